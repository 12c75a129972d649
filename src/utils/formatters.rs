pub fn format_sol(value: f64) -> String {
    let s = format!("{:.4}", value);
    let s = s.trim_end_matches('0');
    s.trim_end_matches('.').to_string()
}

/// Same as `format_sol` but always carries the sign, `+0.5` / `-0.25`.
pub fn format_signed_sol(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", format_sol(value))
    } else {
        format!("-{}", format_sol(-value))
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:+.2}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sol_trims_zeros() {
        assert_eq!(format_sol(1.5), "1.5");
        assert_eq!(format_sol(2.0), "2");
        assert_eq!(format_sol(0.12345), "0.1235");
    }

    #[test]
    fn test_signed_and_percent() {
        assert_eq!(format_signed_sol(0.25), "+0.25");
        assert_eq!(format_signed_sol(-0.25), "-0.25");
        assert_eq!(format_percent(12.345), "+12.35%");
        assert_eq!(format_percent(-3.0), "-3.00%");
    }
}
