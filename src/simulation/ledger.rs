use crate::simulation::errors::SimulationError;

/// Balance arithmetic shared by every paper money movement. All results are >= 0.
pub fn credit(balance: f64, amount: f64) -> Result<f64, SimulationError> {
    ensure_positive(amount)?;
    Ok(balance + amount)
}

pub fn debit(balance: f64, amount: f64) -> Result<f64, SimulationError> {
    ensure_positive(amount)?;
    if amount > balance {
        return Err(SimulationError::InsufficientBalance {
            requested: amount,
            available: balance,
        });
    }
    Ok(balance - amount)
}

/// Signed admin adjustment: positive credits, negative debits.
pub fn adjust(balance: f64, delta: f64) -> Result<f64, SimulationError> {
    if delta >= 0.0 {
        credit(balance, delta)
    } else {
        debit(balance, -delta)
    }
}

pub fn withdraw(balance: f64, amount: f64, minimum: f64) -> Result<f64, SimulationError> {
    ensure_positive(amount)?;
    if amount < minimum {
        return Err(SimulationError::BelowMinimumWithdrawal {
            requested: amount,
            minimum,
        });
    }
    debit(balance, amount)
}

/// Applies a trade or tick result. A loss bigger than the balance is clamped,
/// the returned pnl is what was actually booked.
pub fn apply_pnl(balance: f64, pnl: f64) -> (f64, f64) {
    let next = (balance + pnl).max(0.0);
    (next, next - balance)
}

fn ensure_positive(amount: f64) -> Result<(), SimulationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(SimulationError::NonPositiveAmount(amount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdraw_never_goes_negative() {
        assert_eq!(withdraw(1.0, 0.4, 0.1), Ok(0.6));
        assert_eq!(withdraw(1.0, 1.0, 0.1), Ok(0.0));
        assert_eq!(
            withdraw(1.0, 1.5, 0.1),
            Err(SimulationError::InsufficientBalance {
                requested: 1.5,
                available: 1.0
            })
        );
    }

    #[test]
    fn test_withdraw_rules() {
        assert!(matches!(
            withdraw(5.0, 0.05, 0.1),
            Err(SimulationError::BelowMinimumWithdrawal { .. })
        ));
        assert_eq!(withdraw(5.0, 0.0, 0.0), Err(SimulationError::NonPositiveAmount(0.0)));
        assert!(withdraw(5.0, f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_adjust_sign() {
        assert_eq!(adjust(2.0, 0.5), Ok(2.5));
        assert_eq!(adjust(2.0, -0.5), Ok(1.5));
        assert!(adjust(2.0, -2.5).is_err());
    }

    #[test]
    fn test_pnl_is_clamped_at_zero() {
        assert_eq!(apply_pnl(1.0, 0.25), (1.25, 0.25));
        assert_eq!(apply_pnl(1.0, -3.0), (0.0, -1.0));
    }
}
