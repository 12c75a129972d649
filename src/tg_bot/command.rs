use strum_macros::Display;
use teloxide::utils::command::{BotCommands, ParseError};

#[derive(BotCommands, Clone, Display, Debug, PartialEq)]
#[command(
    rename_rule = "lowercase",
    description = "Paper trading simulator. All balances are play SOL. These commands are supported:"
)]
pub enum UserCommand {
    #[command(description = "Register and read the simulation disclaimer")]
    Start,
    #[command(description = "Receive paper SOL and start the simulated trading loop")]
    Simulate,
    #[command(description = "Show your paper balance")]
    Balance,
    #[command(description = "Last simulated trades and paper transactions")]
    History,
    #[command(description = "Progress of your simulated target cycle")]
    Cycle,
    #[command(description = "Request a paper withdrawal, e.g. /withdraw 0.5")]
    Withdraw(String),
    #[command(description = "Stop the simulated trading loop")]
    Stop,
    #[command(description = "Show this help")]
    Help,
}

#[derive(BotCommands, Clone, Display, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Admin commands (paper balances only):")]
pub enum AdminCommand {
    #[command(description = "Credit paper SOL: /credit <@user|tg_id> <amount> [note]", parse_with = parse_adjustment)]
    Credit(String, f64, String),
    #[command(description = "Debit paper SOL: /debit <@user|tg_id> <amount> [note]", parse_with = parse_adjustment)]
    Debit(String, f64, String),
    #[command(
        description = "Start a cycle: /startcycle <@user|tg_id> [initial] [daily_roi]",
        parse_with = parse_start_cycle
    )]
    StartCycle(String, Option<f64>, Option<f64>),
    #[command(description = "Pause a cycle: /pausecycle <@user|tg_id>")]
    PauseCycle(String),
    #[command(description = "Resume a cycle: /resumecycle <@user|tg_id>")]
    ResumeCycle(String),
    #[command(description = "Set the daily cycle %: /setroi <@user|tg_id> <pct>", parse_with = parse_target_and_number)]
    SetRoi(String, f64),
    #[command(description = "Turn simulated trading on: /autoon <@user|tg_id>")]
    AutoOn(String),
    #[command(description = "Turn simulated trading off: /autooff <@user|tg_id>")]
    AutoOff(String),
    #[command(description = "Open a simulated position for all users: /buy <symbol> <entry>", parse_with = parse_target_and_number)]
    Buy(String, f64),
    #[command(description = "Close simulated positions: /sell <symbol> <exit>", parse_with = parse_target_and_number)]
    Sell(String, f64),
    #[command(description = "List pending paper withdrawals")]
    Withdrawals,
    #[command(description = "Approve a paper withdrawal: /approve <id>")]
    Approve(i32),
    #[command(description = "Reject and refund a paper withdrawal: /reject <id>")]
    Reject(i32),
    #[command(description = "List users")]
    Users,
    #[command(description = "Show admin help")]
    AdminHelp,
}

fn custom(message: &str) -> ParseError {
    ParseError::Custom(message.to_string().into())
}

fn parse_number(token: Option<&str>, what: &str) -> Result<f64, ParseError> {
    let token = token.ok_or_else(|| custom(&format!("missing {what}")))?;
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| custom(&format!("{what} must be a number, got {token}")))
}

fn parse_target(token: Option<&str>) -> Result<String, ParseError> {
    token
        .map(str::to_string)
        .ok_or_else(|| custom("missing user (@username or telegram id)"))
}

fn parse_adjustment(input: String) -> Result<(String, f64, String), ParseError> {
    let mut parts = input.split_whitespace();
    let target = parse_target(parts.next())?;
    let amount = parse_number(parts.next(), "amount")?;
    let note = parts.collect::<Vec<_>>().join(" ");
    Ok((target, amount, note))
}

fn parse_target_and_number(input: String) -> Result<(String, f64), ParseError> {
    let mut parts = input.split_whitespace();
    let target = parse_target(parts.next())?;
    let value = parse_number(parts.next(), "value")?;
    if parts.next().is_some() {
        return Err(custom("too many arguments"));
    }
    Ok((target, value))
}

fn parse_start_cycle(input: String) -> Result<(String, Option<f64>, Option<f64>), ParseError> {
    let mut parts = input.split_whitespace();
    let target = parse_target(parts.next())?;
    let initial = parts.next().map(|t| parse_number(Some(t), "initial balance")).transpose()?;
    let roi = parts.next().map(|t| parse_number(Some(t), "daily roi")).transpose()?;
    Ok((target, initial, roi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_withdraw_keeps_raw_amount() {
        let cmd = UserCommand::parse("/withdraw 0.5", "bot").unwrap();
        assert_eq!(cmd, UserCommand::Withdraw("0.5".to_string()));
    }

    #[test]
    fn test_credit_with_note() {
        let cmd = AdminCommand::parse("/credit @ada 1.5 welcome bonus", "bot").unwrap();
        assert_eq!(
            cmd,
            AdminCommand::Credit("@ada".to_string(), 1.5, "welcome bonus".to_string())
        );
        let cmd = AdminCommand::parse("/debit 42 0.25", "bot").unwrap();
        assert_eq!(cmd, AdminCommand::Debit("42".to_string(), 0.25, String::new()));
    }

    #[test]
    fn test_start_cycle_optional_arguments() {
        assert_eq!(
            AdminCommand::parse("/startcycle @ada", "bot").unwrap(),
            AdminCommand::StartCycle("@ada".to_string(), None, None)
        );
        assert_eq!(
            AdminCommand::parse("/startcycle @ada 2 15", "bot").unwrap(),
            AdminCommand::StartCycle("@ada".to_string(), Some(2.0), Some(15.0))
        );
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        assert!(AdminCommand::parse("/credit @ada lots", "bot").is_err());
        assert!(AdminCommand::parse("/setroi @ada", "bot").is_err());
        assert!(AdminCommand::parse("/buy BONK 0.1 extra", "bot").is_err());
        assert!(AdminCommand::parse("/setroi @ada NaN", "bot").is_err());
    }
}
