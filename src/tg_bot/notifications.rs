use crate::simulation::SimulationError;
use crate::tg_bot::helpers::formatters::with_banner;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html::escape;
use teloxide::Bot;
use tracing::{error, warn};

/// Fire-and-forget push to a user. Delivery failures are logged, never propagated.
pub async fn notify_user(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot
        .send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .disable_web_page_preview(true)
        .await
    {
        warn!("Failed to notify chat {}: {e}", chat_id.0);
    }
}

/// Reply to the chat a command came from.
pub async fn reply(bot: &Bot, msg: &Message, text: &str) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .disable_web_page_preview(true)
        .await?;
    Ok(())
}

/// Short text for a failed command. Domain rule violations are shown as is, anything else stays in the logs.
pub fn error_text(e: &anyhow::Error) -> String {
    match e.downcast_ref::<SimulationError>() {
        Some(rule) => with_banner(&format!("⚠️ {}", escape(&rule.to_string()))),
        None => with_banner("⚠️ Something went wrong, please try again later."),
    }
}

/// Sends the handler's text, or its error as a short reply.
pub async fn respond(bot: &Bot, msg: &Message, result: anyhow::Result<String>) -> ResponseResult<()> {
    let text = match result {
        Ok(text) => text,
        Err(e) => {
            error!("Command in chat {} failed: {e:#}", msg.chat.id.0);
            error_text(&e)
        }
    };
    reply(bot, msg, &text).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_violations_are_shown() {
        let e = anyhow::Error::from(SimulationError::NonPositiveAmount(-1.0));
        assert!(error_text(&e).contains("amount must be positive"));
    }

    #[test]
    fn test_internal_errors_are_hidden() {
        let e = anyhow::anyhow!("connection refused to 10.0.0.3");
        assert!(!error_text(&e).contains("10.0.0.3"));
    }
}
