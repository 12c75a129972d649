pub mod formatters;

use crate::storage::persistent::UserLookup;
use teloxide::prelude::Message;
use teloxide::types::User as TelegramUser;
use tracing::warn;

/// The human sender of a private-chat command. Bots and group chats are ignored.
pub fn get_user_from_user_message(message: &Message) -> Option<TelegramUser> {
    let user = message.from()?;
    if user.is_bot {
        return None;
    }
    if !message.chat.is_private() {
        warn!(
            "Ignoring command from user {} in non-private chat {}",
            user.id.0, message.chat.id.0
        );
        return None;
    }
    Some(user.clone())
}

/// `@name` or a bare username selects by username, a number by telegram id.
pub fn parse_user_lookup(target: &str) -> Option<UserLookup> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    if let Ok(id) = target.parse::<i64>() {
        return Some(UserLookup::TelegramId(id));
    }
    let username = target.trim_start_matches('@');
    (!username.is_empty()).then(|| UserLookup::Username(username.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_lookup() {
        assert!(matches!(parse_user_lookup("12345"), Some(UserLookup::TelegramId(12345))));
        assert!(matches!(parse_user_lookup("@ada"), Some(UserLookup::Username(name)) if name == "ada"));
        assert!(matches!(parse_user_lookup("ada"), Some(UserLookup::Username(name)) if name == "ada"));
        assert!(parse_user_lookup("@").is_none());
        assert!(parse_user_lookup("  ").is_none());
    }
}
