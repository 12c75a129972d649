use crate::schema::*;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use teloxide::prelude::ChatId;

#[derive(diesel_derive_enum::DbEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[ExistingTypePath = "crate::schema::sql_types::UserStatus"]
#[strum(serialize_all = "snake_case")]
pub enum UserStatus {
    Onboarding,
    /// Asked for paper funds, waiting for an admin credit.
    Depositing,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(check_for_backend(Pg))]
#[diesel(table_name = users)]
pub struct BotUser {
    pub id: i32,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Paper SOL, never backed by an on-chain balance.
    pub balance: f64,
    pub status: UserStatus,
    pub initial_deposit: f64,
    pub auto_trading_enabled: bool,
    pub joined_at: chrono::NaiveDateTime,
    pub last_activity: chrono::NaiveDateTime,
}

impl BotUser {
    pub fn get_chat_id(&self) -> ChatId {
        ChatId(self.telegram_id)
    }

    pub fn display_name(&self) -> String {
        match (&self.username, &self.first_name) {
            (Some(username), _) => format!("@{username}"),
            (None, Some(first_name)) => first_name.clone(),
            (None, None) => format!("user {}", self.telegram_id),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(check_for_backend(Pg))]
#[diesel(table_name = users)]
pub struct NewBotUser {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub balance: f64,
    pub status: UserStatus,
    pub initial_deposit: f64,
    pub auto_trading_enabled: bool,
    pub joined_at: chrono::NaiveDateTime,
    pub last_activity: chrono::NaiveDateTime,
}

impl NewBotUser {
    pub(crate) fn new_from_tg_user(user: &teloxide::types::User) -> Self {
        let now = chrono::Utc::now().naive_utc();
        NewBotUser {
            telegram_id: user.id.0 as i64,
            username: user.username.clone(),
            first_name: Some(user.first_name.clone()),
            last_name: user.last_name.clone(),
            balance: 0.0,
            status: UserStatus::Onboarding,
            initial_deposit: 0.0,
            auto_trading_enabled: false,
            joined_at: now,
            last_activity: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::{User as TelegramUser, UserId};

    fn tg_user(username: Option<&str>) -> TelegramUser {
        TelegramUser {
            id: UserId(4242),
            is_bot: false,
            first_name: "Ada".to_string(),
            last_name: None,
            username: username.map(str::to_string),
            language_code: None,
            is_premium: false,
            added_to_attachment_menu: false,
        }
    }

    #[test]
    fn test_new_user_starts_onboarding_without_funds() {
        let user = NewBotUser::new_from_tg_user(&tg_user(Some("ada")));
        assert_eq!(user.telegram_id, 4242);
        assert_eq!(user.status, UserStatus::Onboarding);
        assert_eq!(user.balance, 0.0);
        assert!(!user.auto_trading_enabled);
    }

    #[test]
    fn test_status_display_is_snake_case() {
        assert_eq!(UserStatus::Depositing.to_string(), "depositing");
    }
}
