use crate::schema::*;
use crate::types::bot_user::BotUser;
use chrono::NaiveDateTime;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(diesel_derive_enum::DbEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[ExistingTypePath = "crate::schema::sql_types::PositionStatus"]
#[strum(serialize_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

pub const TRADE_TYPE_AUTO: &str = "auto";
pub const TRADE_TYPE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable, Associations)]
#[diesel(check_for_backend(Pg))]
#[diesel(belongs_to(BotUser, foreign_key = user_id))]
#[diesel(table_name = trading_positions)]
pub struct TradingPosition {
    pub id: i32,
    pub user_id: i32,
    pub token_name: String,
    pub token_symbol: String,
    /// Paper stake in SOL.
    pub amount: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub status: PositionStatus,
    pub trade_type: String,
    pub opened_at: NaiveDateTime,
    pub closed_at: Option<NaiveDateTime>,
    pub roi_percentage: Option<f64>,
    pub created_by: Option<i64>,
}

impl TradingPosition {
    /// Return on the stake for a given exit price, in percent.
    pub fn roi_at(&self, exit_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (exit_price / self.entry_price - 1.0) * 100.0
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(check_for_backend(Pg))]
#[diesel(table_name = trading_positions)]
pub struct NewTradingPosition {
    pub user_id: i32,
    pub token_name: String,
    pub token_symbol: String,
    pub amount: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub status: PositionStatus,
    pub trade_type: String,
    pub opened_at: NaiveDateTime,
    pub closed_at: Option<NaiveDateTime>,
    pub roi_percentage: Option<f64>,
    pub created_by: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(entry_price: f64) -> TradingPosition {
        TradingPosition {
            id: 1,
            user_id: 1,
            token_name: "Dog Coin".to_string(),
            token_symbol: "DOG".to_string(),
            amount: 2.0,
            entry_price,
            exit_price: None,
            status: PositionStatus::Open,
            trade_type: TRADE_TYPE_ADMIN.to_string(),
            opened_at: chrono::Utc::now().naive_utc(),
            closed_at: None,
            roi_percentage: None,
            created_by: Some(99),
        }
    }

    #[test]
    fn test_roi_at_exit_price() {
        let p = position(0.002);
        assert!((p.roi_at(0.003) - 50.0).abs() < 1e-9);
        assert!((p.roi_at(0.001) + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_roi_with_zero_entry_is_flat() {
        assert_eq!(position(0.0).roi_at(1.0), 0.0);
    }
}
