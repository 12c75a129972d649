use crate::schema::*;
use crate::types::bot_user::BotUser;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(diesel_derive_enum::DbEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[ExistingTypePath = "crate::schema::sql_types::TxKind"]
#[strum(serialize_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdraw,
    AdminCredit,
    AdminDebit,
    Buy,
    Sell,
    TradeProfit,
    TradeLoss,
}

impl TxKind {
    /// Whether the kind adds to the user's paper balance.
    pub fn is_inflow(&self) -> bool {
        matches!(
            self,
            TxKind::Deposit | TxKind::AdminCredit | TxKind::Sell | TxKind::TradeProfit
        )
    }

    pub fn for_pnl(pnl: f64) -> Self {
        if pnl >= 0.0 {
            TxKind::TradeProfit
        } else {
            TxKind::TradeLoss
        }
    }
}

#[derive(diesel_derive_enum::DbEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[ExistingTypePath = "crate::schema::sql_types::TxStatus"]
#[strum(serialize_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable, Associations)]
#[diesel(check_for_backend(Pg))]
#[diesel(belongs_to(BotUser, foreign_key = user_id))]
#[diesel(table_name = transactions)]
pub struct Transaction {
    pub id: i32,
    pub user_id: i32,
    pub kind: TxKind,
    pub amount: f64,
    pub token_name: Option<String>,
    pub price: Option<f64>,
    pub status: TxStatus,
    pub notes: Option<String>,
    pub timestamp: chrono::NaiveDateTime,
    pub processed_at: Option<chrono::NaiveDateTime>,
    pub related_position_id: Option<i32>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(check_for_backend(Pg))]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    pub user_id: i32,
    pub kind: TxKind,
    pub amount: f64,
    pub token_name: Option<String>,
    pub price: Option<f64>,
    pub status: TxStatus,
    pub notes: Option<String>,
    pub timestamp: chrono::NaiveDateTime,
    pub processed_at: Option<chrono::NaiveDateTime>,
    pub related_position_id: Option<i32>,
}

impl NewTransaction {
    /// A completed ledger row, the common case for everything but withdrawals.
    pub fn completed(user_id: i32, kind: TxKind, amount: f64, notes: Option<String>) -> Self {
        let now = chrono::Utc::now().naive_utc();
        NewTransaction {
            user_id,
            kind,
            amount: amount.abs(),
            token_name: None,
            price: None,
            status: TxStatus::Completed,
            notes,
            timestamp: now,
            processed_at: Some(now),
            related_position_id: None,
        }
    }

    pub fn pending_withdrawal(user_id: i32, amount: f64) -> Self {
        NewTransaction {
            user_id,
            kind: TxKind::Withdraw,
            amount,
            token_name: None,
            price: None,
            status: TxStatus::Pending,
            notes: Some("paper withdrawal request".to_string()),
            timestamp: chrono::Utc::now().naive_utc(),
            processed_at: None,
            related_position_id: None,
        }
    }

    pub fn with_token(mut self, token_name: String, price: f64) -> Self {
        self.token_name = Some(token_name);
        self.price = Some(price);
        self
    }

    pub fn with_position(mut self, position_id: i32) -> Self {
        self.related_position_id = Some(position_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable, Associations)]
#[diesel(check_for_backend(Pg))]
#[diesel(belongs_to(BotUser, foreign_key = user_id))]
#[diesel(table_name = profits)]
pub struct Profit {
    pub id: i32,
    pub user_id: i32,
    pub amount: f64,
    pub percentage: f64,
    pub date: chrono::NaiveDate,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = profits)]
pub struct NewProfit {
    pub user_id: i32,
    pub amount: f64,
    pub percentage: f64,
    pub date: chrono::NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pnl_picks_kind_and_amount_is_unsigned() {
        assert_eq!(TxKind::for_pnl(0.4), TxKind::TradeProfit);
        assert_eq!(TxKind::for_pnl(-0.4), TxKind::TradeLoss);
        let tx = NewTransaction::completed(1, TxKind::for_pnl(-0.4), -0.4, None);
        assert_eq!(tx.amount, 0.4);
        assert_eq!(tx.status, TxStatus::Completed);
    }

    #[test]
    fn test_withdrawal_starts_pending() {
        let tx = NewTransaction::pending_withdrawal(7, 1.5);
        assert_eq!(tx.kind, TxKind::Withdraw);
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(tx.processed_at.is_none());
        assert!(!tx.kind.is_inflow());
    }
}
