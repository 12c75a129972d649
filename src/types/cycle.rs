use crate::schema::*;
use crate::types::bot_user::BotUser;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(diesel_derive_enum::DbEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[ExistingTypePath = "crate::schema::sql_types::CycleStatus"]
#[strum(serialize_all = "snake_case")]
pub enum CycleStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

/// A simulated target cycle: grow `initial_balance` to `target_balance` over a fixed number of days.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Identifiable, Selectable, Associations, AsChangeset,
)]
#[diesel(check_for_backend(Pg))]
#[diesel(belongs_to(BotUser, foreign_key = user_id))]
#[diesel(table_name = trading_cycles)]
pub struct TradingCycle {
    pub id: i32,
    pub user_id: i32,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub initial_balance: f64,
    pub target_balance: f64,
    pub current_balance: f64,
    pub status: CycleStatus,
    pub daily_roi_percentage: f64,
    pub total_profit_amount: f64,
    pub total_roi_percentage: f64,
    pub is_auto_roi: bool,
    pub last_tick_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(check_for_backend(Pg))]
#[diesel(table_name = trading_cycles)]
pub struct NewTradingCycle {
    pub user_id: i32,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub initial_balance: f64,
    pub target_balance: f64,
    pub current_balance: f64,
    pub status: CycleStatus,
    pub daily_roi_percentage: f64,
    pub total_profit_amount: f64,
    pub total_roi_percentage: f64,
    pub is_auto_roi: bool,
    pub last_tick_date: Option<NaiveDate>,
}

/// Read-only view used by the `/cycle` screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleMetrics {
    pub status: CycleStatus,
    pub initial_balance: f64,
    pub current_balance: f64,
    pub target_balance: f64,
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub progress_percentage: f64,
    pub is_on_track: bool,
    pub daily_roi_percentage: f64,
    pub total_roi_percentage: f64,
}

impl CycleMetrics {
    pub fn not_started(length_days: i64) -> Self {
        CycleMetrics {
            status: CycleStatus::NotStarted,
            initial_balance: 0.0,
            current_balance: 0.0,
            target_balance: 0.0,
            days_elapsed: 0,
            days_remaining: length_days,
            progress_percentage: 0.0,
            is_on_track: true,
            daily_roi_percentage: 0.0,
            total_roi_percentage: 0.0,
        }
    }
}
