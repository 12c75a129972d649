// Shown on every user-facing message
pub const SIMULATION_BANNER: &str = "🧪 PAPER TRADING SIMULATION · play SOL only, not real returns";

pub const HISTORY_POSITIONS_LIMIT: i64 = 10;
pub const HISTORY_TRANSACTIONS_LIMIT: i64 = 10;
pub const CYCLE_HISTORY_LIMIT: i64 = 5;
// Profit rows read back to compute the streak in daily summaries
pub const PROFIT_STREAK_LOOKBACK_DAYS: i64 = 30;

pub const PROGRESS_BAR_WIDTH: usize = 10;
