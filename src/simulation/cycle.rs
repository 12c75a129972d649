use crate::simulation::errors::SimulationError;
use crate::simulation::ledger;
use crate::types::cycle::{CycleMetrics, CycleStatus, NewTradingCycle, TradingCycle};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

const BALANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub target_multiplier: f64,
    pub length_days: i64,
    /// When unset the daily percentage is derived from the multiplier and length.
    pub default_daily_roi: Option<f64>,
    pub tick_interval_s: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        CycleConfig {
            target_multiplier: 2.0,
            length_days: 7,
            default_daily_roi: None,
            tick_interval_s: 3600,
        }
    }
}

impl CycleConfig {
    pub fn auto_daily_roi(&self) -> f64 {
        (self.target_multiplier - 1.0) * 100.0 / self.length_days as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotInProgress(CycleStatus),
    AlreadyTickedToday,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Applied {
        profit: f64,
        percentage: f64,
        completed: bool,
    },
}

pub fn is_open(cycle: &TradingCycle) -> bool {
    cycle.status != CycleStatus::Completed
}

/// Builds a fresh, not yet started cycle for `initial_balance`.
pub fn plan_cycle(
    user_id: i32,
    initial_balance: f64,
    daily_roi: Option<f64>,
    config: &CycleConfig,
    now: NaiveDateTime,
) -> Result<NewTradingCycle, SimulationError> {
    if !initial_balance.is_finite() || initial_balance <= 0.0 {
        return Err(SimulationError::NonPositiveAmount(initial_balance));
    }
    let (daily_roi_percentage, is_auto_roi) = match daily_roi.or(config.default_daily_roi) {
        Some(pct) => (validate_roi(pct)?, daily_roi.is_none()),
        None => (config.auto_daily_roi(), true),
    };
    Ok(NewTradingCycle {
        user_id,
        start_date: now,
        end_date: None,
        initial_balance,
        target_balance: initial_balance * config.target_multiplier,
        current_balance: initial_balance,
        status: CycleStatus::NotStarted,
        daily_roi_percentage,
        total_profit_amount: 0.0,
        total_roi_percentage: 0.0,
        is_auto_roi,
        last_tick_date: None,
    })
}

pub fn begin(cycle: &mut TradingCycle, now: NaiveDateTime) -> Result<(), SimulationError> {
    transition(cycle, "begin", CycleStatus::NotStarted, CycleStatus::InProgress)?;
    cycle.start_date = now;
    Ok(())
}

pub fn pause(cycle: &mut TradingCycle) -> Result<(), SimulationError> {
    transition(cycle, "pause", CycleStatus::InProgress, CycleStatus::Paused)
}

pub fn resume(cycle: &mut TradingCycle) -> Result<(), SimulationError> {
    transition(cycle, "resume", CycleStatus::Paused, CycleStatus::InProgress)
}

pub fn complete(cycle: &mut TradingCycle, now: NaiveDateTime) -> Result<(), SimulationError> {
    if cycle.status == CycleStatus::Completed {
        return Err(SimulationError::InvalidCycleTransition {
            action: "complete",
            from: cycle.status,
        });
    }
    cycle.status = CycleStatus::Completed;
    cycle.end_date = Some(now);
    Ok(())
}

pub fn set_daily_roi(cycle: &mut TradingCycle, percentage: f64) -> Result<(), SimulationError> {
    match cycle.status {
        CycleStatus::InProgress | CycleStatus::Paused => {
            cycle.daily_roi_percentage = validate_roi(percentage)?;
            cycle.is_auto_roi = false;
            Ok(())
        }
        from => Err(SimulationError::InvalidCycleTransition {
            action: "set the daily ROI of",
            from,
        }),
    }
}

/// Applies one day of growth. Idempotent per UTC date, missed days are not caught up.
pub fn apply_daily_tick(
    cycle: &mut TradingCycle,
    today: NaiveDate,
    now: NaiveDateTime,
    length_days: i64,
) -> TickOutcome {
    if cycle.status != CycleStatus::InProgress {
        return TickOutcome::Skipped(SkipReason::NotInProgress(cycle.status));
    }
    if cycle.last_tick_date == Some(today) {
        return TickOutcome::Skipped(SkipReason::AlreadyTickedToday);
    }
    let percentage = cycle.daily_roi_percentage;
    let (current_balance, profit) = ledger::apply_pnl(
        cycle.current_balance,
        cycle.initial_balance * percentage / 100.0,
    );
    cycle.current_balance = current_balance;
    cycle.total_profit_amount += profit;
    cycle.total_roi_percentage = cycle.total_profit_amount / cycle.initial_balance * 100.0;
    cycle.last_tick_date = Some(today);

    let completed = target_reached(cycle) || days_elapsed(cycle, now) >= length_days;
    if completed {
        cycle.status = CycleStatus::Completed;
        cycle.end_date = Some(now);
    }
    TickOutcome::Applied {
        profit,
        percentage,
        completed,
    }
}

/// Mirrors an admin balance change into an open cycle. Returns true when it completed the cycle.
pub fn apply_balance_adjustment(cycle: &mut TradingCycle, delta: f64, now: NaiveDateTime) -> bool {
    if !is_open(cycle) {
        return false;
    }
    cycle.current_balance = (cycle.current_balance + delta).max(0.0);
    if cycle.status != CycleStatus::NotStarted && target_reached(cycle) {
        cycle.status = CycleStatus::Completed;
        cycle.end_date = Some(now);
        return true;
    }
    false
}

pub fn days_elapsed(cycle: &TradingCycle, now: NaiveDateTime) -> i64 {
    (now - cycle.start_date).num_days().max(0)
}

pub fn metrics(cycle: &TradingCycle, now: NaiveDateTime, length_days: i64) -> CycleMetrics {
    let end = cycle.end_date.unwrap_or(now);
    let days_elapsed = days_elapsed(cycle, end).min(length_days);
    let goal = cycle.target_balance - cycle.initial_balance;
    let progress_percentage = if goal > 0.0 {
        ((cycle.current_balance - cycle.initial_balance) / goal * 100.0).clamp(0.0, 100.0)
    } else {
        100.0
    };
    let expected = days_elapsed as f64 / length_days.max(1) as f64 * 100.0;
    CycleMetrics {
        status: cycle.status,
        initial_balance: cycle.initial_balance,
        current_balance: cycle.current_balance,
        target_balance: cycle.target_balance,
        days_elapsed,
        days_remaining: (length_days - days_elapsed).max(0),
        progress_percentage,
        is_on_track: progress_percentage + BALANCE_EPSILON >= expected,
        daily_roi_percentage: cycle.daily_roi_percentage,
        total_roi_percentage: cycle.total_roi_percentage,
    }
}

fn target_reached(cycle: &TradingCycle) -> bool {
    cycle.current_balance + BALANCE_EPSILON >= cycle.target_balance
}

fn validate_roi(percentage: f64) -> Result<f64, SimulationError> {
    if !percentage.is_finite() || percentage <= -100.0 {
        return Err(SimulationError::InvalidRoi(percentage));
    }
    Ok(percentage)
}

fn transition(
    cycle: &mut TradingCycle,
    action: &'static str,
    from: CycleStatus,
    to: CycleStatus,
) -> Result<(), SimulationError> {
    if cycle.status != from {
        return Err(SimulationError::InvalidCycleTransition {
            action,
            from: cycle.status,
        });
    }
    cycle.status = to;
    Ok(())
}

#[cfg(test)]
pub(crate) fn cycle_from_plan(id: i32, plan: NewTradingCycle) -> TradingCycle {
    TradingCycle {
        id,
        user_id: plan.user_id,
        start_date: plan.start_date,
        end_date: plan.end_date,
        initial_balance: plan.initial_balance,
        target_balance: plan.target_balance,
        current_balance: plan.current_balance,
        status: plan.status,
        daily_roi_percentage: plan.daily_roi_percentage,
        total_profit_amount: plan.total_profit_amount,
        total_roi_percentage: plan.total_roi_percentage,
        is_auto_roi: plan.is_auto_roi,
        last_tick_date: plan.last_tick_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn started(initial: f64, roi: Option<f64>) -> TradingCycle {
        let plan = plan_cycle(1, initial, roi, &CycleConfig::default(), t0()).unwrap();
        let mut cycle = cycle_from_plan(1, plan);
        begin(&mut cycle, t0()).unwrap();
        cycle
    }

    fn tick_day(cycle: &mut TradingCycle, day: i64) -> TickOutcome {
        let now = t0() + Duration::days(day);
        apply_daily_tick(cycle, now.date(), now, 7)
    }

    #[test]
    fn test_plan_derives_target_and_auto_roi() {
        let plan = plan_cycle(3, 1.5, None, &CycleConfig::default(), t0()).unwrap();
        assert_eq!(plan.status, CycleStatus::NotStarted);
        assert_eq!(plan.target_balance, 3.0);
        assert!(plan.is_auto_roi);
        assert!((plan.daily_roi_percentage - 100.0 / 7.0).abs() < 1e-9);

        let manual = plan_cycle(3, 1.5, Some(10.0), &CycleConfig::default(), t0()).unwrap();
        assert!(!manual.is_auto_roi);
        assert_eq!(manual.daily_roi_percentage, 10.0);
    }

    #[test]
    fn test_plan_rejects_empty_balance() {
        assert_eq!(
            plan_cycle(3, 0.0, None, &CycleConfig::default(), t0()),
            Err(SimulationError::NonPositiveAmount(0.0))
        );
    }

    #[test]
    fn test_full_lifecycle_transitions() {
        let plan = plan_cycle(1, 1.0, None, &CycleConfig::default(), t0()).unwrap();
        let mut cycle = cycle_from_plan(1, plan);
        assert!(pause(&mut cycle).is_err());
        begin(&mut cycle, t0()).unwrap();
        assert_eq!(cycle.status, CycleStatus::InProgress);
        assert!(begin(&mut cycle, t0()).is_err());
        assert!(resume(&mut cycle).is_err());
        pause(&mut cycle).unwrap();
        assert_eq!(cycle.status, CycleStatus::Paused);
        assert!(pause(&mut cycle).is_err());
        resume(&mut cycle).unwrap();
        assert_eq!(cycle.status, CycleStatus::InProgress);
        complete(&mut cycle, t0()).unwrap();
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert_eq!(cycle.end_date, Some(t0()));
        assert!(resume(&mut cycle).is_err());
        assert!(complete(&mut cycle, t0()).is_err());
    }

    #[test]
    fn test_completes_when_target_reached() {
        let mut cycle = started(1.0, Some(50.0));
        assert_eq!(
            tick_day(&mut cycle, 1),
            TickOutcome::Applied {
                profit: 0.5,
                percentage: 50.0,
                completed: false
            }
        );
        assert!(matches!(
            tick_day(&mut cycle, 2),
            TickOutcome::Applied { completed: true, .. }
        ));
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert_eq!(cycle.current_balance, 2.0);
        assert_eq!(cycle.total_roi_percentage, 100.0);
    }

    #[test]
    fn test_auto_roi_doubles_in_seven_ticks() {
        let mut cycle = started(2.0, None);
        for day in 1..7 {
            assert!(matches!(
                tick_day(&mut cycle, day),
                TickOutcome::Applied { completed: false, .. }
            ));
        }
        assert!(matches!(
            tick_day(&mut cycle, 7),
            TickOutcome::Applied { completed: true, .. }
        ));
        assert!((cycle.current_balance - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_completes_after_length_elapsed() {
        let mut cycle = started(1.0, Some(1.0));
        assert!(matches!(
            tick_day(&mut cycle, 6),
            TickOutcome::Applied { completed: false, .. }
        ));
        assert!(matches!(
            tick_day(&mut cycle, 7),
            TickOutcome::Applied { completed: true, .. }
        ));
        assert!(cycle.current_balance < cycle.target_balance);
    }

    #[test]
    fn test_tick_is_once_per_day_and_skips_paused() {
        let mut cycle = started(1.0, Some(5.0));
        assert!(matches!(tick_day(&mut cycle, 1), TickOutcome::Applied { .. }));
        assert_eq!(
            tick_day(&mut cycle, 1),
            TickOutcome::Skipped(SkipReason::AlreadyTickedToday)
        );
        pause(&mut cycle).unwrap();
        assert_eq!(
            tick_day(&mut cycle, 2),
            TickOutcome::Skipped(SkipReason::NotInProgress(CycleStatus::Paused))
        );
        assert!((cycle.current_balance - 1.05).abs() < 1e-9);
    }

    #[test]
    fn test_negative_roi_never_takes_cycle_below_zero() {
        let mut cycle = started(1.0, Some(-90.0));
        tick_day(&mut cycle, 1);
        tick_day(&mut cycle, 2);
        assert_eq!(cycle.current_balance, 0.0);
        assert!((cycle.total_profit_amount + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_daily_roi_rules() {
        let mut cycle = started(1.0, None);
        set_daily_roi(&mut cycle, 3.5).unwrap();
        assert!(!cycle.is_auto_roi);
        assert_eq!(cycle.daily_roi_percentage, 3.5);
        assert_eq!(
            set_daily_roi(&mut cycle, -100.0),
            Err(SimulationError::InvalidRoi(-100.0))
        );
        assert!(set_daily_roi(&mut cycle, f64::INFINITY).is_err());
        pause(&mut cycle).unwrap();
        assert!(set_daily_roi(&mut cycle, 2.0).is_ok());
        complete(&mut cycle, t0()).unwrap();
        assert!(set_daily_roi(&mut cycle, 2.0).is_err());
    }

    #[test]
    fn test_admin_credit_can_complete_cycle() {
        let mut cycle = started(1.0, None);
        assert!(!apply_balance_adjustment(&mut cycle, 0.5, t0()));
        assert!(apply_balance_adjustment(&mut cycle, 0.5, t0()));
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert!(!apply_balance_adjustment(&mut cycle, 5.0, t0()));
        assert_eq!(cycle.current_balance, 2.0);
    }

    #[test]
    fn test_metrics_progress_and_track() {
        let mut cycle = started(1.0, None);
        tick_day(&mut cycle, 1);
        let m = metrics(&cycle, t0() + Duration::days(1), 7);
        assert_eq!(m.days_elapsed, 1);
        assert_eq!(m.days_remaining, 6);
        assert!((m.progress_percentage - 100.0 / 7.0).abs() < 1e-6);
        assert!(m.is_on_track);

        let late = metrics(&cycle, t0() + Duration::days(3), 7);
        assert!(!late.is_on_track);
    }
}
