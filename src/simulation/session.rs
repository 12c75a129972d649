use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub first_trade_delay_minutes: (i64, i64),
    pub trade_interval_minutes: (i64, i64),
    pub trades_per_day: (u32, u32),
    /// Inclusive UTC hour window for the first trade of the next day.
    pub next_day_hours: (u32, u32),
    pub retry_minutes: (i64, i64),
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            first_trade_delay_minutes: (5, 10),
            trade_interval_minutes: (120, 240),
            trades_per_day: (4, 8),
            next_day_hours: (8, 11),
            retry_minutes: (30, 60),
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let minute_ranges = [
            ("first_trade_delay_minutes", self.first_trade_delay_minutes),
            ("trade_interval_minutes", self.trade_interval_minutes),
            ("retry_minutes", self.retry_minutes),
        ];
        for (name, (min, max)) in minute_ranges {
            if min < 0 || min > max {
                anyhow::bail!("{name} range is invalid: {min}..{max}");
            }
        }
        let (min, max) = self.trades_per_day;
        if min == 0 || min > max {
            anyhow::bail!("trades_per_day range is invalid: {min}..{max}");
        }
        let (from, to) = self.next_day_hours;
        if from > to || to > 23 {
            anyhow::bail!("next_day_hours must be within 0..=23, got {from}..{to}");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub trades: u32,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub profit_streak: u32,
    pub closing_balance: f64,
}

/// Per-user counters of the auto trading loop, persisted between restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSession {
    pub user_id: i32,
    pub trades_per_day: u32,
    pub day: NaiveDate,
    pub trades_today: u32,
    pub wins_today: u32,
    pub losses_today: u32,
    pub daily_pnl: f64,
    pub daily_starting_balance: f64,
    pub total_trades: u64,
    pub next_trade_at: Option<NaiveDateTime>,
}

impl TradingSession {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        user_id: i32,
        balance: f64,
        now: NaiveDateTime,
        config: &ScheduleConfig,
    ) -> Self {
        let (min, max) = config.trades_per_day;
        TradingSession {
            user_id,
            trades_per_day: rng.gen_range(min..=max),
            day: now.date(),
            trades_today: 0,
            wins_today: 0,
            losses_today: 0,
            daily_pnl: 0.0,
            daily_starting_balance: balance,
            total_trades: 0,
            next_trade_at: None,
        }
    }

    /// Closes the previous day when the UTC date changed. A summary is only produced for days with trades.
    pub fn roll_over(&mut self, today: NaiveDate, balance: f64) -> Option<DailySummary> {
        if today <= self.day {
            return None;
        }
        let summary = (self.trades_today > 0).then(|| DailySummary {
            date: self.day,
            trades: self.trades_today,
            pnl: self.daily_pnl,
            pnl_percentage: if self.daily_starting_balance > 0.0 {
                self.daily_pnl / self.daily_starting_balance * 100.0
            } else {
                0.0
            },
            wins: self.wins_today,
            losses: self.losses_today,
            win_rate: self.win_rate(),
            profit_streak: 0,
            closing_balance: balance,
        });
        self.day = today;
        self.trades_today = 0;
        self.wins_today = 0;
        self.losses_today = 0;
        self.daily_pnl = 0.0;
        self.daily_starting_balance = balance;
        summary
    }

    pub fn record_trade(&mut self, pnl: f64) {
        self.trades_today += 1;
        self.total_trades += 1;
        self.daily_pnl += pnl;
        if pnl >= 0.0 {
            self.wins_today += 1;
        } else {
            self.losses_today += 1;
        }
    }

    pub fn daily_limit_reached(&self) -> bool {
        self.trades_today >= self.trades_per_day
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.wins_today + self.losses_today;
        if total == 0 {
            return 0.0;
        }
        self.wins_today as f64 / total as f64 * 100.0
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.next_trade_at.map_or(true, |at| now >= at)
    }

    pub fn schedule_first<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: NaiveDateTime,
        config: &ScheduleConfig,
    ) -> NaiveDateTime {
        self.set_next(now + random_minutes(rng, config.first_trade_delay_minutes))
    }

    /// After a trade: the next slot today, or tomorrow morning once the daily quota is used.
    pub fn schedule_next<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: NaiveDateTime,
        config: &ScheduleConfig,
    ) -> NaiveDateTime {
        if self.daily_limit_reached() {
            return self.schedule_tomorrow(rng, now, config);
        }
        self.set_next(now + random_minutes(rng, config.trade_interval_minutes))
    }

    pub fn schedule_tomorrow<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: NaiveDateTime,
        config: &ScheduleConfig,
    ) -> NaiveDateTime {
        let (from, to) = config.next_day_hours;
        let time = NaiveTime::from_hms_opt(
            rng.gen_range(from..=to),
            rng.gen_range(0..60),
            rng.gen_range(0..60),
        )
        .unwrap_or(NaiveTime::MIN);
        let tomorrow = now.date() + Duration::days(1);
        self.set_next(tomorrow.and_time(time))
    }

    pub fn schedule_retry<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: NaiveDateTime,
        config: &ScheduleConfig,
    ) -> NaiveDateTime {
        self.set_next(now + random_minutes(rng, config.retry_minutes))
    }

    fn set_next(&mut self, at: NaiveDateTime) -> NaiveDateTime {
        self.next_trade_at = Some(at);
        at
    }
}

/// Consecutive profitable days, newest first. A gap in dates ends the streak.
pub fn profit_streak(days_desc: &[(NaiveDate, f64)]) -> u32 {
    let mut streak = 0;
    let mut expected: Option<NaiveDate> = None;
    for (date, amount) in days_desc {
        if *amount <= 0.0 || expected.map_or(false, |e| e != *date) {
            break;
        }
        streak += 1;
        expected = date.pred_opt();
    }
    streak
}

fn random_minutes<R: Rng + ?Sized>(rng: &mut R, (min, max): (i64, i64)) -> Duration {
    Duration::minutes(rng.gen_range(min..=max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn session() -> (TradingSession, StdRng) {
        let mut rng = StdRng::seed_from_u64(11);
        let session = TradingSession::new(&mut rng, 1, 10.0, at(1, 9), &ScheduleConfig::default());
        (session, rng)
    }

    #[test]
    fn test_trades_per_day_within_range() {
        let (session, _) = session();
        assert!((4..=8).contains(&session.trades_per_day));
        assert!(session.is_due(at(1, 9)));
    }

    #[test]
    fn test_rollover_summarises_previous_day() {
        let (mut session, _) = session();
        session.record_trade(0.5);
        session.record_trade(-0.1);
        session.record_trade(0.6);
        assert!(session.roll_over(at(1, 23).date(), 11.0).is_none());

        let summary = session.roll_over(at(2, 0).date(), 11.0).unwrap();
        assert_eq!(summary.date, at(1, 0).date());
        assert_eq!(summary.trades, 3);
        assert_eq!((summary.wins, summary.losses), (2, 1));
        assert!((summary.pnl - 1.0).abs() < 1e-12);
        assert!((summary.pnl_percentage - 10.0).abs() < 1e-9);
        assert!((summary.win_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.closing_balance, 11.0);

        assert_eq!(session.trades_today, 0);
        assert_eq!(session.daily_starting_balance, 11.0);
        assert_eq!(session.total_trades, 3);
        assert!(session.roll_over(at(3, 0).date(), 11.0).is_none());
    }

    #[test]
    fn test_schedule_windows() {
        let cfg = ScheduleConfig::default();
        let (mut session, mut rng) = session();
        let now = at(1, 9);

        let first = session.schedule_first(&mut rng, now, &cfg);
        assert!(first >= now + Duration::minutes(5) && first <= now + Duration::minutes(10));
        assert!(!session.is_due(now));
        assert!(session.is_due(first));

        let next = session.schedule_next(&mut rng, now, &cfg);
        assert!(next >= now + Duration::minutes(120) && next <= now + Duration::minutes(240));

        let retry = session.schedule_retry(&mut rng, now, &cfg);
        assert!(retry >= now + Duration::minutes(30) && retry <= now + Duration::minutes(60));
    }

    #[test]
    fn test_daily_limit_moves_to_tomorrow_morning() {
        let cfg = ScheduleConfig::default();
        let (mut session, mut rng) = session();
        for _ in 0..session.trades_per_day {
            session.record_trade(0.1);
        }
        assert!(session.daily_limit_reached());
        let next = session.schedule_next(&mut rng, at(1, 20), &cfg);
        assert_eq!(next.date(), at(2, 0).date());
        assert!((8..=11).contains(&next.hour()));
    }

    #[test]
    fn test_profit_streak_counts_consecutive_days() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        assert_eq!(profit_streak(&[]), 0);
        assert_eq!(profit_streak(&[(d(5), 1.0), (d(4), 0.2), (d(3), 0.1)]), 3);
        assert_eq!(profit_streak(&[(d(5), 1.0), (d(4), -0.2), (d(3), 0.1)]), 1);
        assert_eq!(profit_streak(&[(d(5), 1.0), (d(3), 0.2)]), 1);
    }

    #[test]
    fn test_schedule_config_validation() {
        assert!(ScheduleConfig::default().validate().is_ok());
        let cfg = ScheduleConfig {
            next_day_hours: (8, 25),
            ..ScheduleConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
