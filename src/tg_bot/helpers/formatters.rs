use crate::config::constants::{PROGRESS_BAR_WIDTH, SIMULATION_BANNER};
use crate::simulation::cycle::{self, TickOutcome};
use crate::simulation::session::DailySummary;
use crate::simulation::trade_generator::SimulatedTrade;
use crate::storage::persistent::{BalanceAdjustment, CycleTick, RecordedTrade};
use crate::types::bot_user::BotUser;
use crate::types::cycle::{CycleMetrics, CycleStatus, TradingCycle};
use crate::types::ledger::{Transaction, TxKind, TxStatus};
use crate::types::position::{PositionStatus, TradingPosition};
use crate::utils::formatters::{format_percent, format_signed_sol, format_sol};
use chrono::NaiveDateTime;
use teloxide::utils::html::{bold, escape, italic, link};

/// Every user-facing text goes through here so the simulation label is never missing.
pub fn with_banner(body: &str) -> String {
    format!("{}\n\n{body}", italic(SIMULATION_BANNER))
}

pub fn format_sol_amount(amount: f64) -> String {
    format!("{} SOL", format_sol(amount))
}

pub fn progress_bar(percentage: f64) -> String {
    let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * PROGRESS_BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:.1}%",
        "█".repeat(filled),
        "░".repeat(PROGRESS_BAR_WIDTH - filled),
        percentage.clamp(0.0, 100.0)
    )
}

pub fn format_welcome(user: &BotUser) -> String {
    with_banner(&format!(
        "Welcome {}!\n\n\
         This bot runs a {} of memecoin trading. Every trade, balance and profit you see here \
         is generated by a random simulator using play SOL. Nothing is bought or sold on chain \
         and no result shown here is a real or expected return.\n\n\
         Use /simulate to receive paper SOL and start the simulated trading loop, /help for all commands.",
        escape(&user.display_name()),
        bold("paper trading simulation"),
    ))
}

pub fn format_trade_message(trade: &SimulatedTrade, pnl: f64, balance: f64) -> String {
    let token = match &trade.token_link {
        Some(url) => link(url, &escape(&trade.token_name)),
        None => escape(&trade.token_name),
    };
    let headline = if pnl >= 0.0 {
        if trade.is_standout {
            "🚀 Simulated standout win"
        } else {
            "✅ Simulated win"
        }
    } else {
        "🔻 Simulated loss"
    };
    with_banner(&format!(
        "{}\n\n\
         Token: {token} ({})\n\
         Entry: {}\n\
         Exit: {}\n\
         Stake: {}\n\
         Result: {} SOL ({})\n\
         Held: {} min\n\n\
         Paper balance: {}",
        bold(headline),
        escape(&trade.token_symbol),
        trade.entry_price,
        trade.exit_price,
        format_sol_amount(trade.stake),
        format_signed_sol(pnl),
        format_percent(trade.pnl_percentage),
        (trade.closed_at - trade.opened_at).num_minutes(),
        format_sol_amount(balance),
    ))
}

pub fn format_daily_summary(summary: &DailySummary) -> String {
    with_banner(&format!(
        "{}\n\n\
         Simulated trades: {} ({} wins, {} losses, win rate {:.0}%)\n\
         Day result: {} SOL ({})\n\
         Profit streak: {} day(s)\n\
         Closing paper balance: {}",
        bold(&format!("📊 Simulated day summary {}", summary.date)),
        summary.trades,
        summary.wins,
        summary.losses,
        summary.win_rate,
        format_signed_sol(summary.pnl),
        format_percent(summary.pnl_percentage),
        summary.profit_streak,
        format_sol_amount(summary.closing_balance),
    ))
}

fn status_label(status: CycleStatus) -> &'static str {
    match status {
        CycleStatus::NotStarted => "not started",
        CycleStatus::InProgress => "in progress",
        CycleStatus::Paused => "paused",
        CycleStatus::Completed => "completed",
    }
}

fn metrics_body(metrics: &CycleMetrics) -> String {
    format!(
        "Status: {}\n\
         {}\n\
         Start: {} → now: {} (target {})\n\
         Day {} ({} remaining)\n\
         Daily growth: {}\n\
         Total growth: {}\n\
         {}",
        status_label(metrics.status),
        progress_bar(metrics.progress_percentage),
        format_sol_amount(metrics.initial_balance),
        format_sol_amount(metrics.current_balance),
        format_sol_amount(metrics.target_balance),
        metrics.days_elapsed,
        metrics.days_remaining,
        format_percent(metrics.daily_roi_percentage),
        format_percent(metrics.total_roi_percentage),
        if metrics.is_on_track {
            "On track"
        } else {
            "Behind schedule"
        },
    )
}

pub fn format_cycle_screen(open: Option<&TradingCycle>, history: &[TradingCycle], now: NaiveDateTime, length_days: i64) -> String {
    let current = match open {
        Some(open) => metrics_body(&cycle::metrics(open, now, length_days)),
        None => "No simulated cycle is running. An admin starts one after your paper balance is funded.".to_string(),
    };
    let past: Vec<String> = history
        .iter()
        .filter(|c| c.status == CycleStatus::Completed)
        .map(|c| {
            format!(
                "• {} {} → {} ({})",
                c.start_date.date(),
                format_sol_amount(c.initial_balance),
                format_sol_amount(c.current_balance),
                format_percent(c.total_roi_percentage),
            )
        })
        .collect();
    let mut body = format!("{}\n\n{current}", bold("🎯 Simulated target cycle"));
    if !past.is_empty() {
        body.push_str(&format!("\n\n{}\n{}", bold("Past cycles"), past.join("\n")));
    }
    with_banner(&body)
}

pub fn format_cycle_update(headline: &str, cycle: &TradingCycle, now: NaiveDateTime, length_days: i64) -> String {
    with_banner(&format!(
        "{}\n\n{}",
        bold(headline),
        metrics_body(&cycle::metrics(cycle, now, length_days))
    ))
}

/// Only applied ticks produce a message.
pub fn format_cycle_tick(tick: &CycleTick, length_days: i64, now: NaiveDateTime) -> Option<String> {
    let TickOutcome::Applied {
        profit,
        percentage,
        completed,
    } = tick.outcome
    else {
        return None;
    };
    let headline = if completed {
        "🏁 Simulated cycle completed".to_string()
    } else {
        format!("📈 Simulated cycle day: {} SOL ({})", format_signed_sol(profit), format_percent(percentage))
    };
    Some(format!(
        "{}\n\nPaper balance: {}",
        format_cycle_update(&headline, &tick.cycle, now, length_days),
        format_sol_amount(tick.user.balance)
    ))
}

pub fn format_balance(user: &BotUser, open: Option<&TradingCycle>, now: NaiveDateTime, length_days: i64) -> String {
    let auto = if user.auto_trading_enabled {
        "running"
    } else {
        "stopped"
    };
    let mut body = format!(
        "{}\n\n\
         Paper balance: {}\n\
         Paper funding received: {}\n\
         Simulated trading: {auto}",
        bold("💰 Paper balance"),
        format_sol_amount(user.balance),
        format_sol_amount(user.initial_deposit),
    );
    if let Some(open) = open {
        let metrics = cycle::metrics(open, now, length_days);
        body.push_str(&format!("\nCycle progress: {}", progress_bar(metrics.progress_percentage)));
    }
    with_banner(&body)
}

fn kind_label(kind: TxKind) -> &'static str {
    match kind {
        TxKind::Deposit => "paper funding",
        TxKind::Withdraw => "withdrawal",
        TxKind::AdminCredit => "admin credit",
        TxKind::AdminDebit => "admin debit",
        TxKind::Buy => "buy",
        TxKind::Sell => "sell",
        TxKind::TradeProfit => "trade profit",
        TxKind::TradeLoss => "trade loss",
    }
}

fn signed_amount(tx: &Transaction) -> String {
    match tx.kind {
        // the stake stays in the balance until the position is sold
        TxKind::Buy => format!("{} SOL staked", format_sol(tx.amount)),
        kind if kind.is_inflow() => format!("{} SOL", format_signed_sol(tx.amount)),
        _ => format!("{} SOL", format_signed_sol(-tx.amount)),
    }
}

pub fn format_history(positions: &[TradingPosition], transactions: &[Transaction]) -> String {
    let positions = if positions.is_empty() {
        "No simulated trades yet.".to_string()
    } else {
        positions
            .iter()
            .map(|p| match (p.status, p.roi_percentage) {
                (PositionStatus::Closed, Some(roi)) => format!(
                    "• {} {} {} ({})",
                    p.opened_at.format("%m-%d %H:%M"),
                    escape(&p.token_symbol),
                    format_sol_amount(p.amount),
                    format_percent(roi),
                ),
                _ => format!(
                    "• {} {} {} open",
                    p.opened_at.format("%m-%d %H:%M"),
                    escape(&p.token_symbol),
                    format_sol_amount(p.amount),
                ),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let transactions = if transactions.is_empty() {
        "No transactions yet.".to_string()
    } else {
        transactions
            .iter()
            .map(|tx| {
                format!(
                    "• {} {} {} [{}]",
                    tx.timestamp.format("%m-%d %H:%M"),
                    kind_label(tx.kind),
                    signed_amount(tx),
                    tx.status,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    with_banner(&format!(
        "{}\n{positions}\n\n{}\n{transactions}",
        bold("📜 Simulated trades"),
        bold("🧾 Paper transactions"),
    ))
}

/// Message for the user whose balance an admin changed.
pub fn format_adjustment(adjustment: &BalanceAdjustment) -> String {
    let delta = adjustment.user.balance - adjustment.previous_balance;
    let mut body = format!(
        "{}\n\n{} → {} ({} SOL)",
        bold("🛠 Your paper balance was adjusted"),
        format_sol_amount(adjustment.previous_balance),
        format_sol_amount(adjustment.user.balance),
        format_signed_sol(delta),
    );
    if adjustment.cycle_completed {
        body.push_str("\n\nYour simulated cycle reached its target and is completed.");
    }
    with_banner(&body)
}

/// Reply for the admin who made the change.
pub fn format_adjustment_report(adjustment: &BalanceAdjustment) -> String {
    let cycle = match &adjustment.cycle {
        Some(c) => format!("cycle {} {}", c.id, status_label(c.status)),
        None => "no cycle".to_string(),
    };
    with_banner(&format!(
        "{} {}: {} → {} ({cycle})",
        kind_label(adjustment.transaction.kind),
        escape(&adjustment.user.display_name()),
        format_sol_amount(adjustment.previous_balance),
        format_sol_amount(adjustment.user.balance),
    ))
}

pub fn format_withdrawal_requested(tx: &Transaction, balance: f64) -> String {
    with_banner(&format!(
        "{}\n\nRequest #{} for {} is pending admin review.\nPaper balance: {}\n\n\
         Paper SOL has no cash value and nothing is sent on chain.",
        bold("📤 Paper withdrawal requested"),
        tx.id,
        format_sol_amount(tx.amount),
        format_sol_amount(balance),
    ))
}

pub fn format_withdrawal_resolved(tx: &Transaction, balance: f64) -> String {
    let outcome = match tx.status {
        TxStatus::Completed => "approved",
        TxStatus::Failed => "rejected, the amount was returned to your paper balance",
        TxStatus::Pending => "still pending",
    };
    with_banner(&format!(
        "Paper withdrawal #{} of {} was {outcome}.\nPaper balance: {}",
        tx.id,
        format_sol_amount(tx.amount),
        format_sol_amount(balance),
    ))
}

pub fn format_pending_withdrawals(pending: &[Transaction]) -> String {
    if pending.is_empty() {
        return with_banner("No pending paper withdrawals.");
    }
    let lines: Vec<String> = pending
        .iter()
        .map(|tx| {
            format!(
                "#{} user {} {} at {}",
                tx.id,
                tx.user_id,
                format_sol_amount(tx.amount),
                tx.timestamp.format("%Y-%m-%d %H:%M")
            )
        })
        .collect();
    with_banner(&format!("{}\n{}", bold("Pending paper withdrawals"), lines.join("\n")))
}

pub fn format_position_opened(position: &TradingPosition, balance: f64) -> String {
    with_banner(&format!(
        "{}\n\nToken: {}\nEntry: {}\nStake: {}\nPaper balance: {}",
        bold("🟢 Simulated position opened"),
        escape(&position.token_symbol),
        position.entry_price,
        format_sol_amount(position.amount),
        format_sol_amount(balance),
    ))
}

pub fn format_position_closed(recorded: &RecordedTrade, roi: f64) -> String {
    let position = &recorded.position;
    with_banner(&format!(
        "{}\n\nToken: {}\nEntry: {} → exit: {}\nResult: {} SOL ({})\nPaper balance: {}",
        bold("🔴 Simulated position closed"),
        escape(&position.token_symbol),
        position.entry_price,
        position.exit_price.unwrap_or_default(),
        format_signed_sol(recorded.pnl),
        format_percent(roi),
        format_sol_amount(recorded.user.balance),
    ))
}

pub fn format_users(users: &[BotUser]) -> String {
    if users.is_empty() {
        return with_banner("No users yet.");
    }
    let lines: Vec<String> = users
        .iter()
        .map(|u| {
            format!(
                "{} id {} tg {} {} {} auto {}",
                escape(&u.display_name()),
                u.id,
                u.telegram_id,
                u.status,
                format_sol_amount(u.balance),
                if u.auto_trading_enabled { "on" } else { "off" },
            )
        })
        .collect();
    with_banner(&lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::cycle::{begin, cycle_from_plan, plan_cycle, CycleConfig};
    use crate::types::bot_user::UserStatus;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn user() -> BotUser {
        BotUser {
            id: 1,
            telegram_id: 42,
            username: Some("ada<b>".to_string()),
            first_name: None,
            last_name: None,
            balance: 1.5,
            status: UserStatus::Active,
            initial_deposit: 1.0,
            auto_trading_enabled: true,
            joined_at: now(),
            last_activity: now(),
        }
    }

    fn running_cycle() -> TradingCycle {
        let plan = plan_cycle(1, 1.0, None, &CycleConfig::default(), now()).unwrap();
        let mut cycle = cycle_from_plan(7, plan);
        begin(&mut cycle, now()).unwrap();
        cycle
    }

    fn trade(pnl: f64) -> SimulatedTrade {
        SimulatedTrade {
            token_name: "Doge & Co".to_string(),
            token_symbol: "DOGE".to_string(),
            token_link: None,
            entry_price: 0.001,
            exit_price: 0.0012,
            stake: 0.5,
            pnl,
            pnl_percentage: pnl / 0.5 * 100.0,
            is_standout: false,
            opened_at: now(),
            closed_at: now() + Duration::minutes(12),
        }
    }

    fn transaction(kind: TxKind, status: TxStatus) -> Transaction {
        Transaction {
            id: 3,
            user_id: 1,
            kind,
            amount: 0.25,
            token_name: None,
            price: None,
            status,
            notes: None,
            timestamp: now(),
            processed_at: None,
            related_position_id: None,
        }
    }

    #[test]
    fn test_progress_bar_is_clamped() {
        assert_eq!(progress_bar(0.0), "[░░░░░░░░░░] 0.0%");
        assert_eq!(progress_bar(50.0), "[█████░░░░░] 50.0%");
        assert_eq!(progress_bar(250.0), "[██████████] 100.0%");
    }

    #[test]
    fn test_trade_message_escapes_and_labels() {
        let text = format_trade_message(&trade(0.1), 0.1, 1.6);
        assert!(text.contains("Doge &amp; Co"));
        assert!(text.contains("+0.1 SOL"));
        assert!(text.contains("Held: 12 min"));
        assert!(format_trade_message(&trade(-0.1), -0.1, 1.4).contains("Simulated loss"));
    }

    #[test]
    fn test_cycle_tick_skipped_is_silent() {
        let tick = CycleTick {
            user: user(),
            cycle: running_cycle(),
            outcome: TickOutcome::Skipped(crate::simulation::cycle::SkipReason::AlreadyTickedToday),
        };
        assert!(format_cycle_tick(&tick, 7, now()).is_none());
    }

    #[test]
    fn test_every_user_message_carries_the_banner() {
        let cycle = running_cycle();
        let summary = DailySummary {
            date: now().date(),
            trades: 4,
            pnl: 0.2,
            pnl_percentage: 20.0,
            wins: 3,
            losses: 1,
            win_rate: 75.0,
            profit_streak: 2,
            closing_balance: 1.2,
        };
        let adjustment = BalanceAdjustment {
            user: user(),
            previous_balance: 1.0,
            transaction: transaction(TxKind::AdminCredit, TxStatus::Completed),
            cycle: Some(cycle.clone()),
            cycle_completed: true,
        };
        let tick = CycleTick {
            user: user(),
            cycle: cycle.clone(),
            outcome: TickOutcome::Applied {
                profit: 0.14,
                percentage: 14.0,
                completed: false,
            },
        };
        let messages = vec![
            format_welcome(&user()),
            format_trade_message(&trade(0.1), 0.1, 1.6),
            format_daily_summary(&summary),
            format_cycle_screen(Some(&cycle), &[], now(), 7),
            format_cycle_screen(None, &[], now(), 7),
            format_cycle_update("Cycle paused", &cycle, now(), 7),
            format_cycle_tick(&tick, 7, now()).unwrap(),
            format_balance(&user(), Some(&cycle), now(), 7),
            format_history(&[], &[transaction(TxKind::Withdraw, TxStatus::Pending)]),
            format_adjustment(&adjustment),
            format_adjustment_report(&adjustment),
            format_withdrawal_requested(&transaction(TxKind::Withdraw, TxStatus::Pending), 1.0),
            format_withdrawal_resolved(&transaction(TxKind::Withdraw, TxStatus::Failed), 1.0),
            format_pending_withdrawals(&[]),
            format_users(&[user()]),
        ];
        for message in messages {
            assert!(message.contains(SIMULATION_BANNER), "missing banner: {message}");
        }
    }

    #[test]
    fn test_history_signs_outflows() {
        let text = format_history(&[], &[transaction(TxKind::Withdraw, TxStatus::Pending)]);
        assert!(text.contains("withdrawal -0.25 SOL [pending]"));
        assert!(text.contains("No simulated trades yet."));
    }

    #[test]
    fn test_adjustment_mentions_completed_cycle() {
        let adjustment = BalanceAdjustment {
            user: user(),
            previous_balance: 1.0,
            transaction: transaction(TxKind::AdminCredit, TxStatus::Completed),
            cycle: None,
            cycle_completed: true,
        };
        let text = format_adjustment(&adjustment);
        assert!(text.contains("+0.5 SOL"));
        assert!(text.contains("reached its target"));
    }
}
