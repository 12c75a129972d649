use crate::config::app_context::AppContext;
use crate::config::constants::PROFIT_STREAK_LOOKBACK_DAYS;
use crate::config::settings::Settings;
use crate::simulation::session::{profit_streak, TradingSession};
use crate::simulation::trade_generator::{generate_trade, pick_token, synthetic_token};
use crate::storage::persistent;
use crate::tg_bot::helpers::formatters::{format_daily_summary, format_trade_message};
use crate::tg_bot::notify_user;
use crate::types::bot_user::{BotUser, UserStatus};
use crate::workers::registry::sleep_or_stop;
use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Exit,
}

/// Auto trading loop of one user. Runs until the stop flag flips or the user opts out.
pub async fn run_trading_worker(context: AppContext, user_id: i32, mut stop: watch::Receiver<bool>) {
    info!("Simulated trading loop started for user {user_id}");
    loop {
        let settings = context.get_settings().await.clone();
        let poll = Duration::from_secs(settings.simulation.poll_interval_s);
        let wait = match trading_step(&context, &settings, user_id, Utc::now().naive_utc()).await {
            Ok(Step::Continue) => poll,
            Ok(Step::Exit) => break,
            Err(e) => {
                error!("Trading loop of user {user_id} failed: {e:#}");
                Duration::from_secs(settings.simulation.error_backoff_s)
            }
        };
        if sleep_or_stop(&mut stop, wait).await {
            break;
        }
    }
    info!("Simulated trading loop stopped for user {user_id}");
}

async fn trading_step(
    context: &AppContext,
    settings: &Settings,
    user_id: i32,
    now: NaiveDateTime,
) -> Result<Step> {
    let Some(user) = persistent::get_user(&context.db_pool, user_id).await? else {
        warn!("User {user_id} no longer exists");
        context.sessions.remove(user_id).await?;
        return Ok(Step::Exit);
    };
    if !user.auto_trading_enabled {
        return Ok(Step::Exit);
    }
    if user.status != UserStatus::Active || user.balance <= 0.0 {
        return Ok(Step::Continue);
    }

    let schedule = &settings.simulation.schedule;
    let mut session = match context.sessions.load(user_id).await? {
        Some(session) => session,
        None => {
            let mut rng = rand::thread_rng();
            let mut session = TradingSession::new(&mut rng, user_id, user.balance, now, schedule);
            let first = session.schedule_first(&mut rng, now, schedule);
            debug!("User {user_id}: first simulated trade at {first}");
            session
        }
    };

    if let Some(mut summary) = session.roll_over(now.date(), user.balance) {
        let days: Vec<_> = persistent::recent_profits(&context.db_pool, user_id, PROFIT_STREAK_LOOKBACK_DAYS)
            .await?
            .into_iter()
            .map(|profit| (profit.date, profit.amount))
            .collect();
        summary.profit_streak = profit_streak(&days);
        notify(context, &user, &format_daily_summary(&summary)).await;
    }

    if session.is_due(now) {
        trade_once(context, settings, &user, &mut session, now).await?;
    }
    context.sessions.save(&session).await?;
    Ok(Step::Continue)
}

async fn trade_once(
    context: &AppContext,
    settings: &Settings,
    user: &BotUser,
    session: &mut TradingSession,
    now: NaiveDateTime,
) -> Result<()> {
    let schedule = &settings.simulation.schedule;
    if session.daily_limit_reached() {
        let next = session.schedule_tomorrow(&mut rand::thread_rng(), now, schedule);
        debug!("User {}: daily quota used, next simulated trade at {next}", user.id);
        return Ok(());
    }

    let listings = context.token_feed.listings().await;
    let trade = {
        let mut rng = rand::thread_rng();
        let token = pick_token(&mut rng, &listings).cloned().or_else(|| {
            context
                .token_feed
                .synthetic_fallback()
                .then(|| synthetic_token(&mut rng))
        });
        token.and_then(|token| {
            generate_trade(&mut rng, &settings.simulation.trades, &token, user.balance, now)
        })
    };
    let Some(trade) = trade else {
        let retry = session.schedule_retry(&mut rand::thread_rng(), now, schedule);
        warn!("User {}: no token available for a simulated trade, retrying at {retry}", user.id);
        return Ok(());
    };

    let recorded = persistent::record_simulated_trade(&context.db_pool, user.id, trade.clone()).await?;
    session.record_trade(recorded.pnl);
    let next = session.schedule_next(&mut rand::thread_rng(), now, schedule);
    info!(
        "User {}: simulated {} trade booked {:+.4} SOL, next at {next}",
        user.id, trade.token_symbol, recorded.pnl
    );
    notify(context, &recorded.user, &format_trade_message(&trade, recorded.pnl, recorded.user.balance)).await;
    Ok(())
}

async fn notify(context: &AppContext, user: &BotUser, text: &str) {
    if let Some(bot) = &context.tg_bot {
        notify_user(bot, user.get_chat_id(), text).await;
    }
}
