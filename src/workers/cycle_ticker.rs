use crate::config::app_context::AppContext;
use crate::simulation::cycle::TickOutcome;
use crate::storage::persistent::{self, CycleTick};
use crate::tg_bot::helpers::formatters::format_cycle_tick;
use crate::tg_bot::notify_user;
use crate::workers::registry::sleep_or_stop;
use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

pub async fn run_cycle_ticker(context: AppContext, mut stop: watch::Receiver<bool>) {
    info!("Cycle ticker started");
    loop {
        let interval = Duration::from_secs(context.get_settings().await.cycle.tick_interval_s);
        if let Err(e) = tick_cycles_once(&context, Utc::now().naive_utc()).await {
            error!("Cycle tick failed: {e:#}");
        }
        if sleep_or_stop(&mut stop, interval).await {
            break;
        }
    }
    info!("Cycle ticker stopped");
}

/// Ticks every running cycle once and notifies the users whose cycle moved.
pub async fn tick_cycles_once(context: &AppContext, now: NaiveDateTime) -> Result<Vec<CycleTick>> {
    let length_days = context.get_settings().await.cycle.length_days;
    let ticks = persistent::tick_all_cycles(&context.db_pool, length_days, now).await?;
    let applied = ticks
        .iter()
        .filter(|tick| matches!(tick.outcome, TickOutcome::Applied { .. }))
        .count();
    info!("Cycle tick at {now}: {applied} of {} running cycles advanced", ticks.len());
    if let Some(bot) = &context.tg_bot {
        for tick in ticks.iter() {
            if let Some(text) = format_cycle_tick(tick, length_days, now) {
                notify_user(bot, tick.user.get_chat_id(), &text).await;
            }
        }
    }
    Ok(ticks)
}
