use crate::simulation::SimulationError;
use crate::storage::persistent::{self, BalanceAdjustment};
use crate::tg_bot::bot_config::{BotConfig, HandlerResult};
use crate::tg_bot::command::AdminCommand;
use crate::tg_bot::helpers::formatters::{
    format_adjustment, format_adjustment_report, format_cycle_update, format_pending_withdrawals,
    format_position_closed, format_position_opened, format_users, format_withdrawal_resolved, with_banner,
};
use crate::tg_bot::helpers::parse_user_lookup;
use crate::tg_bot::notifications::{notify_user, reply, respond};
use crate::types::bot_user::{BotUser, UserStatus};
use crate::types::cycle::TradingCycle;
use crate::workers;
use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html::escape;
use teloxide::Bot;
use tracing::info;

fn admin_id(message: &Message) -> i64 {
    message.from().map_or(message.chat.id.0, |u| u.id.0 as i64)
}

async fn target_user(config: &BotConfig, target: &str) -> Result<BotUser> {
    let lookup = parse_user_lookup(target).ok_or_else(|| SimulationError::UserNotFound(target.to_string()))?;
    persistent::find_user(&config.context.db_pool, &lookup).await
}

async fn push(config: &BotConfig, user: &BotUser, text: &str) {
    if let Some(bot) = &config.context.tg_bot {
        notify_user(bot, user.get_chat_id(), text).await;
    }
}

pub async fn admin_help(bot: Bot, message: Message) -> HandlerResult {
    let text = with_banner(&escape(&AdminCommand::descriptions().to_string()));
    reply(&bot, &message, &text).await?;
    Ok(())
}

pub async fn credit(
    bot: Bot,
    message: Message,
    config: BotConfig,
    (target, amount, note): (String, f64, String),
) -> HandlerResult {
    let result = adjust(&config, admin_id(&message), &target, amount, true, note).await;
    respond(&bot, &message, result.map(|a| format_adjustment_report(&a))).await?;
    Ok(())
}

pub async fn debit(
    bot: Bot,
    message: Message,
    config: BotConfig,
    (target, amount, note): (String, f64, String),
) -> HandlerResult {
    let result = adjust(&config, admin_id(&message), &target, amount, false, note).await;
    respond(&bot, &message, result.map(|a| format_adjustment_report(&a))).await?;
    Ok(())
}

async fn adjust(
    config: &BotConfig,
    admin: i64,
    target: &str,
    amount: f64,
    is_credit: bool,
    note: String,
) -> Result<BalanceAdjustment> {
    if !(amount.is_finite() && amount > 0.0) {
        return Err(SimulationError::NonPositiveAmount(amount).into());
    }
    let delta = if is_credit { amount } else { -amount };
    let context = &config.context;
    let user = target_user(config, target).await?;
    let (cycle_config, auto_start) = {
        let settings = context.get_settings().await;
        (settings.cycle.clone(), settings.simulation.auto_start_on_credit)
    };
    let note = (!note.trim().is_empty()).then_some(note);
    let adjustment =
        persistent::adjust_balance(&context.db_pool, user.id, delta, note, Some(admin), &cycle_config).await?;
    info!(
        "Admin {admin} adjusted paper balance of user {} by {delta}: {} -> {}",
        user.id, adjustment.previous_balance, adjustment.user.balance
    );
    push(config, &adjustment.user, &format_adjustment(&adjustment)).await;

    if delta > 0.0 && auto_start && adjustment.user.status == UserStatus::Active {
        persistent::set_auto_trading(&context.db_pool, user.id, true).await?;
        workers::start_auto_trading(context, user.id).await;
    }
    Ok(adjustment)
}

async fn cycle_reply(config: &BotConfig, headline: &str, cycle: &TradingCycle) -> String {
    let length_days = config.context.get_settings().await.cycle.length_days;
    format_cycle_update(headline, cycle, Utc::now().naive_utc(), length_days)
}

pub async fn start_cycle(
    bot: Bot,
    message: Message,
    config: BotConfig,
    (target, initial, daily_roi): (String, Option<f64>, Option<f64>),
) -> HandlerResult {
    let result = async {
        let user = target_user(&config, &target).await?;
        let cycle_config = config.context.get_settings().await.cycle.clone();
        let cycle =
            persistent::start_cycle(&config.context.db_pool, user.id, initial, daily_roi, &cycle_config).await?;
        info!("Admin {} started cycle {} for user {}", admin_id(&message), cycle.id, user.id);
        let text = cycle_reply(&config, "🎯 A new simulated target cycle started", &cycle).await;
        push(&config, &user, &text).await;
        Ok::<_, anyhow::Error>(text)
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn pause_cycle(bot: Bot, message: Message, config: BotConfig, target: String) -> HandlerResult {
    let result = async {
        let user = target_user(&config, &target).await?;
        let cycle = persistent::pause_cycle(&config.context.db_pool, user.id).await?;
        let text = cycle_reply(&config, "⏸ Simulated cycle paused", &cycle).await;
        push(&config, &user, &text).await;
        Ok::<_, anyhow::Error>(text)
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn resume_cycle(bot: Bot, message: Message, config: BotConfig, target: String) -> HandlerResult {
    let result = async {
        let user = target_user(&config, &target).await?;
        let cycle = persistent::resume_cycle(&config.context.db_pool, user.id).await?;
        let text = cycle_reply(&config, "▶️ Simulated cycle resumed", &cycle).await;
        push(&config, &user, &text).await;
        Ok::<_, anyhow::Error>(text)
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn set_roi(
    bot: Bot,
    message: Message,
    config: BotConfig,
    (target, percentage): (String, f64),
) -> HandlerResult {
    let result = async {
        let user = target_user(&config, &target).await?;
        let cycle = persistent::set_cycle_roi(&config.context.db_pool, user.id, percentage).await?;
        info!("Admin {} set daily cycle % of user {} to {percentage}", admin_id(&message), user.id);
        Ok::<_, anyhow::Error>(cycle_reply(&config, "Daily cycle growth updated", &cycle).await)
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

async fn set_auto(config: &BotConfig, target: &str, enabled: bool) -> Result<String> {
    let context = &config.context;
    let user = target_user(config, target).await?;
    let user = persistent::set_auto_trading(&context.db_pool, user.id, enabled).await?;
    if enabled {
        workers::start_auto_trading(context, user.id).await;
    } else {
        workers::stop_auto_trading(context, user.id).await;
    }
    let state = if enabled { "on" } else { "off" };
    let running = context.workers.is_active(user.id).await;
    push(config, &user, &with_banner(&format!("An admin turned simulated trading {state}."))).await;
    Ok(with_banner(&format!(
        "Simulated trading {state} for {} (loop running: {running})",
        escape(&user.display_name())
    )))
}

pub async fn auto_on(bot: Bot, message: Message, config: BotConfig, target: String) -> HandlerResult {
    let result = set_auto(&config, &target, true).await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn auto_off(bot: Bot, message: Message, config: BotConfig, target: String) -> HandlerResult {
    let result = set_auto(&config, &target, false).await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn buy(bot: Bot, message: Message, config: BotConfig, (symbol, entry): (String, f64)) -> HandlerResult {
    let result = async {
        let fraction = config.context.get_settings().await.simulation.admin_position_fraction;
        let admin = admin_id(&message);
        let opened =
            persistent::open_admin_positions(&config.context.db_pool, &symbol, entry, fraction, admin).await?;
        for (user, position) in opened.iter() {
            push(&config, user, &format_position_opened(position, user.balance)).await;
        }
        Ok::<_, anyhow::Error>(with_banner(&format!(
            "Opened {} simulated {} positions at {entry}",
            opened.len(),
            escape(&symbol.to_uppercase())
        )))
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn sell(bot: Bot, message: Message, config: BotConfig, (symbol, exit): (String, f64)) -> HandlerResult {
    let result = async {
        let closed = persistent::close_admin_positions(&config.context.db_pool, &symbol, exit).await?;
        for (recorded, roi) in closed.iter() {
            push(&config, &recorded.user, &format_position_closed(recorded, *roi)).await;
        }
        let total: f64 = closed.iter().map(|(recorded, _)| recorded.pnl).sum();
        Ok::<_, anyhow::Error>(with_banner(&format!(
            "Closed {} simulated {} positions at {exit}, total result {total:+.4} SOL",
            closed.len(),
            escape(&symbol.to_uppercase())
        )))
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn withdrawals(bot: Bot, message: Message, config: BotConfig) -> HandlerResult {
    let result = persistent::pending_withdrawals(&config.context.db_pool)
        .await
        .map(|pending| format_pending_withdrawals(&pending));
    respond(&bot, &message, result).await?;
    Ok(())
}

async fn resolve(config: &BotConfig, admin: i64, tx_id: i32, approve: bool) -> Result<String> {
    let (user, tx) = persistent::resolve_withdrawal(&config.context.db_pool, tx_id, approve).await?;
    info!("Admin {admin} resolved paper withdrawal #{tx_id}: {}", tx.status);
    let text = format_withdrawal_resolved(&tx, user.balance);
    push(config, &user, &text).await;
    Ok(text)
}

pub async fn approve(bot: Bot, message: Message, config: BotConfig, tx_id: i32) -> HandlerResult {
    let result = resolve(&config, admin_id(&message), tx_id, true).await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn reject(bot: Bot, message: Message, config: BotConfig, tx_id: i32) -> HandlerResult {
    let result = resolve(&config, admin_id(&message), tx_id, false).await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn users(bot: Bot, message: Message, config: BotConfig) -> HandlerResult {
    let result = persistent::list_users(&config.context.db_pool)
        .await
        .map(|users| format_users(&users));
    respond(&bot, &message, result).await?;
    Ok(())
}
