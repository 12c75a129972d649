use crate::config::constants::{CYCLE_HISTORY_LIMIT, HISTORY_POSITIONS_LIMIT, HISTORY_TRANSACTIONS_LIMIT};
use crate::simulation::SimulationError;
use crate::storage::persistent;
use crate::tg_bot::bot_config::{BotConfig, HandlerResult};
use crate::tg_bot::command::UserCommand;
use crate::tg_bot::helpers::formatters::{
    format_balance, format_cycle_screen, format_history, format_welcome, format_withdrawal_requested,
    with_banner,
};
use crate::tg_bot::helpers::get_user_from_user_message;
use crate::tg_bot::notifications::{notify_user, reply, respond};
use crate::types::bot_user::{BotUser, UserStatus};
use crate::workers;
use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html::escape;
use teloxide::Bot;
use tracing::info;

async fn sender(config: &BotConfig, message: &Message) -> Result<Option<BotUser>> {
    match get_user_from_user_message(message) {
        Some(tg_user) => Ok(Some(
            persistent::load_or_create_user(&config.context.db_pool, &tg_user).await?,
        )),
        None => Ok(None),
    }
}

macro_rules! sender_or_return {
    ($bot:expr, $config:expr, $message:expr) => {
        match sender(&$config, &$message).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                reply(&$bot, &$message, &with_banner("Please talk to the bot in a private chat.")).await?;
                return Ok(());
            }
            Err(e) => {
                respond(&$bot, &$message, Err(e)).await?;
                return Ok(());
            }
        }
    };
}

pub async fn start(bot: Bot, message: Message, config: BotConfig) -> HandlerResult {
    let user = sender_or_return!(bot, config, message);
    reply(&bot, &message, &format_welcome(&user)).await?;
    Ok(())
}

pub async fn help(bot: Bot, message: Message) -> HandlerResult {
    let text = with_banner(&escape(&UserCommand::descriptions().to_string()));
    reply(&bot, &message, &text).await?;
    Ok(())
}

pub async fn simulate(bot: Bot, message: Message, config: BotConfig) -> HandlerResult {
    let user = sender_or_return!(bot, config, message);
    let result = simulate_inner(&config, user).await;
    respond(&bot, &message, result).await?;
    Ok(())
}

async fn simulate_inner(config: &BotConfig, user: BotUser) -> Result<String> {
    let context = &config.context;
    let starting_balance = context.get_settings().await.simulation.starting_balance_sol;
    let user = persistent::request_paper_funds(&context.db_pool, user.id, starting_balance).await?;
    if user.status != UserStatus::Active {
        return Ok(with_banner(
            "Your request for paper SOL is noted. An admin will credit your paper balance, \
             then the simulated trading loop starts.",
        ));
    }
    let user = persistent::set_auto_trading(&context.db_pool, user.id, true).await?;
    let started = workers::start_auto_trading(context, user.id).await;
    info!("User {} enabled simulated trading (new loop: {started})", user.id);
    let open = persistent::open_cycle(&context.db_pool, user.id).await?;
    let length_days = context.get_settings().await.cycle.length_days;
    Ok(format!(
        "{}\n\nThe simulated trading loop is running. Every trade it reports is randomly generated.",
        format_balance(&user, open.as_ref(), Utc::now().naive_utc(), length_days)
    ))
}

pub async fn balance(bot: Bot, message: Message, config: BotConfig) -> HandlerResult {
    let user = sender_or_return!(bot, config, message);
    let context = &config.context;
    let result = async {
        let open = persistent::open_cycle(&context.db_pool, user.id).await?;
        let length_days = context.get_settings().await.cycle.length_days;
        Ok::<_, anyhow::Error>(format_balance(&user, open.as_ref(), Utc::now().naive_utc(), length_days))
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn history(bot: Bot, message: Message, config: BotConfig) -> HandlerResult {
    let user = sender_or_return!(bot, config, message);
    let pool = &config.context.db_pool;
    let result = async {
        let positions = persistent::recent_positions(pool, user.id, HISTORY_POSITIONS_LIMIT).await?;
        let transactions = persistent::recent_transactions(pool, user.id, HISTORY_TRANSACTIONS_LIMIT).await?;
        Ok::<_, anyhow::Error>(format_history(&positions, &transactions))
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn cycle(bot: Bot, message: Message, config: BotConfig) -> HandlerResult {
    let user = sender_or_return!(bot, config, message);
    let context = &config.context;
    let result = async {
        let open = persistent::open_cycle(&context.db_pool, user.id).await?;
        let past = persistent::cycle_history(&context.db_pool, user.id, CYCLE_HISTORY_LIMIT).await?;
        let length_days = context.get_settings().await.cycle.length_days;
        Ok::<_, anyhow::Error>(format_cycle_screen(open.as_ref(), &past, Utc::now().naive_utc(), length_days))
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}

pub async fn withdraw(bot: Bot, message: Message, config: BotConfig, amount: String) -> HandlerResult {
    let user = sender_or_return!(bot, config, message);
    let Some(amount) = amount.trim().parse::<f64>().ok().filter(|a| a.is_finite()) else {
        reply(&bot, &message, &with_banner("Usage: /withdraw &lt;amount&gt;, e.g. /withdraw 0.5")).await?;
        return Ok(());
    };
    let result = withdraw_inner(&bot, &config, &user, amount).await;
    respond(&bot, &message, result).await?;
    Ok(())
}

async fn withdraw_inner(bot: &Bot, config: &BotConfig, user: &BotUser, amount: f64) -> Result<String> {
    let context = &config.context;
    if amount <= 0.0 {
        return Err(SimulationError::NonPositiveAmount(amount).into());
    }
    let (minimum, admins) = {
        let settings = context.get_settings().await;
        (settings.simulation.minimum_withdrawal_sol, settings.admin_chat_ids())
    };
    let (updated, tx) = persistent::request_withdrawal(&context.db_pool, user.id, amount, minimum).await?;
    info!("User {} requested paper withdrawal #{} of {amount}", user.id, tx.id);
    let admin_text = with_banner(&format!(
        "New paper withdrawal #{} from {} for {} SOL. /approve {} or /reject {}",
        tx.id,
        escape(&user.display_name()),
        amount,
        tx.id,
        tx.id
    ));
    for admin in admins {
        notify_user(bot, ChatId(admin), &admin_text).await;
    }
    Ok(format_withdrawal_requested(&tx, updated.balance))
}

pub async fn stop(bot: Bot, message: Message, config: BotConfig) -> HandlerResult {
    let user = sender_or_return!(bot, config, message);
    let context = &config.context;
    let result = async {
        persistent::set_auto_trading(&context.db_pool, user.id, false).await?;
        let was_running = workers::stop_auto_trading(context, user.id).await;
        info!("User {} stopped simulated trading (loop was running: {was_running})", user.id);
        Ok::<_, anyhow::Error>(with_banner("The simulated trading loop is stopped. Use /simulate to start it again."))
    }
    .await;
    respond(&bot, &message, result).await?;
    Ok(())
}
