mod config;
mod market;
mod schema;
mod simulation;
mod storage;
mod tg_bot;
mod types;
mod utils;
mod workers;

use crate::config::app_context::AppContext;
use crate::storage::persistent::{self, UserLookup};
use crate::types::bot_user::UserStatus;
use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Paper trading simulator bot. Every balance and trade is simulated.")]
struct Cli {
    /// Config file name without extension
    #[arg(long, default_value = "config")]
    config: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Target {
    #[arg(long)]
    telegram_id: Option<i64>,
    #[arg(long)]
    username: Option<String>,
}

impl Target {
    fn lookup(&self) -> Result<UserLookup> {
        match (self.telegram_id, &self.username) {
            (Some(id), _) => Ok(UserLookup::TelegramId(id)),
            (None, Some(username)) => Ok(UserLookup::Username(username.clone())),
            (None, None) => bail!("either --telegram-id or --username is required"),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bot, the trading loops and the cycle ticker (default)
    Run,
    /// Credit (positive) or debit (negative) a user's paper balance
    AdjustBalance {
        #[command(flatten)]
        target: Target,
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,
        #[arg(long)]
        note: Option<String>,
    },
    /// Start a new target cycle for a user, completing any open one
    StartCycle {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        initial: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        daily_roi: Option<f64>,
    },
    /// Apply today's growth to every running cycle once and exit
    TickCycles,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = AppContext::new(&cli.config).await?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(context).await,
        Command::AdjustBalance { target, amount, note } => {
            let user = persistent::find_user(&context.db_pool, &target.lookup()?).await?;
            let (cycle_config, auto_start) = {
                let settings = context.get_settings().await;
                (settings.cycle.clone(), settings.simulation.auto_start_on_credit)
            };
            let adjustment =
                persistent::adjust_balance(&context.db_pool, user.id, amount, note, None, &cycle_config).await?;
            // picked up by resume_enabled_workers on the next start of the bot
            if amount > 0.0 && auto_start && adjustment.user.status == UserStatus::Active {
                persistent::set_auto_trading(&context.db_pool, user.id, true).await?;
            }
            info!(
                "Paper balance of {} adjusted: {} -> {} (cycle completed: {})",
                user.display_name(),
                adjustment.previous_balance,
                adjustment.user.balance,
                adjustment.cycle_completed
            );
            Ok(())
        }
        Command::StartCycle { target, initial, daily_roi } => {
            let user = persistent::find_user(&context.db_pool, &target.lookup()?).await?;
            let cycle_config = context.get_settings().await.cycle.clone();
            let cycle =
                persistent::start_cycle(&context.db_pool, user.id, initial, daily_roi, &cycle_config).await?;
            info!(
                "Started cycle {} for {}: {} -> {} at {}% per day",
                cycle.id,
                user.display_name(),
                cycle.initial_balance,
                cycle.target_balance,
                cycle.daily_roi_percentage
            );
            Ok(())
        }
        Command::TickCycles => {
            let ticks = workers::cycle_ticker::tick_cycles_once(&context, Utc::now().naive_utc()).await?;
            info!("Ticked {} running cycles", ticks.len());
            Ok(())
        }
    }
}

async fn run(context: AppContext) -> Result<()> {
    info!("Starting the paper trading simulator with settings: {:?}", *context.get_settings().await);
    context.start_telegram_bot().await?;
    workers::resume_enabled_workers(&context).await?;

    let (stop_ticker, ticker_stop) = watch::channel(false);
    let ticker = tokio::spawn(workers::cycle_ticker::run_cycle_ticker(context.clone(), ticker_stop));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, stopping {} trading loops", context.workers.active_users().await.len());
    let _ = stop_ticker.send(true);
    context.workers.stop_all().await;
    let _ = ticker.await;
    Ok(())
}
