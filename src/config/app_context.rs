use crate::config::settings::Settings;
use crate::market::TokenFeed;
use crate::storage::persistent::DbPool;
use crate::storage::session_store::{SessionStore, SessionStoreRef};
use crate::tg_bot::bot_config::BotConfig;
use crate::workers::registry::WorkerRegistry;
use crate::{storage, tg_bot};
use anyhow::{Context, Result};
use std::fmt::Debug;
use std::sync::Arc;
use teloxide::net::client_from_env;
use teloxide::Bot;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// app context we're going to pass around
#[derive(Clone)]
pub struct AppContext {
    pub(crate) settings: Arc<RwLock<Settings>>,
    pub(crate) db_pool: DbPool,
    pub(crate) tg_bot: Option<Bot>,
    pub(crate) token_feed: TokenFeed,
    pub(crate) sessions: SessionStoreRef,
    pub(crate) workers: WorkerRegistry,
}

impl Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("tg_bot", &self.tg_bot.is_some())
            .field("token_feed", &self.token_feed)
            .field("sessions", &self.sessions)
            .finish()
    }
}

pub fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(level)
        .add_directive("h2::codec=info".parse()?)
        .add_directive("hyper::client=info".parse()?)
        .add_directive("hyper_util=info".parse()?)
        .add_directive("tokio_postgres=info".parse()?)
        .add_directive("reqwest=info".parse()?)
        .add_directive("teloxide=info".parse()?)
        .add_directive("hyper::proto::h1=info".parse()?);
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);
    // a second init (tests, repeated CLI calls) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init();
    Ok(())
}

impl AppContext {
    pub(crate) async fn new(config_filename: &str) -> Result<Self> {
        let settings = Settings::new(config_filename).context("Failed to load settings")?;
        init_logging(&settings.logger.level)?;
        settings.validate().context("Invalid settings")?;

        let db_pool = storage::persistent::connect(&settings.storage.database_uri)?;
        let token_feed = TokenFeed::new(settings.market.clone())?;
        let sessions = Arc::new(SessionStore::new(&settings.storage.session_file));
        let tg_bot = settings
            .telegram_token()
            .map(|token| Bot::with_client(token, client_from_env()));

        Ok(Self {
            settings: Arc::new(RwLock::new(settings)),
            db_pool,
            tg_bot,
            token_feed,
            sessions,
            workers: WorkerRegistry::new(),
        })
    }

    pub async fn start_telegram_bot(&self) -> Result<()> {
        let Some(bot) = self.tg_bot.clone() else {
            info!("No telegram token configured, the bot stays offline");
            return Ok(());
        };
        let bot_config = BotConfig {
            context: self.clone(),
        };
        tokio::spawn(async move {
            info!("Starting telegram bot... ");
            let mut dispatcher = tg_bot::init::build_dispatcher(bot, &bot_config).await;
            dispatcher.dispatch().await;
        });
        Ok(())
    }

    pub async fn get_settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().await
    }
}
