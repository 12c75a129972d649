use crate::market::token_feed::MarketConfig;
use crate::simulation::cycle::CycleConfig;
use crate::simulation::session::ScheduleConfig;
use crate::simulation::trade_generator::TradeGeneratorConfig;
use anyhow::bail;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "PAPERSIM";

#[derive(Debug, Clone, Deserialize)]
#[allow(unused)]
pub struct LoggerConfig {
    pub(crate) level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(unused)]
pub struct StorageConfig {
    pub database_uri: String,
    pub session_file: String,
}

#[derive(Clone, Deserialize)]
#[allow(unused)]
pub struct TgBotConfig {
    #[serde(default)]
    pub telegram_token: String,
    pub whitelisted_chat_ids: Option<Vec<i64>>,
    pub admin_chat_ids: Option<Vec<i64>>,
}

impl std::fmt::Debug for TgBotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TgBotConfig")
            .field("telegram_token", &"<hidden>")
            .field("whitelisted_chat_ids", &self.whitelisted_chat_ids)
            .field("admin_chat_ids", &self.admin_chat_ids)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[allow(unused)]
pub struct SimulationConfig {
    /// Paper SOL granted on `/simulate`. Zero means an admin has to credit the user.
    pub starting_balance_sol: f64,
    pub minimum_withdrawal_sol: f64,
    pub admin_position_fraction: f64,
    pub auto_start_on_credit: bool,
    pub poll_interval_s: u64,
    pub error_backoff_s: u64,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub trades: TradeGeneratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(unused)]
pub struct Settings {
    pub logger: LoggerConfig,
    pub storage: StorageConfig,
    pub tgbot: Option<TgBotConfig>,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub market: MarketConfig,
}

impl Settings {
    /// `config_filename`, then `PAPERSIM__*` variables, then the plain deployment variables.
    pub fn new(config_filename: &str) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let builder = Config::builder()
            .add_source(File::with_name(config_filename).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
        Self::with_deployment_overrides(builder)?.build()?.try_deserialize()
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn with_deployment_overrides(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let admin_ids = std::env::var("ADMIN_USER_ID")
            .ok()
            .and_then(|id| id.trim().parse::<i64>().ok())
            .map(|id| vec![id]);
        builder
            .set_override_option("tgbot.telegram_token", std::env::var("TELEGRAM_BOT_TOKEN").ok())?
            .set_override_option("storage.database_uri", std::env::var("DATABASE_URL").ok())?
            .set_override_option("tgbot.admin_chat_ids", admin_ids)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let sim = &self.simulation;
        sim.trades.validate()?;
        sim.schedule.validate()?;
        if sim.starting_balance_sol < 0.0 || sim.minimum_withdrawal_sol < 0.0 {
            bail!("simulation balances must not be negative");
        }
        if !(sim.admin_position_fraction > 0.0 && sim.admin_position_fraction <= 1.0) {
            bail!(
                "admin_position_fraction must be within (0, 1], got {}",
                sim.admin_position_fraction
            );
        }
        if sim.poll_interval_s == 0 {
            bail!("poll_interval_s must be positive");
        }
        if !(self.cycle.target_multiplier > 1.0) || self.cycle.length_days <= 0 {
            bail!("cycle needs a multiplier above 1 and a positive length");
        }
        if let Some(roi) = self.cycle.default_daily_roi {
            if !roi.is_finite() || roi <= -100.0 {
                bail!("cycle.default_daily_roi must be above -100, got {roi}");
            }
        }
        if self.cycle.tick_interval_s == 0 {
            bail!("cycle.tick_interval_s must be positive");
        }
        if self.market.max_retries == 0 {
            bail!("market.max_retries must be at least 1");
        }
        Ok(())
    }

    /// The bot only runs with a non-empty token.
    pub fn telegram_token(&self) -> Option<&str> {
        self.tgbot
            .as_ref()
            .map(|tgbot| tgbot.telegram_token.as_str())
            .filter(|token| !token.is_empty())
    }

    pub fn admin_chat_ids(&self) -> Vec<i64> {
        self.tgbot
            .as_ref()
            .and_then(|tgbot| tgbot.admin_chat_ids.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPED: &str = include_str!("../../config.toml");

    #[test]
    fn test_shipped_config_parses_and_validates() {
        let settings = Settings::from_toml(SHIPPED).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.cycle.target_multiplier, 2.0);
        assert_eq!(settings.cycle.length_days, 7);
        assert_eq!(settings.simulation.schedule.trades_per_day, (4, 8));
        assert_eq!(settings.market.max_retries, 3);
        assert!((settings.simulation.trades.loss_probability - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_sections_fall_back_to_defaults() {
        let settings = Settings::from_toml(
            r#"
            [logger]
            level = "info"
            [storage]
            database_uri = "postgres://localhost/papersim"
            session_file = "sessions.json"
            [simulation]
            starting_balance_sol = 1.0
            minimum_withdrawal_sol = 0.1
            admin_position_fraction = 0.2
            auto_start_on_credit = true
            poll_interval_s = 30
            error_backoff_s = 60
            "#,
        )
        .unwrap();
        assert!(settings.tgbot.is_none());
        assert_eq!(settings.market.cache_ttl_s, 900);
        assert!(settings.admin_chat_ids().is_empty());
        settings.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        let mut settings = Settings::from_toml(SHIPPED).unwrap();
        settings.simulation.trades.standout_probability = -0.1;
        assert!(settings.validate().is_err());

        let mut settings = Settings::from_toml(SHIPPED).unwrap();
        settings.cycle.target_multiplier = 1.0;
        assert!(settings.validate().is_err());
    }
}
