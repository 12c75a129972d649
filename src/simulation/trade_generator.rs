use crate::market::token_feed::{TokenListing, TokenSource};
use anyhow::{bail, Result};
use chrono::{Duration, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const FALLBACK_ENTRY_PRICE: f64 = 0.00001;

/// Distribution of simulated outcomes. Every draw is independent of earlier trades.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeGeneratorConfig {
    pub loss_probability: f64,
    pub standout_probability: f64,
    pub win_pct_min: f64,
    pub win_pct_max: f64,
    pub standout_pct_min: f64,
    pub standout_pct_max: f64,
    pub loss_pct_min: f64,
    pub loss_pct_max: f64,
    pub stake_fraction_min: f64,
    pub stake_fraction_max: f64,
    pub holding_minutes_min: i64,
    pub holding_minutes_max: i64,
}

impl Default for TradeGeneratorConfig {
    fn default() -> Self {
        TradeGeneratorConfig {
            loss_probability: 0.2,
            standout_probability: 0.15,
            win_pct_min: 4.0,
            win_pct_max: 10.0,
            standout_pct_min: 12.0,
            standout_pct_max: 15.0,
            loss_pct_min: 0.5,
            loss_pct_max: 1.8,
            stake_fraction_min: 0.1,
            stake_fraction_max: 0.5,
            holding_minutes_min: 5,
            holding_minutes_max: 20,
        }
    }
}

impl TradeGeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("loss_probability", self.loss_probability),
            ("standout_probability", self.standout_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                bail!("{name} must be within [0, 1], got {p}");
            }
        }
        for (name, min, max) in [
            ("win_pct", self.win_pct_min, self.win_pct_max),
            ("standout_pct", self.standout_pct_min, self.standout_pct_max),
            ("loss_pct", self.loss_pct_min, self.loss_pct_max),
        ] {
            if !(min >= 0.0 && min <= max) {
                bail!("{name} range is invalid: {min}..{max}");
            }
        }
        if !(self.stake_fraction_min > 0.0
            && self.stake_fraction_min <= self.stake_fraction_max
            && self.stake_fraction_max <= 1.0)
        {
            bail!(
                "stake fraction must satisfy 0 < min <= max <= 1, got {}..{}",
                self.stake_fraction_min,
                self.stake_fraction_max
            );
        }
        if self.loss_pct_max >= 100.0 {
            bail!("loss_pct_max must stay below 100");
        }
        if !(0 <= self.holding_minutes_min && self.holding_minutes_min <= self.holding_minutes_max) {
            bail!("holding minutes range is invalid");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub token_name: String,
    pub token_symbol: String,
    pub token_link: Option<String>,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Paper SOL put into the trade.
    pub stake: f64,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub is_standout: bool,
    pub opened_at: NaiveDateTime,
    pub closed_at: NaiveDateTime,
}

impl SimulatedTrade {
    pub fn is_profitable(&self) -> bool {
        self.pnl >= 0.0
    }
}

/// Draws one simulated trade on `token`. Returns None when there is nothing to stake.
pub fn generate_trade<R: Rng + ?Sized>(
    rng: &mut R,
    config: &TradeGeneratorConfig,
    token: &TokenListing,
    balance: f64,
    now: NaiveDateTime,
) -> Option<SimulatedTrade> {
    if !(balance > 0.0) {
        return None;
    }
    let is_loss = rng.gen_bool(config.loss_probability);
    let is_standout = !is_loss && rng.gen_bool(config.standout_probability);
    let pnl_percentage = if is_loss {
        -rng.gen_range(config.loss_pct_min..=config.loss_pct_max)
    } else if is_standout {
        rng.gen_range(config.standout_pct_min..=config.standout_pct_max)
    } else {
        rng.gen_range(config.win_pct_min..=config.win_pct_max)
    };

    let stake = balance * rng.gen_range(config.stake_fraction_min..=config.stake_fraction_max);
    let entry_price = if token.price > 0.0 {
        token.price
    } else {
        FALLBACK_ENTRY_PRICE
    };
    let holding = rng.gen_range(config.holding_minutes_min..=config.holding_minutes_max);

    Some(SimulatedTrade {
        token_name: token.name.clone(),
        token_symbol: token.symbol.clone(),
        token_link: token.link(),
        entry_price,
        exit_price: entry_price * (1.0 + pnl_percentage / 100.0),
        stake,
        pnl: stake * pnl_percentage / 100.0,
        pnl_percentage,
        is_standout,
        opened_at: now - Duration::minutes(holding),
        closed_at: now,
    })
}

pub fn pick_token<'a, R: Rng + ?Sized>(
    rng: &mut R,
    listings: &'a [TokenListing],
) -> Option<&'a TokenListing> {
    listings.choose(rng)
}

/// A placeholder token that can never be mistaken for a real listing.
pub fn synthetic_token<R: Rng + ?Sized>(rng: &mut R) -> TokenListing {
    let tag: u16 = rng.gen();
    TokenListing {
        name: format!("Simulated Token {tag:04X}"),
        symbol: format!("SIM-{tag:04X}"),
        address: None,
        price: rng.gen_range(0.00001..0.01),
        market_cap: None,
        source: TokenSource::Synthetic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn token() -> TokenListing {
        TokenListing {
            name: "Frog".to_string(),
            symbol: "FROG".to_string(),
            address: Some("FrogMint111".to_string()),
            price: 0.002,
            market_cap: Some(12_000.0),
            source: TokenSource::PumpFun,
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(TradeGeneratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut cfg = TradeGeneratorConfig::default();
        cfg.loss_probability = 1.2;
        assert!(cfg.validate().is_err());

        let mut cfg = TradeGeneratorConfig::default();
        cfg.win_pct_min = 11.0;
        assert!(cfg.validate().is_err());

        let mut cfg = TradeGeneratorConfig::default();
        cfg.stake_fraction_max = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_trade_respects_configured_ranges() {
        let cfg = TradeGeneratorConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let trade = generate_trade(&mut rng, &cfg, &token(), 10.0, now()).unwrap();
            assert!(trade.stake >= 1.0 && trade.stake <= 5.0);
            let pct = trade.pnl_percentage;
            if trade.is_profitable() {
                let (lo, hi) = if trade.is_standout { (12.0, 15.0) } else { (4.0, 10.0) };
                assert!(pct >= lo && pct <= hi, "{pct}");
            } else {
                assert!(pct <= -0.5 && pct >= -1.8, "{pct}");
                assert!(!trade.is_standout);
            }
            assert!((trade.pnl - trade.stake * pct / 100.0).abs() < 1e-12);
            assert!(trade.opened_at < trade.closed_at);
        }
    }

    #[test]
    fn test_losses_can_follow_losses() {
        let cfg = TradeGeneratorConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let outcomes: Vec<bool> = (0..2000)
            .map(|_| {
                generate_trade(&mut rng, &cfg, &token(), 1.0, now())
                    .unwrap()
                    .is_profitable()
            })
            .collect();
        let losses = outcomes.iter().filter(|win| !**win).count();
        let back_to_back = outcomes.windows(2).filter(|w| !w[0] && !w[1]).count();
        assert!(losses > 300 && losses < 500, "losses: {losses}");
        assert!(back_to_back > 0);
    }

    #[test]
    fn test_certain_loss_is_always_a_loss() {
        let cfg = TradeGeneratorConfig {
            loss_probability: 1.0,
            ..TradeGeneratorConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..50).all(|_| !generate_trade(&mut rng, &cfg, &token(), 1.0, now())
            .unwrap()
            .is_profitable()));
    }

    #[test]
    fn test_no_trade_without_balance() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = TradeGeneratorConfig::default();
        assert!(generate_trade(&mut rng, &cfg, &token(), 0.0, now()).is_none());
    }

    #[test]
    fn test_synthetic_token_is_labelled() {
        let mut rng = StdRng::seed_from_u64(3);
        let token = synthetic_token(&mut rng);
        assert!(token.symbol.starts_with("SIM-"));
        assert_eq!(token.source, TokenSource::Synthetic);
        assert!(token.link().is_none());
    }
}
