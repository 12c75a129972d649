use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const BIRDEYE_MAX_LISTINGS: usize = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub pump_fun_url: String,
    pub birdeye_url: String,
    pub cache_ttl_s: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_s: u64,
    /// Use a clearly synthetic `SIM-` token when no listing is available at all.
    pub synthetic_fallback: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            pump_fun_url: "https://client-api.pump.fun/tokens/recent".to_string(),
            birdeye_url: "https://public-api.birdeye.so/public/tokenlist?sort_by=v24hUSD".to_string(),
            cache_ttl_s: 15 * 60,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            request_timeout_s: 10,
            synthetic_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TokenSource {
    PumpFun,
    Birdeye,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenListing {
    pub name: String,
    pub symbol: String,
    pub address: Option<String>,
    pub price: f64,
    pub market_cap: Option<f64>,
    pub source: TokenSource,
}

impl TokenListing {
    pub fn link(&self) -> Option<String> {
        let address = self.address.as_ref()?;
        match self.source {
            TokenSource::PumpFun => Some(format!("https://pump.fun/{address}")),
            TokenSource::Birdeye => Some(format!("https://birdeye.so/token/{address}?chain=solana")),
            TokenSource::Synthetic => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),
}

impl FeedError {
    fn is_retryable(&self) -> bool {
        match self {
            FeedError::Http(e) => !e.is_decode(),
            FeedError::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}

pub fn parse_pump_fun(body: &Value) -> Vec<TokenListing> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|tokens| {
            tokens
                .iter()
                .filter_map(|token| {
                    let name = str_field(token, "name")?;
                    let address = str_field(token, "address")?;
                    Some(TokenListing {
                        symbol: str_field(token, "symbol").unwrap_or_else(|| "UNKNOWN".to_string()),
                        name,
                        address: Some(address),
                        price: num_field(token, "price").unwrap_or(0.0),
                        market_cap: num_field(token, "marketCap"),
                        source: TokenSource::PumpFun,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_birdeye(body: &Value) -> Vec<TokenListing> {
    body.pointer("/data/tokens")
        .and_then(Value::as_array)
        .map(|tokens| {
            tokens
                .iter()
                .take(BIRDEYE_MAX_LISTINGS)
                .filter_map(|token| {
                    let symbol = str_field(token, "symbol")?;
                    let address = str_field(token, "address")?;
                    Some(TokenListing {
                        name: str_field(token, "name").unwrap_or_else(|| symbol.clone()),
                        symbol,
                        address: Some(address),
                        price: num_field(token, "price").unwrap_or(0.0),
                        market_cap: num_field(token, "marketCap")
                            .or_else(|| num_field(token, "mc")),
                        source: TokenSource::Birdeye,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn str_field(token: &Value, key: &str) -> Option<String> {
    token
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// some listings send prices as strings
fn num_field(token: &Value, key: &str) -> Option<f64> {
    match token.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16)))
}

#[derive(Debug, Clone)]
struct CachedListings {
    fetched_at: Instant,
    listings: Vec<TokenListing>,
}

/// Token names and prices for simulated trades, cached per source.
#[derive(Debug, Clone)]
pub struct TokenFeed {
    http: Client,
    config: MarketConfig,
    cache: Arc<RwLock<HashMap<TokenSource, CachedListings>>>,
}

impl TokenFeed {
    pub fn new(config: MarketConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s))
            .build()?;
        Ok(TokenFeed {
            http,
            config,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn synthetic_fallback(&self) -> bool {
        self.config.synthetic_fallback
    }

    /// pump.fun first, birdeye second. Empty when both are down and nothing was ever cached.
    pub async fn listings(&self) -> Vec<TokenListing> {
        for source in [TokenSource::PumpFun, TokenSource::Birdeye] {
            let listings = self.listings_from(source).await;
            if !listings.is_empty() {
                return listings;
            }
        }
        Vec::new()
    }

    async fn listings_from(&self, source: TokenSource) -> Vec<TokenListing> {
        let ttl = Duration::from_secs(self.config.cache_ttl_s);
        if let Some(cached) = self.cache.read().await.get(&source) {
            if cached.fetched_at.elapsed() < ttl {
                return cached.listings.clone();
            }
        }

        match self.fetch_with_retry(source).await {
            Ok(listings) if !listings.is_empty() => {
                info!("Fetched {} tokens from {source}", listings.len());
                self.store(source, listings.clone(), Instant::now()).await;
                listings
            }
            Ok(_) => {
                warn!("No usable tokens in the {source} response");
                self.stale(source).await
            }
            Err(e) => {
                warn!("Fetching tokens from {source} failed: {e}");
                self.stale(source).await
            }
        }
    }

    async fn stale(&self, source: TokenSource) -> Vec<TokenListing> {
        let stale = self
            .cache
            .read()
            .await
            .get(&source)
            .map(|cached| cached.listings.clone())
            .unwrap_or_default();
        if !stale.is_empty() {
            debug!("Using {} stale {source} tokens", stale.len());
        }
        stale
    }

    async fn store(&self, source: TokenSource, listings: Vec<TokenListing>, fetched_at: Instant) {
        self.cache.write().await.insert(
            source,
            CachedListings {
                fetched_at,
                listings,
            },
        );
    }

    async fn fetch_with_retry(&self, source: TokenSource) -> Result<Vec<TokenListing>, FeedError> {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch(source).await {
                Ok(listings) => return Ok(listings),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = backoff_delay(self.config.retry_base_delay_ms, attempt);
                    debug!("{source} attempt {attempt}/{max_attempts} failed: {e}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch(&self, source: TokenSource) -> Result<Vec<TokenListing>, FeedError> {
        let url = match source {
            TokenSource::PumpFun => &self.config.pump_fun_url,
            TokenSource::Birdeye => &self.config.birdeye_url,
            TokenSource::Synthetic => return Ok(Vec::new()),
        };
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status));
        }
        let body: Value = response.json().await?;
        Ok(match source {
            TokenSource::PumpFun => parse_pump_fun(&body),
            _ => parse_birdeye(&body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offline_config(cache_ttl_s: u64) -> MarketConfig {
        MarketConfig {
            pump_fun_url: "http://127.0.0.1:1/tokens".to_string(),
            birdeye_url: "http://127.0.0.1:1/tokenlist".to_string(),
            cache_ttl_s,
            max_retries: 2,
            retry_base_delay_ms: 1,
            request_timeout_s: 2,
            synthetic_fallback: false,
        }
    }

    fn listing(symbol: &str, source: TokenSource) -> TokenListing {
        TokenListing {
            name: symbol.to_lowercase(),
            symbol: symbol.to_string(),
            address: Some(format!("{symbol}Mint")),
            price: 0.01,
            market_cap: None,
            source,
        }
    }

    #[test]
    fn test_parse_pump_fun_skips_incomplete_tokens() {
        let body = json!({"data": [
            {"name": "Frog", "symbol": "FROG", "address": "F1", "price": 0.002, "marketCap": 5000},
            {"name": "NoAddress", "symbol": "NA"},
            {"name": "Quiet", "address": "Q1", "price": "0.5"}
        ]});
        let tokens = parse_pump_fun(&body);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].market_cap, Some(5000.0));
        assert_eq!(tokens[1].symbol, "UNKNOWN");
        assert_eq!(tokens[1].price, 0.5);
        assert_eq!(tokens[0].link().as_deref(), Some("https://pump.fun/F1"));
    }

    #[test]
    fn test_parse_birdeye_takes_first_fifty() {
        let tokens: Vec<Value> = (0..60)
            .map(|i| json!({"symbol": format!("T{i}"), "address": format!("A{i}"), "price": 1.0}))
            .collect();
        let parsed = parse_birdeye(&json!({"data": {"tokens": tokens}}));
        assert_eq!(parsed.len(), 50);
        assert_eq!(parsed[0].name, "T0");
        assert!(parsed[0].link().unwrap().starts_with("https://birdeye.so/token/A0"));
        assert!(parse_birdeye(&json!({"data": []})).is_empty());
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(2000, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2000, 2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(2000, 3), Duration::from_millis(8000));
    }

    #[test]
    fn test_only_throttling_and_server_errors_retry() {
        assert!(FeedError::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(FeedError::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!FeedError::Status(StatusCode::NOT_FOUND).is_retryable());
    }

    #[tokio::test]
    async fn test_fresh_cache_is_served_without_fetching() {
        let feed = TokenFeed::new(offline_config(900)).unwrap();
        feed.store(TokenSource::PumpFun, vec![listing("FROG", TokenSource::PumpFun)], Instant::now())
            .await;
        let tokens = feed.listings().await;
        assert_eq!(tokens[0].symbol, "FROG");
    }

    #[tokio::test]
    async fn test_stale_cache_used_when_sources_are_down() {
        let feed = TokenFeed::new(offline_config(0)).unwrap();
        assert!(feed.listings().await.is_empty());

        feed.store(TokenSource::Birdeye, vec![listing("OWL", TokenSource::Birdeye)], Instant::now())
            .await;
        let tokens = feed.listings().await;
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].source, TokenSource::Birdeye);
    }
}
