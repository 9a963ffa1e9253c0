//! Market feed clients and their contracts
//!
//! The cycle engine only sees the traits defined here; the HTTP clients are
//! thin adapters over the public GeckoTerminal, DexScreener and
//! alternative.me/CoinGecko endpoints. Any feed failure is "no data from
//! this feed this cycle", never fatal.

pub mod dexscreener;
pub mod geckoterminal;
pub mod rate_limit;
pub mod sentiment;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use dexscreener::DexScreenerClient;
pub use geckoterminal::GeckoTerminalClient;
pub use rate_limit::RateLimiter;
pub use sentiment::SentimentClient;

/// Per-window transaction counts from a pool feed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TxWindow {
    pub buys: u32,
    pub sells: u32,
    pub buyers: Option<u32>,
    pub sellers: Option<u32>,
}

/// A discovered pool, normalised across feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub pool_address: String,
    pub network: String,
    pub token_address: String,
    pub symbol: String,
    pub created_at: Option<DateTime<Utc>>,
    pub price_usd: f64,
    pub reserve_usd: f64,
    pub fdv_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub tx_m5: TxWindow,
    pub tx_h1: TxWindow,
    pub tx_h6: TxWindow,
    pub tx_h24: TxWindow,
    pub volume_m5: f64,
    pub volume_h1: f64,
    pub volume_h6: f64,
    pub volume_h24: f64,
    pub price_change_m5: f64,
    pub price_change_h1: f64,
    pub price_change_h6: f64,
    pub price_change_h24: f64,
}

impl PoolInfo {
    /// Pair age in hours relative to `now`; very large when unknown so age
    /// filters treat unknown pairs as mature.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        match self.created_at {
            Some(created) => ((now - created).num_seconds() as f64 / 3600.0).max(0.0),
            None => f64::MAX,
        }
    }
}

/// One discovery scan across networks; failed networks land in `errors`.
#[derive(Debug, Clone, Default)]
pub struct PoolScan {
    pub pools: Vec<PoolInfo>,
    pub errors: Vec<(String, String)>,
}

/// Normalised best-pair view used by health checks, quotes and exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSummary {
    pub pair_address: String,
    pub dex_id: String,
    pub network: String,
    pub token_address: String,
    pub symbol: String,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub price_change_1h: f64,
    pub price_change_24h: f64,
    pub buys_24h: u32,
    pub sells_24h: u32,
    pub pair_age_hours: Option<f64>,
}

/// Fear & greed reading, 0-100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReading {
    pub value: f64,
    pub classification: String,
}

impl Default for SentimentReading {
    fn default() -> Self {
        Self {
            value: 50.0,
            classification: "Neutral".to_string(),
        }
    }
}

/// Global market snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalMarket {
    pub btc_dominance: f64,
    pub total_volume_usd: f64,
}

impl Default for GlobalMarket {
    fn default() -> Self {
        Self {
            btc_dominance: 50.0,
            total_volume_usd: 0.0,
        }
    }
}

/// Trending- and new-pool discovery feed.
#[async_trait]
pub trait PoolFeed: Send + Sync {
    async fn trending_pools(&self, networks: &[String]) -> PoolScan;
    async fn new_pools(&self, networks: &[String]) -> PoolScan;
}

/// Per-token pair lookup; "best" is the highest-USD-liquidity pair.
#[async_trait]
pub trait PairLookup: Send + Sync {
    async fn best_pair(&self, network: &str, token_address: &str) -> Result<Option<PairSummary>>;
}

/// Global sentiment feed. Both calls fall back gracefully instead of
/// erroring: 50/"Neutral" and 50 dominance with zero volume.
#[async_trait]
pub trait SentimentFeed: Send + Sync {
    async fn fear_greed(&self) -> SentimentReading;
    async fn global_market(&self) -> GlobalMarket;
}
