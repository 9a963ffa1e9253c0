// DexScreener API client for per-token pair lookup
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FeedConfig;
use crate::error::Result;
use crate::market::{PairLookup, PairSummary, RateLimiter};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Txns {
    pub m5: Option<TxnCount>,
    pub h1: Option<TxnCount>,
    pub h6: Option<TxnCount>,
    pub h24: Option<TxnCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnCount {
    pub buys: u32,
    pub sells: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub txns: Option<Txns>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    /// Unix millis of pair creation
    #[serde(rename = "pairCreatedAt")]
    pub pair_created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl DexScreenerClient {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.http_timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.dexscreener_base.clone(),
            limiter: RateLimiter::new(MIN_REQUEST_INTERVAL),
        }
    }

    /// Fetch all pairs for a token on any chain.
    pub async fn token_pairs(&self, token_address: &str) -> Result<Vec<DexPair>> {
        self.limiter.acquire().await;
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, token_address);
        let resp = self.client.get(&url).send().await?;
        let data: TokenPairsResponse = resp.json().await?;
        Ok(data.pairs.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl PairLookup for DexScreenerClient {
    async fn best_pair(&self, network: &str, token_address: &str) -> Result<Option<PairSummary>> {
        let pairs = self.token_pairs(token_address).await?;

        let best = pairs
            .into_iter()
            .filter(|p| p.chain_id == network)
            .max_by(|a, b| {
                liquidity_usd(a)
                    .partial_cmp(&liquidity_usd(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        debug!(
            network,
            token = token_address,
            found = best.is_some(),
            "best pair lookup"
        );
        Ok(best.map(|p| summarize(&p)))
    }
}

fn liquidity_usd(pair: &DexPair) -> f64 {
    pair.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
}

/// Collapse a raw pair into the normalised view the engine consumes.
pub fn summarize(pair: &DexPair) -> PairSummary {
    let (buys_24h, sells_24h) = pair
        .txns
        .as_ref()
        .and_then(|t| t.h24.as_ref())
        .map(|c| (c.buys, c.sells))
        .unwrap_or((0, 0));

    let pair_age_hours = pair.pair_created_at.map(|ms| {
        let age_ms = Utc::now().timestamp_millis() - ms;
        (age_ms as f64 / 3_600_000.0).max(0.0)
    });

    PairSummary {
        pair_address: pair.pair_address.clone(),
        dex_id: pair.dex_id.clone(),
        network: pair.chain_id.clone(),
        token_address: pair.base_token.address.clone(),
        symbol: pair
            .base_token
            .symbol
            .clone()
            .unwrap_or_else(|| "???".to_string()),
        price_usd: pair
            .price_usd
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0),
        liquidity_usd: liquidity_usd(pair),
        volume_24h: pair.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0),
        price_change_1h: pair
            .price_change
            .as_ref()
            .and_then(|pc| pc.h1)
            .unwrap_or(0.0),
        price_change_24h: pair
            .price_change
            .as_ref()
            .and_then(|pc| pc.h24)
            .unwrap_or(0.0),
        buys_24h,
        sells_24h,
        pair_age_hours,
    }
}
