//! GeckoTerminal pool discovery client
//!
//! Serves the trending-pool and new-pool scans. GeckoTerminal is strict
//! about request rates (~0.5 req/s), so every call goes through the shared
//! rate limiter and 429s are retried with backoff inside the client's own
//! budget.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::market::{PoolFeed, PoolInfo, PoolScan, RateLimiter, TxWindow};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(2000);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Deserialize)]
struct PoolsResponse {
    data: Vec<PoolData>,
}

#[derive(Debug, Clone, Deserialize)]
struct PoolData {
    attributes: PoolAttributes,
    relationships: Option<PoolRelationships>,
}

#[derive(Debug, Clone, Deserialize)]
struct PoolAttributes {
    address: String,
    name: Option<String>,
    #[serde(rename = "pool_created_at")]
    pool_created_at: Option<String>,
    #[serde(rename = "base_token_price_usd")]
    base_token_price_usd: Option<String>,
    #[serde(rename = "reserve_in_usd")]
    reserve_in_usd: Option<String>,
    #[serde(rename = "fdv_usd")]
    fdv_usd: Option<String>,
    #[serde(rename = "market_cap_usd")]
    market_cap_usd: Option<String>,
    transactions: Option<HashMap<String, TxBucket>>,
    #[serde(rename = "volume_usd")]
    volume_usd: Option<HashMap<String, Option<String>>>,
    #[serde(rename = "price_change_percentage")]
    price_change_percentage: Option<HashMap<String, Option<String>>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct TxBucket {
    buys: Option<u32>,
    sells: Option<u32>,
    buyers: Option<u32>,
    sellers: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct PoolRelationships {
    #[serde(rename = "base_token")]
    base_token: Option<RelationshipRef>,
}

#[derive(Debug, Clone, Deserialize)]
struct RelationshipRef {
    data: Option<RelationshipData>,
}

#[derive(Debug, Clone, Deserialize)]
struct RelationshipData {
    /// e.g. "eth_0xabc..." - network prefix followed by the token address
    id: String,
}

pub struct GeckoTerminalClient {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl GeckoTerminalClient {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.http_timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.geckoterminal_base.clone(),
            limiter: RateLimiter::new(MIN_REQUEST_INTERVAL),
        }
    }

    async fn fetch_pools(&self, network: &str, kind: &str) -> Result<Vec<PoolInfo>> {
        let url = format!("{}/networks/{}/{}", self.base_url, network, kind);

        let op = || async {
            self.limiter.acquire().await;
            let resp = self
                .client
                .get(&url)
                .header("accept", "application/json")
                .send()
                .await
                .map_err(|e| backoff::Error::transient(Error::from(e)))?;

            if resp.status().as_u16() == 429 {
                warn!(network, kind, "geckoterminal rate limited");
                return Err(backoff::Error::transient(Error::RateLimited {
                    feed: "geckoterminal".to_string(),
                    retry_after_ms: MIN_REQUEST_INTERVAL.as_millis() as u64,
                }));
            }
            if !resp.status().is_success() {
                let status = resp.status();
                let err = Error::feed("geckoterminal", format!("{} for {}", status, url));
                return if status.is_server_error() {
                    Err(backoff::Error::transient(err))
                } else {
                    Err(backoff::Error::permanent(err))
                };
            }

            resp.json::<PoolsResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(Error::data("geckoterminal", e)))
        };

        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
            .build();
        let response = backoff::future::retry(policy, op).await?;

        let now = Utc::now();
        let pools = response
            .data
            .into_iter()
            .filter_map(|p| to_pool_info(p, network, now))
            .collect();
        Ok(pools)
    }

    async fn scan(&self, networks: &[String], kind: &str) -> PoolScan {
        let mut scan = PoolScan::default();
        for network in networks {
            match self.fetch_pools(network, kind).await {
                Ok(mut pools) => {
                    debug!(network, kind, count = pools.len(), "pools fetched");
                    scan.pools.append(&mut pools);
                }
                Err(e) => {
                    warn!(network, kind, error = %e, "pool scan failed for network");
                    scan.errors.push((network.clone(), e.to_string()));
                }
            }
        }
        scan
    }
}

#[async_trait::async_trait]
impl PoolFeed for GeckoTerminalClient {
    async fn trending_pools(&self, networks: &[String]) -> PoolScan {
        self.scan(networks, "trending_pools").await
    }

    async fn new_pools(&self, networks: &[String]) -> PoolScan {
        self.scan(networks, "new_pools").await
    }
}

fn parse_f64(value: &Option<String>) -> f64 {
    value
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn windowed_f64(map: &Option<HashMap<String, Option<String>>>, window: &str) -> f64 {
    map.as_ref()
        .and_then(|m| m.get(window))
        .and_then(|v| v.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn windowed_tx(map: &Option<HashMap<String, TxBucket>>, window: &str) -> TxWindow {
    map.as_ref()
        .and_then(|m| m.get(window))
        .map(|b| TxWindow {
            buys: b.buys.unwrap_or(0),
            sells: b.sells.unwrap_or(0),
            buyers: b.buyers,
            sellers: b.sellers,
        })
        .unwrap_or_default()
}

/// Token address from a relationship id like "eth_0xabc..."; the prefix is
/// the feed's own network slug, not ours, so only the tail is kept.
fn token_address_from_id(id: &str) -> String {
    match id.split_once('_') {
        Some((_, address)) => address.to_string(),
        None => id.to_string(),
    }
}

fn symbol_from_name(name: &Option<String>) -> String {
    // pool names look like "WIF / SOL" - the base symbol is the first token
    name.as_deref()
        .and_then(|n| n.split('/').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "???".to_string())
}

fn to_pool_info(data: PoolData, network: &str, _now: DateTime<Utc>) -> Option<PoolInfo> {
    let token_address = data
        .relationships
        .as_ref()
        .and_then(|r| r.base_token.as_ref())
        .and_then(|t| t.data.as_ref())
        .map(|d| token_address_from_id(&d.id))?;

    let attrs = data.attributes;
    let created_at = attrs
        .pool_created_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(PoolInfo {
        pool_address: attrs.address.clone(),
        network: network.to_string(),
        token_address,
        symbol: symbol_from_name(&attrs.name),
        created_at,
        price_usd: parse_f64(&attrs.base_token_price_usd),
        reserve_usd: parse_f64(&attrs.reserve_in_usd),
        fdv_usd: attrs.fdv_usd.as_deref().and_then(|s| s.parse().ok()),
        market_cap_usd: attrs.market_cap_usd.as_deref().and_then(|s| s.parse().ok()),
        tx_m5: windowed_tx(&attrs.transactions, "m5"),
        tx_h1: windowed_tx(&attrs.transactions, "h1"),
        tx_h6: windowed_tx(&attrs.transactions, "h6"),
        tx_h24: windowed_tx(&attrs.transactions, "h24"),
        volume_m5: windowed_f64(&attrs.volume_usd, "m5"),
        volume_h1: windowed_f64(&attrs.volume_usd, "h1"),
        volume_h6: windowed_f64(&attrs.volume_usd, "h6"),
        volume_h24: windowed_f64(&attrs.volume_usd, "h24"),
        price_change_m5: windowed_f64(&attrs.price_change_percentage, "m5"),
        price_change_h1: windowed_f64(&attrs.price_change_percentage, "h1"),
        price_change_h6: windowed_f64(&attrs.price_change_percentage, "h6"),
        price_change_h24: windowed_f64(&attrs.price_change_percentage, "h24"),
    })
}
