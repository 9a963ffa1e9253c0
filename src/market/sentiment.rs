//! Global sentiment feed
//!
//! Fear & greed from alternative.me and BTC dominance from the CoinGecko
//! global endpoint. Both degrade to neutral defaults instead of erroring so
//! the regime detector always has something to classify.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::config::FeedConfig;
use crate::error::Result;
use crate::market::{GlobalMarket, RateLimiter, SentimentFeed, SentimentReading};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Deserialize)]
struct FearGreedResponse {
    data: Vec<FearGreedEntry>,
}

#[derive(Debug, Deserialize)]
struct FearGreedEntry {
    value: String,
    value_classification: String,
}

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    #[serde(rename = "market_cap_percentage")]
    market_cap_percentage: std::collections::HashMap<String, f64>,
    #[serde(rename = "total_volume")]
    total_volume: std::collections::HashMap<String, f64>,
}

pub struct SentimentClient {
    client: reqwest::Client,
    fng_base: String,
    global_base: String,
    limiter: RateLimiter,
}

impl SentimentClient {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.http_timeout_secs))
                .build()
                .unwrap_or_default(),
            fng_base: config.sentiment_base.clone(),
            global_base: config.global_market_base.clone(),
            limiter: RateLimiter::new(MIN_REQUEST_INTERVAL),
        }
    }

    async fn try_fear_greed(&self) -> Result<SentimentReading> {
        self.limiter.acquire().await;
        let url = format!("{}/fng/?limit=1", self.fng_base);
        let resp: FearGreedResponse = self.client.get(&url).send().await?.json().await?;

        let entry = resp
            .data
            .into_iter()
            .next()
            .ok_or_else(|| crate::error::Error::data("fear_greed", "empty data array"))?;

        Ok(SentimentReading {
            value: entry.value.parse::<f64>().unwrap_or(50.0).clamp(0.0, 100.0),
            classification: entry.value_classification,
        })
    }

    async fn try_global_market(&self) -> Result<GlobalMarket> {
        self.limiter.acquire().await;
        let url = format!("{}/global", self.global_base);
        let resp: GlobalResponse = self.client.get(&url).send().await?.json().await?;

        Ok(GlobalMarket {
            btc_dominance: resp
                .data
                .market_cap_percentage
                .get("btc")
                .copied()
                .unwrap_or(50.0),
            total_volume_usd: resp.data.total_volume.get("usd").copied().unwrap_or(0.0),
        })
    }
}

#[async_trait::async_trait]
impl SentimentFeed for SentimentClient {
    async fn fear_greed(&self) -> SentimentReading {
        match self.try_fear_greed().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "fear/greed feed failed, using neutral fallback");
                SentimentReading::default()
            }
        }
    }

    async fn global_market(&self) -> GlobalMarket {
        match self.try_global_market().await {
            Ok(market) => market,
            Err(e) => {
                warn!(error = %e, "global market feed failed, using fallback");
                GlobalMarket::default()
            }
        }
    }
}
