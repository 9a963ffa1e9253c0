//! Per-token health checks
//!
//! Pulls the best pair for a token, derives liquidity/volume/spread/
//! concentration metrics, raises risk flags and folds everything into a
//! 0-100 health score. A snapshot is persisted per check and the token
//! registry row is created on first sight.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::market::{PairLookup, PairSummary};
use crate::storage::Storage;
use crate::types::{HealthSnapshot, TokenRow};

/// Optional holder-distribution lookup; yields the top-10 holder share in
/// percent when available.
#[async_trait]
pub trait HolderLookup: Send + Sync {
    async fn top10_concentration_pct(&self, network: &str, token_address: &str)
        -> Result<Option<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    LowLiquidity,
    LowVolume,
    ZeroPrice,
    VeryNewPair,
    NoSells24h,
    NoBuys24h,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::LowLiquidity => "low_liquidity",
            RiskFlag::LowVolume => "low_volume",
            RiskFlag::ZeroPrice => "zero_price",
            RiskFlag::VeryNewPair => "very_new_pair",
            RiskFlag::NoSells24h => "no_sells_24h",
            RiskFlag::NoBuys24h => "no_buys_24h",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHealth {
    pub token_address: String,
    pub network: String,
    pub symbol: String,
    pub score: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub price_usd: f64,
    pub spread_pct: f64,
    pub top10_concentration_pct: Option<f64>,
    pub pair_age_hours: Option<f64>,
    pub flags: Vec<RiskFlag>,
}

impl TokenHealth {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.flags.contains(&flag)
    }
}

pub struct TokenHealthChecker {
    pairs: Arc<dyn PairLookup>,
    holders: Option<Arc<dyn HolderLookup>>,
    storage: Arc<dyn Storage>,
    /// Per-cycle pair cache so health checks, quotes and exits share lookups
    pair_cache: DashMap<String, PairSummary>,
}

impl TokenHealthChecker {
    pub fn new(
        pairs: Arc<dyn PairLookup>,
        holders: Option<Arc<dyn HolderLookup>>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            pairs,
            holders,
            storage,
            pair_cache: DashMap::new(),
        }
    }

    /// Drop cached pairs; called by the orchestrator between cycles.
    pub fn clear_cache(&self) {
        self.pair_cache.clear();
    }

    /// Fetch the best pair for a token, going through the per-cycle cache.
    pub async fn best_pair(&self, network: &str, token_address: &str) -> Result<Option<PairSummary>> {
        let key = format!("{}:{}", network, token_address);
        if let Some(hit) = self.pair_cache.get(&key) {
            return Ok(Some(hit.clone()));
        }
        let pair = self.pairs.best_pair(network, token_address).await?;
        if let Some(ref p) = pair {
            self.pair_cache.insert(key, p.clone());
        }
        Ok(pair)
    }

    /// Run a full health check. Returns None when no pair exists.
    pub async fn check(
        &self,
        network: &str,
        token_address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenHealth>> {
        let pair = match self.best_pair(network, token_address).await? {
            Some(p) => p,
            None => {
                debug!(network, token = token_address, "no pair found for token");
                return Ok(None);
            }
        };

        let concentration = match &self.holders {
            Some(lookup) => lookup
                .top10_concentration_pct(network, token_address)
                .await
                .unwrap_or_else(|e| {
                    debug!(error = %e, "holder lookup failed, skipping concentration");
                    None
                }),
            None => None,
        };

        let health = score_pair(&pair, concentration);

        // registry row on first sight; best-effort like every non-critical write
        let row = TokenRow {
            token_address: token_address.to_string(),
            network: network.to_string(),
            symbol: health.symbol.clone(),
            first_seen: now,
        };
        if let Err(e) = self.storage.ensure_token(&row).await {
            warn!(error = %e, "token registry write failed");
        }

        let snapshot = HealthSnapshot {
            token_address: token_address.to_string(),
            network: network.to_string(),
            score: health.score,
            liquidity_usd: health.liquidity_usd,
            volume_24h: health.volume_24h,
            price_usd: health.price_usd,
            spread_pct: health.spread_pct,
            flags: health.flags.iter().map(|f| f.as_str().to_string()).collect(),
            taken_at: now,
        };
        if let Err(e) = self.storage.insert_health_snapshot(&snapshot).await {
            warn!(error = %e, "health snapshot write failed");
        }

        Ok(Some(health))
    }
}

/// Estimated spread in percent: thin pools trade wide, active volume
/// tightens the estimate slightly.
pub fn estimate_spread_pct(liquidity_usd: f64, volume_24h: f64) -> f64 {
    let volume_adjust = if volume_24h > 0.0 { 0.9 } else { 1.1 };
    let base = if liquidity_usd > 0.0 {
        1.0 / (liquidity_usd / 1000.0).sqrt()
    } else {
        10.0
    };
    (base * volume_adjust).clamp(0.05, 10.0)
}

/// Score a pair without I/O; exposed for the confluence tests.
pub fn score_pair(pair: &PairSummary, top10_concentration_pct: Option<f64>) -> TokenHealth {
    let liquidity = pair.liquidity_usd;
    let volume = pair.volume_24h;
    let price = pair.price_usd;
    let spread = estimate_spread_pct(liquidity, volume);

    let mut flags = Vec::new();
    if liquidity < 50_000.0 {
        flags.push(RiskFlag::LowLiquidity);
    }
    if volume < 10_000.0 {
        flags.push(RiskFlag::LowVolume);
    }
    if price <= 0.0 {
        flags.push(RiskFlag::ZeroPrice);
    }
    if pair.pair_age_hours.map(|a| a < 24.0).unwrap_or(false) {
        flags.push(RiskFlag::VeryNewPair);
    }
    if pair.sells_24h == 0 {
        flags.push(RiskFlag::NoSells24h);
    }
    if pair.buys_24h == 0 {
        flags.push(RiskFlag::NoBuys24h);
    }

    let mut score = 50.0;

    // liquidity band
    score += if liquidity >= 1_000_000.0 {
        20.0
    } else if liquidity >= 250_000.0 {
        15.0
    } else if liquidity >= 50_000.0 {
        8.0
    } else {
        -15.0
    };

    // volume band
    score += if volume >= 500_000.0 {
        15.0
    } else if volume >= 100_000.0 {
        10.0
    } else if volume >= 10_000.0 {
        5.0
    } else {
        -10.0
    };

    // spread band
    score += if spread <= 0.3 {
        10.0
    } else if spread <= 1.0 {
        5.0
    } else if spread >= 3.0 {
        -10.0
    } else {
        0.0
    };

    // concentration band, only when holder data came back
    if let Some(pct) = top10_concentration_pct {
        score += if pct <= 30.0 {
            5.0
        } else if pct > 60.0 {
            -15.0
        } else if pct > 45.0 {
            -8.0
        } else {
            0.0
        };
    }

    // flag count
    score += if flags.is_empty() {
        5.0
    } else {
        -5.0 * flags.len() as f64
    };

    // age band
    if let Some(age) = pair.pair_age_hours {
        if age >= 24.0 * 30.0 {
            score += 5.0;
        } else if age < 24.0 {
            score -= 10.0;
        }
    }

    TokenHealth {
        token_address: pair.token_address.clone(),
        network: pair.network.clone(),
        symbol: pair.symbol.clone(),
        score: score.clamp(0.0, 100.0),
        liquidity_usd: liquidity,
        volume_24h: volume,
        price_usd: price,
        spread_pct: spread,
        top10_concentration_pct,
        pair_age_hours: pair.pair_age_hours,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    pub(crate) fn pair(liquidity: f64, volume: f64, price: f64) -> PairSummary {
        PairSummary {
            pair_address: "pp".to_string(),
            dex_id: "uniswap".to_string(),
            network: "base".to_string(),
            token_address: "0xtoke".to_string(),
            symbol: "TOKE".to_string(),
            price_usd: price,
            liquidity_usd: liquidity,
            volume_24h: volume,
            price_change_1h: 1.0,
            price_change_24h: 5.0,
            buys_24h: 200,
            sells_24h: 150,
            pair_age_hours: Some(24.0 * 10.0),
        }
    }

    struct FixedPair(Option<PairSummary>);

    #[async_trait]
    impl PairLookup for FixedPair {
        async fn best_pair(&self, _network: &str, _token: &str) -> Result<Option<PairSummary>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_spread_estimate() {
        // deep pool, active volume: clamped at the 5bps floor
        let tight = estimate_spread_pct(1_000_000.0, 500_000.0);
        assert_eq!(tight, 0.05);

        // thin dead pool: 1/sqrt(0.5) * 1.1
        let wide = estimate_spread_pct(500.0, 0.0);
        assert!((wide - 1.5556).abs() < 0.001);
        assert_eq!(estimate_spread_pct(0.0, 0.0), 10.0);
    }

    #[test]
    fn test_healthy_pool_scores_high() {
        let health = score_pair(&pair(2_000_000.0, 800_000.0, 1.0), Some(20.0));
        assert!(health.flags.is_empty());
        assert!(health.score >= 85.0, "score = {}", health.score);
    }

    #[test]
    fn test_degenerate_pool_scores_low_with_flags() {
        let mut p = pair(10_000.0, 2_000.0, 0.0);
        p.sells_24h = 0;
        p.buys_24h = 0;
        p.pair_age_hours = Some(3.0);

        let health = score_pair(&p, None);
        assert!(health.has_flag(RiskFlag::LowLiquidity));
        assert!(health.has_flag(RiskFlag::LowVolume));
        assert!(health.has_flag(RiskFlag::ZeroPrice));
        assert!(health.has_flag(RiskFlag::VeryNewPair));
        assert!(health.has_flag(RiskFlag::NoSells24h));
        assert!(health.has_flag(RiskFlag::NoBuys24h));
        assert_eq!(health.score, 0.0); // clamped
    }

    #[test]
    fn test_score_clamped_to_100() {
        let health = score_pair(&pair(5_000_000.0, 2_000_000.0, 1.0), Some(10.0));
        assert!(health.score <= 100.0);
    }

    #[test]
    fn test_concentration_penalty() {
        let balanced = score_pair(&pair(300_000.0, 120_000.0, 1.0), Some(25.0));
        let whale_heavy = score_pair(&pair(300_000.0, 120_000.0, 1.0), Some(70.0));
        assert!(balanced.score > whale_heavy.score);
        assert!((balanced.score - whale_heavy.score - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_check_persists_snapshot_and_registry() {
        let storage = Arc::new(MemoryStore::new());
        let checker = TokenHealthChecker::new(
            Arc::new(FixedPair(Some(pair(300_000.0, 120_000.0, 1.0)))),
            None,
            storage.clone(),
        );

        let health = checker
            .check("base", "0xtoke", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(health.score > 50.0);
    }

    #[tokio::test]
    async fn test_check_returns_none_without_pair() {
        let storage = Arc::new(MemoryStore::new());
        let checker = TokenHealthChecker::new(Arc::new(FixedPair(None)), None, storage);
        let health = checker.check("base", "0xmissing", Utc::now()).await.unwrap();
        assert!(health.is_none());
    }

    #[tokio::test]
    async fn test_pair_cache_hits_once() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct Counting(AtomicU32);

        #[async_trait]
        impl PairLookup for Counting {
            async fn best_pair(&self, _n: &str, _t: &str) -> Result<Option<PairSummary>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Some(pair(300_000.0, 120_000.0, 1.0)))
            }
        }

        let lookup = Arc::new(Counting(AtomicU32::new(0)));
        let checker =
            TokenHealthChecker::new(lookup.clone(), None, Arc::new(MemoryStore::new()));

        checker.best_pair("base", "0xtoke").await.unwrap();
        checker.best_pair("base", "0xtoke").await.unwrap();
        assert_eq!(lookup.0.load(Ordering::SeqCst), 1);
    }
}
