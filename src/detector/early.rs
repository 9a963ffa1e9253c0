//! Early-traction detector
//!
//! Scores freshly created pools for organic early traction. The profile is
//! different from the momentum detector: thinner pools, much younger pairs,
//! and unique-wallet ratios matter more than raw transaction counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detector::momentum::buy_pressure;
use crate::market::PoolInfo;

/// Hard filter bounds
const MIN_LIQUIDITY_USD: f64 = 5_000.0;
const MAX_LIQUIDITY_USD: f64 = 2_000_000.0;
const MIN_VOLUME_24H: f64 = 3_000.0;
const MIN_AGE_HOURS: f64 = 1.0;
const MAX_AGE_HOURS: f64 = 72.0;
const MAX_ABS_CHANGE_24H: f64 = 200.0;
const MIN_BUY_PRESSURE: f64 = 1.3;
const MIN_WALLET_RATIO: f64 = 1.2;

/// Assumed buyer/seller wallet ratio when the feed has no unique counts.
const NEUTRAL_WALLET_RATIO: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyTier {
    HighPotential,
    ModeratePotential,
    Speculative,
}

impl EarlyTier {
    fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            EarlyTier::HighPotential
        } else if score >= 60.0 {
            EarlyTier::ModeratePotential
        } else {
            EarlyTier::Speculative
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlySignal {
    pub token_address: String,
    pub network: String,
    pub symbol: String,
    pub pool_address: String,
    pub score: f64,
    pub tier: EarlyTier,
    pub buy_pressure: f64,
    pub buyer_seller_ratio: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub price_usd: f64,
    pub price_change_1h: f64,
    pub price_change_24h: f64,
    pub pair_age_hours: f64,
}

pub struct EarlyDetector {
    min_score: f64,
}

impl EarlyDetector {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }

    /// Threshold override from the calibrator at the start of each cycle.
    pub fn set_min_score(&mut self, min_score: f64) {
        self.min_score = min_score;
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    /// Scan new pools into ranked signals, best first.
    pub fn scan(&self, pools: &[PoolInfo], now: DateTime<Utc>) -> Vec<EarlySignal> {
        let mut signals: Vec<EarlySignal> = pools
            .iter()
            .filter_map(|pool| self.evaluate(pool, now))
            .filter(|s| s.score >= self.min_score)
            .collect();

        signals.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        debug!(
            candidates = pools.len(),
            emitted = signals.len(),
            min_score = self.min_score,
            "early scan complete"
        );
        signals
    }

    fn evaluate(&self, pool: &PoolInfo, now: DateTime<Utc>) -> Option<EarlySignal> {
        let age_hours = pool.age_hours(now);

        if pool.reserve_usd < MIN_LIQUIDITY_USD || pool.reserve_usd > MAX_LIQUIDITY_USD {
            return None;
        }
        if pool.volume_h24 < MIN_VOLUME_24H {
            return None;
        }
        if !(MIN_AGE_HOURS..=MAX_AGE_HOURS).contains(&age_hours) {
            return None;
        }
        if pool.price_change_h24.abs() > MAX_ABS_CHANGE_24H {
            return None;
        }

        let bp = buy_pressure(pool.tx_h24.buys, pool.tx_h24.sells);
        if bp < MIN_BUY_PRESSURE {
            return None;
        }

        let wallet_ratio = buyer_seller_ratio(pool);
        if wallet_ratio < MIN_WALLET_RATIO {
            return None;
        }

        let score = composite_score(pool, bp, wallet_ratio, age_hours);

        Some(EarlySignal {
            token_address: pool.token_address.clone(),
            network: pool.network.clone(),
            symbol: pool.symbol.clone(),
            pool_address: pool.pool_address.clone(),
            score,
            tier: EarlyTier::from_score(score),
            buy_pressure: bp,
            buyer_seller_ratio: wallet_ratio,
            liquidity_usd: pool.reserve_usd,
            volume_24h: pool.volume_h24,
            price_usd: pool.price_usd,
            price_change_1h: pool.price_change_h1,
            price_change_24h: pool.price_change_h24,
            pair_age_hours: age_hours,
        })
    }
}

/// Unique-buyer to unique-seller wallet ratio; neutral when the feed does
/// not expose unique counts.
pub(crate) fn buyer_seller_ratio(pool: &PoolInfo) -> f64 {
    match (pool.tx_h24.buyers, pool.tx_h24.sellers) {
        (Some(buyers), Some(sellers)) if sellers > 0 => buyers as f64 / sellers as f64,
        (Some(buyers), Some(0)) if buyers > 0 => 5.0,
        _ => NEUTRAL_WALLET_RATIO,
    }
}

fn composite_score(pool: &PoolInfo, bp: f64, wallet_ratio: f64, age_hours: f64) -> f64 {
    // buy pressure, up to 20: maxes out at 3.5:1
    let bp_pts = ((bp - MIN_BUY_PRESSURE) / 2.2).clamp(0.0, 1.0) * 20.0;

    // distinct-wallet ratio, up to 20: maxes out at 2.5:1
    let wallet_pts = ((wallet_ratio - MIN_WALLET_RATIO) / 1.3).clamp(0.0, 1.0) * 20.0;

    // short/long volume growth, up to 20: the last hour against the 6h rate
    let growth = if pool.volume_h6 > 0.0 {
        pool.volume_h1 / (pool.volume_h6 / 6.0)
    } else {
        1.0
    };
    let growth_pts = ((growth - 1.0) / 3.0).clamp(0.0, 1.0) * 20.0;

    // organic activity, up to 15: many distinct buyers per buy transaction
    // reads as real wallets instead of a few bots looping
    let organic = match (pool.tx_h24.buyers, pool.tx_h24.buys) {
        (Some(buyers), buys) if buys > 0 => buyers as f64 / buys as f64,
        _ => 0.5,
    };
    let organic_pts = ((organic - 0.3) / 0.6).clamp(0.0, 1.0) * 15.0;

    // liquidity growth per hour of life, up to 15
    let liq_per_hour = pool.reserve_usd / age_hours.max(1.0);
    let liq_pts = (liq_per_hour / 5_000.0).clamp(0.0, 1.0) * 15.0;

    // age sweet spot 6-48h, up to 10: old enough to have survived the
    // snipers, young enough to still be early
    let age_pts = if (6.0..=48.0).contains(&age_hours) {
        10.0
    } else if age_hours < 6.0 {
        (age_hours - MIN_AGE_HOURS) / 5.0 * 10.0
    } else {
        ((MAX_AGE_HOURS - age_hours) / 24.0).clamp(0.0, 1.0) * 10.0
    };

    (bp_pts + wallet_pts + growth_pts + organic_pts + liq_pts + age_pts).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::TxWindow;

    pub(crate) fn new_pool() -> PoolInfo {
        PoolInfo {
            pool_address: "0xnewpool".to_string(),
            network: "base".to_string(),
            token_address: "0xfresh".to_string(),
            symbol: "FRESH".to_string(),
            created_at: Some(Utc::now() - chrono::Duration::hours(12)),
            price_usd: 0.002,
            reserve_usd: 60_000.0,
            fdv_usd: None,
            market_cap_usd: None,
            tx_m5: TxWindow::default(),
            tx_h1: TxWindow {
                buys: 60,
                sells: 25,
                buyers: Some(45),
                sellers: Some(20),
            },
            tx_h6: TxWindow::default(),
            tx_h24: TxWindow {
                buys: 300,
                sells: 120,
                buyers: Some(210),
                sellers: Some(100),
            },
            volume_m5: 1_500.0,
            volume_h1: 25_000.0,
            volume_h6: 60_000.0,
            volume_h24: 90_000.0,
            price_change_m5: 1.0,
            price_change_h1: 6.0,
            price_change_h6: 20.0,
            price_change_h24: 60.0,
        }
    }

    #[test]
    fn test_organic_new_pool_emits_signal() {
        let detector = EarlyDetector::new(50.0);
        let signals = detector.scan(&[new_pool()], Utc::now());
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert!(s.score >= 50.0, "score = {}", s.score);
        assert!((s.buy_pressure - 2.5).abs() < 1e-9);
        assert!((s.buyer_seller_ratio - 2.1).abs() < 1e-9);
    }

    #[test]
    fn test_age_window_filters() {
        let detector = EarlyDetector::new(0.0);
        let now = Utc::now();

        let mut too_young = new_pool();
        too_young.created_at = Some(now - chrono::Duration::minutes(30));
        assert!(detector.scan(&[too_young], now).is_empty());

        let mut too_old = new_pool();
        too_old.created_at = Some(now - chrono::Duration::hours(100));
        assert!(detector.scan(&[too_old], now).is_empty());

        let mut unknown_age = new_pool();
        unknown_age.created_at = None;
        assert!(detector.scan(&[unknown_age], now).is_empty());
    }

    #[test]
    fn test_liquidity_and_volume_filters() {
        let detector = EarlyDetector::new(0.0);
        let now = Utc::now();

        let mut dust = new_pool();
        dust.reserve_usd = 2_000.0;
        assert!(detector.scan(&[dust], now).is_empty());

        let mut whale_pool = new_pool();
        whale_pool.reserve_usd = 3_000_000.0;
        assert!(detector.scan(&[whale_pool], now).is_empty());

        let mut quiet = new_pool();
        quiet.volume_h24 = 1_000.0;
        assert!(detector.scan(&[quiet], now).is_empty());
    }

    #[test]
    fn test_wallet_ratio_filter_and_neutral_fallback() {
        let detector = EarlyDetector::new(0.0);
        let now = Utc::now();

        // mostly the same wallets selling back: ratio below 1.2
        let mut churn = new_pool();
        churn.tx_h24.buyers = Some(100);
        churn.tx_h24.sellers = Some(95);
        assert!(detector.scan(&[churn], now).is_empty());

        // no unique counts from the feed: neutral 1.2 passes the filter
        let mut opaque = new_pool();
        opaque.tx_h24.buyers = None;
        opaque.tx_h24.sellers = None;
        let signals = detector.scan(&[opaque], now);
        assert_eq!(signals.len(), 1);
        assert!((signals[0].buyer_seller_ratio - NEUTRAL_WALLET_RATIO).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_pump_is_rejected() {
        let detector = EarlyDetector::new(0.0);
        let mut pumped = new_pool();
        pumped.price_change_h24 = 400.0;
        assert!(detector.scan(&[pumped], Utc::now()).is_empty());
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(EarlyTier::from_score(80.0), EarlyTier::HighPotential);
        assert_eq!(EarlyTier::from_score(75.0), EarlyTier::HighPotential);
        assert_eq!(EarlyTier::from_score(65.0), EarlyTier::ModeratePotential);
        assert_eq!(EarlyTier::from_score(59.9), EarlyTier::Speculative);
    }

    #[test]
    fn test_sweet_spot_age_scores_best() {
        let detector = EarlyDetector::new(0.0);
        let now = Utc::now();

        let mut sweet = new_pool();
        sweet.created_at = Some(now - chrono::Duration::hours(24));
        let mut late = new_pool();
        late.created_at = Some(now - chrono::Duration::hours(70));

        let sweet_score = detector.scan(&[sweet], now)[0].score;
        let late_score = detector.scan(&[late], now)[0].score;
        assert!(sweet_score > late_score);
    }
}
