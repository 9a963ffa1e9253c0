//! Momentum detector
//!
//! Scores trending pools for continuation. Hard filters knock out illiquid,
//! stale or already-parabolic pools; survivors get a 0-100 composite score
//! from buy pressure, volume acceleration, price shape, turnover, activity
//! and maturity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market::PoolInfo;

/// Hard filter bounds
const MIN_LIQUIDITY_USD: f64 = 50_000.0;
const MAX_LIQUIDITY_USD: f64 = 50_000_000.0;
const MIN_VOLUME_24H: f64 = 10_000.0;
const MIN_AGE_HOURS: f64 = 48.0;
const MAX_ABS_CHANGE_24H: f64 = 80.0;
const MIN_BUY_PRESSURE: f64 = 1.2;

/// Buy pressure assigned when a pool has buys but zero sells.
const NO_SELLS_BUY_PRESSURE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumTier {
    Strong,
    Moderate,
    Weak,
}

impl MomentumTier {
    fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            MomentumTier::Strong
        } else if score >= 65.0 {
            MomentumTier::Moderate
        } else {
            MomentumTier::Weak
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumSignal {
    pub token_address: String,
    pub network: String,
    pub symbol: String,
    pub pool_address: String,
    pub score: f64,
    pub tier: MomentumTier,
    pub buy_pressure: f64,
    pub volume_acceleration: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub price_usd: f64,
    pub price_change_1h: f64,
    pub price_change_6h: f64,
    pub price_change_24h: f64,
    pub pair_age_hours: f64,
}

pub struct MomentumDetector {
    min_score: f64,
}

impl MomentumDetector {
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

    /// Scan trending pools into ranked signals, best first.
    pub fn scan(&self, pools: &[PoolInfo], now: DateTime<Utc>) -> Vec<MomentumSignal> {
        let mut signals: Vec<MomentumSignal> = pools
            .iter()
            .filter_map(|pool| self.evaluate(pool, now))
            .filter(|s| s.score >= self.min_score)
            .collect();

        signals.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        debug!(
            candidates = pools.len(),
            emitted = signals.len(),
            min_score = self.min_score,
            "momentum scan complete"
        );
        signals
    }

    fn evaluate(&self, pool: &PoolInfo, now: DateTime<Utc>) -> Option<MomentumSignal> {
        let age_hours = pool.age_hours(now);

        if pool.reserve_usd < MIN_LIQUIDITY_USD || pool.reserve_usd > MAX_LIQUIDITY_USD {
            return None;
        }
        if pool.volume_h24 < MIN_VOLUME_24H {
            return None;
        }
        if age_hours < MIN_AGE_HOURS {
            return None;
        }
        if pool.price_change_h24.abs() > MAX_ABS_CHANGE_24H {
            return None;
        }

        let buy_pressure = buy_pressure(pool.tx_h24.buys, pool.tx_h24.sells);
        if buy_pressure < MIN_BUY_PRESSURE {
            return None;
        }

        let volume_acceleration =
            volume_acceleration(pool.volume_h1, pool.volume_h6, pool.volume_h24);

        let score = composite_score(pool, buy_pressure, volume_acceleration, age_hours);

        Some(MomentumSignal {
            token_address: pool.token_address.clone(),
            network: pool.network.clone(),
            symbol: pool.symbol.clone(),
            pool_address: pool.pool_address.clone(),
            score,
            tier: MomentumTier::from_score(score),
            buy_pressure,
            volume_acceleration,
            liquidity_usd: pool.reserve_usd,
            volume_24h: pool.volume_h24,
            price_usd: pool.price_usd,
            price_change_1h: pool.price_change_h1,
            price_change_6h: pool.price_change_h6,
            price_change_24h: pool.price_change_h24,
            pair_age_hours: age_hours,
        })
    }
}

pub(crate) fn buy_pressure(buys: u32, sells: u32) -> f64 {
    if sells == 0 {
        if buys == 0 {
            0.0
        } else {
            NO_SELLS_BUY_PRESSURE
        }
    } else {
        buys as f64 / sells as f64
    }
}

/// Steady volume across all three windows yields exactly this value, so
/// degenerate inputs fall back to it and scoring normalises against it.
pub(crate) const NEUTRAL_ACCELERATION: f64 = 1.0 / 6.0;

/// Recent-hour volume rate relative to the 6h rate, normalised by how the
/// 6h volume compares to the hourly 24h rate.
pub(crate) fn volume_acceleration(v1h: f64, v6h: f64, v24h: f64) -> f64 {
    if v1h <= 0.0 || v6h <= 0.0 || v24h <= 0.0 {
        return NEUTRAL_ACCELERATION;
    }
    let short = v1h / (v6h / 6.0);
    let long = v6h / (v24h / 24.0);
    if long <= 0.0 {
        return NEUTRAL_ACCELERATION;
    }
    short / long
}

fn composite_score(
    pool: &PoolInfo,
    buy_pressure: f64,
    volume_acceleration: f64,
    age_hours: f64,
) -> f64 {
    // buy pressure, up to 25: maxes out at 3:1
    let bp_pts = ((buy_pressure - MIN_BUY_PRESSURE) / 1.8).clamp(0.0, 1.0) * 25.0;

    // volume acceleration, up to 20: normalised so steady volume is 1x,
    // maxing out at 2.5x the steady rate
    let normalised_acc = volume_acceleration / NEUTRAL_ACCELERATION;
    let acc_pts = ((normalised_acc - 1.0) / 1.5).clamp(0.0, 1.0) * 20.0;

    // price shape, up to 20: gradual 1h + 6h gains, parabolic moves decay
    let shape_pts = gain_shape(pool.price_change_h1, 8.0, 0.5)
        + gain_shape(pool.price_change_h6, 20.0, 0.25);

    // turnover, up to 15: 24h volume relative to pool depth; extreme
    // turnover reads as wash trading and is cut back
    let turnover = pool.volume_h24 / pool.reserve_usd;
    let turnover_pts = if turnover > 10.0 {
        5.0
    } else {
        (turnover / 2.0).clamp(0.0, 1.0) * 15.0
    };

    // activity, up to 10
    let tx_total = (pool.tx_h24.buys + pool.tx_h24.sells) as f64;
    let tx_pts = (tx_total / 500.0).clamp(0.0, 1.0) * 10.0;

    // maturity, up to 10: from the 2-day floor towards 30 days
    let age_days = age_hours / 24.0;
    let maturity_pts = ((age_days - 2.0) / 28.0).clamp(0.0, 1.0) * 10.0;

    (bp_pts + acc_pts + shape_pts + turnover_pts + tx_pts + maturity_pts).clamp(0.0, 100.0)
}

/// Up to 10 points for a gain inside the ideal band; gains past the band
/// decay linearly because chasing a spike is late entry.
fn gain_shape(change_pct: f64, ideal_cap: f64, decay_per_pct: f64) -> f64 {
    if change_pct <= 0.0 {
        0.0
    } else if change_pct <= ideal_cap {
        change_pct / ideal_cap * 10.0
    } else {
        (10.0 - (change_pct - ideal_cap) * decay_per_pct).max(0.0)
    }
}
