//! Stress event model
//!
//! Rare adverse events rolled once per order: rug pulls, flash crashes,
//! exploits, whale dumps and oracle failures. A drawn event degrades the
//! quote (liquidity and price) before any other friction model runs.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::Layer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressKind {
    RugPull,
    FlashCrash,
    Exploit,
    WhaleDump,
    OracleFailure,
}

impl StressKind {
    pub const ALL: [StressKind; 5] = [
        StressKind::RugPull,
        StressKind::FlashCrash,
        StressKind::Exploit,
        StressKind::WhaleDump,
        StressKind::OracleFailure,
    ];

    /// Per-cycle base probability of this event kind.
    pub fn base_probability(&self) -> f64 {
        match self {
            StressKind::RugPull => 0.003,
            StressKind::FlashCrash => 0.008,
            StressKind::Exploit => 0.001,
            StressKind::WhaleDump => 0.020,
            StressKind::OracleFailure => 0.002,
        }
    }

    /// Severity range drawn when the event fires.
    pub fn severity_range(&self) -> (f64, f64) {
        match self {
            StressKind::RugPull => (0.6, 1.0),
            StressKind::FlashCrash => (0.3, 0.8),
            StressKind::Exploit => (0.8, 1.0),
            StressKind::WhaleDump => (0.2, 0.6),
            StressKind::OracleFailure => (0.4, 0.7),
        }
    }

    /// Deterministic (liquidity_impact, price_impact) fractions for a given
    /// severity. Price impact is the fraction the price falls by.
    pub fn impacts(&self, severity: f64) -> (f64, f64) {
        match self {
            StressKind::RugPull => (severity * 0.90, severity),
            StressKind::FlashCrash => (severity * 0.30, severity * 0.50),
            StressKind::Exploit => (severity * 0.70, severity * 0.80),
            StressKind::WhaleDump => (severity * 0.10, severity * 0.40),
            StressKind::OracleFailure => (0.0, severity * 0.30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StressKind::RugPull => "rug_pull",
            StressKind::FlashCrash => "flash_crash",
            StressKind::Exploit => "exploit",
            StressKind::WhaleDump => "whale_dump",
            StressKind::OracleFailure => "oracle_failure",
        }
    }
}

/// Inputs that scale the base probabilities for one order.
#[derive(Debug, Clone)]
pub struct StressContext {
    pub pool_liquidity_usd: f64,
    pub pair_age_hours: f64,
    pub layer: Layer,
}

/// A drawn stress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressEvent {
    pub kind: StressKind,
    pub severity: f64,
    /// Fraction of pool liquidity removed
    pub liquidity_impact: f64,
    /// Fraction the price drops by
    pub price_impact: f64,
}

/// Thin pools are far more likely to blow up.
fn liquidity_multiplier(liquidity_usd: f64) -> f64 {
    if liquidity_usd < 50_000.0 {
        2.0
    } else if liquidity_usd < 250_000.0 {
        1.5
    } else if liquidity_usd < 1_000_000.0 {
        1.0
    } else {
        0.6
    }
}

/// Young pairs carry most of the rug risk.
fn age_multiplier(pair_age_hours: f64) -> f64 {
    if pair_age_hours < 24.0 {
        2.0
    } else if pair_age_hours < 72.0 {
        1.5
    } else if pair_age_hours < 24.0 * 7.0 {
        1.2
    } else {
        1.0
    }
}

fn layer_multiplier(layer: Layer) -> f64 {
    match layer {
        Layer::Core => 1.0,
        Layer::Satellite => 1.8,
    }
}

/// Roll for at most one stress event. Kinds are tried in a fixed order and
/// the first hit wins, which keeps the per-order event distribution stable.
pub fn roll_stress_event<R: Rng + ?Sized>(ctx: &StressContext, rng: &mut R) -> Option<StressEvent> {
    let scale = liquidity_multiplier(ctx.pool_liquidity_usd)
        * age_multiplier(ctx.pair_age_hours)
        * layer_multiplier(ctx.layer);

    for kind in StressKind::ALL {
        let p = (kind.base_probability() * scale).min(0.25);
        if rng.gen::<f64>() < p {
            let (lo, hi) = kind.severity_range();
            let severity = rng.gen_range(lo..=hi);
            let (liquidity_impact, price_impact) = kind.impacts(severity);
            return Some(StressEvent {
                kind,
                severity,
                liquidity_impact,
                price_impact,
            });
        }
    }

    None
}
