//! Incremental calibrator
//!
//! Runs at the start of every cycle. Reads the last batch of outcomes with
//! a known 24h pnl and nudges the detector thresholds and confluence
//! floors towards the per-layer hit-rate targets, one bounded step at a
//! time. Exposure between the two detectors is rebalanced when one is
//! hogging the book without earning it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::perf::profit_factor;
use crate::storage::Storage;
use crate::types::{CalibrationState, DetectorInteraction, Layer, SignalOutcome, SignalSource};

/// Hit-rate targets per layer at the 24h window.
pub const CORE_TARGET_HIT_RATE: f64 = 0.55;
pub const SATELLITE_TARGET_HIT_RATE: f64 = 0.40;

/// Outcomes pulled per calibration pass.
const OUTCOME_BATCH: usize = 200;
/// Minimum per-layer sample before thresholds move.
const MIN_LAYER_OUTCOMES: usize = 10;
/// Lower the thresholds when the hit rate beats target by this much.
const OVERSHOOT_MARGIN: f64 = 0.15;

/// Threshold bounds.
const MOMENTUM_BOUNDS: (f64, f64) = (40.0, 80.0);
const EARLY_BOUNDS: (f64, f64) = (35.0, 70.0);
const CORE_CONF_BOUNDS: (f64, f64) = (60.0, 90.0);
const SATELLITE_CONF_BOUNDS: (f64, f64) = (35.0, 70.0);

/// Exposure share above which the dominant detector gets rebalanced.
const EXPOSURE_CEILING: f64 = 0.70;

/// Observed statistics for one slice of outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SliceStats {
    pub count: usize,
    pub hit_rate: f64,
    pub avg_pnl_pct: f64,
    pub profit_factor: f64,
}

fn slice_stats<'a, I>(outcomes: I) -> SliceStats
where
    I: Iterator<Item = &'a SignalOutcome>,
{
    let mut count = 0usize;
    let mut hits = 0usize;
    let mut pnl_sum = 0.0;
    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;

    for outcome in outcomes {
        let pnl = match outcome.pnl_pct_24h {
            Some(p) => p,
            None => continue,
        };
        count += 1;
        pnl_sum += pnl;
        if pnl > 0.0 {
            hits += 1;
            gross_profit += pnl;
        } else {
            gross_loss += pnl.abs();
        }
    }

    SliceStats {
        count,
        hit_rate: if count > 0 { hits as f64 / count as f64 } else { 0.0 },
        avg_pnl_pct: if count > 0 { pnl_sum / count as f64 } else { 0.0 },
        profit_factor: profit_factor(gross_profit, gross_loss),
    }
}

/// Adaptive step: base 2, one more past a 0.10 gap, two more past 0.20.
pub fn adaptive_step(gap: f64) -> f64 {
    let gap = gap.abs();
    if gap >= 0.20 {
        4.0
    } else if gap > 0.10 {
        3.0
    } else {
        2.0
    }
}

pub struct Calibrator {
    storage: Arc<dyn Storage>,
}

impl Calibrator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Run one calibration pass for a user and persist the new state.
    pub async fn run(&self, user_id: &str, now: DateTime<Utc>) -> Result<CalibrationState> {
        let state = self
            .storage
            .calibration_state(user_id)
            .await?
            .unwrap_or_else(|| CalibrationState::defaults(user_id));

        let outcomes: Vec<SignalOutcome> = self
            .storage
            .recent_outcomes(user_id, OUTCOME_BATCH)
            .await?
            .into_iter()
            .filter(|o| o.pnl_pct_24h.is_some())
            .collect();

        let new_state = calibrate(&state, &outcomes, now);

        if let Err(e) = self.storage.put_calibration_state(&new_state).await {
            warn!(error = %e, user = user_id, "calibration state write failed");
        }
        info!(
            user = user_id,
            momentum = new_state.momentum_score_threshold,
            early = new_state.early_score_threshold,
            core_conf = new_state.core_min_confidence,
            satellite_conf = new_state.satellite_min_confidence,
            samples = outcomes.len(),
            "calibration pass complete"
        );
        Ok(new_state)
    }
}

/// Pure calibration step, exposed for tests.
pub fn calibrate(
    state: &CalibrationState,
    outcomes: &[SignalOutcome],
    now: DateTime<Utc>,
) -> CalibrationState {
    let core = slice_stats(outcomes.iter().filter(|o| o.layer == Layer::Core));
    let satellite = slice_stats(outcomes.iter().filter(|o| o.layer == Layer::Satellite));
    let momentum = slice_stats(
        outcomes
            .iter()
            .filter(|o| o.signal_source == SignalSource::Momentum),
    );
    let early = slice_stats(
        outcomes
            .iter()
            .filter(|o| o.signal_source == SignalSource::Early),
    );

    let total = outcomes.len();
    let momentum_exposure = if total > 0 {
        momentum.count as f64 / total as f64
    } else {
        0.0
    };

    let mut next = state.clone();
    next.hit_rate_core = core.hit_rate;
    next.hit_rate_satellite = satellite.hit_rate;
    next.profit_factor_core = core.profit_factor;
    next.profit_factor_satellite = satellite.profit_factor;
    next.momentum_exposure = momentum_exposure;
    next.detector_interaction =
        interaction_summary(outcomes, momentum_exposure, &momentum, &early);
    next.last_calibrated_at = Some(now);

    // core layer against its target
    if core.count >= MIN_LAYER_OUTCOMES {
        let gap = CORE_TARGET_HIT_RATE - core.hit_rate;
        if core.hit_rate < CORE_TARGET_HIT_RATE {
            let step = adaptive_step(gap);
            debug!(gap, step, "tightening core thresholds");
            next.momentum_score_threshold += step;
            next.core_min_confidence += step;
        } else if core.hit_rate > CORE_TARGET_HIT_RATE + OVERSHOOT_MARGIN {
            let step = adaptive_step(gap);
            debug!(gap, step, "loosening core thresholds");
            next.momentum_score_threshold -= step;
            next.core_min_confidence -= step;
        }
    }

    // satellite layer against its target
    if satellite.count >= MIN_LAYER_OUTCOMES {
        let gap = SATELLITE_TARGET_HIT_RATE - satellite.hit_rate;
        if satellite.hit_rate < SATELLITE_TARGET_HIT_RATE {
            let step = adaptive_step(gap);
            next.early_score_threshold += step;
            next.satellite_min_confidence += step;
        } else if satellite.hit_rate > SATELLITE_TARGET_HIT_RATE + OVERSHOOT_MARGIN {
            let step = adaptive_step(gap);
            next.early_score_threshold -= step;
            next.satellite_min_confidence -= step;
        }
    }

    // exposure rebalance: an overweight detector being outperformed gives
    // a point back to the other side
    if momentum_exposure > EXPOSURE_CEILING && early.profit_factor > momentum.profit_factor {
        next.momentum_score_threshold += 1.0;
        next.early_score_threshold -= 1.0;
    } else if (1.0 - momentum_exposure) > EXPOSURE_CEILING
        && momentum.profit_factor > early.profit_factor
    {
        next.early_score_threshold += 1.0;
        next.momentum_score_threshold -= 1.0;
    }

    // bias bonus: a dominant detector with a real edge earns a slightly
    // lower confidence floor on its layer
    if next.detector_interaction.bias == "recommended" {
        match next.detector_interaction.dominant {
            SignalSource::Momentum if momentum.profit_factor > 1.5 => {
                next.core_min_confidence -= 1.0;
            }
            SignalSource::Early if early.profit_factor > 1.5 => {
                next.satellite_min_confidence -= 1.0;
            }
            _ => {}
        }
    }

    // bounds hold regardless of how the adjustments stacked
    next.momentum_score_threshold = next
        .momentum_score_threshold
        .clamp(MOMENTUM_BOUNDS.0, MOMENTUM_BOUNDS.1);
    next.early_score_threshold = next
        .early_score_threshold
        .clamp(EARLY_BOUNDS.0, EARLY_BOUNDS.1);
    next.core_min_confidence = next
        .core_min_confidence
        .clamp(CORE_CONF_BOUNDS.0, CORE_CONF_BOUNDS.1);
    next.satellite_min_confidence = next
        .satellite_min_confidence
        .clamp(SATELLITE_CONF_BOUNDS.0, SATELLITE_CONF_BOUNDS.1);

    next
}

fn interaction_summary(
    outcomes: &[SignalOutcome],
    momentum_exposure: f64,
    momentum: &SliceStats,
    early: &SliceStats,
) -> DetectorInteraction {
    let momentum_tokens: HashSet<&str> = outcomes
        .iter()
        .filter(|o| o.signal_source == SignalSource::Momentum)
        .map(|o| o.token_address.as_str())
        .collect();
    let early_tokens: HashSet<&str> = outcomes
        .iter()
        .filter(|o| o.signal_source == SignalSource::Early)
        .map(|o| o.token_address.as_str())
        .collect();

    let distinct: HashSet<&str> = momentum_tokens.union(&early_tokens).copied().collect();
    let overlap = momentum_tokens.intersection(&early_tokens).count();
    let overlap_pct = if distinct.is_empty() {
        0.0
    } else {
        overlap as f64 / distinct.len() as f64 * 100.0
    };

    let (dominant, dominant_stats, target) = if momentum_exposure >= 0.5 {
        (SignalSource::Momentum, momentum, CORE_TARGET_HIT_RATE)
    } else {
        (SignalSource::Early, early, SATELLITE_TARGET_HIT_RATE)
    };

    let bias = if dominant_stats.profit_factor >= 1.2 && dominant_stats.hit_rate >= target {
        "recommended".to_string()
    } else {
        "neutral".to_string()
    };

    DetectorInteraction {
        dominant,
        token_overlap_pct: overlap_pct,
        bias,
    }
}
