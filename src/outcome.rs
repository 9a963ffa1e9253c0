//! Signal outcome tracking
//!
//! Every evaluated signal gets an outcome record whether it executed or
//! not; forward prices at 1h/6h/24h/48h/7d are filled in as the windows
//! elapse. Windows are write-once - a filled price is never overwritten -
//! and a record is fully tracked exactly when all five are filled. The
//! summaries feed the calibrator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::confluence::ConfluenceDecision;
use crate::error::Result;
use crate::market::PairLookup;
use crate::storage::Storage;
use crate::types::{
    Layer, MarketRegime, SignalOutcome, SignalSource, OUTCOME_WINDOWS_HOURS,
};

pub struct OutcomeTracker {
    pairs: Arc<dyn PairLookup>,
    storage: Arc<dyn Storage>,
}

impl OutcomeTracker {
    pub fn new(pairs: Arc<dyn PairLookup>, storage: Arc<dyn Storage>) -> Self {
        Self { pairs, storage }
    }

    /// Record an evaluated signal at emission time.
    pub async fn record(
        &self,
        decision: &ConfluenceDecision,
        regime: MarketRegime,
        was_executed: bool,
        reject_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let outcome = SignalOutcome {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: decision.order.user_id.clone(),
            token_address: decision.order.token_address.clone(),
            network: decision.order.network.clone(),
            layer: decision.layer,
            confidence: decision.confidence,
            regime,
            entry_price: decision.entry_price,
            was_executed,
            reject_reason,
            reasons: decision.reasons.clone(),
            price_1h: None,
            price_6h: None,
            price_24h: None,
            price_48h: None,
            price_7d: None,
            pnl_pct_1h: None,
            pnl_pct_6h: None,
            pnl_pct_24h: None,
            pnl_pct_48h: None,
            pnl_pct_7d: None,
            checks_done: 0,
            fully_tracked: false,
            signal_source: decision.order.signal_source,
            emitted_at: now,
            metadata: serde_json::json!({
                "sources": decision.sources,
                "wallet_confluence": decision.wallet_confluence.as_ref().map(|c| c.count),
            }),
        };
        self.storage.insert_outcome(&outcome).await
    }

    /// Revisit under-tracked records: one price fetch per token, then fill
    /// every elapsed empty window in a single update.
    pub async fn update_pending(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let pending = self.storage.pending_outcomes(user_id).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        // fetch each token's price at most once per pass
        let mut prices: HashMap<String, Option<f64>> = HashMap::new();
        let mut updated = 0;

        for mut outcome in pending {
            let due: Vec<i64> = OUTCOME_WINDOWS_HOURS
                .iter()
                .copied()
                .filter(|hours| {
                    outcome.window_price(*hours).is_none()
                        && now - outcome.emitted_at >= Duration::hours(*hours)
                })
                .collect();
            if due.is_empty() {
                continue;
            }

            let key = format!("{}:{}", outcome.network, outcome.token_address);
            let price = match prices.get(&key) {
                Some(cached) => *cached,
                None => {
                    let fetched = match self
                        .pairs
                        .best_pair(&outcome.network, &outcome.token_address)
                        .await
                    {
                        Ok(Some(pair)) if pair.price_usd > 0.0 => Some(pair.price_usd),
                        Ok(_) => None,
                        Err(e) => {
                            warn!(error = %e, token = %outcome.token_address, "outcome price fetch failed");
                            None
                        }
                    };
                    prices.insert(key, fetched);
                    fetched
                }
            };

            let price = match price {
                Some(p) => p,
                None => continue,
            };

            let pnl_pct = if outcome.entry_price > 0.0 {
                (price - outcome.entry_price) / outcome.entry_price * 100.0
            } else {
                0.0
            };

            for hours in due {
                outcome.set_window(hours, price, pnl_pct);
            }
            outcome.checks_done += 1;
            outcome.fully_tracked = outcome.all_windows_filled();

            if let Err(e) = self.storage.update_outcome(&outcome).await {
                warn!(error = %e, outcome = %outcome.id, "outcome update failed");
                continue;
            }
            debug!(
                outcome = %outcome.id,
                fully_tracked = outcome.fully_tracked,
                "outcome windows updated"
            );
            updated += 1;
        }

        Ok(updated)
    }

    /// Aggregate hit rates and pnl per window over the most recent records.
    pub async fn validation_summary(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<ValidationSummary> {
        let recent = self.storage.recent_outcomes(user_id, limit).await?;
        Ok(summarize(&recent))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowStats {
    pub tracked: usize,
    /// Fraction of tracked records with positive pnl in this window
    pub hit_rate: f64,
    pub avg_pnl_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub executed: usize,
    pub fully_tracked: usize,
    /// Keyed by window hours: 1, 6, 24, 48, 168
    pub windows: HashMap<i64, WindowStats>,
    pub by_layer: HashMap<String, WindowStats>,
    pub by_regime: HashMap<String, WindowStats>,
    pub by_source: HashMap<String, WindowStats>,
    pub recent_ids: Vec<String>,
}

fn stats<'a, I>(outcomes: I, window_hours: i64) -> WindowStats
where
    I: Iterator<Item = &'a SignalOutcome>,
{
    let mut tracked = 0usize;
    let mut hits = 0usize;
    let mut pnl_sum = 0.0;

    for outcome in outcomes {
        let pnl = match window_hours {
            1 => outcome.pnl_pct_1h,
            6 => outcome.pnl_pct_6h,
            24 => outcome.pnl_pct_24h,
            48 => outcome.pnl_pct_48h,
            168 => outcome.pnl_pct_7d,
            _ => None,
        };
        if let Some(p) = pnl {
            tracked += 1;
            pnl_sum += p;
            if p > 0.0 {
                hits += 1;
            }
        }
    }

    WindowStats {
        tracked,
        hit_rate: if tracked > 0 {
            hits as f64 / tracked as f64
        } else {
            0.0
        },
        avg_pnl_pct: if tracked > 0 {
            pnl_sum / tracked as f64
        } else {
            0.0
        },
    }
}

/// Build the validation summary over a slice of outcomes; the 24h window
/// drives the per-layer/per-regime/per-source breakdowns.
pub fn summarize(outcomes: &[SignalOutcome]) -> ValidationSummary {
    let mut summary = ValidationSummary {
        total: outcomes.len(),
        executed: outcomes.iter().filter(|o| o.was_executed).count(),
        fully_tracked: outcomes.iter().filter(|o| o.fully_tracked).count(),
        ..Default::default()
    };

    for hours in OUTCOME_WINDOWS_HOURS {
        summary.windows.insert(hours, stats(outcomes.iter(), hours));
    }

    for layer in [Layer::Core, Layer::Satellite] {
        summary.by_layer.insert(
            layer.as_str().to_string(),
            stats(outcomes.iter().filter(|o| o.layer == layer), 24),
        );
    }
    for regime in [MarketRegime::RiskOn, MarketRegime::RiskOff, MarketRegime::Neutral] {
        summary.by_regime.insert(
            regime.as_str().to_string(),
            stats(outcomes.iter().filter(|o| o.regime == regime), 24),
        );
    }
    for source in [SignalSource::Momentum, SignalSource::Early] {
        summary.by_source.insert(
            source.as_str().to_string(),
            stats(outcomes.iter().filter(|o| o.signal_source == source), 24),
        );
    }

    summary.recent_ids = outcomes.iter().take(20).map(|o| o.id.clone()).collect();
    summary
}
