//! Market regime detector
//!
//! Coarse risk_on / risk_off / neutral classification from global sentiment
//! and BTC dominance. Rising dominance means capital hiding in BTC, which
//! is hostile for long-tail DEX tokens even at mid sentiment.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market::{GlobalMarket, SentimentReading};
use crate::types::{MarketRegime, RegimeSnapshot};

/// Sentiment at or below this is risk-off regardless of dominance.
const FEAR_FLOOR: f64 = 30.0;
/// Sentiment at or above this is greed territory.
const GREED_CEILING: f64 = 65.0;
/// Dominance above this turns mid sentiment into risk-off.
const DOMINANCE_HIGH: f64 = 60.0;
/// Dominance below this turns mid sentiment into risk-on.
const DOMINANCE_LOW: f64 = 45.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: MarketRegime,
    pub sentiment_score: f64,
    pub sentiment_classification: String,
    pub btc_dominance: f64,
    pub reasons: Vec<String>,
}

impl RegimeReading {
    /// Build the append-only snapshot persisted each cycle.
    pub fn snapshot(&self, now: chrono::DateTime<chrono::Utc>) -> RegimeSnapshot {
        RegimeSnapshot {
            regime: self.regime,
            sentiment_score: self.sentiment_score,
            btc_dominance: self.btc_dominance,
            taken_at: now,
            metadata: serde_json::json!({
                "classification": self.sentiment_classification,
                "reasons": self.reasons,
            }),
        }
    }
}

pub struct RegimeDetector;

impl RegimeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify the current market state.
    pub fn classify(&self, sentiment: &SentimentReading, market: &GlobalMarket) -> RegimeReading {
        let mut reasons = Vec::new();
        let value = sentiment.value;
        let dominance = market.btc_dominance;

        let regime = if value <= FEAR_FLOOR {
            reasons.push(format!("fear/greed {} at or below {}", value, FEAR_FLOOR));
            MarketRegime::RiskOff
        } else if value >= GREED_CEILING {
            if dominance >= DOMINANCE_HIGH {
                reasons.push(format!(
                    "greed {} but BTC dominance {:.1} caps appetite",
                    value, dominance
                ));
                MarketRegime::Neutral
            } else {
                reasons.push(format!("fear/greed {} at or above {}", value, GREED_CEILING));
                MarketRegime::RiskOn
            }
        } else if dominance >= DOMINANCE_HIGH {
            reasons.push(format!("BTC dominance {:.1} above {}", dominance, DOMINANCE_HIGH));
            MarketRegime::RiskOff
        } else if dominance <= DOMINANCE_LOW {
            reasons.push(format!("BTC dominance {:.1} below {}", dominance, DOMINANCE_LOW));
            MarketRegime::RiskOn
        } else {
            reasons.push(format!(
                "sentiment {} and dominance {:.1} both mid-range",
                value, dominance
            ));
            MarketRegime::Neutral
        };

        debug!(
            regime = %regime,
            sentiment = value,
            dominance,
            "market regime classified"
        );

        RegimeReading {
            regime,
            sentiment_score: value,
            sentiment_classification: sentiment.classification.clone(),
            btc_dominance: dominance,
            reasons,
        }
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new()
    }
}
