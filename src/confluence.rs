//! Confluence engine
//!
//! Folds independent evidence - detector score, smart-money wallet
//! confluence, token health, market regime - into a single 0-100 confidence
//! and routes the result to the core or satellite risk layer. Separate
//! pipelines for momentum and early signals because the weights differ.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfluenceConfig;
use crate::detector::{EarlySignal, MomentumSignal};
use crate::health::{RiskFlag, TokenHealth};
use crate::storage::Storage;
use crate::types::{Layer, MarketRegime, PaperOrder, SignalSource, TradeSide};

/// Smart-money buying agreement on a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfluence {
    pub count: usize,
    pub avg_score: f64,
    pub total_usd: f64,
    pub wallet_ids: Vec<String>,
}

/// A routed decision ready for the risk gate.
#[derive(Debug, Clone)]
pub struct ConfluenceDecision {
    pub order: PaperOrder,
    pub confidence: f64,
    pub layer: Layer,
    pub reasons: Vec<String>,
    pub sources: Vec<&'static str>,
    pub wallet_confluence: Option<WalletConfluence>,
    /// Best-known entry price for outcome tracking
    pub entry_price: f64,
    pub liquidity_usd: f64,
}

pub struct ConfluenceEngine {
    storage: Arc<dyn Storage>,
    config: ConfluenceConfig,
    core_min_confidence: f64,
    satellite_min_confidence: f64,
}

impl ConfluenceEngine {
    pub fn new(storage: Arc<dyn Storage>, config: ConfluenceConfig) -> Self {
        let core = config.core_min_confidence;
        let satellite = config.satellite_min_confidence;
        Self {
            storage,
            config,
            core_min_confidence: core,
            satellite_min_confidence: satellite,
        }
    }

    /// Calibrator override applied at the start of every cycle.
    pub fn set_thresholds(&mut self, core_min: f64, satellite_min: f64) {
        self.core_min_confidence = core_min;
        self.satellite_min_confidence = satellite_min;
    }

    /// Count smart-money wallets buying this token in the lookback window.
    /// Only wallets whose latest score clears the floor count; fewer than
    /// the minimum means no confluence at all.
    pub async fn wallet_confluence(
        &self,
        token_address: &str,
        network: &str,
        now: DateTime<Utc>,
    ) -> Option<WalletConfluence> {
        let since = now - Duration::hours(self.config.window_hours);
        let movements = match self
            .storage
            .buy_movements_since(token_address, network, since)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, token = token_address, "movement query failed");
                return None;
            }
        };

        let mut wallet_ids: Vec<String> = Vec::new();
        let mut scores: Vec<f64> = Vec::new();
        let mut total_usd = 0.0;

        for movement in &movements {
            if wallet_ids.contains(&movement.wallet_id) {
                total_usd += movement.amount_usd;
                continue;
            }
            let score = match self.storage.latest_wallet_score(&movement.wallet_id).await {
                Ok(Some(s)) => s.score,
                _ => continue,
            };
            if score < self.config.min_wallet_score {
                continue;
            }
            wallet_ids.push(movement.wallet_id.clone());
            scores.push(score);
            total_usd += movement.amount_usd;
        }

        if wallet_ids.len() < self.config.min_wallets {
            return None;
        }

        Some(WalletConfluence {
            count: wallet_ids.len(),
            avg_score: scores.iter().sum::<f64>() / scores.len() as f64,
            total_usd,
            wallet_ids,
        })
    }

    /// Evaluate a momentum signal into a routed decision.
    pub async fn evaluate(
        &self,
        user_id: &str,
        signal: &MomentumSignal,
        health: &TokenHealth,
        regime: MarketRegime,
        now: DateTime<Utc>,
    ) -> Option<ConfluenceDecision> {
        let mut reasons = Vec::new();
        let mut sources = vec!["momentum_detector"];

        // detector, up to 40
        let detector_pts = (signal.score * 0.5).min(40.0);
        reasons.push(format!("momentum score {:.0} ({:?})", signal.score, signal.tier));

        // wallet confluence, up to 25
        let confluence = self
            .wallet_confluence(&signal.token_address, &signal.network, now)
            .await;
        let wallet_pts = match &confluence {
            Some(c) => {
                sources.push("wallet_confluence");
                reasons.push(format!(
                    "{} smart wallets buying (avg score {:.0})",
                    c.count, c.avg_score
                ));
                (c.count as f64 * 4.5).min(25.0)
            }
            None => 0.0,
        };

        // health, +/-20, minus 5 per risk flag
        let health_pts = momentum_health_points(health);
        sources.push("health");
        reasons.push(format!(
            "health {:.0} with {} flags",
            health.score,
            health.flags.len()
        ));

        // regime, +15/+5/-8
        let regime_pts = match regime {
            MarketRegime::RiskOn => 15.0,
            MarketRegime::Neutral => 5.0,
            MarketRegime::RiskOff => -8.0,
        };
        sources.push("regime");
        reasons.push(format!("regime {}", regime));

        let confidence = (detector_pts + wallet_pts + health_pts + regime_pts)
            .clamp(0.0, 100.0)
            .round();

        if confidence < self.satellite_min_confidence {
            debug!(
                token = %signal.token_address,
                confidence,
                floor = self.satellite_min_confidence,
                "momentum signal below confidence floor"
            );
            return None;
        }

        let layer = if confidence >= self.core_min_confidence {
            Layer::Core
        } else {
            Layer::Satellite
        };

        Some(self.decision(
            user_id,
            signal.symbol.clone(),
            signal.token_address.clone(),
            signal.network.clone(),
            SignalSource::Momentum,
            confidence,
            layer,
            reasons,
            sources,
            confluence,
            signal.price_usd,
            signal.liquidity_usd,
        ))
    }

    /// Evaluate an early signal. Stricter health handling: critical flags
    /// reject outright and low health is a hard floor, but wallet agreement
    /// is worth more than it is for momentum.
    pub async fn evaluate_early(
        &self,
        user_id: &str,
        signal: &EarlySignal,
        health: &TokenHealth,
        regime: MarketRegime,
        now: DateTime<Utc>,
    ) -> Option<ConfluenceDecision> {
        if health.has_flag(RiskFlag::NoSells24h) || health.has_flag(RiskFlag::ZeroPrice) {
            debug!(token = %signal.token_address, "early signal rejected on critical flag");
            return None;
        }
        if health.score < 40.0 {
            debug!(
                token = %signal.token_address,
                health = health.score,
                "early signal below health floor"
            );
            return None;
        }

        let mut reasons = Vec::new();
        let mut sources = vec!["early_detector"];

        // detector, up to 35
        let detector_pts = (signal.score * 0.4).min(35.0);
        reasons.push(format!("early score {:.0} ({:?})", signal.score, signal.tier));

        // wallet confluence, up to 30 with a 1.5x boost: smart money moving
        // this early is the strongest evidence there is
        let confluence = self
            .wallet_confluence(&signal.token_address, &signal.network, now)
            .await;
        let wallet_pts = match &confluence {
            Some(c) => {
                sources.push("wallet_confluence");
                reasons.push(format!(
                    "{} smart wallets in early (avg score {:.0})",
                    c.count, c.avg_score
                ));
                ((c.count as f64 * 4.5).min(25.0) * 1.5).min(30.0)
            }
            None => 0.0,
        };

        // health, up to 15
        let health_pts = (health.score * 0.15).min(15.0);
        sources.push("health");
        reasons.push(format!("health {:.0}", health.score));

        // organic buy ratio, up to 10
        let organic_pts =
            ((signal.buyer_seller_ratio - 1.2) / 0.8).clamp(0.0, 1.0) * 10.0;
        if organic_pts > 0.0 {
            reasons.push(format!(
                "buyer/seller wallet ratio {:.2}",
                signal.buyer_seller_ratio
            ));
        }

        // regime, +10/+3/-4
        let regime_pts = match regime {
            MarketRegime::RiskOn => 10.0,
            MarketRegime::Neutral => 3.0,
            MarketRegime::RiskOff => -4.0,
        };
        sources.push("regime");
        reasons.push(format!("regime {}", regime));

        let confidence = (detector_pts + wallet_pts + health_pts + organic_pts + regime_pts)
            .clamp(0.0, 100.0)
            .round();

        if confidence < self.satellite_min_confidence {
            return None;
        }

        // early promotes to core only with wallet agreement behind it
        let layer = if confidence >= self.config.early_core_promotion_confidence
            && confluence.is_some()
        {
            Layer::Core
        } else {
            Layer::Satellite
        };

        Some(self.decision(
            user_id,
            signal.symbol.clone(),
            signal.token_address.clone(),
            signal.network.clone(),
            SignalSource::Early,
            confidence,
            layer,
            reasons,
            sources,
            confluence,
            signal.price_usd,
            signal.liquidity_usd,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn decision(
        &self,
        user_id: &str,
        symbol: String,
        token_address: String,
        network: String,
        source: SignalSource,
        confidence: f64,
        layer: Layer,
        reasons: Vec<String>,
        sources: Vec<&'static str>,
        wallet_confluence: Option<WalletConfluence>,
        entry_price: f64,
        liquidity_usd: f64,
    ) -> ConfluenceDecision {
        let order = PaperOrder {
            user_id: user_id.to_string(),
            symbol,
            token_address,
            network,
            side: TradeSide::Buy,
            layer,
            confidence,
            signal_source: source,
            entry_reason: reasons.join("; "),
        };
        ConfluenceDecision {
            order,
            confidence,
            layer,
            reasons,
            sources,
            wallet_confluence,
            entry_price,
            liquidity_usd,
        }
    }
}

/// Health contribution for the momentum pipeline: +/-20 band around a
/// 50-point pivot, minus 5 per risk flag, floored at -20.
fn momentum_health_points(health: &TokenHealth) -> f64 {
    let base = if health.score >= 50.0 {
        (health.score * 0.25).min(20.0)
    } else {
        -(50.0 - health.score) * 0.4
    };
    (base - 5.0 * health.flags.len() as f64).max(-20.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{EarlyTier, MomentumTier};
    use crate::storage::MemoryStore;
    use crate::types::{TradeSide, WalletMovement, WalletScore};
    use chrono::TimeZone;

    fn momentum_signal(score: f64) -> MomentumSignal {
        MomentumSignal {
            token_address: "0xtoke".to_string(),
            network: "base".to_string(),
            symbol: "TOKE".to_string(),
            pool_address: "0xpool".to_string(),
            score,
            tier: MomentumTier::Strong,
            buy_pressure: 2.0,
            volume_acceleration: 0.2,
            liquidity_usd: 400_000.0,
            volume_24h: 250_000.0,
            price_usd: 1.0,
            price_change_1h: 4.0,
            price_change_6h: 10.0,
            price_change_24h: 25.0,
            pair_age_hours: 200.0,
        }
    }

    fn early_signal(score: f64) -> EarlySignal {
        EarlySignal {
            token_address: "0xfresh".to_string(),
            network: "base".to_string(),
            symbol: "FRESH".to_string(),
            pool_address: "0xnewpool".to_string(),
            score,
            tier: EarlyTier::ModeratePotential,
            buy_pressure: 1.8,
            buyer_seller_ratio: 1.2,
            liquidity_usd: 60_000.0,
            volume_24h: 80_000.0,
            price_usd: 0.002,
            price_change_1h: 5.0,
            price_change_24h: 40.0,
            pair_age_hours: 12.0,
        }
    }

    fn health(score: f64) -> TokenHealth {
        TokenHealth {
            token_address: "0xtoke".to_string(),
            network: "base".to_string(),
            symbol: "TOKE".to_string(),
            score,
            liquidity_usd: 400_000.0,
            volume_24h: 250_000.0,
            price_usd: 1.0,
            spread_pct: 0.2,
            top10_concentration_pct: None,
            pair_age_hours: Some(200.0),
            flags: vec![],
        }
    }

    async fn seed_wallets(storage: &MemoryStore, token: &str, count: usize, now: DateTime<Utc>) {
        for i in 0..count {
            let wallet_id = format!("w{}", i);
            storage
                .put_wallet_score(&WalletScore {
                    wallet_id: wallet_id.clone(),
                    score: 80.0,
                    scored_at: now,
                })
                .await
                .unwrap();
            storage
                .insert_movement(&WalletMovement {
                    id: format!("m{}", i),
                    wallet_id,
                    token_address: token.to_string(),
                    network: "base".to_string(),
                    direction: TradeSide::Buy,
                    amount_usd: 1000.0,
                    observed_at: now - Duration::hours(1),
                    metadata: serde_json::json!({}),
                })
                .await
                .unwrap();
        }
    }

    fn engine(storage: Arc<MemoryStore>) -> ConfluenceEngine {
        ConfluenceEngine::new(storage, ConfluenceConfig::default())
    }

    #[tokio::test]
    async fn test_risk_off_momentum_routes_to_satellite() {
        // scenario: momentum 80, health 85, risk_off
        // 40 (detector) + 20 (health) - 8 (regime) = 52 -> satellite
        let storage = Arc::new(MemoryStore::new());
        let eng = engine(storage);
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();

        let decision = eng
            .evaluate("u1", &momentum_signal(80.0), &health(85.0), MarketRegime::RiskOff, now)
            .await
            .unwrap();

        assert_eq!(decision.confidence, 52.0);
        assert_eq!(decision.layer, Layer::Satellite);
    }

    #[tokio::test]
    async fn test_early_wallet_boost() {
        // scenario: early 62, 4 wallets >= 70 buying within 6h, health 55,
        // risk_on: 24.8 + 27 + 8.25 + 10 = 70 -> satellite
        let storage = Arc::new(MemoryStore::new());
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        seed_wallets(&storage, "0xfresh", 4, now).await;
        let eng = engine(storage);

        let decision = eng
            .evaluate_early("u1", &early_signal(62.0), &health(55.0), MarketRegime::RiskOn, now)
            .await
            .unwrap();

        assert_eq!(decision.confidence, 70.0);
        assert_eq!(decision.layer, Layer::Satellite);
        let confluence = decision.wallet_confluence.unwrap();
        assert_eq!(confluence.count, 4);
    }

    #[tokio::test]
    async fn test_momentum_core_routing() {
        // 40 + 20 + 15 = 75: exactly at the core threshold
        let storage = Arc::new(MemoryStore::new());
        let eng = engine(storage);
        let now = Utc::now();

        let decision = eng
            .evaluate("u1", &momentum_signal(80.0), &health(85.0), MarketRegime::RiskOn, now)
            .await
            .unwrap();

        assert_eq!(decision.confidence, 75.0);
        assert_eq!(decision.layer, Layer::Core);
    }

    #[tokio::test]
    async fn test_below_floor_is_discarded() {
        let storage = Arc::new(MemoryStore::new());
        let eng = engine(storage);
        let now = Utc::now();

        // 55*0.5=27.5 + health 55 -> 13.75 - regime 8 = 33 < 50
        let decision = eng
            .evaluate("u1", &momentum_signal(55.0), &health(55.0), MarketRegime::RiskOff, now)
            .await;
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_critical_flags_always_reject_early() {
        let storage = Arc::new(MemoryStore::new());
        let now = Utc::now();
        seed_wallets(&storage, "0xfresh", 5, now).await;
        let eng = engine(storage);

        let mut bad_health = health(90.0);
        bad_health.flags.push(RiskFlag::NoSells24h);

        let decision = eng
            .evaluate_early("u1", &early_signal(90.0), &bad_health, MarketRegime::RiskOn, now)
            .await;
        assert!(decision.is_none());

        let mut zero_price = health(90.0);
        zero_price.flags.push(RiskFlag::ZeroPrice);
        let decision = eng
            .evaluate_early("u1", &early_signal(90.0), &zero_price, MarketRegime::RiskOn, now)
            .await;
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_early_health_floor() {
        let storage = Arc::new(MemoryStore::new());
        let eng = engine(storage);
        let decision = eng
            .evaluate_early("u1", &early_signal(80.0), &health(35.0), MarketRegime::RiskOn, Utc::now())
            .await;
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_early_promotion_requires_wallets() {
        let storage = Arc::new(MemoryStore::new());
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let eng = engine(storage.clone());

        // very strong early signal without wallet confluence: 35 + 15 + 10
        // + 10 = 70 -> stays satellite even if we lower the promotion bar
        let mut strong = early_signal(95.0);
        strong.buyer_seller_ratio = 2.5;
        let decision = eng
            .evaluate_early("u1", &strong, &health(100.0), MarketRegime::RiskOn, now)
            .await
            .unwrap();
        assert_eq!(decision.layer, Layer::Satellite);

        // with 5 wallets the same signal crosses 85 and promotes
        seed_wallets(&storage, "0xfresh", 5, now).await;
        let decision = eng
            .evaluate_early("u1", &strong, &health(100.0), MarketRegime::RiskOn, now)
            .await
            .unwrap();
        assert!(decision.confidence >= 85.0);
        assert_eq!(decision.layer, Layer::Core);
    }

    #[tokio::test]
    async fn test_wallet_confluence_requires_three_scored_wallets() {
        let storage = Arc::new(MemoryStore::new());
        let now = Utc::now();
        seed_wallets(&storage, "0xtoke", 2, now).await;
        let eng = engine(storage.clone());

        assert!(eng.wallet_confluence("0xtoke", "base", now).await.is_none());

        // a third wallet buying but scored below 70 still does not count
        storage
            .put_wallet_score(&WalletScore {
                wallet_id: "weak".to_string(),
                score: 40.0,
                scored_at: now,
            })
            .await
            .unwrap();
        storage
            .insert_movement(&WalletMovement {
                id: "mweak".to_string(),
                wallet_id: "weak".to_string(),
                token_address: "0xtoke".to_string(),
                network: "base".to_string(),
                direction: TradeSide::Buy,
                amount_usd: 500.0,
                observed_at: now - Duration::minutes(30),
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();
        assert!(eng.wallet_confluence("0xtoke", "base", now).await.is_none());
    }

    #[test]
    fn test_momentum_health_points_bands() {
        assert_eq!(momentum_health_points(&health(85.0)), 20.0);
        assert_eq!(momentum_health_points(&health(60.0)), 15.0);
        // low health goes negative
        assert_eq!(momentum_health_points(&health(30.0)), -8.0);

        // flags subtract 5 each and the floor holds at -20
        let mut flagged = health(30.0);
        flagged.flags = vec![
            RiskFlag::LowLiquidity,
            RiskFlag::LowVolume,
            RiskFlag::VeryNewPair,
        ];
        assert_eq!(momentum_health_points(&flagged), -20.0);
    }
}
