//! Paper broker
//!
//! Turns an approved order into a simulated fill by composing the friction
//! models: stress events degrade the quote first, latency noise moves the
//! price, then AMM slippage, competition slippage and half the spread land
//! on top. Every raw factor ends up in the trade metadata so fills can be
//! audited after the fact.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::friction::slippage::{MAX_SLIPPAGE_PCT, MIN_SLIPPAGE_PCT};
use crate::friction::{
    competition_slippage, estimate_slippage, micro_volatility, roll_stress_event, SlippageInput,
    StressContext,
};
use crate::risk::GateDecision;
use crate::types::{PaperOrder, Quote, TradeRecord, TradeSide, TradeStatus};

/// Simulated order latency bounds, milliseconds.
const LATENCY_MIN_MS: u64 = 100;
const LATENCY_MAX_MS: u64 = 1000;

/// Per-network gas cost range in USD.
pub fn gas_range(network: &str) -> (f64, f64) {
    match network {
        "ethereum" => (3.0, 25.0),
        "bsc" => (0.10, 1.00),
        "base" => (0.01, 0.15),
        "arbitrum" => (0.05, 0.50),
        "polygon" => (0.01, 0.10),
        "solana" => (0.005, 0.05),
        _ => (0.10, 1.00),
    }
}

/// Quote source injected into the broker; production wires this to the
/// pair-lookup client, tests to a fixture.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    async fn quote(&self, network: &str, token_address: &str) -> Result<Option<Quote>>;
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub executed: bool,
    pub reason: Option<String>,
    pub trade: Option<TradeRecord>,
}

impl ExecutionResult {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            executed: false,
            reason: Some(reason.into()),
            trade: None,
        }
    }
}

pub struct PaperBroker {
    quotes: Arc<dyn QuoteFetcher>,
    rng: Mutex<StdRng>,
}

impl PaperBroker {
    /// Create a broker with an optional RNG seed; tests pin the seed for
    /// reproducible fills.
    pub fn new(quotes: Arc<dyn QuoteFetcher>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            quotes,
            rng: Mutex::new(rng),
        }
    }

    /// Execute one order through the friction pipeline.
    pub async fn execute(
        &self,
        order: &PaperOrder,
        requested_position_usd: f64,
        gate: &GateDecision,
        now: DateTime<Utc>,
    ) -> ExecutionResult {
        // 1. gate check
        if !gate.allowed {
            return ExecutionResult::rejected(
                gate.reason.clone().unwrap_or_else(|| "gate denied".to_string()),
            );
        }

        // 2. clamp to the gate's sizing
        let position_usd = requested_position_usd.min(gate.max_position_usd);
        if position_usd <= 0.0 {
            return ExecutionResult::rejected("position size clamped to zero");
        }

        // 3. fetch the quote
        let mut quote = match self.quotes.quote(&order.network, &order.token_address).await {
            Ok(Some(q)) if q.price > 0.0 => q,
            Ok(_) => {
                return ExecutionResult::rejected(format!(
                    "no usable quote for {} on {}",
                    order.token_address, order.network
                ))
            }
            Err(e) => {
                warn!(error = %e, token = %order.token_address, "quote fetch failed");
                return ExecutionResult::rejected(format!("quote fetch failed: {}", e));
            }
        };

        let mut rng = self.rng.lock().await;

        // 4. stress event degrades the quote before any friction model
        let stress = roll_stress_event(
            &StressContext {
                pool_liquidity_usd: quote.liquidity_usd,
                pair_age_hours: quote.pair_age_hours,
                layer: order.layer,
            },
            &mut *rng,
        );
        if let Some(ref event) = stress {
            info!(
                kind = event.kind.as_str(),
                severity = event.severity,
                token = %order.token_address,
                "stress event hit the fill"
            );
            quote.liquidity_usd *= 1.0 - event.liquidity_impact;
            quote.price *= 1.0 - event.price_impact;
            if quote.price <= 0.0 {
                return ExecutionResult::rejected(format!(
                    "stress event {} wiped the quote",
                    event.kind.as_str()
                ));
            }
        }

        // 5. latency draw
        let latency_ms = rng.gen_range(LATENCY_MIN_MS..=LATENCY_MAX_MS);

        // 6. micro-volatility over the latency window
        let vol = micro_volatility(
            quote.price,
            latency_ms,
            None,
            quote.price_change_1h,
            &mut *rng,
        );

        // 7. AMM slippage on the noised price
        let slippage = estimate_slippage(
            &SlippageInput::new(
                position_usd,
                quote.liquidity_usd,
                vol.adjusted_price,
                order.side,
            ),
            &mut *rng,
        );

        // 8. competition slippage and spread
        let competition = competition_slippage(
            &order.network,
            position_usd,
            quote.liquidity_usd,
            quote.volume_24h,
            &mut *rng,
        );
        let total_slippage = (slippage.slippage_pct + competition.extra_slippage_pct)
            .clamp(MIN_SLIPPAGE_PCT, MAX_SLIPPAGE_PCT);
        let half_spread = quote.spread_pct / 100.0 / 2.0;
        let entry_price = match order.side {
            TradeSide::Buy => vol.adjusted_price * (1.0 + total_slippage + half_spread),
            TradeSide::Sell => vol.adjusted_price * (1.0 - total_slippage - half_spread),
        };

        // 9. quantity and gas
        let quantity = position_usd / entry_price;
        let (gas_lo, gas_hi) = gas_range(&order.network);
        let gas = rng.gen_range(gas_lo..=gas_hi);
        drop(rng);

        // 10. the trade record, raw factors in metadata
        let trade = TradeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: order.user_id.clone(),
            symbol: order.symbol.clone(),
            token_address: order.token_address.clone(),
            network: order.network.clone(),
            side: order.side,
            status: TradeStatus::Open,
            layer: order.layer,
            quantity,
            entry_price,
            exit_price: None,
            pnl_abs: None,
            pnl_pct: None,
            is_win: None,
            fees_abs: gas,
            slippage_simulated: total_slippage,
            gas_simulated: gas,
            latency_ms,
            entry_reason: order.entry_reason.clone(),
            exit_reason: None,
            entered_at: now,
            closed_at: None,
            metadata: serde_json::json!({
                "confidence": order.confidence,
                "signal_source": order.signal_source.as_str(),
                "position_usd": position_usd,
                "quote_price": quote.price,
                "noised_price": vol.adjusted_price,
                "noise_pct": vol.noise_pct,
                "sigma_annual": vol.sigma,
                "amm_slippage_pct": slippage.slippage_pct,
                "price_impact_pct": slippage.price_impact_pct,
                "competition_slippage_pct": competition.extra_slippage_pct,
                "frontrun": competition.frontrun,
                "backrun": competition.backrun,
                "half_spread_pct": half_spread,
                "entry_liquidity_usd": quote.liquidity_usd,
                "entry_volume_24h": quote.volume_24h,
                "stress_event": stress.as_ref().map(|e| serde_json::json!({
                    "kind": e.kind.as_str(),
                    "severity": e.severity,
                    "liquidity_impact": e.liquidity_impact,
                    "price_impact": e.price_impact,
                })),
            }),
        };

        debug!(
            token = %order.token_address,
            layer = %order.layer,
            entry_price,
            quantity,
            slippage = total_slippage,
            latency_ms,
            "paper fill"
        );

        ExecutionResult {
            executed: true,
            reason: None,
            trade: Some(trade),
        }
    }
}
