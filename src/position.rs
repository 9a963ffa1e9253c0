//! Open-position lifecycle
//!
//! Walks every open paper trade against the current best pair and applies
//! the exit ladder in fixed order: trailing stop, time limit, volume fade,
//! liquidity floor, take profit. First match wins. Closing writes the full
//! exit fields; the orchestrator books the pnl into the risk state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::PositionConfig;
use crate::error::Result;
use crate::market::{PairLookup, PairSummary};
use crate::storage::Storage;
use crate::types::{Layer, TradeRecord, TradeStatus};

pub struct PositionManager {
    pairs: Arc<dyn PairLookup>,
    storage: Arc<dyn Storage>,
    config: PositionConfig,
}

impl PositionManager {
    pub fn new(
        pairs: Arc<dyn PairLookup>,
        storage: Arc<dyn Storage>,
        config: PositionConfig,
    ) -> Self {
        Self {
            pairs,
            storage,
            config,
        }
    }

    /// Evaluate all open trades for one user; returns the trades closed
    /// this pass with their exit fields already persisted.
    pub async fn check_positions(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>> {
        let open = self.storage.open_trades(user_id).await?;
        let mut closed = Vec::new();

        for mut trade in open {
            let pair = match self
                .pairs
                .best_pair(&trade.network, &trade.token_address)
                .await
            {
                Ok(Some(p)) => p,
                Ok(None) => {
                    debug!(token = %trade.token_address, "no pair for open position, holding");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, token = %trade.token_address, "pair fetch failed, holding");
                    continue;
                }
            };

            if pair.price_usd <= 0.0 {
                debug!(token = %trade.token_address, "zero price from pair, holding");
                continue;
            }

            let exit = self.evaluate_exit(&mut trade, &pair, now);

            match exit {
                Some(reason) => {
                    close_trade(&mut trade, pair.price_usd, &reason, now);
                    if let Err(e) = self.storage.update_trade(&trade).await {
                        // leave it open in memory; the next cycle re-reads
                        // the open set and retries the close
                        warn!(error = %e, trade = %trade.id, "trade close write failed");
                        continue;
                    }
                    info!(
                        trade = %trade.id,
                        token = %trade.token_address,
                        reason = %reason,
                        pnl_pct = trade.pnl_pct.unwrap_or(0.0),
                        "position closed"
                    );
                    closed.push(trade);
                }
                None => {
                    // persist the updated high-water mark
                    if let Err(e) = self.storage.update_trade(&trade).await {
                        warn!(error = %e, trade = %trade.id, "trade metadata write failed");
                    }
                }
            }
        }

        Ok(closed)
    }

    /// Apply the exit ladder; mutates the trade's high-water metadata.
    fn evaluate_exit(
        &self,
        trade: &mut TradeRecord,
        pair: &PairSummary,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let current = pair.price_usd;

        // high-water mark lives in metadata across cycles
        if !trade.metadata.is_object() {
            trade.metadata = serde_json::json!({});
        }
        let highest = trade
            .metadata
            .get("highest_price")
            .and_then(|v| v.as_f64())
            .unwrap_or(trade.entry_price)
            .max(current);
        trade.metadata["highest_price"] = serde_json::json!(highest);

        let pnl_pct = (current - trade.entry_price) / trade.entry_price * 100.0;

        // 1. trailing stop - only fires on losing positions; profitable
        //    trades are left for the take-profit rule
        let trail = match trade.layer {
            Layer::Core => self.config.core_trailing_pct,
            Layer::Satellite => self.config.satellite_trailing_pct,
        };
        if current <= highest * (1.0 - trail) && pnl_pct < 0.0 {
            return Some("trailing stop".to_string());
        }

        // 2. time limit
        let max_hold_hours = match trade.layer {
            Layer::Core => self.config.core_max_hold_hours,
            Layer::Satellite => self.config.satellite_max_hold_hours,
        };
        let age_hours = (now - trade.entered_at).num_seconds() as f64 / 3600.0;
        if age_hours >= max_hold_hours as f64 {
            return Some("time max".to_string());
        }

        // 3. volume fade while in profit
        let entry_volume = trade
            .metadata
            .get("entry_volume_24h")
            .and_then(|v| v.as_f64());
        if let Some(entry_vol) = entry_volume {
            if entry_vol > 0.0
                && pair.volume_24h / entry_vol < self.config.volume_fade_ratio
                && pnl_pct > 0.0
            {
                return Some("momentum exhausted".to_string());
            }
        }

        // 4. liquidity floor
        if pair.liquidity_usd < self.config.liquidity_floor_usd {
            return Some("liquidity too low".to_string());
        }

        // 5. take profit
        let take_profit = match trade.layer {
            Layer::Core => self.config.core_take_profit_pct,
            Layer::Satellite => self.config.satellite_take_profit_pct,
        };
        if pnl_pct >= take_profit {
            return Some("take profit".to_string());
        }

        None
    }
}

/// Write the exit fields. A closed trade always carries all of them.
fn close_trade(trade: &mut TradeRecord, exit_price: f64, reason: &str, now: DateTime<Utc>) {
    let pnl_abs = (exit_price - trade.entry_price) * trade.quantity;
    let pnl_pct = (exit_price - trade.entry_price) / trade.entry_price * 100.0;

    trade.status = TradeStatus::Closed;
    trade.exit_price = Some(exit_price);
    trade.pnl_abs = Some(pnl_abs);
    trade.pnl_pct = Some(pnl_pct);
    trade.is_win = Some(pnl_pct > 0.0);
    trade.exit_reason = Some(reason.to_string());
    trade.closed_at = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::TradeSide;
    use async_trait::async_trait;
    use chrono::Duration;

    struct FixedPair(PairSummary);

    #[async_trait]
    impl PairLookup for FixedPair {
        async fn best_pair(&self, _n: &str, _t: &str) -> Result<Option<PairSummary>> {
            Ok(Some(self.0.clone()))
        }
    }

    fn pair(price: f64, liquidity: f64, volume: f64) -> PairSummary {
        PairSummary {
            pair_address: "pp".to_string(),
            dex_id: "uniswap".to_string(),
            network: "base".to_string(),
            token_address: "0xtoke".to_string(),
            symbol: "TOKE".to_string(),
            price_usd: price,
            liquidity_usd: liquidity,
            volume_24h: volume,
            price_change_1h: 0.0,
            price_change_24h: 0.0,
            buys_24h: 100,
            sells_24h: 80,
            pair_age_hours: Some(100.0),
        }
    }

    fn open_trade(layer: Layer, entry: f64, highest: f64, age_hours: i64) -> TradeRecord {
        TradeRecord {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            symbol: "TOKE".to_string(),
            token_address: "0xtoke".to_string(),
            network: "base".to_string(),
            side: TradeSide::Buy,
            status: TradeStatus::Open,
            layer,
            quantity: 100.0,
            entry_price: entry,
            exit_price: None,
            pnl_abs: None,
            pnl_pct: None,
            is_win: None,
            fees_abs: 0.1,
            slippage_simulated: 0.004,
            gas_simulated: 0.1,
            latency_ms: 300,
            entry_reason: "test".to_string(),
            exit_reason: None,
            entered_at: Utc::now() - Duration::hours(age_hours),
            closed_at: None,
            metadata: serde_json::json!({
                "highest_price": highest,
                "entry_volume_24h": 200_000.0,
            }),
        }
    }

    async fn run_manager(
        trade: TradeRecord,
        current_pair: PairSummary,
    ) -> (Vec<TradeRecord>, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::new());
        storage.insert_trade(&trade).await.unwrap();
        let manager = PositionManager::new(
            Arc::new(FixedPair(current_pair)),
            storage.clone(),
            PositionConfig::default(),
        );
        let closed = manager.check_positions("u1", Utc::now()).await.unwrap();
        (closed, storage)
    }

    #[tokio::test]
    async fn test_trailing_stop_needs_negative_pnl() {
        // scenario: entry 1.00, highest 1.20, current 1.13 -> +13%; the
        // 5% trail line at 1.14 is breached but pnl is positive, and take
        // profit needs +15%, so the trade stays open
        let trade = open_trade(Layer::Core, 1.0, 1.20, 5);
        let (closed, storage) = run_manager(trade, pair(1.13, 500_000.0, 180_000.0)).await;

        assert!(closed.is_empty());
        let still_open = storage.open_trades("u1").await.unwrap();
        assert_eq!(still_open.len(), 1);
    }

    #[tokio::test]
    async fn test_trailing_stop_fires_underwater() {
        // entry 1.00, highest 1.02, current 0.95: below the trail line and
        // pnl negative
        let trade = open_trade(Layer::Core, 1.0, 1.02, 5);
        let (closed, _) = run_manager(trade, pair(0.95, 500_000.0, 180_000.0)).await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason.as_deref(), Some("trailing stop"));
        assert_eq!(closed[0].is_win, Some(false));
    }

    #[tokio::test]
    async fn test_satellite_trail_is_wider() {
        // -8% on satellite: inside the 10% trail, stays open
        let trade = open_trade(Layer::Satellite, 1.0, 1.0, 5);
        let (closed, _) = run_manager(trade, pair(0.92, 500_000.0, 180_000.0)).await;
        assert!(closed.is_empty());

        // -12% on satellite: trail fires
        let trade = open_trade(Layer::Satellite, 1.0, 1.0, 5);
        let (closed, _) = run_manager(trade, pair(0.88, 500_000.0, 180_000.0)).await;
        assert_eq!(closed.len(), 1);
    }

    #[tokio::test]
    async fn test_time_limit() {
        let trade = open_trade(Layer::Core, 1.0, 1.0, 49);
        let (closed, _) = run_manager(trade, pair(1.01, 500_000.0, 180_000.0)).await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason.as_deref(), Some("time max"));

        // satellite holds for a week
        let trade = open_trade(Layer::Satellite, 1.0, 1.0, 49);
        let (closed, _) = run_manager(trade, pair(1.01, 500_000.0, 180_000.0)).await;
        assert!(closed.is_empty());
    }

    #[tokio::test]
    async fn test_volume_fade_only_in_profit() {
        // volume collapsed to 20% of entry while up 5%
        let trade = open_trade(Layer::Core, 1.0, 1.05, 5);
        let (closed, _) = run_manager(trade, pair(1.05, 500_000.0, 40_000.0)).await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason.as_deref(), Some("momentum exhausted"));

        // same fade underwater: rule 3 skips, liquidity/tp do not fire,
        // trail not breached -> holds
        let trade = open_trade(Layer::Core, 1.0, 1.0, 5);
        let (closed, _) = run_manager(trade, pair(0.98, 500_000.0, 40_000.0)).await;
        assert!(closed.is_empty());
    }

    #[tokio::test]
    async fn test_liquidity_floor() {
        let trade = open_trade(Layer::Core, 1.0, 1.0, 5);
        let (closed, _) = run_manager(trade, pair(1.02, 20_000.0, 180_000.0)).await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason.as_deref(), Some("liquidity too low"));
    }

    #[tokio::test]
    async fn test_take_profit_per_layer() {
        // +16% hits the core TP
        let trade = open_trade(Layer::Core, 1.0, 1.16, 5);
        let (closed, _) = run_manager(trade, pair(1.16, 500_000.0, 180_000.0)).await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason.as_deref(), Some("take profit"));
        assert_eq!(closed[0].is_win, Some(true));

        // +16% on satellite needs +80%, stays open
        let trade = open_trade(Layer::Satellite, 1.0, 1.16, 5);
        let (closed, _) = run_manager(trade, pair(1.16, 500_000.0, 180_000.0)).await;
        assert!(closed.is_empty());

        let trade = open_trade(Layer::Satellite, 1.0, 1.85, 5);
        let (closed, _) = run_manager(trade, pair(1.85, 500_000.0, 180_000.0)).await;
        assert_eq!(closed.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_trade_field_invariants() {
        let trade = open_trade(Layer::Core, 1.0, 1.20, 5);
        let (closed, _) = run_manager(trade, pair(1.20, 500_000.0, 180_000.0)).await;
        let t = &closed[0];

        let exit = t.exit_price.unwrap();
        let pnl_abs = t.pnl_abs.unwrap();
        let pnl_pct = t.pnl_pct.unwrap();
        assert!((pnl_abs - (exit - t.entry_price) * t.quantity).abs() < 1e-6);
        assert_eq!(t.is_win, Some(pnl_pct > 0.0));
        assert!(t.closed_at.unwrap() > t.entered_at);
    }

    #[tokio::test]
    async fn test_high_water_mark_persists_without_exit() {
        let mut trade = open_trade(Layer::Core, 1.0, 1.0, 5);
        trade.metadata = serde_json::json!({"entry_volume_24h": 200_000.0});
        let (closed, storage) = run_manager(trade, pair(1.08, 500_000.0, 180_000.0)).await;

        assert!(closed.is_empty());
        let open = storage.open_trades("u1").await.unwrap();
        let highest = open[0].metadata["highest_price"].as_f64().unwrap();
        assert!((highest - 1.08).abs() < 1e-9);
    }
}
