//! In-memory store with optional JSON snapshot persistence
//!
//! Collections are plain maps behind one async RwLock; the whole store
//! serialises to a single JSON document that can be loaded back, which is
//! enough persistence for a paper-trading engine and keeps tests hermetic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::types::{
    CalibrationState, HealthSnapshot, RegimeSnapshot, RiskState, SignalOutcome, TokenRow,
    TradeRecord, TradeSide, TrackedWallet, WalletMovement, WalletScore,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    risk_states: HashMap<String, RiskState>,
    calibration_states: HashMap<String, CalibrationState>,
    trades: Vec<TradeRecord>,
    outcomes: Vec<SignalOutcome>,
    regime_snapshots: Vec<RegimeSnapshot>,
    health_snapshots: Vec<HealthSnapshot>,
    tokens: HashMap<String, TokenRow>,
    wallets: HashMap<String, TrackedWallet>,
    wallet_scores: HashMap<String, WalletScore>,
    movements: Vec<WalletMovement>,
}

pub struct MemoryStore {
    inner: RwLock<Collections>,
    snapshot_path: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Collections::default()),
            snapshot_path: None,
        }
    }

    pub fn with_snapshot_path(path: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Collections::default()),
            snapshot_path: Some(path.into()),
        }
    }

    /// Load collections from the snapshot file if one exists.
    pub async fn load(&self) -> Result<()> {
        if let Some(path) = &self.snapshot_path {
            if std::path::Path::new(path).exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| Error::Storage(e.to_string()))?;
                let collections: Collections =
                    serde_json::from_str(&data).map_err(|e| Error::Storage(e.to_string()))?;

                let mut guard = self.inner.write().await;
                *guard = collections;
                info!(path, trades = guard.trades.len(), "store snapshot loaded");
            }
        }
        Ok(())
    }

    /// Persist all collections to the snapshot file.
    pub async fn save(&self) -> Result<()> {
        if let Some(path) = &self.snapshot_path {
            let guard = self.inner.read().await;
            let data = serde_json::to_string_pretty(&*guard)
                .map_err(|e| Error::Storage(e.to_string()))?;
            drop(guard);

            tokio::fs::write(path, data)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
            debug!(path, "store snapshot saved");
        }
        Ok(())
    }

    fn token_key(network: &str, token_address: &str) -> String {
        format!("{}:{}", network, token_address)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn risk_state(&self, user_id: &str) -> Result<Option<RiskState>> {
        Ok(self.inner.read().await.risk_states.get(user_id).cloned())
    }

    async fn put_risk_state(&self, state: &RiskState) -> Result<()> {
        self.inner
            .write()
            .await
            .risk_states
            .insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    async fn calibration_state(&self, user_id: &str) -> Result<Option<CalibrationState>> {
        Ok(self
            .inner
            .read()
            .await
            .calibration_states
            .get(user_id)
            .cloned())
    }

    async fn put_calibration_state(&self, state: &CalibrationState) -> Result<()> {
        self.inner
            .write()
            .await
            .calibration_states
            .insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    async fn insert_trade(&self, trade: &TradeRecord) -> Result<()> {
        self.inner.write().await.trades.push(trade.clone());
        Ok(())
    }

    async fn update_trade(&self, trade: &TradeRecord) -> Result<()> {
        let mut guard = self.inner.write().await;
        match guard.trades.iter_mut().find(|t| t.id == trade.id) {
            Some(existing) => {
                *existing = trade.clone();
                Ok(())
            }
            None => Err(Error::Storage(format!("trade {} not found", trade.id))),
        }
    }

    async fn open_trades(&self, user_id: &str) -> Result<Vec<TradeRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .trades
            .iter()
            .filter(|t| t.user_id == user_id && t.is_open())
            .cloned()
            .collect())
    }

    async fn closed_trades_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>> {
        let mut trades: Vec<TradeRecord> = self
            .inner
            .read()
            .await
            .trades
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.status == crate::types::TradeStatus::Closed
                    && t.closed_at.map(|c| c >= since).unwrap_or(false)
            })
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.closed_at);
        Ok(trades)
    }

    async fn insert_outcome(&self, outcome: &SignalOutcome) -> Result<()> {
        self.inner.write().await.outcomes.push(outcome.clone());
        Ok(())
    }

    async fn update_outcome(&self, outcome: &SignalOutcome) -> Result<()> {
        let mut guard = self.inner.write().await;
        match guard.outcomes.iter_mut().find(|o| o.id == outcome.id) {
            Some(existing) => {
                *existing = outcome.clone();
                Ok(())
            }
            None => Err(Error::Storage(format!("outcome {} not found", outcome.id))),
        }
    }

    async fn pending_outcomes(&self, user_id: &str) -> Result<Vec<SignalOutcome>> {
        Ok(self
            .inner
            .read()
            .await
            .outcomes
            .iter()
            .filter(|o| o.user_id == user_id && !o.fully_tracked)
            .cloned()
            .collect())
    }

    async fn recent_outcomes(&self, user_id: &str, limit: usize) -> Result<Vec<SignalOutcome>> {
        let guard = self.inner.read().await;
        let mut outcomes: Vec<SignalOutcome> = guard
            .outcomes
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        outcomes.sort_by_key(|o| std::cmp::Reverse(o.emitted_at));
        outcomes.truncate(limit);
        Ok(outcomes)
    }

    async fn insert_regime_snapshot(&self, snapshot: &RegimeSnapshot) -> Result<()> {
        self.inner
            .write()
            .await
            .regime_snapshots
            .push(snapshot.clone());
        Ok(())
    }

    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> Result<()> {
        self.inner
            .write()
            .await
            .health_snapshots
            .push(snapshot.clone());
        Ok(())
    }

    async fn ensure_token(&self, row: &TokenRow) -> Result<()> {
        let key = Self::token_key(&row.network, &row.token_address);
        self.inner
            .write()
            .await
            .tokens
            .entry(key)
            .or_insert_with(|| row.clone());
        Ok(())
    }

    async fn upsert_wallet(&self, wallet: &TrackedWallet) -> Result<()> {
        self.inner
            .write()
            .await
            .wallets
            .insert(wallet.wallet_id.clone(), wallet.clone());
        Ok(())
    }

    async fn put_wallet_score(&self, score: &WalletScore) -> Result<()> {
        self.inner
            .write()
            .await
            .wallet_scores
            .insert(score.wallet_id.clone(), score.clone());
        Ok(())
    }

    async fn insert_movement(&self, movement: &WalletMovement) -> Result<()> {
        let mut guard = self.inner.write().await;
        // idempotent per movement id so a re-run of the deterministic
        // simulator never duplicates rows
        if !guard.movements.iter().any(|m| m.id == movement.id) {
            guard.movements.push(movement.clone());
        }
        Ok(())
    }

    async fn buy_movements_since(
        &self,
        token_address: &str,
        network: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<WalletMovement>> {
        Ok(self
            .inner
            .read()
            .await
            .movements
            .iter()
            .filter(|m| {
                m.token_address == token_address
                    && m.network == network
                    && m.direction == TradeSide::Buy
                    && m.observed_at >= since
            })
            .cloned()
            .collect())
    }

    async fn latest_wallet_score(&self, wallet_id: &str) -> Result<Option<WalletScore>> {
        Ok(self.inner.read().await.wallet_scores.get(wallet_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Layer, MarketRegime, SignalSource, TradeStatus};

    fn trade(id: &str, user: &str, status: TradeStatus) -> TradeRecord {
        TradeRecord {
            id: id.to_string(),
            user_id: user.to_string(),
            symbol: "TOKE".to_string(),
            token_address: "0xtoke".to_string(),
            network: "base".to_string(),
            side: TradeSide::Buy,
            status,
            layer: Layer::Core,
            quantity: 100.0,
            entry_price: 1.0,
            exit_price: None,
            pnl_abs: None,
            pnl_pct: None,
            is_win: None,
            fees_abs: 0.1,
            slippage_simulated: 0.004,
            gas_simulated: 0.1,
            latency_ms: 250,
            entry_reason: "test".to_string(),
            exit_reason: None,
            entered_at: Utc::now(),
            closed_at: if status == TradeStatus::Closed {
                Some(Utc::now())
            } else {
                None
            },
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_risk_state_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.risk_state("u1").await.unwrap().is_none());

        let state = RiskState::new("u1", 10_000.0, Utc::now());
        store.put_risk_state(&state).await.unwrap();

        let loaded = store.risk_state("u1").await.unwrap().unwrap();
        assert_eq!(loaded.capital, 10_000.0);
    }

    #[tokio::test]
    async fn test_calibration_state_bit_exact_roundtrip() {
        let store = MemoryStore::new();
        let mut state = CalibrationState::defaults("u1");
        state.momentum_score_threshold = 57.3333333333;
        state.hit_rate_core = 0.5500000001;

        store.put_calibration_state(&state).await.unwrap();
        let loaded = store.calibration_state("u1").await.unwrap().unwrap();
        assert_eq!(loaded, state);

        // re-persist and reload: still identical
        store.put_calibration_state(&loaded).await.unwrap();
        let again = store.calibration_state("u1").await.unwrap().unwrap();
        assert_eq!(again, state);
    }

    #[tokio::test]
    async fn test_trade_queries_filter_by_user_and_status() {
        let store = MemoryStore::new();
        store.insert_trade(&trade("t1", "u1", TradeStatus::Open)).await.unwrap();
        store.insert_trade(&trade("t2", "u1", TradeStatus::Closed)).await.unwrap();
        store.insert_trade(&trade("t3", "u2", TradeStatus::Open)).await.unwrap();

        let open = store.open_trades("u1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "t1");

        let closed = store
            .closed_trades_since("u1", Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, "t2");
    }

    #[tokio::test]
    async fn test_update_missing_trade_fails() {
        let store = MemoryStore::new();
        let result = store.update_trade(&trade("ghost", "u1", TradeStatus::Open)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_movement_insert_is_idempotent() {
        let store = MemoryStore::new();
        let movement = WalletMovement {
            id: "m1".to_string(),
            wallet_id: "w1".to_string(),
            token_address: "0xtoke".to_string(),
            network: "base".to_string(),
            direction: TradeSide::Buy,
            amount_usd: 1500.0,
            observed_at: Utc::now(),
            metadata: serde_json::json!({}),
        };

        store.insert_movement(&movement).await.unwrap();
        store.insert_movement(&movement).await.unwrap();

        let since = Utc::now() - chrono::Duration::hours(6);
        let found = store.buy_movements_since("0xtoke", "base", since).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let path_str = path.to_str().unwrap().to_string();

        let store = MemoryStore::with_snapshot_path(&path_str);
        store
            .put_risk_state(&RiskState::new("u1", 5_000.0, Utc::now()))
            .await
            .unwrap();
        store.insert_trade(&trade("t1", "u1", TradeStatus::Open)).await.unwrap();
        store.save().await.unwrap();

        let reloaded = MemoryStore::with_snapshot_path(&path_str);
        reloaded.load().await.unwrap();
        assert!(reloaded.risk_state("u1").await.unwrap().is_some());
        assert_eq!(reloaded.open_trades("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_outcomes_ordering_and_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let outcome = SignalOutcome {
                id: format!("o{}", i),
                user_id: "u1".to_string(),
                token_address: "0xtoke".to_string(),
                network: "base".to_string(),
                layer: Layer::Core,
                confidence: 70.0,
                regime: MarketRegime::Neutral,
                entry_price: 1.0,
                was_executed: false,
                reject_reason: None,
                reasons: vec![],
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
                signal_source: SignalSource::Momentum,
                emitted_at: Utc::now() + chrono::Duration::seconds(i),
                metadata: serde_json::json!({}),
            };
            store.insert_outcome(&outcome).await.unwrap();
        }

        let recent = store.recent_outcomes("u1", 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, "o4"); // newest first
    }
}
