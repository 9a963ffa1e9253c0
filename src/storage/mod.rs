//! Storage abstraction
//!
//! The engine only talks to this trait. The concrete backend is a
//! collaborator concern; the bundled implementation is an in-memory store
//! with optional JSON snapshot persistence. All writes at call sites are
//! best-effort: a failed non-critical write is logged and the cycle
//! continues.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    CalibrationState, HealthSnapshot, RegimeSnapshot, RiskState, SignalOutcome, TokenRow,
    TradeRecord, TrackedWallet, WalletMovement, WalletScore,
};

pub use memory::MemoryStore;

#[async_trait]
pub trait Storage: Send + Sync {
    // Risk state: one row per user
    async fn risk_state(&self, user_id: &str) -> Result<Option<RiskState>>;
    async fn put_risk_state(&self, state: &RiskState) -> Result<()>;

    // Calibration state: one row per user
    async fn calibration_state(&self, user_id: &str) -> Result<Option<CalibrationState>>;
    async fn put_calibration_state(&self, state: &CalibrationState) -> Result<()>;

    // Trades: append + update
    async fn insert_trade(&self, trade: &TradeRecord) -> Result<()>;
    async fn update_trade(&self, trade: &TradeRecord) -> Result<()>;
    async fn open_trades(&self, user_id: &str) -> Result<Vec<TradeRecord>>;
    /// Closed trades with `closed_at >= since`, oldest first.
    async fn closed_trades_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>>;

    // Signal outcomes: append, then monotonic window updates
    async fn insert_outcome(&self, outcome: &SignalOutcome) -> Result<()>;
    async fn update_outcome(&self, outcome: &SignalOutcome) -> Result<()>;
    async fn pending_outcomes(&self, user_id: &str) -> Result<Vec<SignalOutcome>>;
    /// Most recent outcomes first, capped at `limit`.
    async fn recent_outcomes(&self, user_id: &str, limit: usize) -> Result<Vec<SignalOutcome>>;

    // Append-only snapshots
    async fn insert_regime_snapshot(&self, snapshot: &RegimeSnapshot) -> Result<()>;
    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> Result<()>;

    // Token registry
    async fn ensure_token(&self, row: &TokenRow) -> Result<()>;

    // Smart-money wallets
    async fn upsert_wallet(&self, wallet: &TrackedWallet) -> Result<()>;
    async fn put_wallet_score(&self, score: &WalletScore) -> Result<()>;
    async fn insert_movement(&self, movement: &WalletMovement) -> Result<()>;
    /// Buy-side movements for a token observed at or after `since`.
    async fn buy_movements_since(
        &self,
        token_address: &str,
        network: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<WalletMovement>>;
    async fn latest_wallet_score(&self, wallet_id: &str) -> Result<Option<WalletScore>>;
}
