//! Shared value types for the paper-trading engine
//!
//! Every record that crosses a component or storage boundary is an explicit
//! struct here. Metadata bags are `serde_json::Value` objects written and
//! read only by the component that owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk layer a signal or trade belongs to.
///
/// Core carries the majority of risk with stricter filters; satellite takes
/// smaller, more speculative positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Core,
    Satellite,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Core => "core",
            Layer::Satellite => "satellite",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    Closed,
    Cancelled,
    Failed,
}

/// Which detector produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Momentum,
    Early,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Momentum => "momentum",
            SignalSource::Early => "early",
        }
    }
}

/// Coarse classification of the overall market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    RiskOn,
    RiskOff,
    Neutral,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::RiskOn => "risk_on",
            MarketRegime::RiskOff => "risk_off",
            MarketRegime::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user mutable risk accounting. One row per user.
///
/// Invariants: `capital > 0`; counters never negative; when `is_paused` is
/// set either `pause_until` lies in the future or the caller must unpause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub user_id: String,
    /// Paper capital in USD
    pub capital: f64,
    pub pnl_today: f64,
    pub pnl_this_week: f64,
    pub trades_today_core: u32,
    pub trades_today_satellite: u32,
    pub consecutive_losses_satellite: u32,
    pub is_paused: bool,
    pub pause_reason: Option<String>,
    pub pause_until: Option<DateTime<Utc>>,
    /// Day key (%Y-%m-%d) the daily counters belong to
    pub counters_day: String,
    /// ISO week key the weekly pnl belongs to
    pub counters_week: String,
}

impl RiskState {
    pub fn new(user_id: &str, capital: f64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            capital,
            pnl_today: 0.0,
            pnl_this_week: 0.0,
            trades_today_core: 0,
            trades_today_satellite: 0,
            consecutive_losses_satellite: 0,
            is_paused: false,
            pause_reason: None,
            pause_until: None,
            counters_day: day_key(now),
            counters_week: week_key(now),
        }
    }

    pub fn trades_today(&self, layer: Layer) -> u32 {
        match layer {
            Layer::Core => self.trades_today_core,
            Layer::Satellite => self.trades_today_satellite,
        }
    }
}

/// Day key used for daily resets and smart-money seeding.
pub fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// ISO-week key (Monday-anchored) used for weekly resets.
pub fn week_key(at: DateTime<Utc>) -> String {
    at.format("%G-W%V").to_string()
}

/// A single simulated trade. Created open by the paper broker, closed only
/// by the position manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub token_address: String,
    pub network: String,
    pub side: TradeSide,
    pub status: TradeStatus,
    pub layer: Layer,
    pub quantity: f64,
    pub entry_price: f64,
    /// Set together with the other exit fields when the position closes
    pub exit_price: Option<f64>,
    pub pnl_abs: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub is_win: Option<bool>,
    pub fees_abs: f64,
    pub slippage_simulated: f64,
    pub gas_simulated: f64,
    pub latency_ms: u64,
    pub entry_reason: String,
    pub exit_reason: Option<String>,
    pub entered_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Notional position size at entry, in USD
    pub fn position_usd(&self) -> f64 {
        self.quantity * self.entry_price
    }
}

/// Outcome record written for every evaluated signal, executed or not, and
/// filled in over the five tracking windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub id: String,
    pub user_id: String,
    pub token_address: String,
    pub network: String,
    pub layer: Layer,
    pub confidence: f64,
    pub regime: MarketRegime,
    pub entry_price: f64,
    pub was_executed: bool,
    pub reject_reason: Option<String>,
    pub reasons: Vec<String>,
    pub price_1h: Option<f64>,
    pub price_6h: Option<f64>,
    pub price_24h: Option<f64>,
    pub price_48h: Option<f64>,
    pub price_7d: Option<f64>,
    pub pnl_pct_1h: Option<f64>,
    pub pnl_pct_6h: Option<f64>,
    pub pnl_pct_24h: Option<f64>,
    pub pnl_pct_48h: Option<f64>,
    pub pnl_pct_7d: Option<f64>,
    pub checks_done: u32,
    pub fully_tracked: bool,
    pub signal_source: SignalSource,
    pub emitted_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// The five tracking windows, oldest first.
pub const OUTCOME_WINDOWS_HOURS: [i64; 5] = [1, 6, 24, 48, 168];

impl SignalOutcome {
    pub fn window_price(&self, hours: i64) -> Option<f64> {
        match hours {
            1 => self.price_1h,
            6 => self.price_6h,
            24 => self.price_24h,
            48 => self.price_48h,
            168 => self.price_7d,
            _ => None,
        }
    }

    pub fn set_window(&mut self, hours: i64, price: f64, pnl_pct: f64) {
        match hours {
            1 => {
                self.price_1h = Some(price);
                self.pnl_pct_1h = Some(pnl_pct);
            }
            6 => {
                self.price_6h = Some(price);
                self.pnl_pct_6h = Some(pnl_pct);
            }
            24 => {
                self.price_24h = Some(price);
                self.pnl_pct_24h = Some(pnl_pct);
            }
            48 => {
                self.price_48h = Some(price);
                self.pnl_pct_48h = Some(pnl_pct);
            }
            168 => {
                self.price_7d = Some(price);
                self.pnl_pct_7d = Some(pnl_pct);
            }
            _ => {}
        }
    }

    pub fn all_windows_filled(&self) -> bool {
        OUTCOME_WINDOWS_HOURS
            .iter()
            .all(|h| self.window_price(*h).is_some())
    }
}

/// Calibrator-owned tuning state. One row per user; read by the orchestrator
/// at the start of every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    pub user_id: String,
    pub momentum_score_threshold: f64,
    pub early_score_threshold: f64,
    pub core_min_confidence: f64,
    pub satellite_min_confidence: f64,
    pub hit_rate_core: f64,
    pub hit_rate_satellite: f64,
    pub profit_factor_core: f64,
    pub profit_factor_satellite: f64,
    /// Fraction of recent outcomes sourced from the momentum detector
    pub momentum_exposure: f64,
    pub detector_interaction: DetectorInteraction,
    pub last_calibrated_at: Option<DateTime<Utc>>,
}

/// Summary of how the two detectors interact over the calibration window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorInteraction {
    pub dominant: SignalSource,
    /// Share of tokens seen by both detectors, 0-100
    pub token_overlap_pct: f64,
    /// "recommended" when the dominant detector is earning its exposure
    pub bias: String,
}

impl Default for DetectorInteraction {
    fn default() -> Self {
        Self {
            dominant: SignalSource::Momentum,
            token_overlap_pct: 0.0,
            bias: "neutral".to_string(),
        }
    }
}

impl CalibrationState {
    pub fn defaults(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            momentum_score_threshold: 55.0,
            early_score_threshold: 50.0,
            core_min_confidence: 75.0,
            satellite_min_confidence: 50.0,
            hit_rate_core: 0.0,
            hit_rate_satellite: 0.0,
            profit_factor_core: 0.0,
            profit_factor_satellite: 0.0,
            momentum_exposure: 0.0,
            detector_interaction: DetectorInteraction::default(),
            last_calibrated_at: None,
        }
    }
}

/// A wallet tracked by the smart-money layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedWallet {
    pub wallet_id: String,
    pub label: String,
    pub style: WalletStyle,
    pub networks: Vec<String>,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStyle {
    Alpha,
    Momentum,
    EarlySniper,
    Whale,
}

/// Latest quality score for a tracked wallet, 0-100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletScore {
    pub wallet_id: String,
    pub score: f64,
    pub scored_at: DateTime<Utc>,
}

/// One observed (or simulated) wallet trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMovement {
    pub id: String,
    pub wallet_id: String,
    pub token_address: String,
    pub network: String,
    pub direction: TradeSide,
    pub amount_usd: f64,
    pub observed_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Append-only record of the market regime at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub regime: MarketRegime,
    pub sentiment_score: f64,
    pub btc_dominance: f64,
    pub taken_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Token registry row, auto-created on first sight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRow {
    pub token_address: String,
    pub network: String,
    pub symbol: String,
    pub first_seen: DateTime<Utc>,
}

/// Persisted per-token health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub token_address: String,
    pub network: String,
    pub score: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub price_usd: f64,
    pub spread_pct: f64,
    pub flags: Vec<String>,
    pub taken_at: DateTime<Utc>,
}

/// A market quote used by the paper broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub pair_age_hours: f64,
    pub price_change_1h: f64,
    /// Half-spread applied in the trade direction, percent
    pub spread_pct: f64,
}

/// A buy order routed from the confluence engine to the risk gate + broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperOrder {
    pub user_id: String,
    pub symbol: String,
    pub token_address: String,
    pub network: String,
    pub side: TradeSide,
    pub layer: Layer,
    pub confidence: f64,
    pub signal_source: SignalSource,
    pub entry_reason: String,
}

/// Per-cycle summary returned to the caller. A non-empty `errors` list is
/// advisory, not fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub regime: MarketRegime,
    pub trending_scanned: usize,
    pub new_scanned: usize,
    pub signals_evaluated: usize,
    pub trades_opened: usize,
    pub trades_closed: usize,
    pub outcomes_updated: usize,
    pub skipped_paused: bool,
    pub errors: Vec<String>,
}

impl CycleResult {
    pub fn empty(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            timestamp: now,
            regime: MarketRegime::Neutral,
            trending_scanned: 0,
            new_scanned: 0,
            signals_evaluated: 0,
            trades_opened: 0,
            trades_closed: 0,
            outcomes_updated: 0,
            skipped_paused: false,
            errors: Vec::new(),
        }
    }
}
