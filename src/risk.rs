//! Adaptive risk gate
//!
//! Pre-trade gating plus dynamic position sizing. The baseline rules are
//! non-negotiable kill-switches (daily/weekly loss, trade caps, satellite
//! cooldown); the adaptive layer only engages once the 30d rolling window
//! has enough trades to mean something, and then scales sizing by profit
//! factor, drawdown and half-Kelly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::perf::RollingMetrics;
use crate::types::{day_key, week_key, Layer, RiskState};

/// Trades required in the 30d window before adaptive sizing engages.
const ADAPTIVE_MIN_TRADES: usize = 10;
/// Deny everything above this rolling drawdown.
const ADAPTIVE_MAX_DRAWDOWN: f64 = 0.10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub max_position_usd: f64,
}

impl GateDecision {
    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            max_position_usd: 0.0,
        }
    }

    fn allow(max_position_usd: f64) -> Self {
        Self {
            allowed: true,
            reason: None,
            max_position_usd,
        }
    }
}

pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Roll daily and weekly counters forward. Expired pauses are cleared
    /// on the daily boundary.
    pub fn roll_over(&self, state: &mut RiskState, now: DateTime<Utc>) {
        let today = day_key(now);
        if state.counters_day != today {
            info!(user = %state.user_id, "daily risk counters reset");
            state.counters_day = today;
            state.pnl_today = 0.0;
            state.trades_today_core = 0;
            state.trades_today_satellite = 0;
            if state.is_paused && state.pause_until.map(|t| t <= now).unwrap_or(true) {
                state.is_paused = false;
                state.pause_reason = None;
                state.pause_until = None;
            }
        }

        let week = week_key(now);
        if state.counters_week != week {
            info!(user = %state.user_id, "weekly risk counters reset");
            state.counters_week = week;
            state.pnl_this_week = 0.0;
            state.consecutive_losses_satellite = 0;
        }
    }

    /// Pre-trade gate check for one order.
    pub fn evaluate(
        &self,
        state: &RiskState,
        layer: Layer,
        rolling_30d: Option<&RollingMetrics>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        // pause check
        if state.is_paused {
            if let Some(until) = state.pause_until {
                if until > now {
                    return GateDecision::deny(format!(
                        "paused until {}: {}",
                        until.format("%Y-%m-%d %H:%M UTC"),
                        state.pause_reason.as_deref().unwrap_or("unspecified")
                    ));
                }
            } else {
                return GateDecision::deny(format!(
                    "paused: {}",
                    state.pause_reason.as_deref().unwrap_or("unspecified")
                ));
            }
        }

        // daily kill-switch
        let daily_loss_pct = state.pnl_today.min(0.0).abs() / state.capital;
        if daily_loss_pct >= self.config.max_daily_loss_pct {
            return GateDecision::deny(format!(
                "Pérdida diaria {:.2}% >= {:.2}%",
                daily_loss_pct * 100.0,
                self.config.max_daily_loss_pct * 100.0
            ));
        }

        // weekly kill-switch
        let weekly_loss_pct = state.pnl_this_week.min(0.0).abs() / state.capital;
        if weekly_loss_pct >= self.config.max_weekly_loss_pct {
            return GateDecision::deny(format!(
                "weekly loss {:.2}% >= {:.2}%",
                weekly_loss_pct * 100.0,
                self.config.max_weekly_loss_pct * 100.0
            ));
        }

        // per-layer daily trade cap
        let cap = match layer {
            Layer::Core => self.config.core_daily_trade_cap,
            Layer::Satellite => self.config.satellite_daily_trade_cap,
        };
        if state.trades_today(layer) >= cap {
            return GateDecision::deny(format!("{} daily trade cap {} reached", layer, cap));
        }

        // satellite loss-streak cooldown
        if layer == Layer::Satellite
            && state.consecutive_losses_satellite >= self.config.satellite_consec_loss_limit
            && state.pause_until.map(|t| t > now).unwrap_or(false)
        {
            return GateDecision::deny(format!(
                "satellite cooldown after {} consecutive losses",
                state.consecutive_losses_satellite
            ));
        }

        // baseline sizing
        let risk_fraction = match layer {
            Layer::Core => self.config.core_max_risk_per_trade_pct,
            Layer::Satellite => self.config.satellite_max_risk_per_trade_pct,
        };
        let base_position = state.capital * risk_fraction;

        // adaptive layer
        let rolling = match rolling_30d {
            Some(r) if r.total_trades >= ADAPTIVE_MIN_TRADES => r,
            _ => return GateDecision::allow(base_position),
        };

        if rolling.current_drawdown_pct > ADAPTIVE_MAX_DRAWDOWN {
            return GateDecision::deny(format!(
                "adaptive pause: rolling drawdown {:.1}% above {:.0}%",
                rolling.current_drawdown_pct * 100.0,
                ADAPTIVE_MAX_DRAWDOWN * 100.0
            ));
        }

        let layer_metrics = rolling.layer(layer);
        let mut multiplier = 1.0;
        if layer_metrics.trades > 0 {
            if layer_metrics.profit_factor < 0.8 {
                multiplier *= 0.5;
            } else if layer_metrics.profit_factor > 1.5 {
                multiplier *= 1.25;
            }
        }
        if rolling.current_drawdown_pct > 0.03 {
            multiplier *= (1.0 - rolling.current_drawdown_pct * 5.0).max(0.3);
        }

        let mut max_position = base_position * multiplier;
        if layer_metrics.kelly_fraction > 0.0 {
            max_position = max_position.min(state.capital * layer_metrics.kelly_fraction);
        }

        GateDecision::allow(max_position)
    }

    /// Count a successful open against the daily caps.
    pub fn register_open(&self, state: &mut RiskState, layer: Layer) {
        match layer {
            Layer::Core => state.trades_today_core += 1,
            Layer::Satellite => state.trades_today_satellite += 1,
        }
    }

    /// Book a closed trade's pnl into the risk state and trigger pauses
    /// when a threshold is crossed.
    pub fn apply_trade_result(
        &self,
        state: &mut RiskState,
        layer: Layer,
        pnl: f64,
        now: DateTime<Utc>,
    ) {
        state.pnl_today += pnl;
        state.pnl_this_week += pnl;

        if layer == Layer::Satellite {
            if pnl < 0.0 {
                state.consecutive_losses_satellite += 1;
                if state.consecutive_losses_satellite >= self.config.satellite_consec_loss_limit {
                    let until = now + Duration::milliseconds(self.config.satellite_cooldown_ms as i64);
                    warn!(
                        user = %state.user_id,
                        streak = state.consecutive_losses_satellite,
                        "satellite loss streak cooldown engaged"
                    );
                    // cooldown bounds satellite orders only; core keeps trading
                    state.pause_until = Some(until);
                    state.pause_reason = Some(format!(
                        "satellite cooldown after {} consecutive losses",
                        state.consecutive_losses_satellite
                    ));
                }
            } else if pnl > 0.0 {
                state.consecutive_losses_satellite = 0;
            }
        }

        let daily_loss_pct = state.pnl_today.min(0.0).abs() / state.capital;
        let weekly_loss_pct = state.pnl_this_week.min(0.0).abs() / state.capital;

        if daily_loss_pct >= self.config.max_daily_loss_pct {
            warn!(user = %state.user_id, "daily loss kill-switch tripped");
            state.is_paused = true;
            state.pause_reason = Some(format!(
                "Pérdida diaria {:.2}% >= {:.2}%",
                daily_loss_pct * 100.0,
                self.config.max_daily_loss_pct * 100.0
            ));
            state.pause_until = Some(end_of_utc_day(now));
        } else if weekly_loss_pct >= self.config.max_weekly_loss_pct {
            warn!(user = %state.user_id, "weekly loss kill-switch tripped");
            state.is_paused = true;
            state.pause_reason = Some(format!(
                "weekly loss {:.2}% >= {:.2}%",
                weekly_loss_pct * 100.0,
                self.config.max_weekly_loss_pct * 100.0
            ));
            state.pause_until = Some(end_of_utc_day(now));
        }
    }
}

/// First instant of the next UTC day.
pub fn end_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = now.date_naive() + chrono::Days::new(1);
    next.and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}
