//! Rolling performance metrics
//!
//! Windowed statistics over closed paper trades: profit factor, win rate,
//! expectancy net of fees, peak-based drawdown, friction averages, streaks
//! and half-Kelly sizing fractions. Computed per cycle for the 7d and 30d
//! windows and consumed by the risk gate, the forward predictor and the
//! calibrator.

use serde::{Deserialize, Serialize};

use crate::types::{Layer, TradeRecord};

/// Profit factor ceiling when there are gains but no losses.
pub const PF_NO_LOSS_CAP: f64 = 10.0;
/// Half-Kelly cap.
pub const KELLY_CAP: f64 = 0.25;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerMetrics {
    pub trades: usize,
    pub wins: usize,
    /// 0-1
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Average pnl per trade net of fees, USD
    pub expectancy: f64,
    /// Average winning pnl, USD
    pub avg_win: f64,
    /// Average losing pnl magnitude, USD
    pub avg_loss: f64,
    /// Half-Kelly fraction, capped at 0.25
    pub kelly_fraction: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingMetrics {
    pub window_days: i64,
    pub total_trades: usize,
    pub core: LayerMetrics,
    pub satellite: LayerMetrics,
    pub profit_factor: f64,
    pub win_rate: f64,
    pub expectancy: f64,
    pub total_net_pnl: f64,
    /// Fractions of the equity peak
    pub max_drawdown_pct: f64,
    pub current_drawdown_pct: f64,
    pub avg_slippage_pct: f64,
    pub avg_gas_usd: f64,
    pub avg_latency_ms: f64,
    pub avg_competition_slippage_pct: f64,
    pub avg_abs_pnl: f64,
    /// Raw expectancy with average friction subtracted
    pub slippage_adjusted_expectancy: f64,
    pub recovery_factor: f64,
    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,
    /// Positive while winning, negative while losing
    pub current_streak: i32,
    pub projected_pnl_7d: f64,
}

impl RollingMetrics {
    pub fn layer(&self, layer: Layer) -> &LayerMetrics {
        match layer {
            Layer::Core => &self.core,
            Layer::Satellite => &self.satellite,
        }
    }
}

pub struct RollingPerformance;

impl RollingPerformance {
    /// Compute metrics over closed trades, oldest first, against the
    /// user's capital base.
    pub fn compute(trades: &[TradeRecord], capital: f64, window_days: i64) -> RollingMetrics {
        let closed: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.closed_at.is_some() && t.pnl_abs.is_some())
            .collect();

        if closed.is_empty() {
            return RollingMetrics {
                window_days,
                ..Default::default()
            };
        }

        let core = layer_metrics(&closed, Some(Layer::Core));
        let satellite = layer_metrics(&closed, Some(Layer::Satellite));
        let global = layer_metrics(&closed, None);

        // equity path for drawdown, in trade-close order
        let mut equity = capital.max(f64::MIN_POSITIVE);
        let mut peak = equity;
        let mut max_dd = 0.0f64;
        for trade in &closed {
            equity += trade.pnl_abs.unwrap_or(0.0);
            if equity > peak {
                peak = equity;
            }
            let dd = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };
            if dd > max_dd {
                max_dd = dd;
            }
        }
        let current_dd = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };

        // friction averages
        let n = closed.len() as f64;
        let avg_slippage = closed.iter().map(|t| t.slippage_simulated).sum::<f64>() / n;
        let avg_gas = closed.iter().map(|t| t.gas_simulated).sum::<f64>() / n;
        let avg_latency = closed.iter().map(|t| t.latency_ms as f64).sum::<f64>() / n;
        let avg_competition = closed
            .iter()
            .map(|t| {
                t.metadata
                    .get("competition_slippage_pct")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0)
            })
            .sum::<f64>()
            / n;
        let avg_abs_pnl = closed
            .iter()
            .map(|t| t.pnl_abs.unwrap_or(0.0).abs())
            .sum::<f64>()
            / n;

        let total_net: f64 = closed
            .iter()
            .map(|t| t.pnl_abs.unwrap_or(0.0) - t.fees_abs)
            .sum();

        let slippage_adjusted = global.expectancy - (avg_slippage * avg_abs_pnl + avg_gas);

        let recovery_factor = if max_dd > 0.0 {
            total_net / (max_dd * 100.0)
        } else {
            0.0
        };

        // streaks in close order
        let mut longest_win = 0u32;
        let mut longest_loss = 0u32;
        let mut run = 0i32;
        for trade in &closed {
            let win = trade.pnl_abs.unwrap_or(0.0) > 0.0;
            if win {
                run = if run > 0 { run + 1 } else { 1 };
                longest_win = longest_win.max(run as u32);
            } else {
                run = if run < 0 { run - 1 } else { -1 };
                longest_loss = longest_loss.max((-run) as u32);
            }
        }

        let daily_avg = total_net / window_days.max(1) as f64;

        RollingMetrics {
            window_days,
            total_trades: closed.len(),
            core,
            satellite,
            profit_factor: global.profit_factor,
            win_rate: global.win_rate,
            expectancy: global.expectancy,
            total_net_pnl: total_net,
            max_drawdown_pct: max_dd,
            current_drawdown_pct: current_dd,
            avg_slippage_pct: avg_slippage,
            avg_gas_usd: avg_gas,
            avg_latency_ms: avg_latency,
            avg_competition_slippage_pct: avg_competition,
            avg_abs_pnl,
            slippage_adjusted_expectancy: slippage_adjusted,
            recovery_factor,
            longest_win_streak: longest_win,
            longest_loss_streak: longest_loss,
            current_streak: run,
            projected_pnl_7d: daily_avg * 7.0,
        }
    }
}

fn layer_metrics(closed: &[&TradeRecord], layer: Option<Layer>) -> LayerMetrics {
    let trades: Vec<&&TradeRecord> = closed
        .iter()
        .filter(|t| layer.map(|l| t.layer == l).unwrap_or(true))
        .collect();

    if trades.is_empty() {
        return LayerMetrics::default();
    }

    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;
    let mut wins = 0usize;
    let mut win_sum = 0.0;
    let mut loss_sum = 0.0;
    let mut net_sum = 0.0;

    for trade in &trades {
        let pnl = trade.pnl_abs.unwrap_or(0.0);
        net_sum += pnl - trade.fees_abs;
        if pnl > 0.0 {
            wins += 1;
            gross_profit += pnl;
            win_sum += pnl;
        } else {
            gross_loss += pnl.abs();
            loss_sum += pnl.abs();
        }
    }

    let n = trades.len();
    let win_rate = wins as f64 / n as f64;
    let profit_factor = profit_factor(gross_profit, gross_loss);
    let avg_win = if wins > 0 { win_sum / wins as f64 } else { 0.0 };
    let losses = n - wins;
    let avg_loss = if losses > 0 {
        loss_sum / losses as f64
    } else {
        0.0
    };

    LayerMetrics {
        trades: n,
        wins,
        win_rate,
        profit_factor,
        expectancy: net_sum / n as f64,
        avg_win,
        avg_loss,
        kelly_fraction: kelly_fraction(win_rate, profit_factor),
    }
}

/// gross_profit / gross_loss with the documented special cases: zero
/// trades or all-zero pnl yields 0; profits with no losses cap at 10.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss <= 0.0 {
        if gross_profit > 0.0 {
            PF_NO_LOSS_CAP
        } else {
            0.0
        }
    } else {
        gross_profit / gross_loss
    }
}

/// Half-Kelly: 0.5 * (W - (1-W)/PF), floored at 0 and capped at 0.25.
pub fn kelly_fraction(win_rate: f64, profit_factor: f64) -> f64 {
    if profit_factor <= 0.0 {
        return 0.0;
    }
    (0.5 * (win_rate - (1.0 - win_rate) / profit_factor)).clamp(0.0, KELLY_CAP)
}
