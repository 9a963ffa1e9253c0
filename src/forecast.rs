//! Forward predictor
//!
//! Monte Carlo over the observed trade distribution. Wins and losses are
//! drawn from Student-t(df=3) around the rolling averages - fat tails on
//! purpose, DEX token pnl is nothing like normal - with average friction
//! subtracted per trade. Per path we track terminal pnl, peak drawdown and
//! the worst loss streak.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::MonteCarloConfig;
use crate::friction::volatility::box_muller;
use crate::perf::RollingMetrics;

/// Degrees of freedom for the magnitude distribution.
const STUDENT_T_DF: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPercentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub window_days: i64,
    pub simulations: usize,
    pub trades_per_path: usize,
    pub win_probability: f64,
    pub percentiles: ForecastPercentiles,
    pub prob_positive_pnl: f64,
    pub prob_double_daily_target: f64,
    pub prob_drawdown_over_5pct: f64,
    pub prob_drawdown_over_10pct: f64,
    pub prob_loss_streak_over_5: f64,
    pub risk_of_ruin_5pct: f64,
}

pub struct ForwardPredictor {
    config: MonteCarloConfig,
}

impl ForwardPredictor {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self { config }
    }

    /// Run the simulation for one window against the rolling metrics.
    pub fn run<R: Rng + ?Sized>(
        &self,
        metrics: &RollingMetrics,
        capital: f64,
        window_days: i64,
        rng: &mut R,
    ) -> Forecast {
        let sims = self.config.simulations.max(1);
        let trades_per_path = (window_days.max(1) as usize) * self.config.trades_per_day.max(1);

        let win_probability =
            ((metrics.core.win_rate + metrics.satellite.win_rate) / 2.0).clamp(0.1, 0.9);

        // blended magnitudes; fall back to modest defaults on an empty book
        let avg_win = blended(metrics.core.avg_win, metrics.satellite.avg_win).max(1.0);
        let avg_loss = blended(metrics.core.avg_loss, metrics.satellite.avg_loss).max(1.0);

        let daily_target = capital * self.config.daily_target_pct;
        let double_target = 2.0 * daily_target * window_days as f64;
        let ruin_floor = capital * 0.95;

        let mut finals = Vec::with_capacity(sims);
        let mut dd_over_5 = 0usize;
        let mut dd_over_10 = 0usize;
        let mut streak_over_5 = 0usize;
        let mut ruined = 0usize;
        let mut positive = 0usize;
        let mut doubled = 0usize;

        for _ in 0..sims {
            let mut equity = capital;
            let mut peak = capital;
            let mut max_dd = 0.0f64;
            let mut loss_streak = 0u32;
            let mut worst_streak = 0u32;
            let mut path_ruined = false;

            for _ in 0..trades_per_path {
                let is_win = rng.gen::<f64>() < win_probability;
                let t = student_t(rng);

                let pnl = if is_win {
                    (avg_win + t * 0.6 * avg_win).max(0.0)
                } else {
                    -(avg_loss + t * 0.5 * avg_loss).max(0.0)
                };
                let friction = metrics.avg_slippage_pct * pnl.abs() + metrics.avg_gas_usd;
                let net = pnl - friction;

                equity += net;
                if equity > peak {
                    peak = equity;
                }
                let dd = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };
                if dd > max_dd {
                    max_dd = dd;
                }
                if equity <= ruin_floor {
                    path_ruined = true;
                }

                if net < 0.0 {
                    loss_streak += 1;
                    worst_streak = worst_streak.max(loss_streak);
                } else {
                    loss_streak = 0;
                }
            }

            let final_pnl = equity - capital;
            finals.push(final_pnl);

            if final_pnl > 0.0 {
                positive += 1;
            }
            if final_pnl >= double_target {
                doubled += 1;
            }
            if max_dd > 0.05 {
                dd_over_5 += 1;
            }
            if max_dd > 0.10 {
                dd_over_10 += 1;
            }
            if worst_streak > 5 {
                streak_over_5 += 1;
            }
            if path_ruined {
                ruined += 1;
            }
        }

        finals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sims as f64;

        Forecast {
            window_days,
            simulations: sims,
            trades_per_path,
            win_probability,
            percentiles: ForecastPercentiles {
                p10: percentile(&finals, 0.10),
                p25: percentile(&finals, 0.25),
                p50: percentile(&finals, 0.50),
                p75: percentile(&finals, 0.75),
                p90: percentile(&finals, 0.90),
            },
            prob_positive_pnl: positive as f64 / n,
            prob_double_daily_target: doubled as f64 / n,
            prob_drawdown_over_5pct: dd_over_5 as f64 / n,
            prob_drawdown_over_10pct: dd_over_10 as f64 / n,
            prob_loss_streak_over_5: streak_over_5 as f64 / n,
            risk_of_ruin_5pct: ruined as f64 / n,
        }
    }
}

fn blended(core: f64, satellite: f64) -> f64 {
    match (core > 0.0, satellite > 0.0) {
        (true, true) => (core + satellite) / 2.0,
        (true, false) => core,
        (false, true) => satellite,
        (false, false) => 0.0,
    }
}

/// Student-t draw with df=3: standard normal over sqrt(chi-squared / df).
fn student_t<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let z = box_muller(rng);
    let chi2: f64 = (0..STUDENT_T_DF).map(|_| box_muller(rng).powi(2)).sum();
    z / (chi2 / STUDENT_T_DF as f64).sqrt()
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perf::LayerMetrics;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn metrics(win_rate: f64, avg_win: f64, avg_loss: f64) -> RollingMetrics {
        RollingMetrics {
            window_days: 30,
            total_trades: 40,
            core: LayerMetrics {
                trades: 25,
                win_rate,
                avg_win,
                avg_loss,
                profit_factor: 1.6,
                ..Default::default()
            },
            satellite: LayerMetrics {
                trades: 15,
                win_rate,
                avg_win,
                avg_loss,
                profit_factor: 1.6,
                ..Default::default()
            },
            avg_slippage_pct: 0.004,
            avg_gas_usd: 0.05,
            ..Default::default()
        }
    }

    #[test]
    fn test_profitable_edge_forecasts_positive() {
        // scenario: avg_win 5, avg_loss 3, win rate 0.55, capital 10k,
        // 5000 sims over 7d -> prob positive above 60%, ruin below 2%
        let predictor = ForwardPredictor::new(MonteCarloConfig::default());
        let mut rng = StdRng::seed_from_u64(0);

        let forecast = predictor.run(&metrics(0.55, 5.0, 3.0), 10_000.0, 7, &mut rng);

        assert_eq!(forecast.simulations, 5000);
        assert_eq!(forecast.trades_per_path, 21);
        assert!(
            forecast.prob_positive_pnl > 0.60,
            "prob_positive = {}",
            forecast.prob_positive_pnl
        );
        assert!(
            forecast.risk_of_ruin_5pct < 0.02,
            "ruin = {}",
            forecast.risk_of_ruin_5pct
        );
    }

    #[test]
    fn test_losing_edge_forecasts_negative() {
        let predictor = ForwardPredictor::new(MonteCarloConfig::default());
        let mut rng = StdRng::seed_from_u64(1);

        let forecast = predictor.run(&metrics(0.30, 3.0, 6.0), 10_000.0, 7, &mut rng);
        assert!(forecast.prob_positive_pnl < 0.30);
        assert!(forecast.percentiles.p50 < 0.0);
    }

    #[test]
    fn test_percentiles_are_ordered() {
        let predictor = ForwardPredictor::new(MonteCarloConfig::default());
        let mut rng = StdRng::seed_from_u64(2);

        let f = predictor.run(&metrics(0.5, 4.0, 4.0), 10_000.0, 30, &mut rng);
        let p = &f.percentiles;
        assert!(p.p10 <= p.p25);
        assert!(p.p25 <= p.p50);
        assert!(p.p50 <= p.p75);
        assert!(p.p75 <= p.p90);
    }

    #[test]
    fn test_win_probability_clamped() {
        let predictor = ForwardPredictor::new(MonteCarloConfig {
            simulations: 10,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(3);

        let all_wins = predictor.run(&metrics(1.0, 5.0, 3.0), 10_000.0, 7, &mut rng);
        assert_eq!(all_wins.win_probability, 0.9);

        let all_losses = predictor.run(&metrics(0.0, 5.0, 3.0), 10_000.0, 7, &mut rng);
        assert_eq!(all_losses.win_probability, 0.1);
    }

    #[test]
    fn test_seeded_run_is_reproducible() {
        let predictor = ForwardPredictor::new(MonteCarloConfig {
            simulations: 200,
            ..Default::default()
        });

        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let fa = predictor.run(&metrics(0.55, 5.0, 3.0), 10_000.0, 7, &mut a);
        let fb = predictor.run(&metrics(0.55, 5.0, 3.0), 10_000.0, 7, &mut b);

        assert_eq!(fa.percentiles.p50, fb.percentiles.p50);
        assert_eq!(fa.prob_positive_pnl, fb.prob_positive_pnl);
    }

    #[test]
    fn test_student_t_is_fat_tailed() {
        let mut rng = StdRng::seed_from_u64(4);
        let n = 50_000;
        let mut extreme = 0;
        for _ in 0..n {
            if student_t(&mut rng).abs() > 3.0 {
                extreme += 1;
            }
        }
        // normal leaves ~0.27% beyond 3 sigma; t(3) leaves ~5.8%
        let rate = extreme as f64 / n as f64;
        assert!(rate > 0.02, "tail rate {} too thin for t(3)", rate);
    }

    #[test]
    fn test_empty_history_uses_floor_magnitudes() {
        let predictor = ForwardPredictor::new(MonteCarloConfig {
            simulations: 50,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(5);
        let f = predictor.run(&RollingMetrics::default(), 10_000.0, 7, &mut rng);
        // win probability floors at 0.1 and magnitudes at 1.0; it runs
        assert_eq!(f.win_probability, 0.1);
        assert_eq!(f.trades_per_path, 21);
    }
}
