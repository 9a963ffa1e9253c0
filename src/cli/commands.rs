//! CLI command implementations

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::CycleEngine;
use crate::forecast::ForwardPredictor;
use crate::market::{DexScreenerClient, GeckoTerminalClient, SentimentClient};
use crate::perf::RollingPerformance;
use crate::storage::{MemoryStore, Storage};
use crate::types::CycleResult;

/// Process exit codes: 0 success, 1 partial failure, 2 configuration,
/// 3 storage unavailable, 4 all external feeds failed.
pub const EXIT_OK: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_STORAGE: i32 = 3;
pub const EXIT_FEEDS: i32 = 4;

/// Wire the storage and HTTP clients into a cycle engine.
pub async fn build_engine(config: &Config) -> std::result::Result<(Arc<MemoryStore>, CycleEngine), i32> {
    let store = Arc::new(match &config.storage.snapshot_path {
        Some(path) => MemoryStore::with_snapshot_path(path),
        None => MemoryStore::new(),
    });
    if let Err(e) = store.load().await {
        error!(error = %e, "storage snapshot load failed");
        return Err(EXIT_STORAGE);
    }

    let pool_feed = Arc::new(GeckoTerminalClient::new(&config.feeds));
    let pairs = Arc::new(DexScreenerClient::new(&config.feeds));
    let sentiment = Arc::new(SentimentClient::new(&config.feeds));

    let engine = CycleEngine::new(
        config.clone(),
        store.clone(),
        pool_feed,
        pairs,
        sentiment,
        None,
    );
    Ok((store, engine))
}

/// Map a batch of cycle results to a process exit code.
pub fn exit_code_for(results: &[CycleResult]) -> i32 {
    if results.is_empty() {
        return EXIT_OK;
    }

    // every cycle saw zero pools and at least one feed error: nothing was
    // discoverable anywhere, which is its own failure mode
    let all_feeds_dark = results.iter().all(|r| {
        r.trending_scanned == 0
            && r.new_scanned == 0
            && r.errors.iter().any(|e| e.contains("feed"))
    });
    if all_feeds_dark {
        return EXIT_FEEDS;
    }

    if results.iter().any(|r| !r.errors.is_empty()) {
        return EXIT_PARTIAL;
    }
    EXIT_OK
}

/// Run one cycle across all configured users and exit.
pub async fn cycle(config: &Config) -> i32 {
    let (store, engine) = match build_engine(config).await {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    let results = engine.run_all(CancellationToken::new()).await;
    for result in &results {
        print_result(result);
    }
    if let Err(e) = store.save().await {
        warn!(error = %e, "snapshot save failed");
    }
    exit_code_for(&results)
}

/// Run cycles on the configured interval until interrupted.
pub async fn run(config: &Config) -> i32 {
    let (store, engine) = match build_engine(config).await {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling after the current phase");
            ctrl_c_cancel.cancel();
        }
    });

    let interval = std::time::Duration::from_secs(config.engine.cycle_interval_minutes * 60);
    let mut last_code = EXIT_OK;

    loop {
        let results = engine.run_all(cancel.clone()).await;
        for result in &results {
            print_result(result);
        }
        if let Err(e) = store.save().await {
            warn!(error = %e, "snapshot save failed");
        }
        last_code = exit_code_for(&results);

        if cancel.is_cancelled() {
            info!("engine stopped");
            return last_code;
        }

        info!(
            minutes = config.engine.cycle_interval_minutes,
            "sleeping until next cycle"
        );
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                info!("engine stopped");
                return last_code;
            }
        }
    }
}

/// Print open positions and rolling performance per user.
pub async fn status(config: &Config) -> i32 {
    let (store, _engine) = match build_engine(config).await {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    for user in &config.engine.users {
        println!("== {}", user);

        match store.risk_state(user).await {
            Ok(Some(state)) => {
                println!(
                    "  capital ${:.2} | today {:+.2} | week {:+.2} | paused: {}",
                    state.capital, state.pnl_today, state.pnl_this_week, state.is_paused
                );
            }
            Ok(None) => println!("  no risk state yet"),
            Err(e) => println!("  risk state unavailable: {}", e),
        }

        match store.open_trades(user).await {
            Ok(open) => {
                println!("  {} open position(s)", open.len());
                for trade in open {
                    println!(
                        "    {} {} {} qty {:.4} @ {:.6} since {}",
                        trade.layer,
                        trade.symbol,
                        trade.network,
                        trade.quantity,
                        trade.entry_price,
                        trade.entered_at.format("%Y-%m-%d %H:%M"),
                    );
                }
            }
            Err(e) => println!("  open positions unavailable: {}", e),
        }

        let since = Utc::now() - Duration::days(30);
        if let Ok(closed) = store.closed_trades_since(user, since).await {
            let capital = store
                .risk_state(user)
                .await
                .ok()
                .flatten()
                .map(|s| s.capital)
                .unwrap_or(config.engine.bootstrap_capital_usd);
            let metrics = RollingPerformance::compute(&closed, capital, 30);
            println!(
                "  30d: {} trades | PF {:.2} | win {:.0}% | expectancy {:+.2} | max DD {:.1}%",
                metrics.total_trades,
                metrics.profit_factor,
                metrics.win_rate * 100.0,
                metrics.expectancy,
                metrics.max_drawdown_pct * 100.0,
            );
        }
    }

    EXIT_OK
}

/// Print the Monte Carlo forward prediction for one user.
pub async fn forecast(config: &Config, user: &str, window_days: i64) -> i32 {
    let (store, _engine) = match build_engine(config).await {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    let capital = store
        .risk_state(user)
        .await
        .ok()
        .flatten()
        .map(|s| s.capital)
        .unwrap_or(config.engine.bootstrap_capital_usd);

    let since = Utc::now() - Duration::days(30);
    let trades = match store.closed_trades_since(user, since).await {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "trade history unavailable");
            return EXIT_STORAGE;
        }
    };

    let metrics = RollingPerformance::compute(&trades, capital, 30);
    let predictor = ForwardPredictor::new(config.monte_carlo.clone());
    let mut rng = StdRng::from_entropy();
    let forecast = predictor.run(&metrics, capital, window_days, &mut rng);

    println!(
        "{}d forecast over {} sims ({} trades/path, win prob {:.0}%)",
        forecast.window_days,
        forecast.simulations,
        forecast.trades_per_path,
        forecast.win_probability * 100.0
    );
    println!(
        "  pnl percentiles: P10 {:+.2} | P25 {:+.2} | P50 {:+.2} | P75 {:+.2} | P90 {:+.2}",
        forecast.percentiles.p10,
        forecast.percentiles.p25,
        forecast.percentiles.p50,
        forecast.percentiles.p75,
        forecast.percentiles.p90,
    );
    println!(
        "  P(pnl>0) {:.1}% | P(2x daily target) {:.1}% | P(DD>5%) {:.1}% | P(DD>10%) {:.1}% | ruin {:.2}%",
        forecast.prob_positive_pnl * 100.0,
        forecast.prob_double_daily_target * 100.0,
        forecast.prob_drawdown_over_5pct * 100.0,
        forecast.prob_drawdown_over_10pct * 100.0,
        forecast.risk_of_ruin_5pct * 100.0,
    );

    EXIT_OK
}

/// Show the loaded configuration with secrets masked.
pub fn show_config(config: &Config) -> Result<()> {
    print!("{}", config.display_masked());
    Ok(())
}

fn print_result(result: &CycleResult) {
    println!(
        "[{}] user={} regime={} scanned={}/{} signals={} opened={} closed={} outcomes={} errors={}",
        result.timestamp.format("%H:%M:%S"),
        result.user_id,
        result.regime,
        result.trending_scanned,
        result.new_scanned,
        result.signals_evaluated,
        result.trades_opened,
        result.trades_closed,
        result.outcomes_updated,
        result.errors.len(),
    );
    for error in &result.errors {
        println!("    ! {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketRegime;

    fn result(trending: usize, fresh: usize, errors: Vec<&str>) -> CycleResult {
        let mut r = CycleResult::empty("u1", Utc::now());
        r.regime = MarketRegime::Neutral;
        r.trending_scanned = trending;
        r.new_scanned = fresh;
        r.errors = errors.into_iter().map(String::from).collect();
        r
    }

    #[test]
    fn test_exit_code_clean_run() {
        assert_eq!(exit_code_for(&[result(5, 3, vec![])]), EXIT_OK);
    }

    #[test]
    fn test_exit_code_partial_failure() {
        assert_eq!(
            exit_code_for(&[result(5, 3, vec!["health 0xtoke: timeout"])]),
            EXIT_PARTIAL
        );
    }

    #[test]
    fn test_exit_code_all_feeds_dark() {
        let results = vec![
            result(0, 0, vec!["trending feed ethereum: HTTP 503"]),
            result(0, 0, vec!["new-pool feed base: HTTP 503"]),
        ];
        assert_eq!(exit_code_for(&results), EXIT_FEEDS);
    }

    #[test]
    fn test_exit_code_feeds_partially_up() {
        // one user still saw pools: not a feeds-dark situation
        let results = vec![
            result(0, 0, vec!["trending feed ethereum: HTTP 503"]),
            result(4, 0, vec![]),
        ];
        assert_eq!(exit_code_for(&results), EXIT_PARTIAL);
    }
}
