//! Constant-product AMM slippage model
//!
//! The pool is modelled as a two-sided x*y=k AMM with half the effective
//! liquidity on each side. The quote reserve is denominated in USD, the base
//! reserve in tokens at the current price, so the mid price of the synthetic
//! pool equals the quoted market price.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::TradeSide;

/// Slippage saturates here when the pool cannot absorb the order.
pub const MAX_SLIPPAGE_PCT: f64 = 0.15;
/// Floor keeps fills from ever being friction-free.
pub const MIN_SLIPPAGE_PCT: f64 = 0.0001;
/// Returned when the pool data is unusable.
pub const DEGRADED_SLIPPAGE_PCT: f64 = 0.05;
/// Default AMM fee rate.
pub const DEFAULT_FEE_RATE: f64 = 0.003;

#[derive(Debug, Clone)]
pub struct SlippageInput {
    pub size_usd: f64,
    pub pool_liquidity_usd: f64,
    pub current_price: f64,
    pub side: TradeSide,
    pub fee_rate: f64,
    /// >= 1; concentrated pools behave as if they held more liquidity
    pub concentration_factor: f64,
}

impl SlippageInput {
    pub fn new(size_usd: f64, pool_liquidity_usd: f64, current_price: f64, side: TradeSide) -> Self {
        Self {
            size_usd,
            pool_liquidity_usd,
            current_price,
            side,
            fee_rate: DEFAULT_FEE_RATE,
            concentration_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageEstimate {
    /// Total slippage including the fee, clamped to [0.0001, 0.15]
    pub slippage_pct: f64,
    /// Execution price implied by the pool after the swap
    pub effective_price: f64,
    /// Pure price impact before fee and noise
    pub price_impact_pct: f64,
    pub fee_rate: f64,
    /// True when the inputs were unusable and a fixed estimate was returned
    pub degraded: bool,
}

/// Estimate slippage for a swap against a constant-product pool.
pub fn estimate_slippage<R: Rng + ?Sized>(input: &SlippageInput, rng: &mut R) -> SlippageEstimate {
    let fee = input.fee_rate;

    if input.pool_liquidity_usd <= 0.0 || input.current_price <= 0.0 {
        let signed = directional(input.side, DEGRADED_SLIPPAGE_PCT);
        return SlippageEstimate {
            slippage_pct: DEGRADED_SLIPPAGE_PCT,
            effective_price: (input.current_price.max(0.0)) * (1.0 + signed),
            price_impact_pct: DEGRADED_SLIPPAGE_PCT,
            fee_rate: fee,
            degraded: true,
        };
    }

    let reserve_usd = input.pool_liquidity_usd * input.concentration_factor.max(1.0) / 2.0;
    let reserve_quote = reserve_usd;
    let reserve_base = reserve_usd / input.current_price;
    let k = reserve_quote * reserve_base;
    let mid = reserve_quote / reserve_base; // == current_price

    let (price_impact, effective_price, out_ok) = match input.side {
        TradeSide::Buy => {
            let amount_in = input.size_usd * (1.0 - fee);
            let new_quote = reserve_quote + amount_in;
            let new_base = k / new_quote;
            let out = reserve_base - new_base;
            if out <= 0.0 {
                (MAX_SLIPPAGE_PCT, input.current_price * (1.0 + MAX_SLIPPAGE_PCT), false)
            } else {
                let effective = amount_in / out;
                ((effective - mid) / mid, effective, true)
            }
        }
        TradeSide::Sell => {
            let tokens = input.size_usd / input.current_price;
            let amount_in = tokens * (1.0 - fee);
            let new_base = reserve_base + amount_in;
            let new_quote = k / new_base;
            let out = reserve_quote - new_quote;
            if out <= 0.0 {
                (MAX_SLIPPAGE_PCT, input.current_price * (1.0 - MAX_SLIPPAGE_PCT), false)
            } else {
                let effective = out / amount_in;
                ((mid - effective) / mid, effective, true)
            }
        }
    };

    if !out_ok {
        return SlippageEstimate {
            slippage_pct: MAX_SLIPPAGE_PCT,
            effective_price,
            price_impact_pct: MAX_SLIPPAGE_PCT,
            fee_rate: fee,
            degraded: true,
        };
    }

    let noise = rng.gen_range(0.0..0.0005);
    let slippage_pct = (price_impact + fee + noise).clamp(MIN_SLIPPAGE_PCT, MAX_SLIPPAGE_PCT);

    SlippageEstimate {
        slippage_pct,
        effective_price,
        price_impact_pct: price_impact,
        fee_rate: fee,
        degraded: false,
    }
}

fn directional(side: TradeSide, magnitude: f64) -> f64 {
    match side {
        TradeSide::Buy => magnitude,
        TradeSide::Sell => -magnitude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn test_small_order_in_deep_pool_is_cheap() {
        let input = SlippageInput::new(100.0, 5_000_000.0, 1.0, TradeSide::Buy);
        let est = estimate_slippage(&input, &mut rng());

        assert!(!est.degraded);
        // dominated by the 30bps fee
        assert!(est.slippage_pct >= DEFAULT_FEE_RATE);
        assert!(est.slippage_pct < 0.005);
        assert!(est.effective_price > 1.0);
    }

    #[test]
    fn test_large_order_moves_the_pool() {
        let small = SlippageInput::new(100.0, 100_000.0, 1.0, TradeSide::Buy);
        let large = SlippageInput::new(10_000.0, 100_000.0, 1.0, TradeSide::Buy);

        let est_small = estimate_slippage(&small, &mut rng());
        let est_large = estimate_slippage(&large, &mut rng());

        assert!(est_large.slippage_pct > est_small.slippage_pct);
        assert!(est_large.price_impact_pct > 0.1);
    }

    #[test]
    fn test_sell_side_prices_below_mid() {
        let input = SlippageInput::new(5_000.0, 100_000.0, 2.0, TradeSide::Sell);
        let est = estimate_slippage(&input, &mut rng());

        assert!(est.effective_price < 2.0);
        assert!(est.price_impact_pct > 0.0);
    }

    #[test]
    fn test_degraded_pool_inputs() {
        let no_liq = SlippageInput::new(500.0, 0.0, 1.0, TradeSide::Buy);
        let est = estimate_slippage(&no_liq, &mut rng());
        assert!(est.degraded);
        assert_eq!(est.slippage_pct, DEGRADED_SLIPPAGE_PCT);

        let no_price = SlippageInput::new(500.0, 50_000.0, 0.0, TradeSide::Sell);
        let est = estimate_slippage(&no_price, &mut rng());
        assert!(est.degraded);
        assert_eq!(est.slippage_pct, DEGRADED_SLIPPAGE_PCT);
    }

    #[test]
    fn test_slippage_always_within_bounds() {
        let mut r = rng();
        for (size, liq) in [
            (1.0, 1_000_000.0),
            (50_000.0, 60_000.0),
            (250_000.0, 50_000.0),
            (10.0, 1_000.0),
        ] {
            for side in [TradeSide::Buy, TradeSide::Sell] {
                let input = SlippageInput::new(size, liq, 0.5, side);
                let est = estimate_slippage(&input, &mut r);
                assert!(
                    (MIN_SLIPPAGE_PCT..=MAX_SLIPPAGE_PCT).contains(&est.slippage_pct),
                    "slippage {} out of bounds for size {} liq {}",
                    est.slippage_pct,
                    size,
                    liq
                );
            }
        }
    }

    #[test]
    fn test_concentration_reduces_impact() {
        let base = SlippageInput::new(5_000.0, 100_000.0, 1.0, TradeSide::Buy);
        let concentrated = SlippageInput {
            concentration_factor: 4.0,
            ..base.clone()
        };

        let est_base = estimate_slippage(&base, &mut rng());
        let est_conc = estimate_slippage(&concentrated, &mut rng());

        assert!(est_conc.price_impact_pct < est_base.price_impact_pct);
    }
}
