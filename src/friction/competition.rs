//! Competition / MEV friction model
//!
//! Larger, more visible orders on busier chains attract sandwich and
//! backrun flow. Base risk is a per-network constant scaled by how visible
//! the order is relative to pool depth and by bot density inferred from
//! volume.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Base MEV risk per network. Ethereum public mempool is the worst case,
/// Solana's leader schedule the mildest.
pub fn base_mev_risk(network: &str) -> f64 {
    match network {
        "ethereum" => 0.35,
        "bsc" => 0.20,
        "base" => 0.15,
        "arbitrum" => 0.10,
        "polygon" => 0.08,
        "solana" => 0.05,
        _ => 0.10,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionResult {
    pub frontrun: bool,
    pub backrun: bool,
    /// Additional slippage caused by competing flow
    pub extra_slippage_pct: f64,
    pub frontrun_probability: f64,
    pub backrun_probability: f64,
}

/// Roll for competition effects on an order.
pub fn competition_slippage<R: Rng + ?Sized>(
    network: &str,
    position_usd: f64,
    pool_liquidity_usd: f64,
    volume_24h: f64,
    rng: &mut R,
) -> CompetitionResult {
    let base = base_mev_risk(network);

    let size_visibility = if pool_liquidity_usd > 0.0 {
        (position_usd / (pool_liquidity_usd * 0.01)).min(1.0)
    } else {
        1.0
    };
    let bot_density = (volume_24h / 1_000_000.0).min(1.0) * 0.3;

    let frontrun_probability = base * size_visibility;
    let backrun_probability = base * bot_density * 0.5;

    let frontrun = rng.gen::<f64>() < frontrun_probability;
    let backrun = rng.gen::<f64>() < backrun_probability;

    let mut extra = 0.0;
    if frontrun {
        extra += rng.gen_range(0.002..0.010);
    }
    if backrun {
        extra += rng.gen_range(0.001..0.004);
    }

    CompetitionResult {
        frontrun,
        backrun,
        extra_slippage_pct: extra,
        frontrun_probability,
        backrun_probability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_network_risk_ordering() {
        assert!(base_mev_risk("ethereum") > base_mev_risk("base"));
        assert!(base_mev_risk("base") > base_mev_risk("solana"));
        assert_eq!(base_mev_risk("unknown-chain"), 0.10);
    }

    #[test]
    fn test_invisible_order_is_rarely_hit() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut hits = 0;
        for _ in 0..1000 {
            // $10 order in a $1M pool: visibility ~0.001
            let result = competition_slippage("ethereum", 10.0, 1_000_000.0, 0.0, &mut rng);
            if result.frontrun {
                hits += 1;
            }
        }
        // frontrun probability 0.35 * 0.001 = 0.035%
        assert!(hits < 10);
    }

    #[test]
    fn test_visible_order_on_ethereum_gets_hit() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut hits = 0;
        for _ in 0..1000 {
            // order equal to 1% of the pool: visibility saturates at 1
            let result = competition_slippage("ethereum", 1_000.0, 100_000.0, 5_000_000.0, &mut rng);
            assert!((result.frontrun_probability - 0.35).abs() < 1e-9);
            if result.frontrun {
                hits += 1;
            }
        }
        // expect roughly 350 of 1000
        assert!(hits > 250 && hits < 450, "hits = {}", hits);
    }

    #[test]
    fn test_extra_slippage_bounds() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..1000 {
            let result =
                competition_slippage("ethereum", 1_000.0, 100_000.0, 10_000_000.0, &mut rng);
            // worst case: frontrun 0.010 + backrun 0.004
            assert!(result.extra_slippage_pct >= 0.0);
            assert!(result.extra_slippage_pct < 0.014);
        }
    }

    #[test]
    fn test_zero_liquidity_counts_as_fully_visible() {
        let mut rng = StdRng::seed_from_u64(3);
        let result = competition_slippage("solana", 500.0, 0.0, 0.0, &mut rng);
        assert!((result.frontrun_probability - base_mev_risk("solana")).abs() < 1e-9);
    }
}
