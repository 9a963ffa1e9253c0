//! Micro-volatility model
//!
//! Prices drift during the simulated order latency. Modelled as driftless
//! GBM over the latency window with a Box-Muller standard normal draw.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Annualised volatility bounds when estimating from a 1h price change.
const SIGMA_MIN: f64 = 0.5;
const SIGMA_MAX: f64 = 20.0;
/// Hours in a trading year for the dt conversion.
const HOURS_PER_YEAR: f64 = 8760.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityResult {
    pub adjusted_price: f64,
    /// Signed fractional move applied to the price
    pub noise_pct: f64,
    /// Annualised sigma actually used
    pub sigma: f64,
}

/// Apply latency noise to a price.
///
/// `sigma_annual` overrides the estimate; otherwise sigma is derived from
/// the absolute 1h price change (percent) scaled to annual terms and clamped
/// to [0.5, 20]. The adjusted price never drops below half the input price.
pub fn micro_volatility<R: Rng + ?Sized>(
    price: f64,
    latency_ms: u64,
    sigma_annual: Option<f64>,
    price_change_1h_pct: f64,
    rng: &mut R,
) -> VolatilityResult {
    let sigma = sigma_annual
        .unwrap_or_else(|| {
            ((price_change_1h_pct / 100.0).abs() * (24.0 * 365.0f64).sqrt())
                .clamp(SIGMA_MIN, SIGMA_MAX)
        })
        .clamp(SIGMA_MIN, SIGMA_MAX);

    let dt_years = latency_ms as f64 / 3_600_000.0 / HOURS_PER_YEAR;
    let z = box_muller(rng);

    // driftless GBM: mu * dt + sigma * sqrt(dt) * Z with mu = 0
    let noise_pct = sigma * dt_years.sqrt() * z;
    let adjusted_price = (price * (1.0 + noise_pct)).max(price * 0.5);

    VolatilityResult {
        adjusted_price,
        noise_pct,
        sigma,
    }
}

/// Standard normal draw via Box-Muller.
pub fn box_muller<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
