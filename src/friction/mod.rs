//! Friction models for the simulated execution layer
//!
//! Everything here is a pure function of its inputs plus a caller-supplied
//! random source, so tests can pin a seeded `StdRng` and get byte-identical
//! fills.

pub mod competition;
pub mod slippage;
pub mod stress;
pub mod volatility;

pub use competition::{competition_slippage, CompetitionResult};
pub use slippage::{estimate_slippage, SlippageEstimate, SlippageInput};
pub use stress::{roll_stress_event, StressContext, StressEvent, StressKind};
pub use volatility::{micro_volatility, VolatilityResult};
