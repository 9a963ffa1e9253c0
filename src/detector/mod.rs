//! Signal detectors over the discovery feeds
//!
//! The momentum detector scores trending pools for continuation; the early
//! detector scores freshly created pools for organic traction. Both emit
//! ranked signals above a calibrator-controlled threshold.

pub mod early;
pub mod momentum;

pub use early::{EarlyDetector, EarlySignal, EarlyTier};
pub use momentum::{MomentumDetector, MomentumSignal, MomentumTier};
