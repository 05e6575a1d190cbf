//! Adaptive rate controller
//!
//! Paces upstream call starts. Two control loops feed the same interval:
//! a proactive one driven by rolling call-start windows, and a reactive one
//! driven by explicit throttle/success feedback from completed calls.

mod config;
mod controller;

pub use config::PacingConfig;
pub use controller::{PacingTier, RateController};
