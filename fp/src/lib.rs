//! farepacer - fair, adaptively paced fare-quote scheduling
//!
//! Many user sessions share one rate-limited fare provider. Each session's
//! queries go through a [`service::FareService`], which answers from the
//! [`cache::ResultCache`] when it can and otherwise submits the fetch to the
//! [`scheduler::Scheduler`]. The scheduler serves sessions round-robin,
//! spaces call starts using the adaptive [`rate::RateController`], retries
//! throttled calls with backoff, and drops work for sessions recorded in the
//! [`cancel`] registry.

pub mod cache;
pub mod cancel;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod rate;
pub mod scheduler;
pub mod service;
pub mod simulate;

pub use config::Config;
pub use error::SchedulerError;
