//! Cancellation registry
//!
//! Records which sessions were cancelled by the user or finished normally.
//! The scheduler consults it before admitting, dequeuing, and resolving work;
//! in-flight operations observe it through a per-session cancellation token.

mod config;
mod registry;

use std::sync::{Arc, Mutex, PoisonError};

pub use config::CancellationConfig;
pub use registry::{CancelOutcome, CancelReason, CancellationRegistry};

/// Registry shared between the scheduler task and its handles
///
/// Handles need a synchronous `is_cancelled` check, so the registry lives
/// behind a mutex instead of inside the scheduler task.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<CancellationRegistry>>,
}

impl SharedRegistry {
    pub fn new(config: CancellationConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CancellationRegistry::new(config))),
        }
    }

    /// Run a closure with exclusive access to the registry
    pub fn with<R>(&self, f: impl FnOnce(&mut CancellationRegistry) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.with(|reg| reg.is_cancelled(session_id))
    }
}
