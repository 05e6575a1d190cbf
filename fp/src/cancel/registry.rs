//! Registry of cancelled and completed sessions

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::CancellationConfig;

/// Why a session stopped accepting work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// The user navigated away or explicitly stopped the search
    UserCancelled(String),

    /// The session's work finished normally
    Completed,
}

impl CancelReason {
    pub fn user(reason: impl Into<String>) -> Self {
        CancelReason::UserCancelled(reason.into())
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, CancelReason::Completed)
    }
}

impl From<&str> for CancelReason {
    fn from(reason: &str) -> Self {
        if reason.eq_ignore_ascii_case("completed") {
            CancelReason::Completed
        } else {
            CancelReason::UserCancelled(reason.to_string())
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::UserCancelled(reason) => write!(f, "{}", reason),
            CancelReason::Completed => write!(f, "completed"),
        }
    }
}

/// Result of registering a cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Newly cancelled by the user
    Cancelled,

    /// Newly marked as completed
    Completed,

    /// Already cancelled by the user; nothing changed
    AlreadyCancelled,

    /// Already completed; later signals are ignored
    AlreadyCompleted,
}

impl CancelOutcome {
    /// Whether this call changed the registry
    pub fn is_new(&self) -> bool {
        matches!(self, CancelOutcome::Cancelled | CancelOutcome::Completed)
    }
}

#[derive(Debug)]
struct CancelEntry {
    reason: CancelReason,
    expires_at: Instant,
}

/// Tracks which sessions are cancelled or completed.
///
/// Entries are monotonic while they live: a registered session cannot be
/// un-cancelled, only expire once its retention window passes. Each live
/// session also owns a [`CancellationToken`] handed to its in-flight work.
#[derive(Debug)]
pub struct CancellationRegistry {
    config: CancellationConfig,
    entries: HashMap<String, CancelEntry>,
    tokens: HashMap<String, CancellationToken>,
}

impl CancellationRegistry {
    pub fn new(config: CancellationConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            tokens: HashMap::new(),
        }
    }

    /// Register a cancellation. Idempotent: a session already present keeps
    /// its original reason and expiry.
    pub fn cancel(&mut self, session_id: &str, reason: CancelReason, now: Instant) -> CancelOutcome {
        debug!(%session_id, %reason, "CancellationRegistry::cancel: called");
        if let Some(existing) = self.entries.get(session_id) {
            return if existing.reason.is_completion() {
                CancelOutcome::AlreadyCompleted
            } else {
                CancelOutcome::AlreadyCancelled
            };
        }

        let outcome = if reason.is_completion() {
            CancelOutcome::Completed
        } else {
            CancelOutcome::Cancelled
        };
        let expires_at = now + self.expiry_for(&reason);
        self.entries
            .insert(session_id.to_string(), CancelEntry { reason, expires_at });

        if let Some(token) = self.tokens.remove(session_id) {
            token.cancel();
        }
        outcome
    }

    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }

    pub fn reason(&self, session_id: &str) -> Option<&CancelReason> {
        self.entries.get(session_id).map(|e| &e.reason)
    }

    /// Retention window for a given reason
    pub fn expiry_for(&self, reason: &CancelReason) -> Duration {
        match reason {
            CancelReason::UserCancelled(_) => self.config.user_expiry(),
            CancelReason::Completed => self.config.completion_expiry(),
        }
    }

    /// Token for a session's in-flight work. A cancelled session gets an
    /// already-cancelled token.
    pub fn token(&mut self, session_id: &str) -> CancellationToken {
        if self.is_cancelled(session_id) {
            let token = CancellationToken::new();
            token.cancel();
            return token;
        }
        self.tokens
            .entry(session_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Forget the token of a session that has no remaining work
    pub fn release_token(&mut self, session_id: &str) {
        self.tokens.remove(session_id);
    }

    /// Remove every record whose retention window has passed
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|session_id, entry| {
            let live = now < entry.expires_at;
            if !live {
                debug!(%session_id, "CancellationRegistry::prune: removing record");
            }
            live
        });
        before - self.entries.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn token_count(&self) -> usize {
        self.tokens.len()
    }
}
