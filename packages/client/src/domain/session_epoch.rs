//! Logout marker and session epochs.
//!
//! Every logout bumps the session epoch and records it in a [`LogoutMarker`].
//! A persisted session carries the epoch it was written under; at start-up a
//! session older than the latest marker is stale and must not be restored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::token::TokenPair;

/// How long after a logout automatic re-authentication stays suppressed
pub const LOGOUT_MARKER_TTL: Duration = Duration::from_secs(30 * 60);

/// Written on logout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutMarker {
    /// Session epoch in force after the logout
    pub epoch: u64,
    /// Unix timestamp (milliseconds)
    pub issued_at: i64,
}

impl LogoutMarker {
    pub fn new(epoch: u64, issued_at: i64) -> Self {
        Self { epoch, issued_at }
    }

    /// Whether the logout happened less than [`LOGOUT_MARKER_TTL`] ago
    pub fn is_fresh(&self, now_millis: i64) -> bool {
        let ttl = LOGOUT_MARKER_TTL.as_millis() as i64;
        now_millis < self.issued_at.saturating_add(ttl)
    }
}

/// Token pair as written to the session store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub epoch: u64,
    pub tokens: TokenPair,
}

impl PersistedSession {
    /// Whether this session was written after the most recent logout
    pub fn is_current(&self, marker: Option<&LogoutMarker>) -> bool {
        match marker {
            Some(marker) => self.epoch >= marker.epoch,
            None => true,
        }
    }
}
