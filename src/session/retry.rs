//! Stale-connection retry state
//!
//! An operation gets one reconnect per target. The first liveness failure
//! retires the connection, waits a short jittered delay, re-acquires (which
//! re-authenticates) and resends the same request. A second failure is final.
//!
//! The jitter (10-59ms) keeps clients from reconnecting in lockstep when a
//! target restarts and every pooled connection goes stale at once.

use std::time::Duration;

use crate::constants::pool::{RETRY_JITTER_MIN_MS, RETRY_JITTER_SPAN_MS};

/// Where an operation stands against one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attempt {
    #[default]
    First,
    /// Terminal
    Retried,
}

impl Attempt {
    /// State after a liveness failure, `None` once the retry is spent
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::First => Some(Self::Retried),
            Self::Retried => None,
        }
    }

    #[must_use]
    pub const fn is_retry(self) -> bool {
        matches!(self, Self::Retried)
    }

    /// Number of resends this state represents
    #[must_use]
    pub const fn retries(self) -> u32 {
        match self {
            Self::First => 0,
            Self::Retried => 1,
        }
    }
}

/// Delay before reconnecting
#[must_use]
pub fn jitter() -> Duration {
    Duration::from_millis(RETRY_JITTER_MIN_MS + rand::random::<u64>() % RETRY_JITTER_SPAN_MS)
}

/// Sleep for one jittered interval
pub async fn backoff() {
    tokio::time::sleep(jitter()).await;
}
