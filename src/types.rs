//! Core identifier and newtype definitions
//!
//! This module provides the identifiers used to correlate client sessions,
//! upstream targets, pooled connections and in-flight operations.

pub mod config;
pub mod validated;

pub use config::{MaxPoolSize, duration_serde, option_duration_serde};
pub use validated::{TargetName, ValidationError};

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Unique identifier for client sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a new unique client ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for upstream targets
///
/// The index is the target's position in configuration order, which is also
/// the tie-break order used by candidate selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl TargetId {
    /// Create a target ID from a configuration index
    #[must_use]
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Get the underlying index
    #[must_use]
    #[inline]
    pub const fn as_index(&self) -> usize {
        self.0
    }

    /// Smallest possible ID, used as a range bound over the pool index
    pub const MIN: Self = Self(0);

    /// Largest possible ID, used as a range bound over the pool index
    pub const MAX: Self = Self(usize::MAX);
}

impl From<usize> for TargetId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Target({})", self.0)
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one upstream connection, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection ID
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Client-visible operation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(i32);

impl MessageId {
    #[must_use]
    #[inline]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    #[inline]
    pub const fn get(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}
