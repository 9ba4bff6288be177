//! Default values for configuration fields
//!
//! This module centralizes all default value functions used in serde deserialization.

use std::time::Duration;

/// Default protocol version floor for a target
#[inline]
pub fn protocol_version() -> u8 {
    3
}

/// Default dial timeout
#[inline]
pub fn connect_timeout() -> Duration {
    crate::constants::timeout::CONNECT
}
