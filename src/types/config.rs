//! Configuration-related type-safe wrappers using NonZero types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

/// Upper bound on distinct (identity, target) connections held by one pool
///
/// Ensures a pool always admits at least one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaxPoolSize(NonZeroUsize);

impl MaxPoolSize {
    /// Create a new MaxPoolSize, returning None if value is 0
    #[must_use]
    pub const fn new(value: usize) -> Option<Self> {
        match NonZeroUsize::new(value) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Get the value as usize
    #[must_use]
    #[inline]
    pub const fn get(&self) -> usize {
        self.0.get()
    }

    /// Default pool capacity
    pub const DEFAULT: Self = Self(NonZeroUsize::new(256).unwrap());
}

impl Default for MaxPoolSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for MaxPoolSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl From<MaxPoolSize> for usize {
    fn from(max: MaxPoolSize) -> Self {
        max.get()
    }
}

impl Serialize for MaxPoolSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.get() as u64)
    }
}

impl<'de> Deserialize<'de> for MaxPoolSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = usize::deserialize(deserializer)?;
        Self::new(value).ok_or_else(|| serde::de::Error::custom("max_pool_size cannot be 0"))
    }
}

/// Helper for (de)serializing Duration as whole seconds
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Helper for (de)serializing Option<Duration> as whole seconds
pub mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_max_pool_size_zero_rejected() {
        assert!(MaxPoolSize::new(0).is_none());
        assert_eq!(MaxPoolSize::new(4).unwrap().get(), 4);
    }

    #[test]
    fn test_max_pool_size_default() {
        assert_eq!(MaxPoolSize::default().get(), 256);
    }

    #[test]
    fn test_max_pool_size_deserialize_rejects_zero() {
        let result: Result<MaxPoolSize, _> = serde_json::from_str("0");
        assert!(result.is_err());
        let value: MaxPoolSize = serde_json::from_str("12").unwrap();
        assert_eq!(value.get(), 12);
    }

    #[test]
    fn test_duration_serde_roundtrip() {
        #[derive(Serialize, Deserialize)]
        struct Settings {
            #[serde(with = "duration_serde")]
            timeout: Duration,
        }

        let json = serde_json::to_string(&Settings {
            timeout: Duration::from_secs(30),
        })
        .unwrap();
        assert!(json.contains("30"));

        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_option_duration_serde_none() {
        #[derive(Serialize, Deserialize)]
        struct Settings {
            #[serde(with = "option_duration_serde", default)]
            idle: Option<Duration>,
        }

        let parsed: Settings = serde_json::from_str(r#"{"idle": null}"#).unwrap();
        assert!(parsed.idle.is_none());
        let parsed: Settings = serde_json::from_str(r#"{"idle": 90}"#).unwrap();
        assert_eq!(parsed.idle, Some(Duration::from_secs(90)));
    }
}
