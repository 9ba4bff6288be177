//! Validated string types that enforce invariants at construction time

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for string types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("target name cannot be empty or whitespace")]
    EmptyTargetName,

    #[error("target name contains invalid character {0:?}")]
    InvalidTargetName(char),
}

/// Macro to generate validated string newtypes.
///
/// Each generated type gets a validating `new()`, `as_str()`, `AsRef<str>`,
/// `Deref`, `Display`, `TryFrom<String>` and a serde implementation that runs
/// the same validation on deserialization.
macro_rules! validated_string {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident(String) {
            validation: |$s_param:ident| $validation:expr,
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        $vis struct $name(String);

        impl $name {
            #[doc = concat!("Create a new ", stringify!($name), " after validation")]
            pub fn new($s_param: String) -> Result<Self, ValidationError> {
                let validate = || $validation;
                validate()?;
                Ok(Self($s_param))
            }

            #[doc = concat!("Get the ", stringify!($name), " as a string slice")]
            #[must_use]
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from($s_param: String) -> Result<Self, Self::Error> {
                Self::new($s_param)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::new(s).map_err(serde::de::Error::custom)
            }
        }
    };
}

validated_string! {
    /// A validated target name used in logs, metrics fields and env overrides
    ///
    /// # Examples
    /// ```
    /// use ldap_proxy::types::TargetName;
    ///
    /// let name = TargetName::new("people".to_string()).unwrap();
    /// assert_eq!(name.as_str(), "people");
    ///
    /// assert!(TargetName::new("   ".to_string()).is_err());
    /// ```
    pub struct TargetName(String) {
        validation: |s| {
            if s.trim().is_empty() {
                Err(ValidationError::EmptyTargetName)
            } else if let Some(c) = s.chars().find(|c| c.is_control()) {
                Err(ValidationError::InvalidTargetName(c))
            } else {
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_name_valid() {
        let name = TargetName::new("groups-east".to_string()).unwrap();
        assert_eq!(name.as_str(), "groups-east");
        assert_eq!(&*name, "groups-east");
    }

    #[test]
    fn test_target_name_empty_rejected() {
        assert_eq!(
            TargetName::new(String::new()),
            Err(ValidationError::EmptyTargetName)
        );
        assert_eq!(
            TargetName::new(" \t".to_string()),
            Err(ValidationError::EmptyTargetName)
        );
    }

    #[test]
    fn test_target_name_control_char_rejected() {
        assert_eq!(
            TargetName::new("bad\nname".to_string()),
            Err(ValidationError::InvalidTargetName('\n'))
        );
    }

    #[test]
    fn test_target_name_deserialize_validates() {
        let ok: TargetName = serde_json::from_str(r#""people""#).unwrap();
        assert_eq!(ok.as_str(), "people");
        let err: Result<TargetName, _> = serde_json::from_str(r#""""#);
        assert!(err.is_err());
    }
}
