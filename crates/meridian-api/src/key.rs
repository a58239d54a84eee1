//! Application keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors produced when parsing an application key.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key is not of the form `namespace/name`.
    #[error("invalid application key {0:?}: expected namespace/name")]
    InvalidFormat(String),
}

/// A validated `namespace/name` application identifier.
///
/// The key is the sharding unit for all scheduler state: sessions and
/// pods belong to exactly one application, and reconciliation is
/// serialised per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppKey(String);

impl AppKey {
    /// Parse a key, validating the `namespace/name` shape.
    ///
    /// Both segments must be non-empty and the separator must appear
    /// exactly once.
    pub fn parse(key: impl AsRef<str>) -> Result<Self, KeyError> {
        let key = key.as_ref();
        match key.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self(key.to_owned()))
            }
            _ => Err(KeyError::InvalidFormat(key.to_owned())),
        }
    }

    /// The namespace segment.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.split_once('/').map(|(ns, _)| ns).unwrap_or_default()
    }

    /// The name segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or_default()
    }

    /// The full key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AppKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AppKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
