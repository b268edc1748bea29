//! Network and endpoint id generation and validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{WeftError, WeftResult};

/// A validated resource id, used for networks and endpoints.
///
/// Resource ids must:
/// - Be 1-64 characters long
/// - Contain only alphanumeric characters, hyphens, and underscores
/// - Start with an alphanumeric character
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Maximum length of a resource id.
    pub const MAX_LENGTH: usize = 64;

    /// Create a new resource id, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the id format is invalid.
    pub fn new(id: impl Into<String>) -> WeftResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Generate a new random resource id.
    ///
    /// The id is a 12-character hex string derived from a UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let hex = hex::encode(&uuid.as_bytes()[..6]);
        Self(hex)
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate a resource id string.
    fn validate(id: &str) -> WeftResult<()> {
        if id.is_empty() || id.len() > Self::MAX_LENGTH {
            return Err(WeftError::InvalidId { id: id.to_string() });
        }

        let first_char = id.chars().next().unwrap();
        if !first_char.is_ascii_alphanumeric() {
            return Err(WeftError::InvalidId { id: id.to_string() });
        }

        for c in id.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
                return Err(WeftError::InvalidId { id: id.to_string() });
            }
        }

        Ok(())
    }

    /// Returns a short version of the id (first 7 characters), used when
    /// deriving interface names that must fit in IFNAMSIZ.
    #[must_use]
    pub fn short(&self) -> &str {
        if self.0.len() <= 7 { &self.0 } else { &self.0[..7] }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
