//! Model reference value object

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Reference to a backend model a participant streams from (Value Object)
///
/// The orchestration core never interprets the reference beyond passing it
/// to the generation gateway, so it is a validated opaque string rather
/// than a closed catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRef(String);

impl ModelRef {
    /// Create a new model reference
    ///
    /// # Panics
    /// Panics if the reference is empty or only whitespace
    pub fn new(name: impl Into<String>) -> Self {
        Self::try_new(name).expect("invalid model reference")
    }

    /// Try to create a model reference, returning an error if invalid
    pub fn try_new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::InvalidModel(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ModelRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelRef::try_new(s)
    }
}
