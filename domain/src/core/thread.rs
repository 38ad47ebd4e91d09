//! Thread identifier value object

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Identifies one conversation thread (Value Object)
///
/// Message ids embed the thread id as their leading segment, so a thread id
/// must be non-empty and free of whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Create a new thread id
    ///
    /// # Panics
    /// Panics if the id is empty or contains whitespace
    pub fn new(id: impl Into<String>) -> Self {
        Self::try_new(id).expect("invalid thread id")
    }

    /// Try to create a thread id, rejecting empty or whitespace-bearing input
    pub fn try_new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidThreadId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        ThreadId::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_creation() {
        let id = ThreadId::new("thread-1");
        assert_eq!(id.as_str(), "thread-1");
    }

    #[test]
    fn test_try_new_rejects_empty() {
        assert!(ThreadId::try_new("").is_err());
    }

    #[test]
    fn test_try_new_rejects_whitespace() {
        assert!(ThreadId::try_new("a thread").is_err());
    }

    #[test]
    fn test_underscores_are_allowed() {
        assert!(ThreadId::try_new("thread_r_1").is_ok());
    }
}
