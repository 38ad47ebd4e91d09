//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid thread id: {0}")]
    InvalidThreadId(String),

    #[error("Invalid model reference: {0}")]
    InvalidModel(String),

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("Invalid round state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Round is terminal and immutable")]
    RoundImmutable,

    #[error("Configuration snapshot is invalid: {0}")]
    InvalidSnapshot(String),
}

impl DomainError {
    /// Check whether this error comes from a malformed identifier.
    pub fn is_identity_error(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidThreadId(_) | DomainError::InvalidMessageId(_)
        )
    }
}
