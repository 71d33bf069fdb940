//! Domain errors

use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unknown {kind} state: {value}")]
    UnknownState { kind: &'static str, value: String },

    #[error("Daemon transport failed: {0}")]
    Transport(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Service stopped")]
    ServiceStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound(_))
    }
}
