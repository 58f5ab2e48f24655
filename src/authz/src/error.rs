//! Error types for permission resolution and evaluation

use thiserror::Error;

/// Authorization core errors
///
/// Errors are `Clone` so a failed in-flight policy build can be handed to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    /// Permission name rejected at requirement construction
    #[error("Invalid permission: {0}")]
    InvalidPermission(String),

    /// Invalid policy definition
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// A policy with the same name is already registered
    #[error("Policy already registered: {0}")]
    DuplicatePolicy(String),

    /// An operation with the same name is already registered
    #[error("Operation already registered: {0}")]
    DuplicateOperation(String),

    /// Operation was never registered
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// Static policy source failure
    #[error("Policy source error: {0}")]
    PolicySource(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
