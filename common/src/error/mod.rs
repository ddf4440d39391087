//! Error types for the ledger
//!
//! Every fallible operation in the workspace returns [`Result`]. Repository
//! errors propagate unchanged to the service layer, which hands them to the
//! caller; [`Error::class`] folds them into the three outcomes a transport
//! layer needs to map (not found, bad request, internal).

use std::fmt::Display;
use thiserror::Error;

/// Ledger error type
#[derive(Debug, Error)]
pub enum Error {
    /// Submitted entity is absent or structurally invalid
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error when an account cannot be found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Error when an operation cannot be found
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// Attempt to store an entity under an identifier that is already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A unit of work could not be applied atomically; nothing was applied
    #[error("Commit failed: {0}")]
    CommitFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Decimal conversion error
    #[error("Decimal conversion error: {0}")]
    DecimalError(String),
}

/// Outcome class of an error, as seen by a caller of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The referenced identifier does not exist
    NotFound,
    /// The request itself was rejected (absent, invalid or conflicting)
    BadRequest,
    /// Storage, commit or configuration failure
    Internal,
}

impl Error {
    /// Classify the error for transport-level mapping
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::AccountNotFound(_) | Error::OperationNotFound(_) => ErrorClass::NotFound,
            Error::ValidationError(_) | Error::Conflict(_) | Error::DecimalError(_) => ErrorClass::BadRequest,
            Error::CommitFailure(_)
            | Error::ConfigurationError(_)
            | Error::Internal(_)
            | Error::Database(_)
            | Error::Migration(_) => ErrorClass::Internal,
        }
    }

    /// Whether this error signals a missing entity
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::ValidationError(msg) => Error::ValidationError(format!("{}: {}", context, msg)),
                Error::AccountNotFound(msg) => Error::AccountNotFound(format!("{}: {}", context, msg)),
                Error::OperationNotFound(msg) => Error::OperationNotFound(format!("{}: {}", context, msg)),
                Error::Conflict(msg) => Error::Conflict(format!("{}: {}", context, msg)),
                Error::CommitFailure(msg) => Error::CommitFailure(format!("{}: {}", context, msg)),
                Error::ConfigurationError(msg) => Error::ConfigurationError(format!("{}: {}", context, msg)),
                Error::Internal(msg) => Error::Internal(format!("{}: {}", context, msg)),
                Error::Database(e) => Error::Database(e),
                Error::Migration(e) => Error::Migration(e),
                Error::DecimalError(msg) => Error::DecimalError(format!("{}: {}", context, msg)),
            }
        })
    }
}

/// Trait for converting other error types to our Error type
pub trait IntoError {
    /// Convert to Error
    fn into_error(self, message: &str) -> Error;
}

impl<E: std::error::Error> IntoError for E {
    fn into_error(self, message: &str) -> Error {
        Error::Internal(format!("{}: {}", message, self))
    }
}

/// Convert string messages into an error
impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Internal(message)
    }
}

/// Convert static string references into an error
impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Internal(message.to_string())
    }
}

/// From rust_decimal::Error
impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::DecimalError(err.to_string())
    }
}
