//! Error types for sigcat-resolver
//!
//! Errors fall into three caller-facing classes:
//! - InvalidInput → client error, never retried
//! - NotFound → normal outcome, callers branch on it
//! - everything else → server error carrying the correlation id
//!
//! Provider failures are resolved internally (stale cache value or "no match
//! this round") and only surface here when a caller asks a provider directly.

use crate::providers::ProviderError;
use thiserror::Error;

/// Resolver error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input (bad hash, empty vote list, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested signature, object or entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider call failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored JSON could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// sigcat-common error
    #[error("Common error: {0}")]
    Common(#[from] sigcat_common::Error),

    /// Impossible state (unknown enum tag in storage, broken invariant)
    #[error("Fatal: {0}")]
    Fatal(String),
}

/// Caller-facing error class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ClientError,
    NotFound,
    ServerError,
}

impl Error {
    /// Classify for the caller
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::InvalidInput(_) => ErrorClass::ClientError,
            Error::NotFound(_) => ErrorClass::NotFound,
            _ => ErrorClass::ServerError,
        }
    }

    /// HTTP-equivalent status code for the error class
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::ClientError => 400,
            ErrorClass::NotFound => 404,
            ErrorClass::ServerError => 500,
        }
    }
}

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, Error>;
