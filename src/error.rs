//! Error types for the Quarry library.
//!
//! All errors are represented by the [`QuarryError`] enum. The variants follow
//! the failure classes of the engine: configuration problems detected while
//! building a storage or a query, transaction failures, evaluation failures
//! while ranking, and consistency violations while merging statistics.
//!
//! # Examples
//!
//! ```
//! use quarry::error::QuarryError;
//! use quarry::query::{FunctionConfig, QueryEval};
//!
//! let mut eval = QueryEval::new();
//! let err = eval.add_weighting_function(&FunctionConfig::new("bm26")).unwrap_err();
//! assert!(matches!(err, QuarryError::Config(_)));
//! assert!(!err.is_transient());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// I/O errors (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed configuration, unknown function names, invalid query structure
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transaction errors (schema mismatch, duplicate document id)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Query evaluation errors (division by zero, unknown metadata column)
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Statistics ordering or blob integrity violations
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Query construction errors
    #[error("Query error: {0}")]
    Query(String),

    /// Operation not legal in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Binary encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else
    #[error("{0}")]
    Other(String),

    /// Errors raised by the command line front end
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with QuarryError.
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        QuarryError::Config(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        QuarryError::Storage(msg.into())
    }

    /// Create a new transaction error.
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        QuarryError::Transaction(msg.into())
    }

    /// Create a new evaluation error.
    pub fn evaluation<S: Into<String>>(msg: S) -> Self {
        QuarryError::Evaluation(msg.into())
    }

    /// Create a new consistency error.
    pub fn consistency<S: Into<String>>(msg: S) -> Self {
        QuarryError::Consistency(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        QuarryError::Query(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        QuarryError::InvalidOperation(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        QuarryError::Serialization(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        QuarryError::Other(msg.into())
    }

    /// Whether retrying the failed operation locally is reasonable.
    ///
    /// Only externally caused conditions of the storage layer qualify. Logical
    /// errors are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, QuarryError::Io(_) | QuarryError::Storage(_))
    }
}

impl From<bincode::Error> for QuarryError {
    fn from(err: bincode::Error) -> Self {
        QuarryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = QuarryError::config("unknown summarizer 'foo'");
        assert_eq!(
            error.to_string(),
            "Configuration error: unknown summarizer 'foo'"
        );

        let error = QuarryError::evaluation("division by zero");
        assert_eq!(error.to_string(), "Evaluation error: division by zero");

        let error = QuarryError::consistency("blob out of order");
        assert_eq!(error.to_string(), "Consistency error: blob out of order");
    }

    #[test]
    fn test_io_error_conversion() {
        let error = QuarryError::from(io::Error::new(io::ErrorKind::NotFound, "journal.log"));
        assert!(matches!(error, QuarryError::Io(_)));
        assert!(error.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(QuarryError::storage("disk full").is_transient());
        assert!(!QuarryError::transaction("duplicate document id").is_transient());
        assert!(!QuarryError::config("bad schema").is_transient());
    }
}
