//! Storage error types and result alias.
//!
//! Every [`KeyValueStore`](crate::KeyValueStore) implementation maps its
//! internal failures to [`StorageError`]. Callers above the store treat all of
//! these as opaque I/O failures except [`StorageError::Conflict`], which is the
//! expected outcome of a lost optimistic-locking race.
//!
//! # Example
//!
//! ```
//! use multitoken_storage::{StorageError, StorageResult};
//!
//! fn connect(addr: &str) -> StorageResult<()> {
//!     Err(StorageError::connection(format!("refused: {addr}")))
//! }
//!
//! assert!(connect("127.0.0.1:6379").unwrap_err().is_transient());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute, so
/// logging layers can print the full cause.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A [`compare_and_set`](crate::KeyValueStore::compare_and_set) precondition
    /// did not hold: the key was modified (or created, or removed) since the
    /// caller last read it.
    #[error("Write conflict")]
    Conflict,

    /// Connection or network error.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// A value could not be encoded for storage or decoded after retrieval.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Catch-all for backend-specific failures.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The operation exceeded the backend's time limit.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` for failures that may succeed if the caller tries again
    /// later (network blips, timeouts).
    ///
    /// `Conflict` is deliberately not transient: a conflicting write must be
    /// re-read and recomputed, not blindly replayed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}
