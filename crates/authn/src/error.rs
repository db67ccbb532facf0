//! Credential error types.
//!
//! This module defines errors that can occur while issuing, resolving and
//! revoking credentials, and while building a [`TokenConfig`](crate::TokenConfig).

use multitoken_storage::{BoxError, StorageError};
use thiserror::Error;

use crate::principal::PrincipalId;

/// Message returned to presenting clients for every authentication failure.
pub const AUTHENTICATION_FAILED: &str = "Authentication failed";

/// Message returned to presenting clients for every internal fault.
pub const INTERNAL_ERROR: &str = "Internal error";

/// Credential lifecycle and authentication errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
///
/// # Client-facing messages
///
/// The `Display` output is meant for logs. Use
/// [`public_message`](AuthError::public_message) for anything sent back to
/// the client presenting a credential.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The presented credential is malformed, fails verification, or is not
    /// in the index.
    #[error("Credential not found")]
    CredentialNotFound,

    /// The credential resolved to a principal the directory does not know.
    #[error("Principal not found: {principal}")]
    PrincipalNotFound {
        /// Principal the credential resolved to.
        principal: PrincipalId,
    },

    /// The credential resolved to a principal that is not active.
    #[error("Principal is inactive: {principal}")]
    PrincipalInactive {
        /// Principal the credential resolved to.
        principal: PrincipalId,
    },

    /// I/O failure from the key-value store.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging. Never retried here.
    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),

    /// Password hashing failed or the hashing task did not complete.
    #[error("Hashing failed: {message}")]
    Hashing {
        /// Description of the failure.
        message: String,
    },

    /// A stored index entry could not be decoded.
    #[error("Corrupted index entry at {key}: {message}")]
    IndexCorrupted {
        /// Store key holding the undecodable value.
        key: String,
        /// Description of the decoding failure.
        message: String,
    },

    /// Concurrent writers kept invalidating a principal's credential
    /// sequence until the attempt budget ran out.
    #[error("Credential sequence of {principal} still conflicting after {attempts} attempts")]
    Contention {
        /// Principal whose sequence could not be updated.
        principal: PrincipalId,
        /// Number of compare-and-set attempts made.
        attempts: u32,
    },

    /// The principal directory failed to answer a lookup.
    #[error("Principal directory error: {message}")]
    Directory {
        /// Description of the failure.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl AuthError {
    /// Creates a [`AuthError::Hashing`] error.
    #[must_use]
    pub fn hashing(message: impl Into<String>) -> Self {
        Self::Hashing { message: message.into() }
    }

    /// Creates a [`AuthError::IndexCorrupted`] error.
    #[must_use]
    pub fn index_corrupted(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IndexCorrupted { key: key.into(), message: message.into() }
    }

    /// Creates a [`AuthError::Directory`] error without a source.
    #[must_use]
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory { message: message.into(), source: None }
    }

    /// Creates a [`AuthError::Directory`] error wrapping `source`.
    #[must_use]
    pub fn directory_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Directory { message: message.into(), source: Some(std::sync::Arc::new(source)) }
    }

    /// Returns `true` for failures caused by the presented credential or its
    /// principal, as opposed to faults of the service.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::CredentialNotFound | Self::PrincipalNotFound { .. } | Self::PrincipalInactive { .. }
        )
    }

    /// The message safe to return to the presenting client.
    ///
    /// Malformed, unknown and inactive cases all collapse to
    /// [`AUTHENTICATION_FAILED`], so a client cannot tell which one applied.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        if self.is_authentication_failure() { AUTHENTICATION_FAILED } else { INTERNAL_ERROR }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::StoreUnavailable(err)
    }
}

/// Result type alias for credential operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Invalid [`TokenConfig`](crate::TokenConfig) values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The key namespace is empty.
    #[error("namespace cannot be empty")]
    EmptyNamespace,

    /// The namespace contains a `/`, which would let key families overlap.
    #[error("namespace cannot contain '/': {0}")]
    InvalidNamespace(String),

    /// A zero TTL would expire every credential on issuance.
    #[error("ttl must be greater than zero")]
    ZeroTtl,

    /// At least one compare-and-set attempt is required.
    #[error("max_cas_attempts must be at least 1")]
    ZeroCasAttempts,

    /// Argon2 rejected the configured cost parameters.
    #[error("invalid hash cost: {0}")]
    InvalidHashCost(String),
}
