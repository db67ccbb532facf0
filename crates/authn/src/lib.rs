//! # Multitoken Authentication
//!
//! Multi-device opaque bearer credentials backed by a key-value store.
//!
//! This crate provides:
//! - **Credential engine**: issue, resolve, revoke one, revoke all
//! - **Credential index**: per-principal verifier sequences plus reverse
//!   lookups, updated with compare-and-set
//! - **TTL policy**: per-key reconciliation of existing and desired expiry
//! - **Authenticator**: resolution plus principal lookup and sliding expiry
//!
//! ## Features
//!
//! - A presented credential is `secret:hash:verifier`; only the Argon2id
//!   verifier is stored
//! - Every authentication failure looks the same to the client
//! - Each principal can hold any number of live credentials (devices)
//!
//! ## Key layout
//!
//! ```text
//! {namespace}/principals/{principal}  ->  ["$argon2id$…", "$argon2id$…"]
//! {namespace}/verifiers/{verifier}    ->  principal
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use multitoken_authn::{
//!     Authenticator, CredentialEngine, MemoryPrincipalDirectory, PrincipalId, PrincipalRecord,
//!     TokenConfig,
//! };
//! use multitoken_storage::MemoryBackend;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TokenConfig::builder().ttl(Duration::from_secs(86_400)).build()?;
//! let engine = CredentialEngine::new(Arc::new(MemoryBackend::new()), config)?;
//!
//! let directory = Arc::new(MemoryPrincipalDirectory::new());
//! directory.insert(PrincipalRecord::active(42u64));
//! let auth = Authenticator::new(engine.clone(), directory);
//!
//! let issued = engine.issue(&PrincipalId::from(42u64)).await?;
//! let session = auth.authenticate(&issued.credential).await?;
//! println!("authenticated {}", session.credential.principal());
//!
//! auth.logout(&session).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Request authentication.
pub mod authenticator;
/// Engine configuration.
pub mod config;
/// Credential lifecycle engine.
pub mod engine;
/// Authentication error types.
pub mod error;
/// Per-principal credential index.
pub mod index;
/// Lifecycle counters.
pub mod metrics;
/// Principal identifiers and directories.
pub mod principal;
/// Secret generation and credential splitting.
pub mod secret;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// TTL reconciliation.
pub mod ttl;

// Re-export key types for convenience
pub use authenticator::{Authenticated, Authenticator};
pub use config::{DEFAULT_MAX_CAS_ATTEMPTS, DEFAULT_NAMESPACE, HashCost, TokenConfig};
pub use engine::{CredentialEngine, CredentialHandle, IssuedCredential};
pub use error::{AuthError, ConfigError, Result};
pub use index::CredentialIndex;
pub use metrics::{CredentialMetrics, CredentialMetricsSnapshot};
pub use principal::{
    MemoryPrincipalDirectory, Principal, PrincipalDirectory, PrincipalId, PrincipalRecord,
};
pub use secret::{SecretGenerator, TOKEN_SEPARATOR, split_credential};
pub use ttl::{TtlAction, TtlPolicy};
