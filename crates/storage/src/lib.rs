//! Key-value store abstraction for multi-device credential storage.
//!
//! This crate provides the [`KeyValueStore`] trait, the only contract the
//! credential engine needs from its persistence layer, and [`MemoryBackend`],
//! an in-process implementation for tests and development.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Authentication Adapter                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │        Credential Lifecycle Engine / Credential Index       │
//! │   (issue, resolve, revoke, TTL reconciliation, indexing)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  multitoken-storage                         │
//! │                  KeyValueStore trait                        │
//! │   (get, set, compare_and_set, delete, ttl, expire, persist) │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│   Redis-like adapters (external)             │
//! │   (testing)  │                                              │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use multitoken_storage::{KeyTtl, KeyValueStore, MemoryBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryBackend::new();
//!
//!     store.set(b"session".to_vec(), b"alice".to_vec(), Some(Duration::from_secs(60))).await?;
//!     assert!(store.ttl(b"session").await?.is_expiring());
//!
//!     store.persist(b"session").await?;
//!     assert_eq!(store.ttl(b"session").await?, KeyTtl::Persistent);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. Backends map their internal
//! failures to [`StorageError`] variants.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (store doubles, assertion macros) and the
//!   `conformance` suite. Enable this in `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::KeyValueStore;
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use types::KeyTtl;
