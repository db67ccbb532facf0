//! Key-value store trait definition.
//!
//! This module defines the [`KeyValueStore`] trait, the contract every
//! credential store adapter implements. The shape mirrors what Redis-like
//! services offer natively: single-key reads and writes with an optional
//! per-key expiration, expiration queries and adjustments, and an atomic
//! check-and-set for optimistic locking.
//!
//! # Design Philosophy
//!
//! - **Keys and values are bytes**: no assumptions about serialization format
//! - **Async by default**: all operations are async for non-blocking I/O
//! - **Expiration is native**: the store, not its callers, deletes expired keys
//! - **Object safe**: stores are injected as `Arc<dyn KeyValueStore>`
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`KeyValueStore`] trait
//! 2. Map backend-specific errors to [`StorageError`](crate::StorageError)
//! 3. Run the [`conformance`](crate::conformance) suite against it (feature `testutil`)
//!
//! See [`MemoryBackend`](crate::MemoryBackend) for a reference implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, types::KeyTtl};

/// Abstract key-value store with per-key expiration.
///
/// Implementations must be thread-safe (`Send + Sync`) and guarantee per-key
/// atomicity for every operation. No cross-key atomicity is assumed.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](KeyValueStore::get) | Retrieve a single value by key |
/// | [`set`](KeyValueStore::set) | Store a value, with or without expiration |
/// | [`compare_and_set`](KeyValueStore::compare_and_set) | Atomic check-and-set |
/// | [`delete`](KeyValueStore::delete) | Remove a key |
/// | [`ttl`](KeyValueStore::ttl) | Query a key's expiration state |
/// | [`expire`](KeyValueStore::expire) | Set an expiration on an existing key |
/// | [`persist`](KeyValueStore::persist) | Remove a key's expiration |
/// | [`clear_prefix`](KeyValueStore::clear_prefix) | Delete every key under a prefix |
/// | [`clear`](KeyValueStore::clear) | Delete every key |
/// | [`health_check`](KeyValueStore::health_check) | Verify backend availability |
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use multitoken_storage::{KeyTtl, KeyValueStore, MemoryBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryBackend::new();
///
/// store.set(b"key".to_vec(), b"value".to_vec(), None).await.unwrap();
/// assert_eq!(store.get(b"key").await.unwrap(), Some(Bytes::from("value")));
/// assert_eq!(store.ttl(b"key").await.unwrap(), KeyTtl::Persistent);
///
/// store.expire(b"key", Duration::from_secs(60)).await.unwrap();
/// assert!(store.ttl(b"key").await.unwrap().is_expiring());
/// # });
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists and has not expired
    /// - `Ok(None)` if the key doesn't exist or has expired
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair, replacing any previous value.
    ///
    /// The expiration is replaced as well: `Some(ttl)` makes the key expire
    /// `ttl` from now, `None` makes it persistent. A TTL the backend cannot
    /// represent fails with
    /// [`StorageError::Internal`](crate::StorageError::Internal) and writes nothing.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) -> StorageResult<()>;

    /// Atomically sets a key's value if it matches the expected current value.
    ///
    /// # Semantics
    ///
    /// - **`expected: None`**: insert-if-absent. Succeeds only when the key does not exist (or has
    ///   expired).
    /// - **`expected: Some(value)`**: update-if-unchanged. Succeeds only when the current value is
    ///   a byte-for-byte match of `value`.
    ///
    /// On success the value and expiration are replaced exactly as
    /// [`set`](KeyValueStore::set) would.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict): the precondition failed.
    ///
    /// # Retry Pattern
    ///
    /// `Conflict` is not transient. Re-read the key, recompute the new value
    /// and try again:
    ///
    /// ```no_run
    /// use multitoken_storage::{KeyValueStore, MemoryBackend, StorageError};
    ///
    /// async fn increment(store: &MemoryBackend, key: &[u8]) -> Result<(), StorageError> {
    ///     loop {
    ///         let current = store.get(key).await?;
    ///         let n: u64 = current
    ///             .as_ref()
    ///             .and_then(|b| std::str::from_utf8(b).ok()?.parse().ok())
    ///             .unwrap_or(0);
    ///         let next = (n + 1).to_string().into_bytes();
    ///         match store.compare_and_set(key, current.as_deref(), next, None).await {
    ///             Ok(()) => return Ok(()),
    ///             Err(StorageError::Conflict) => continue,
    ///             Err(e) => return Err(e),
    ///         }
    ///     }
    /// }
    /// ```
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> StorageResult<()>;

    /// Deletes a key.
    ///
    /// If the key doesn't exist, this is a no-op (returns `Ok(())`).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Reports the key's expiration state.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn ttl(&self, key: &[u8]) -> StorageResult<KeyTtl>;

    /// Makes an existing key expire `ttl` from now, replacing any previous
    /// expiration.
    ///
    /// Returns `false` (and does nothing) if the key does not exist. A TTL
    /// the backend cannot represent fails as in [`set`](Self::set).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn expire(&self, key: &[u8], ttl: Duration) -> StorageResult<bool>;

    /// Removes the expiration from an existing key, making it persistent.
    ///
    /// Returns `true` only if an expiration was actually removed.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn persist(&self, key: &[u8]) -> StorageResult<bool>;

    /// Deletes every key that starts with `prefix`.
    ///
    /// Used to reset a single namespace without touching the rest of a
    /// shared store.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn clear_prefix(&self, prefix: &[u8]) -> StorageResult<()>;

    /// Deletes every key in the store.
    ///
    /// Intended for tests and bulk resets; production code paths never call it.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn clear(&self) -> StorageResult<()>;

    /// Verifies the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
