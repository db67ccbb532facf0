//! In-memory key-value store implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`KeyValueStore`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Per-key atomicity**: value and expiration live in a single entry, updated under one lock
//! - **TTL support**: expired keys are invisible immediately and swept by a background task
//!
//! # Example
//!
//! ```
//! use multitoken_storage::{KeyValueStore, MemoryBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryBackend::new();
//!
//!     store.set(b"greeting".to_vec(), b"hello".to_vec(), None).await.unwrap();
//!     let value = store.get(b"greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - The sweeper runs every second, so memory for expired keys is reclaimed lazily (reads never
//!   observe an expired key)

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    backend::KeyValueStore,
    error::{StorageError, StorageResult},
    types::KeyTtl,
};

/// How often the background task sweeps expired keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the cleanup task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// A stored value and its optional absolute expiration.
#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, expires_at: Option<Instant>) -> Self {
        Self { value: Bytes::from(value), expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Converts a relative TTL into an absolute deadline.
///
/// A TTL too large to represent as an [`Instant`] is an error; it never
/// silently becomes a persistent key.
fn deadline(now: Instant, ttl: Option<Duration>) -> StorageResult<Option<Instant>> {
    match ttl {
        None => Ok(None),
        Some(ttl) => now
            .checked_add(ttl)
            .map(Some)
            .ok_or_else(|| StorageError::internal(format!("ttl of {ttl:?} is out of range"))),
    }
}

/// Milliseconds for span fields, saturating instead of truncating.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

/// In-memory key-value store using a [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data.
///
/// # Shutdown
///
/// The background sweeper stops automatically when all clones of the
/// `MemoryBackend` are dropped (via the internal `ShutdownGuard`). You can
/// also call [`shutdown`](Self::shutdown) to stop it explicitly.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Entry>>>,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").field("keys", &self.data.read().len()).finish()
    }
}

impl MemoryBackend {
    /// Creates a new in-memory store.
    ///
    /// This spawns a background task that periodically removes expired keys,
    /// so it must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let backend = Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        // The task holds only the data map, not the guard, so dropping the
        // last user-facing clone still closes the channel.
        let data = Arc::clone(&backend.data);
        tokio::spawn(async move {
            Self::sweep_expired_keys(data, shutdown_rx).await;
        });

        backend
    }

    /// Background task removing keys whose TTL has elapsed.
    async fn sweep_expired_keys(
        data: Arc<RwLock<BTreeMap<Vec<u8>, Entry>>>,
        mut shutdown_rx: watch::Receiver<()>,
    ) {
        loop {
            select! {
                _ = sleep(SWEEP_INTERVAL) => {}
                _ = shutdown_rx.changed() => {
                    return;
                }
            }

            let now = Instant::now();
            let expired: Vec<Vec<u8>> = {
                let guard = data.read();
                guard.iter().filter(|(_, e)| e.is_expired(now)).map(|(k, _)| k.clone()).collect()
            };

            if !expired.is_empty() {
                let mut guard = data.write();
                for key in expired {
                    // Re-check: the key may have been rewritten since the scan.
                    if guard.get(&key).is_some_and(|e| e.is_expired(now)) {
                        guard.remove(&key);
                    }
                }
            }
        }
    }

    /// Explicitly signals the background sweeper to stop.
    ///
    /// Optional: the task also stops when all clones are dropped. Expired
    /// keys stay invisible to reads after shutdown; only memory reclamation
    /// stops.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Number of physically stored entries, including expired ones the
    /// sweeper has not reclaimed yet.
    #[must_use]
    pub fn stored_entries(&self) -> usize {
        self.data.read().len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryBackend {
    #[tracing::instrument(skip_all)]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let now = Instant::now();
        let data = self.data.read();
        Ok(data.get(key).filter(|e| !e.is_expired(now)).map(|e| e.value.clone()))
    }

    #[tracing::instrument(skip_all, fields(ttl_ms = ttl.map(ttl_millis)))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) -> StorageResult<()> {
        let entry = Entry::new(value, deadline(Instant::now(), ttl)?);
        self.data.write().insert(key, entry);
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        let now = Instant::now();
        let expires_at = deadline(now, ttl)?;
        let mut data = self.data.write();

        let current = data.get(key).filter(|e| !e.is_expired(now));
        let matches = match (expected, current) {
            (None, None) => true,
            (Some(exp), Some(cur)) => exp == &cur.value[..],
            _ => false,
        };

        if !matches {
            return Err(StorageError::Conflict);
        }

        data.insert(key.to_vec(), Entry::new(new_value, expires_at));
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn ttl(&self, key: &[u8]) -> StorageResult<KeyTtl> {
        let now = Instant::now();
        let data = self.data.read();
        let state = match data.get(key) {
            None => KeyTtl::Absent,
            Some(entry) if entry.is_expired(now) => KeyTtl::Absent,
            Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Entry { expires_at: Some(at), .. }) => {
                KeyTtl::Expires(at.saturating_duration_since(now))
            },
        };
        Ok(state)
    }

    #[tracing::instrument(skip_all, fields(ttl_ms = ttl_millis(ttl)))]
    async fn expire(&self, key: &[u8], ttl: Duration) -> StorageResult<bool> {
        let now = Instant::now();
        let expires_at = deadline(now, Some(ttl))?;
        let mut data = self.data.write();
        match data.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = expires_at;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    #[tracing::instrument(skip_all)]
    async fn persist(&self, key: &[u8]) -> StorageResult<bool> {
        let now = Instant::now();
        let mut data = self.data.write();
        match data.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => Ok(entry.expires_at.take().is_some()),
            _ => Ok(false),
        }
    }

    #[tracing::instrument(skip_all)]
    async fn clear_prefix(&self, prefix: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        let doomed: Vec<Vec<u8>> = data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            data.remove(&key);
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn clear(&self) -> StorageResult<()> {
        self.data.write().clear();
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn health_check(&self) -> StorageResult<()> {
        // Acquiring the lock proves we're not deadlocked.
        let _unused = self.data.read();
        Ok(())
    }
}
