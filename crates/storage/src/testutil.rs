//! Shared test utilities for key-value store testing.
//!
//! This module provides store doubles, key helpers and assertion macros for
//! [`StorageResult`] values. It is feature-gated behind `testutil` to prevent
//! leaking into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! multitoken-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use multitoken_storage::testutil::{FailingBackend, make_key};
//! ```

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    backend::KeyValueStore,
    error::{StorageError, StorageResult},
    types::KeyTtl,
};

/// Create a deterministic test key from a prefix and index.
///
/// Produces keys like `"prefix:000042"`, zero-padded so lexicographic order
/// matches numeric order.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> Vec<u8> {
    format!("{prefix}:{idx:06}").into_bytes()
}

/// Create a test value tagged with a task ID and sequence number.
///
/// Produces values like `"task3-val42"`, so concurrent tests can tell which
/// task wrote which value.
#[must_use]
pub fn make_tagged_value(task: usize, seq: usize) -> Vec<u8> {
    format!("task{task}-val{seq}").into_bytes()
}

/// A store whose every operation fails with
/// [`StorageError::Connection`].
///
/// Stands in for an unreachable Redis-like service when testing how callers
/// propagate store failures. Counts the calls it rejected.
#[derive(Debug, Default)]
pub struct FailingBackend {
    calls: AtomicU64,
}

impl FailingBackend {
    /// Creates a new failing store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted against this store.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> StorageResult<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(StorageError::connection("store unavailable (injected)"))
    }
}

#[async_trait]
impl KeyValueStore for FailingBackend {
    async fn get(&self, _key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.fail()
    }

    async fn set(
        &self,
        _key: Vec<u8>,
        _value: Vec<u8>,
        _ttl: Option<Duration>,
    ) -> StorageResult<()> {
        self.fail()
    }

    async fn compare_and_set(
        &self,
        _key: &[u8],
        _expected: Option<&[u8]>,
        _new_value: Vec<u8>,
        _ttl: Option<Duration>,
    ) -> StorageResult<()> {
        self.fail()
    }

    async fn delete(&self, _key: &[u8]) -> StorageResult<()> {
        self.fail()
    }

    async fn ttl(&self, _key: &[u8]) -> StorageResult<KeyTtl> {
        self.fail()
    }

    async fn expire(&self, _key: &[u8], _ttl: Duration) -> StorageResult<bool> {
        self.fail()
    }

    async fn persist(&self, _key: &[u8]) -> StorageResult<bool> {
        self.fail()
    }

    async fn clear_prefix(&self, _prefix: &[u8]) -> StorageResult<()> {
        self.fail()
    }

    async fn clear(&self) -> StorageResult<()> {
        self.fail()
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.fail()
    }
}

/// Assert that a [`StorageResult`] is a [`StorageError::Conflict`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use multitoken_storage::{assert_conflict, StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::Conflict);
/// assert_conflict!(result);
/// ```
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "{}: expected StorageError::Conflict, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is `Ok`, returning the inner value.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use multitoken_storage::{assert_storage_ok, StorageResult};
///
/// let result: StorageResult<i32> = Ok(42);
/// let value = assert_storage_ok!(result);
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Assert that a [`KeyTtl`] is an expiration within `tolerance` below
/// `expected`.
///
/// Remaining lifetimes shrink between the write and the query, so exact
/// comparison is never meaningful.
#[macro_export]
macro_rules! assert_ttl_near {
    ($ttl:expr, $expected:expr) => {
        $crate::assert_ttl_near!($ttl, $expected, ::std::time::Duration::from_secs(5))
    };
    ($ttl:expr, $expected:expr, $tolerance:expr) => {
        match $ttl {
            $crate::KeyTtl::Expires(remaining) => assert!(
                remaining <= $expected && remaining + $tolerance >= $expected,
                "expected a TTL near {:?}, got {:?}",
                $expected,
                remaining,
            ),
            other => panic!("expected a TTL near {:?}, got {other}", $expected),
        }
    };
}
