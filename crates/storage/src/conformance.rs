//! Conformance test suite for [`KeyValueStore`] implementations.
//!
//! Async check functions that validate whether a store adapter satisfies the
//! trait contract the credential engine relies on. Every backend, whether the
//! in-memory one or an adapter over a networked service, runs the same suite.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each function with a fresh store:
//!
//! ```no_run
//! use multitoken_storage::{MemoryBackend, conformance};
//!
//! #[tokio::test]
//! async fn crud_get_returns_none_for_missing_key() {
//!     conformance::crud_get_returns_none_for_missing_key(&MemoryBackend::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | Basic get/set/delete semantics |
//! | TTL | Expiration on write, query, `expire`, `persist` |
//! | CAS | `compare_and_set` preconditions and TTL handling |
//! | Clear | Prefix and full clearing |
//! | Concurrent | Thread-safety and lost-update freedom under CAS |

use std::{sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{backend::KeyValueStore, error::StorageError, types::KeyTtl};

/// TTL long enough that no check can observe it elapsing.
const LONG_TTL: Duration = Duration::from_secs(1000);

/// TTL short enough to elapse within a test.
const SHORT_TTL: Duration = Duration::from_millis(50);

// ============================================================================
// CRUD
// ============================================================================

/// `get` on a nonexistent key returns `Ok(None)`.
pub async fn crud_get_returns_none_for_missing_key<S: KeyValueStore>(store: &S) {
    let result = store.get(b"nonexistent").await;
    assert!(result.is_ok(), "get should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None, "missing key should return None");
}

/// `set` then `get` returns the value.
pub async fn crud_set_then_get_returns_value<S: KeyValueStore>(store: &S) {
    store.set(b"k1".to_vec(), b"v1".to_vec(), None).await.expect("set should succeed");
    let val = store.get(b"k1").await.expect("get should succeed");
    assert_eq!(val, Some(Bytes::from("v1")));
}

/// `set` on an existing key overwrites the value.
pub async fn crud_set_overwrites_existing<S: KeyValueStore>(store: &S) {
    store.set(b"k1".to_vec(), b"original".to_vec(), None).await.expect("set");
    store.set(b"k1".to_vec(), b"updated".to_vec(), None).await.expect("overwrite");
    let val = store.get(b"k1").await.expect("get");
    assert_eq!(val, Some(Bytes::from("updated")));
}

/// `delete` on a nonexistent key is a silent no-op.
pub async fn crud_delete_nonexistent_is_noop<S: KeyValueStore>(store: &S) {
    let result = store.delete(b"ghost").await;
    assert!(result.is_ok(), "delete of nonexistent key should not error: {result:?}");
}

/// `delete` removes a previously-set key.
pub async fn crud_delete_removes_key<S: KeyValueStore>(store: &S) {
    store.set(b"k2".to_vec(), b"val".to_vec(), None).await.expect("set");
    store.delete(b"k2").await.expect("delete");
    let val = store.get(b"k2").await.expect("get after delete");
    assert_eq!(val, None, "key should be gone after delete");
}

/// Keys are byte-level distinct: `"key"` and `"key\x00"` are different.
pub async fn crud_keys_are_byte_distinct<S: KeyValueStore>(store: &S) {
    store.set(b"key".to_vec(), b"a".to_vec(), None).await.expect("set key");
    store.set(b"key\x00".to_vec(), b"b".to_vec(), None).await.expect("set key+null");
    assert_eq!(store.get(b"key").await.expect("get key"), Some(Bytes::from("a")));
    assert_eq!(store.get(b"key\x00").await.expect("get key+null"), Some(Bytes::from("b")));
}

// ============================================================================
// TTL
// ============================================================================

/// A key written without TTL reports `Persistent`; a missing key `Absent`.
pub async fn ttl_reports_persistent_and_absent<S: KeyValueStore>(store: &S) {
    store.set(b"forever".to_vec(), b"v".to_vec(), None).await.expect("set");
    assert_eq!(store.ttl(b"forever").await.expect("ttl"), KeyTtl::Persistent);
    assert_eq!(store.ttl(b"missing").await.expect("ttl"), KeyTtl::Absent);
}

/// A key written with TTL reports a remaining lifetime no larger than it.
pub async fn ttl_reports_remaining_lifetime<S: KeyValueStore>(store: &S) {
    store.set(b"temp".to_vec(), b"v".to_vec(), Some(LONG_TTL)).await.expect("set");
    let remaining = store.ttl(b"temp").await.expect("ttl").remaining();
    let remaining = remaining.expect("key written with a TTL must be expiring");
    assert!(remaining <= LONG_TTL, "remaining {remaining:?} exceeds the TTL that was set");
    assert!(remaining > LONG_TTL / 2, "remaining {remaining:?} is implausibly small");
}

/// Expired keys read as absent through both `get` and `ttl`.
pub async fn ttl_expired_key_is_absent<S: KeyValueStore>(store: &S) {
    store.set(b"brief".to_vec(), b"v".to_vec(), Some(SHORT_TTL)).await.expect("set");
    tokio::time::sleep(SHORT_TTL * 3).await;
    assert_eq!(store.get(b"brief").await.expect("get"), None);
    assert_eq!(store.ttl(b"brief").await.expect("ttl"), KeyTtl::Absent);
}

/// `expire` adds an expiration to a persistent key and replaces an existing one.
pub async fn ttl_expire_sets_and_replaces<S: KeyValueStore>(store: &S) {
    store.set(b"k".to_vec(), b"v".to_vec(), None).await.expect("set");

    assert!(store.expire(b"k", Duration::from_secs(500)).await.expect("expire"));
    let first = store.ttl(b"k").await.expect("ttl").remaining().expect("expiring");
    assert!(first <= Duration::from_secs(500));

    assert!(store.expire(b"k", LONG_TTL).await.expect("expire again"));
    let second = store.ttl(b"k").await.expect("ttl").remaining().expect("expiring");
    assert!(second > Duration::from_secs(500), "expire must replace the old TTL: {second:?}");

    assert_eq!(store.get(b"k").await.expect("get"), Some(Bytes::from("v")), "value untouched");
}

/// `expire` and `persist` on a missing key do nothing and report `false`.
pub async fn ttl_adjustments_on_missing_key_are_noops<S: KeyValueStore>(store: &S) {
    assert!(!store.expire(b"ghost", LONG_TTL).await.expect("expire"));
    assert!(!store.persist(b"ghost").await.expect("persist"));
    assert_eq!(store.ttl(b"ghost").await.expect("ttl"), KeyTtl::Absent);
}

/// `persist` removes an expiration and reports whether it did.
pub async fn ttl_persist_clears_expiration<S: KeyValueStore>(store: &S) {
    store.set(b"k".to_vec(), b"v".to_vec(), Some(LONG_TTL)).await.expect("set");
    assert!(store.persist(b"k").await.expect("persist"));
    assert_eq!(store.ttl(b"k").await.expect("ttl"), KeyTtl::Persistent);
    assert!(!store.persist(b"k").await.expect("persist again"));
}

/// Rewriting a key replaces its expiration along with its value.
pub async fn ttl_set_replaces_expiration<S: KeyValueStore>(store: &S) {
    store.set(b"k".to_vec(), b"v1".to_vec(), Some(LONG_TTL)).await.expect("set");
    store.set(b"k".to_vec(), b"v2".to_vec(), None).await.expect("overwrite");
    assert_eq!(store.ttl(b"k").await.expect("ttl"), KeyTtl::Persistent);

    store.set(b"k".to_vec(), b"v3".to_vec(), Some(LONG_TTL)).await.expect("overwrite");
    assert!(store.ttl(b"k").await.expect("ttl").is_expiring());
}

// ============================================================================
// CAS
// ============================================================================

/// `compare_and_set` with `expected: None` inserts only when absent.
pub async fn cas_insert_if_absent<S: KeyValueStore>(store: &S) {
    store.compare_and_set(b"lock", None, b"holder-1".to_vec(), None).await.expect("first insert");
    let second = store.compare_and_set(b"lock", None, b"holder-2".to_vec(), None).await;
    assert!(matches!(second, Err(StorageError::Conflict)), "got {second:?}");
    assert_eq!(store.get(b"lock").await.expect("get"), Some(Bytes::from("holder-1")));
}

/// `compare_and_set` with a matching expected value updates.
pub async fn cas_update_if_unchanged<S: KeyValueStore>(store: &S) {
    store.set(b"ver".to_vec(), b"1".to_vec(), None).await.expect("set");
    store.compare_and_set(b"ver", Some(b"1"), b"2".to_vec(), None).await.expect("cas");
    let stale = store.compare_and_set(b"ver", Some(b"1"), b"3".to_vec(), None).await;
    assert!(matches!(stale, Err(StorageError::Conflict)), "got {stale:?}");
    assert_eq!(store.get(b"ver").await.expect("get"), Some(Bytes::from("2")));
}

/// `compare_and_set` expecting a value fails on a missing key.
pub async fn cas_expected_value_on_missing_key_conflicts<S: KeyValueStore>(store: &S) {
    let result = store.compare_and_set(b"missing", Some(b"x"), b"y".to_vec(), None).await;
    assert!(matches!(result, Err(StorageError::Conflict)), "got {result:?}");
    assert_eq!(store.get(b"missing").await.expect("get"), None);
}

/// A successful `compare_and_set` applies the requested TTL.
pub async fn cas_applies_ttl<S: KeyValueStore>(store: &S) {
    store.compare_and_set(b"k", None, b"v".to_vec(), Some(LONG_TTL)).await.expect("cas");
    assert!(store.ttl(b"k").await.expect("ttl").is_expiring());
    store.compare_and_set(b"k", Some(b"v"), b"w".to_vec(), None).await.expect("cas");
    assert_eq!(store.ttl(b"k").await.expect("ttl"), KeyTtl::Persistent);
}

// ============================================================================
// Clear
// ============================================================================

/// `clear_prefix` deletes exactly the keys under the prefix.
pub async fn clear_prefix_is_scoped<S: KeyValueStore>(store: &S) {
    store.set(b"tokens/a".to_vec(), b"1".to_vec(), None).await.expect("set");
    store.set(b"tokens/b".to_vec(), b"2".to_vec(), Some(LONG_TTL)).await.expect("set");
    store.set(b"other/a".to_vec(), b"3".to_vec(), None).await.expect("set");

    store.clear_prefix(b"tokens/").await.expect("clear_prefix");

    assert_eq!(store.get(b"tokens/a").await.expect("get"), None);
    assert_eq!(store.get(b"tokens/b").await.expect("get"), None);
    assert_eq!(store.get(b"other/a").await.expect("get"), Some(Bytes::from("3")));
}

/// `clear` deletes everything.
pub async fn clear_removes_all_keys<S: KeyValueStore>(store: &S) {
    store.set(b"a".to_vec(), b"1".to_vec(), None).await.expect("set");
    store.set(b"b".to_vec(), b"2".to_vec(), Some(LONG_TTL)).await.expect("set");
    store.clear().await.expect("clear");
    assert_eq!(store.get(b"a").await.expect("get"), None);
    assert_eq!(store.ttl(b"b").await.expect("ttl"), KeyTtl::Absent);
}

// ============================================================================
// Concurrent
// ============================================================================

/// Concurrent read-modify-write loops over `compare_and_set` lose no updates.
///
/// This is the property the credential index relies on when several devices
/// of one principal sign in at the same time.
pub async fn concurrent_cas_loses_no_updates<S: KeyValueStore + 'static>(store: Arc<S>) {
    const TASKS: usize = 8;
    const INCREMENTS: usize = 25;

    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for _ in 0..INCREMENTS {
                loop {
                    let current = store.get(b"counter").await.expect("get");
                    let n: usize = current
                        .as_ref()
                        .and_then(|b| std::str::from_utf8(b).ok()?.parse().ok())
                        .unwrap_or(0);
                    let next = (n + 1).to_string().into_bytes();
                    match store.compare_and_set(b"counter", current.as_deref(), next, None).await {
                        Ok(()) => break,
                        Err(StorageError::Conflict) => tokio::task::yield_now().await,
                        Err(e) => panic!("unexpected storage error: {e}"),
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    let final_value = store.get(b"counter").await.expect("get").expect("counter exists");
    assert_eq!(final_value, Bytes::from((TASKS * INCREMENTS).to_string()));
}

/// Runs every check above, each against a freshly cleared store.
pub async fn run_all<S: KeyValueStore + 'static>(store: Arc<S>) {
    macro_rules! check {
        ($f:ident) => {
            store.clear().await.expect("clear between checks");
            $f(&*store).await;
        };
    }

    check!(crud_get_returns_none_for_missing_key);
    check!(crud_set_then_get_returns_value);
    check!(crud_set_overwrites_existing);
    check!(crud_delete_nonexistent_is_noop);
    check!(crud_delete_removes_key);
    check!(crud_keys_are_byte_distinct);
    check!(ttl_reports_persistent_and_absent);
    check!(ttl_reports_remaining_lifetime);
    check!(ttl_expired_key_is_absent);
    check!(ttl_expire_sets_and_replaces);
    check!(ttl_adjustments_on_missing_key_are_noops);
    check!(ttl_persist_clears_expiration);
    check!(ttl_set_replaces_expiration);
    check!(cas_insert_if_absent);
    check!(cas_update_if_unchanged);
    check!(cas_expected_value_on_missing_key_conflicts);
    check!(cas_applies_ttl);
    check!(clear_prefix_is_scoped);
    check!(clear_removes_all_keys);

    store.clear().await.expect("clear between checks");
    concurrent_cas_loses_no_updates(store).await;
}
