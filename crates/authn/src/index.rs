//! Two-directional credential index.
//!
//! The index owns two key families under its namespace:
//!
//! ```text
//! {namespace}/principals/{principal_id} → ["$argon2id$…", "$argon2id$…"]   (JSON, insertion order)
//! {namespace}/verifiers/{verifier}      → principal_id                      (UTF-8)
//! ```
//!
//! Every write and refresh goes through the [`TtlPolicy`], evaluated per key
//! against that key's own current state.
//!
//! # Consistency
//!
//! The store only guarantees per-key atomicity. Sequence updates are
//! compare-and-set loops, so concurrent issuance and revocation for one
//! principal never lose each other's changes. The sequence key and the
//! reverse key are still written in two steps; a crash in between can leave
//! an orphaned reverse entry, which [`CredentialEngine::resolve`] refuses
//! because it also checks sequence membership.
//!
//! [`CredentialEngine::resolve`]: crate::CredentialEngine::resolve

use std::{fmt, sync::Arc};

use bytes::Bytes;
use fail::fail_point;
use multitoken_storage::{KeyValueStore, StorageError};

use crate::{
    config::TokenConfig,
    error::{AuthError, Result},
    metrics::CredentialMetrics,
    principal::PrincipalId,
    ttl::TtlPolicy,
};

/// Store-backed index of live credentials.
pub struct CredentialIndex {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    policy: TtlPolicy,
    max_cas_attempts: u32,
    metrics: CredentialMetrics,
}

impl fmt::Debug for CredentialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIndex")
            .field("namespace", &self.namespace)
            .field("policy", &self.policy)
            .field("max_cas_attempts", &self.max_cas_attempts)
            .finish_non_exhaustive()
    }
}

impl CredentialIndex {
    /// Creates an index over `store` using `config`'s namespace, TTL policy
    /// and compare-and-set budget.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, config: &TokenConfig) -> Self {
        Self::with_metrics(store, config, CredentialMetrics::new())
    }

    /// Creates an index that records into existing counters.
    #[must_use]
    pub fn with_metrics(
        store: Arc<dyn KeyValueStore>,
        config: &TokenConfig,
        metrics: CredentialMetrics,
    ) -> Self {
        Self {
            store,
            namespace: config.namespace().to_owned(),
            policy: config.ttl_policy(),
            max_cas_attempts: config.max_cas_attempts(),
            metrics,
        }
    }

    /// The TTL policy applied to every key.
    #[must_use]
    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    /// The counters this index records into.
    #[must_use]
    pub fn metrics(&self) -> &CredentialMetrics {
        &self.metrics
    }

    /// Store key of a principal's credential sequence.
    #[must_use]
    pub fn principal_key(&self, principal: &PrincipalId) -> Vec<u8> {
        format!("{}/principals/{principal}", self.namespace).into_bytes()
    }

    /// Store key of a verifier's reverse entry.
    #[must_use]
    pub fn verifier_key(&self, verifier: &str) -> Vec<u8> {
        format!("{}/verifiers/{verifier}", self.namespace).into_bytes()
    }

    /// Appends `verifier` to `principal`'s sequence and writes the reverse
    /// entry.
    ///
    /// Returns `true` if the sequence held no live credential before, that
    /// is, this is the principal's first device. Adding a verifier already
    /// in the sequence does not duplicate it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Contention`] if the sequence kept changing underneath
    /// - [`AuthError::IndexCorrupted`] if the stored sequence cannot be decoded
    /// - [`AuthError::StoreUnavailable`] on store failure
    #[tracing::instrument(skip_all, fields(principal = %principal))]
    pub async fn add_credential(&self, principal: &PrincipalId, verifier: &str) -> Result<bool> {
        let key = self.principal_key(principal);

        let mut first_device = false;
        self.update_sequence(principal, &key, |verifiers| {
            first_device = verifiers.is_empty();
            if verifiers.iter().any(|v| v == verifier) {
                return false;
            }
            verifiers.push(verifier.to_owned());
            true
        })
        .await?;

        fail_point!("index-after-sequence-write", |_| {
            Err(AuthError::StoreUnavailable(StorageError::internal(
                "injected failure after sequence write",
            )))
        });

        let reverse_key = self.verifier_key(verifier);
        let ttl = self.policy.ttl_for_write(self.store.ttl(&reverse_key).await?);
        self.store.set(reverse_key, principal.as_str().as_bytes().to_vec(), ttl).await?;

        Ok(first_device)
    }

    /// Removes `verifier` from its owner's sequence and deletes its reverse
    /// entry.
    ///
    /// Returns `false` (and changes nothing) if the verifier is unknown. An
    /// emptied sequence is kept as `[]`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Contention`] if the sequence kept changing underneath
    /// - [`AuthError::IndexCorrupted`] if a stored value cannot be decoded
    /// - [`AuthError::StoreUnavailable`] on store failure
    #[tracing::instrument(skip_all)]
    pub async fn remove_credential(&self, verifier: &str) -> Result<bool> {
        let reverse_key = self.verifier_key(verifier);
        let Some(principal) = self.resolve_principal(verifier).await? else {
            tracing::debug!("revocation of unknown credential ignored");
            return Ok(false);
        };

        let key = self.principal_key(&principal);
        self.update_sequence(&principal, &key, |verifiers| {
            let before = verifiers.len();
            verifiers.retain(|v| v != verifier);
            verifiers.len() != before
        })
        .await?;

        self.store.delete(&reverse_key).await?;
        Ok(true)
    }

    /// Deletes every reverse entry of `principal`, then its sequence.
    ///
    /// Returns the number of credentials removed; 0 when the principal has
    /// no sequence.
    ///
    /// # Errors
    ///
    /// - [`AuthError::IndexCorrupted`] if the stored sequence cannot be decoded
    /// - [`AuthError::StoreUnavailable`] on store failure
    #[tracing::instrument(skip_all, fields(principal = %principal))]
    pub async fn remove_all_credentials(&self, principal: &PrincipalId) -> Result<usize> {
        let key = self.principal_key(principal);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(0);
        };
        let verifiers = decode_sequence(&key, &raw)?;

        for verifier in &verifiers {
            self.store.delete(&self.verifier_key(verifier)).await?;
        }
        self.store.delete(&key).await?;

        Ok(verifiers.len())
    }

    /// Looks up the owner of `verifier`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::IndexCorrupted`] if the reverse entry is not UTF-8
    /// - [`AuthError::StoreUnavailable`] on store failure
    pub async fn resolve_principal(&self, verifier: &str) -> Result<Option<PrincipalId>> {
        let key = self.verifier_key(verifier);
        match self.store.get(&key).await? {
            Some(raw) => {
                let id = std::str::from_utf8(&raw).map_err(|e| {
                    tracing::warn!(error = %e, "undecodable reverse entry");
                    AuthError::index_corrupted(display_key(&key), e.to_string())
                })?;
                Ok(Some(PrincipalId::from(id)))
            },
            None => Ok(None),
        }
    }

    /// Live verifiers of `principal`, in insertion order.
    ///
    /// # Errors
    ///
    /// - [`AuthError::IndexCorrupted`] if the stored sequence cannot be decoded
    /// - [`AuthError::StoreUnavailable`] on store failure
    pub async fn credentials(&self, principal: &PrincipalId) -> Result<Vec<String>> {
        let key = self.principal_key(principal);
        match self.store.get(&key).await? {
            Some(raw) => decode_sequence(&key, &raw),
            None => Ok(Vec::new()),
        }
    }

    /// Whether `verifier` is in `principal`'s sequence.
    ///
    /// # Errors
    ///
    /// See [`credentials`](Self::credentials).
    pub async fn is_member(&self, principal: &PrincipalId, verifier: &str) -> Result<bool> {
        Ok(self.credentials(principal).await?.iter().any(|v| v == verifier))
    }

    /// Re-applies the TTL policy to `principal`'s sequence key and to the
    /// reverse key of every verifier it lists.
    ///
    /// Returns the number of keys evaluated: N+1 for N live credentials, 0
    /// when the principal has no sequence. Never touches another
    /// principal's keys.
    ///
    /// # Errors
    ///
    /// - [`AuthError::IndexCorrupted`] if the stored sequence cannot be decoded
    /// - [`AuthError::StoreUnavailable`] on store failure
    #[tracing::instrument(skip_all, fields(principal = %principal))]
    pub async fn refresh_ttl(&self, principal: &PrincipalId) -> Result<usize> {
        let key = self.principal_key(principal);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(0);
        };
        let verifiers = decode_sequence(&key, &raw)?;

        self.policy.apply(self.store.as_ref(), &key).await?;
        for verifier in &verifiers {
            self.policy.apply(self.store.as_ref(), &self.verifier_key(verifier)).await?;
        }

        Ok(verifiers.len() + 1)
    }

    /// Deletes every key in this index's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StoreUnavailable`] on store failure.
    #[tracing::instrument(skip_all, fields(namespace = %self.namespace))]
    pub async fn purge(&self) -> Result<()> {
        let prefix = format!("{}/", self.namespace);
        self.store.clear_prefix(prefix.as_bytes()).await?;
        Ok(())
    }

    /// Read-modify-compare-and-set loop over a principal's sequence.
    ///
    /// `edit` mutates the decoded sequence (empty when absent) and returns
    /// whether it changed anything; unchanged sequences are not rewritten.
    async fn update_sequence<F>(&self, principal: &PrincipalId, key: &[u8], mut edit: F) -> Result<()>
    where
        F: FnMut(&mut Vec<String>) -> bool + Send,
    {
        for attempt in 1..=self.max_cas_attempts {
            let current: Option<Bytes> = self.store.get(key).await?;
            let mut verifiers = match &current {
                Some(raw) => decode_sequence(key, raw)?,
                None => Vec::new(),
            };

            if !edit(&mut verifiers) {
                return Ok(());
            }

            let encoded = serde_json::to_vec(&verifiers).map_err(|e| {
                StorageError::serialization_with_source("failed to encode credential sequence", e)
            })?;
            let ttl = self.policy.ttl_for_write(self.store.ttl(key).await?);

            match self.store.compare_and_set(key, current.as_deref(), encoded, ttl).await {
                Ok(()) => return Ok(()),
                Err(StorageError::Conflict) => {
                    self.metrics.record_cas_conflict();
                    tracing::debug!(attempt, "credential sequence changed concurrently, retrying");
                },
                Err(e) => return Err(e.into()),
            }
        }

        self.metrics.record_contention_failure();
        tracing::warn!(
            attempts = self.max_cas_attempts,
            "giving up on credential sequence update under contention"
        );
        Err(AuthError::Contention { principal: principal.clone(), attempts: self.max_cas_attempts })
    }
}

fn decode_sequence(key: &[u8], raw: &[u8]) -> Result<Vec<String>> {
    serde_json::from_slice(raw).map_err(|e| {
        tracing::warn!(error = %e, "undecodable credential sequence");
        AuthError::index_corrupted(display_key(key), e.to_string())
    })
}

fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use multitoken_storage::{KeyTtl, MemoryBackend, assert_ttl_near, testutil::FailingBackend};

    use super::*;
    use crate::testutil::test_config;

    fn index_on(store: &MemoryBackend) -> CredentialIndex {
        CredentialIndex::new(Arc::new(store.clone()), &test_config())
    }

    #[tokio::test]
    async fn test_key_layout() {
        let index = index_on(&MemoryBackend::new());
        assert_eq!(index.principal_key(&PrincipalId::from(7u64)), b"tokens/principals/7");
        assert_eq!(index.verifier_key("$argon2id$abc"), b"tokens/verifiers/$argon2id$abc");
    }

    #[tokio::test]
    async fn test_add_reports_first_device_and_keeps_order() {
        let store = MemoryBackend::new();
        let index = index_on(&store);
        let alice = PrincipalId::from("alice");

        assert!(index.add_credential(&alice, "v1").await.unwrap());
        assert!(!index.add_credential(&alice, "v2").await.unwrap());
        assert!(!index.add_credential(&alice, "v3").await.unwrap());

        assert_eq!(index.credentials(&alice).await.unwrap(), ["v1", "v2", "v3"]);
        assert_eq!(index.resolve_principal("v2").await.unwrap(), Some(alice.clone()));

        let raw = store.get(b"tokens/principals/alice").await.unwrap().unwrap();
        assert_eq!(&raw[..], br#"["v1","v2","v3"]"#);
        let raw = store.get(b"tokens/verifiers/v2").await.unwrap().unwrap();
        assert_eq!(&raw[..], b"alice");
    }

    #[tokio::test]
    async fn test_add_never_duplicates() {
        let index = index_on(&MemoryBackend::new());
        let p = PrincipalId::from(1u64);

        index.add_credential(&p, "v1").await.unwrap();
        index.add_credential(&p, "v1").await.unwrap();
        assert_eq!(index.credentials(&p).await.unwrap(), ["v1"]);
    }

    #[tokio::test]
    async fn test_remove_keeps_empty_sequence() {
        let store = MemoryBackend::new();
        let index = index_on(&store);
        let p = PrincipalId::from(1u64);

        index.add_credential(&p, "v1").await.unwrap();
        assert!(index.remove_credential("v1").await.unwrap());

        let raw = store.get(b"tokens/principals/1").await.unwrap().unwrap();
        assert_eq!(&raw[..], b"[]");
        assert_eq!(index.resolve_principal("v1").await.unwrap(), None);

        assert!(index.add_credential(&p, "v2").await.unwrap(), "empty sequence means first device");
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let store = MemoryBackend::new();
        let index = index_on(&store);
        index.add_credential(&PrincipalId::from(1u64), "v1").await.unwrap();

        assert!(!index.remove_credential("nope").await.unwrap());
        assert_eq!(index.credentials(&PrincipalId::from(1u64)).await.unwrap(), ["v1"]);
    }

    #[tokio::test]
    async fn test_remove_orphaned_reverse_entry() {
        let store = MemoryBackend::new();
        let index = index_on(&store);
        store.set(b"tokens/verifiers/ghost".to_vec(), b"9".to_vec(), None).await.unwrap();

        assert!(index.remove_credential("ghost").await.unwrap());
        assert_eq!(store.get(b"tokens/verifiers/ghost").await.unwrap(), None);
        assert_eq!(store.get(b"tokens/principals/9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_all() {
        let store = MemoryBackend::new();
        let index = index_on(&store);
        let (a, b) = (PrincipalId::from(1u64), PrincipalId::from(2u64));
        index.add_credential(&a, "a1").await.unwrap();
        index.add_credential(&a, "a2").await.unwrap();
        index.add_credential(&b, "b1").await.unwrap();

        assert_eq!(index.remove_all_credentials(&a).await.unwrap(), 2);
        assert_eq!(store.get(b"tokens/principals/1").await.unwrap(), None);
        assert_eq!(index.resolve_principal("a1").await.unwrap(), None);
        assert_eq!(index.resolve_principal("a2").await.unwrap(), None);
        assert_eq!(index.resolve_principal("b1").await.unwrap(), Some(b));

        assert_eq!(index.remove_all_credentials(&a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_writes_follow_policy() {
        let store = MemoryBackend::new();
        let config = TokenConfig::builder()
            .ttl(Duration::from_secs(1000))
            .hash_cost(crate::testutil::fast_hash_cost())
            .build()
            .unwrap();
        let index = CredentialIndex::new(Arc::new(store.clone()), &config);
        let p = PrincipalId::from(1u64);

        index.add_credential(&p, "v1").await.unwrap();
        assert_ttl_near!(store.ttl(b"tokens/principals/1").await.unwrap(), Duration::from_secs(1000));
        assert_ttl_near!(store.ttl(b"tokens/verifiers/v1").await.unwrap(), Duration::from_secs(1000));
    }

    #[tokio::test]
    async fn test_rewrite_keeps_persistent_sequence_without_overwrite() {
        let store = MemoryBackend::new();
        let p = PrincipalId::from(1u64);
        index_on(&store).add_credential(&p, "v1").await.unwrap();

        let config = TokenConfig::builder()
            .ttl(Duration::from_secs(1000))
            .overwrite_none_ttl(false)
            .hash_cost(crate::testutil::fast_hash_cost())
            .build()
            .unwrap();
        let index = CredentialIndex::new(Arc::new(store.clone()), &config);
        index.add_credential(&p, "v2").await.unwrap();

        assert_eq!(store.ttl(b"tokens/principals/1").await.unwrap(), KeyTtl::Persistent);
        assert_ttl_near!(store.ttl(b"tokens/verifiers/v2").await.unwrap(), Duration::from_secs(1000));
    }

    #[tokio::test]
    async fn test_refresh_counts_keys() {
        let index = index_on(&MemoryBackend::new());
        let p = PrincipalId::from(1u64);
        assert_eq!(index.refresh_ttl(&p).await.unwrap(), 0);

        index.add_credential(&p, "v1").await.unwrap();
        index.add_credential(&p, "v2").await.unwrap();
        assert_eq!(index.refresh_ttl(&p).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_corrupted_sequence() {
        let store = MemoryBackend::new();
        let index = index_on(&store);
        store.set(b"tokens/principals/1".to_vec(), b"not json".to_vec(), None).await.unwrap();

        let err = index.add_credential(&PrincipalId::from(1u64), "v1").await.unwrap_err();
        match err {
            AuthError::IndexCorrupted { key, .. } => assert_eq!(key, "tokens/principals/1"),
            other => panic!("expected IndexCorrupted, got {other:?}"),
        }
        assert!(matches!(
            index.credentials(&PrincipalId::from(1u64)).await,
            Err(AuthError::IndexCorrupted { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupted_reverse_entry() {
        let store = MemoryBackend::new();
        let index = index_on(&store);
        store.set(b"tokens/verifiers/v1".to_vec(), vec![0xff, 0xfe], None).await.unwrap();

        assert!(matches!(
            index.resolve_principal("v1").await,
            Err(AuthError::IndexCorrupted { .. })
        ));
    }

    #[tokio::test]
    async fn test_purge_is_namespace_scoped() {
        let store = MemoryBackend::new();
        let index = index_on(&store);
        index.add_credential(&PrincipalId::from(1u64), "v1").await.unwrap();
        store.set(b"tokens-other/keep".to_vec(), b"x".to_vec(), None).await.unwrap();

        index.purge().await.unwrap();
        assert!(index.credentials(&PrincipalId::from(1u64)).await.unwrap().is_empty());
        assert!(store.get(b"tokens-other/keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let index = CredentialIndex::new(Arc::new(FailingBackend::new()), &test_config());
        let err = index.add_credential(&PrincipalId::from(1u64), "v1").await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(StorageError::Connection { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_lose_nothing() {
        let store = MemoryBackend::new();
        let config = TokenConfig::builder()
            .max_cas_attempts(1_000)
            .hash_cost(crate::testutil::fast_hash_cost())
            .build()
            .unwrap();
        let index = Arc::new(CredentialIndex::new(Arc::new(store.clone()), &config));
        let p = PrincipalId::from(1u64);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let index = Arc::clone(&index);
            let p = p.clone();
            tasks.spawn(async move { index.add_credential(&p, &format!("v{i}")).await });
        }
        let mut firsts = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().unwrap() {
                firsts += 1;
            }
        }

        assert_eq!(firsts, 1, "exactly one issuance sees an empty sequence");
        assert_eq!(index.credentials(&p).await.unwrap().len(), 32);
    }
}
