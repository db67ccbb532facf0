//! Credential lifecycle engine.
//!
//! [`CredentialEngine`] is the public surface of this crate: issue, resolve,
//! revoke one, revoke all and refresh TTLs. It composes the
//! [`SecretGenerator`] and the [`CredentialIndex`] and holds no state of its
//! own beyond the injected store.
//!
//! # Lifecycle of one credential
//!
//! ```text
//!            issue                 revoke_one / revoke_all / store expiry
//!  ABSENT ──────────▶ LIVE ─────────────────────────────────────────▶ ABSENT
//! ```
//!
//! An expired credential resolves exactly like an unknown one.

use std::{fmt, sync::Arc};

use multitoken_storage::KeyValueStore;
use zeroize::Zeroizing;

use crate::{
    config::TokenConfig,
    error::{AuthError, ConfigError, Result},
    index::CredentialIndex,
    metrics::CredentialMetrics,
    principal::PrincipalId,
    secret::{GeneratedSecret, SecretGenerator, WRONG_VERIFIER, split_credential},
    ttl::TtlPolicy,
};

/// A newly issued credential.
///
/// `credential` is the only copy of the secret; it is zeroized on drop and
/// redacted from `Debug`.
pub struct IssuedCredential {
    /// The presented credential to hand to the client.
    pub credential: Zeroizing<String>,
    /// Whether this is the principal's first live credential.
    pub first_device: bool,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("credential", &"[REDACTED]")
            .field("first_device", &self.first_device)
            .finish()
    }
}

/// A presented credential that authenticated, with its owner.
#[derive(Clone)]
pub struct CredentialHandle {
    credential: Zeroizing<String>,
    principal: PrincipalId,
}

impl CredentialHandle {
    /// Pairs a presented credential with the principal it resolved to.
    #[must_use]
    pub fn new(credential: impl Into<String>, principal: PrincipalId) -> Self {
        Self { credential: Zeroizing::new(credential.into()), principal }
    }

    /// The owning principal.
    #[must_use]
    pub fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    /// The verifier half of the credential.
    #[must_use]
    pub fn verifier(&self) -> &str {
        split_credential(&self.credential).1
    }

    /// The full presented credential, secret included.
    #[must_use]
    pub fn expose_credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("principal", &self.principal)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

/// Issues, resolves and revokes multi-device credentials.
///
/// Cheaply cloneable; clones share the index and counters.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use multitoken_authn::{CredentialEngine, PrincipalId, TokenConfig};
/// use multitoken_storage::MemoryBackend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = CredentialEngine::new(Arc::new(MemoryBackend::new()), TokenConfig::default())?;
///
/// let alice = PrincipalId::from(42u64);
/// let issued = engine.issue(&alice).await?;
/// assert!(issued.first_device);
///
/// assert_eq!(engine.resolve(&issued.credential).await?, alice);
/// engine.revoke_one(&issued.credential).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CredentialEngine {
    index: Arc<CredentialIndex>,
    generator: SecretGenerator,
    require_verified_revocation: bool,
    reset_ttl_on_authenticate: bool,
}

impl fmt::Debug for CredentialEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEngine")
            .field("index", &self.index)
            .field("require_verified_revocation", &self.require_verified_revocation)
            .field("reset_ttl_on_authenticate", &self.reset_ttl_on_authenticate)
            .finish_non_exhaustive()
    }
}

impl CredentialEngine {
    /// Creates an engine over `store`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` is invalid (deserialized
    /// configurations are validated here).
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        config: TokenConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let generator = SecretGenerator::new(config.hash_cost())?;
        Ok(Self {
            index: Arc::new(CredentialIndex::new(store, &config)),
            generator,
            require_verified_revocation: config.require_verified_revocation(),
            reset_ttl_on_authenticate: config.reset_ttl_on_authenticate(),
        })
    }

    /// The underlying index.
    #[must_use]
    pub fn index(&self) -> &CredentialIndex {
        &self.index
    }

    /// The TTL policy applied to every key.
    #[must_use]
    pub fn policy(&self) -> TtlPolicy {
        self.index.policy()
    }

    /// Whether a successful authentication should slide TTLs.
    #[must_use]
    pub fn reset_ttl_on_authenticate(&self) -> bool {
        self.reset_ttl_on_authenticate
    }

    /// Lifecycle counters.
    #[must_use]
    pub fn metrics(&self) -> &CredentialMetrics {
        self.index.metrics()
    }

    /// Issues a new credential for `principal`.
    ///
    /// The secret is never stored and cannot be recovered later.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Hashing`] if hashing fails
    /// - [`AuthError::Contention`], [`AuthError::IndexCorrupted`] or
    ///   [`AuthError::StoreUnavailable`] from the index
    #[tracing::instrument(skip_all, fields(principal = %principal))]
    pub async fn issue(&self, principal: &PrincipalId) -> Result<IssuedCredential> {
        let generated = self.generate().await?;
        let first_device = self.index.add_credential(principal, generated.verifier()).await?;

        self.metrics().record_issued(first_device);
        tracing::debug!(first_device, "credential issued");

        Ok(IssuedCredential { credential: generated.into_presented(), first_device })
    }

    /// Resolves a presented credential to its principal.
    ///
    /// Malformed, unverifiable, unknown, expired and orphaned credentials
    /// all fail the same way.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CredentialNotFound`] for any credential that does not authenticate
    /// - [`AuthError::IndexCorrupted`] or [`AuthError::StoreUnavailable`] from the index
    #[tracing::instrument(skip_all)]
    pub async fn resolve(&self, presented: &str) -> Result<PrincipalId> {
        let result = self.resolve_inner(presented).await;
        match &result {
            Ok(_) => self.metrics().record_resolved(),
            Err(AuthError::CredentialNotFound) => self.metrics().record_resolve_failure(),
            Err(_) => {},
        }
        result
    }

    async fn resolve_inner(&self, presented: &str) -> Result<PrincipalId> {
        let (secret, verifier) = split_credential(presented);
        if verifier == WRONG_VERIFIER {
            tracing::debug!("malformed credential");
            return Err(AuthError::CredentialNotFound);
        }

        // Only verifiers this engine issued are ever hashed.
        let Some(principal) = self.index.resolve_principal(verifier).await? else {
            tracing::debug!("verifier not in index");
            return Err(AuthError::CredentialNotFound);
        };

        if !self.verify(secret, verifier).await? {
            tracing::debug!(principal = %principal, "credential failed verification");
            return Err(AuthError::CredentialNotFound);
        }

        if !self.index.is_member(&principal, verifier).await? {
            tracing::debug!(principal = %principal, "orphaned reverse entry");
            return Err(AuthError::CredentialNotFound);
        }

        Ok(principal)
    }

    /// Revokes a single credential.
    ///
    /// Returns whether a credential was removed. Unknown credentials are a
    /// no-op. Only the verifier half is used unless
    /// `require_verified_revocation` is set, in which case the credential
    /// must resolve first.
    ///
    /// # Errors
    ///
    /// [`AuthError::Contention`], [`AuthError::IndexCorrupted`] or
    /// [`AuthError::StoreUnavailable`] from the index.
    #[tracing::instrument(skip_all)]
    pub async fn revoke_one(&self, presented: &str) -> Result<bool> {
        if self.require_verified_revocation {
            match self.resolve_inner(presented).await {
                Ok(_) => {},
                Err(AuthError::CredentialNotFound) => {
                    tracing::debug!("unverified revocation ignored");
                    return Ok(false);
                },
                Err(e) => return Err(e),
            }
        }

        let (_, verifier) = split_credential(presented);
        let removed = self.index.remove_credential(verifier).await?;
        if removed {
            self.metrics().record_revoked();
        }
        Ok(removed)
    }

    /// Revokes every credential of `principal`.
    ///
    /// Returns the number of credentials removed.
    ///
    /// # Errors
    ///
    /// [`AuthError::IndexCorrupted`] or [`AuthError::StoreUnavailable`] from
    /// the index.
    #[tracing::instrument(skip_all, fields(principal = %principal))]
    pub async fn revoke_all(&self, principal: &PrincipalId) -> Result<usize> {
        let count = self.index.remove_all_credentials(principal).await?;
        self.metrics().record_bulk_revocation(count);
        tracing::debug!(count, "credentials revoked");
        Ok(count)
    }

    /// Slides the TTL of `principal`'s sequence and of each live credential.
    ///
    /// Returns the number of keys evaluated.
    ///
    /// # Errors
    ///
    /// [`AuthError::IndexCorrupted`] or [`AuthError::StoreUnavailable`] from
    /// the index.
    #[tracing::instrument(skip_all, fields(principal = %principal))]
    pub async fn touch(&self, principal: &PrincipalId) -> Result<usize> {
        let keys = self.index.refresh_ttl(principal).await?;
        self.metrics().record_ttl_refresh(keys);
        Ok(keys)
    }

    /// Number of live credentials (devices) of `principal`.
    ///
    /// # Errors
    ///
    /// [`AuthError::IndexCorrupted`] or [`AuthError::StoreUnavailable`] from
    /// the index.
    pub async fn live_credentials(&self, principal: &PrincipalId) -> Result<usize> {
        Ok(self.index.credentials(principal).await?.len())
    }

    async fn generate(&self) -> Result<GeneratedSecret> {
        let generator = self.generator.clone();
        tokio::task::spawn_blocking(move || generator.generate())
            .await
            .map_err(|e| AuthError::hashing(format!("hashing task failed: {e}")))?
    }

    async fn verify(&self, secret: &str, verifier: &str) -> Result<bool> {
        let generator = self.generator.clone();
        let secret = Zeroizing::new(secret.to_owned());
        let verifier = verifier.to_owned();
        tokio::task::spawn_blocking(move || generator.verify(&secret, &verifier))
            .await
            .map_err(|e| AuthError::hashing(format!("verification task failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use multitoken_storage::MemoryBackend;

    use super::*;
    use crate::{
        secret::{TOKEN_SEPARATOR, join_credential},
        testutil::{engine_with_config, fast_hash_cost, memory_engine},
    };

    #[tokio::test]
    async fn test_issue_then_resolve() {
        let (_, engine) = memory_engine();
        let p = PrincipalId::from(1u64);

        let issued = engine.issue(&p).await.unwrap();
        assert!(issued.first_device);
        assert!(issued.credential.contains(TOKEN_SEPARATOR));
        assert_eq!(engine.resolve(&issued.credential).await.unwrap(), p);
    }

    #[tokio::test]
    async fn test_resolve_rejects_tampered_secret() {
        let (_, engine) = memory_engine();
        let issued = engine.issue(&PrincipalId::from(1u64)).await.unwrap();
        let (_, verifier) = split_credential(&issued.credential);

        let forged = join_credential(&"0".repeat(40), verifier);
        assert!(matches!(engine.resolve(&forged).await, Err(AuthError::CredentialNotFound)));
    }

    #[tokio::test]
    async fn test_resolve_rejects_orphaned_reverse_entry() {
        let (store, engine) = memory_engine();
        let p = PrincipalId::from(1u64);
        let issued = engine.issue(&p).await.unwrap();

        // Drop the sequence but leave the reverse entry behind.
        store.set(b"tokens/principals/1".to_vec(), b"[]".to_vec(), None).await.unwrap();

        assert!(matches!(
            engine.resolve(&issued.credential).await,
            Err(AuthError::CredentialNotFound)
        ));
    }

    #[tokio::test]
    async fn test_resolve_skips_hashing_for_unknown_verifier() {
        let (_, engine) = memory_engine();
        let issued = engine.issue(&PrincipalId::from(1u64)).await.unwrap();
        let (secret, verifier) = split_credential(&issued.credential);

        // Same secret, a verifier the index never saw, at a cost that would
        // take minutes to hash.
        let unknown = verifier.replacen("t=1,", "t=4000000000,", 1);
        let presented = join_credential(secret, &unknown);

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(5), engine.resolve(&presented))
                .await
                .expect("resolve must not hash an unknown verifier");
        assert!(matches!(result, Err(AuthError::CredentialNotFound)));
    }

    #[tokio::test]
    async fn test_engine_carries_reset_ttl_flag_from_config() {
        let (_, engine) = memory_engine();
        assert!(engine.reset_ttl_on_authenticate());

        let config = TokenConfig::builder()
            .hash_cost(fast_hash_cost())
            .reset_ttl_on_authenticate(false)
            .build()
            .unwrap();
        let engine = engine_with_config(&MemoryBackend::new(), config);
        assert!(!engine.reset_ttl_on_authenticate());
    }

    #[tokio::test]
    async fn test_revoke_one_is_idempotent() {
        let (_, engine) = memory_engine();
        let issued = engine.issue(&PrincipalId::from(1u64)).await.unwrap();

        assert!(engine.revoke_one(&issued.credential).await.unwrap());
        assert!(!engine.revoke_one(&issued.credential).await.unwrap());
        assert!(!engine.revoke_one("garbage").await.unwrap());
    }

    #[tokio::test]
    async fn test_verified_revocation_requires_secret() {
        let store = MemoryBackend::new();
        let config = TokenConfig::builder()
            .hash_cost(fast_hash_cost())
            .require_verified_revocation(true)
            .build()
            .unwrap();
        let engine = engine_with_config(&store, config);
        let p = PrincipalId::from(1u64);
        let issued = engine.issue(&p).await.unwrap();
        let (_, verifier) = split_credential(&issued.credential);

        let guessed = join_credential("not-the-secret", verifier);
        assert!(!engine.revoke_one(&guessed).await.unwrap());
        assert_eq!(engine.resolve(&issued.credential).await.unwrap(), p);

        assert!(engine.revoke_one(&issued.credential).await.unwrap());
        assert!(engine.resolve(&issued.credential).await.is_err());
    }

    #[tokio::test]
    async fn test_unverified_revocation_uses_verifier_only() {
        let (_, engine) = memory_engine();
        let issued = engine.issue(&PrincipalId::from(1u64)).await.unwrap();
        let (_, verifier) = split_credential(&issued.credential);

        let guessed = join_credential("not-the-secret", verifier);
        assert!(engine.revoke_one(&guessed).await.unwrap());
        assert!(engine.resolve(&issued.credential).await.is_err());
    }

    #[tokio::test]
    async fn test_metrics_follow_lifecycle() {
        let (_, engine) = memory_engine();
        let p = PrincipalId::from(1u64);

        let a = engine.issue(&p).await.unwrap();
        let _b = engine.issue(&p).await.unwrap();
        engine.resolve(&a.credential).await.unwrap();
        let _ = engine.resolve("nope").await;
        engine.touch(&p).await.unwrap();
        engine.revoke_one(&a.credential).await.unwrap();
        engine.revoke_all(&p).await.unwrap();

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.issued, 2);
        assert_eq!(snapshot.first_device_issued, 1);
        assert_eq!(snapshot.resolved, 1);
        assert_eq!(snapshot.resolve_failures, 1);
        assert_eq!(snapshot.ttl_keys_refreshed, 3);
        assert_eq!(snapshot.revoked, 1);
        assert_eq!(snapshot.bulk_revocations, 1);
        assert_eq!(snapshot.bulk_revoked_credentials, 1);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_deserialized_config() {
        let config: TokenConfig = serde_json::from_str(r#"{ "namespace": "" }"#).unwrap();
        let result = CredentialEngine::new(Arc::new(MemoryBackend::default()), config);
        assert!(matches!(result, Err(ConfigError::EmptyNamespace)));
    }

    #[test]
    fn test_debug_output_redacts_credentials() {
        let issued =
            IssuedCredential { credential: Zeroizing::new("s3cret:hash:v".into()), first_device: true };
        assert!(!format!("{issued:?}").contains("s3cret"));

        let handle = CredentialHandle::new("s3cret:hash:v", PrincipalId::from(5u64));
        let debug = format!("{handle:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains('5'));
        assert_eq!(handle.verifier(), "v");
    }
}
