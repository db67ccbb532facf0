//! Request authentication against a principal directory.

use std::sync::Arc;

use crate::{
    engine::{CredentialEngine, CredentialHandle},
    error::{AuthError, Result},
    principal::{Principal, PrincipalDirectory},
};

/// The outcome of a successful [`Authenticator::authenticate`].
#[derive(Debug, Clone)]
pub struct Authenticated<P> {
    /// The active principal that owns the credential.
    pub principal: P,
    /// The presented credential, for revoking it later (logout).
    pub credential: CredentialHandle,
}

/// Turns a presented credential into an active principal.
///
/// Resolution runs through the [`CredentialEngine`], the owning principal is
/// looked up in the directory, the principal's TTLs are slid when the
/// engine's configuration sets `reset_ttl_on_authenticate`, and finally the
/// principal must be active.
#[derive(Debug)]
pub struct Authenticator<D> {
    engine: CredentialEngine,
    directory: Arc<D>,
}

impl<D> Clone for Authenticator<D> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone(), directory: Arc::clone(&self.directory) }
    }
}

impl<D: PrincipalDirectory> Authenticator<D> {
    /// Creates an authenticator.
    #[must_use]
    pub fn new(engine: CredentialEngine, directory: Arc<D>) -> Self {
        Self { engine, directory }
    }

    /// The wrapped engine.
    #[must_use]
    pub fn engine(&self) -> &CredentialEngine {
        &self.engine
    }

    /// The principal directory.
    #[must_use]
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Authenticates a presented credential.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CredentialNotFound`] if the credential does not resolve
    /// - [`AuthError::PrincipalNotFound`] if the directory has no such principal
    /// - [`AuthError::PrincipalInactive`] if the principal is disabled
    /// - [`AuthError::Directory`] or store errors on infrastructure failure
    ///
    /// Callers facing untrusted clients should report
    /// [`AuthError::public_message`] rather than the error itself.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, presented: &str) -> Result<Authenticated<D::Principal>> {
        let id = self.engine.resolve(presented).await?;

        let Some(principal) = self.directory.lookup(&id).await? else {
            tracing::warn!(principal = %id, "credential resolved to unknown principal");
            return Err(AuthError::PrincipalNotFound { principal: id });
        };

        if self.engine.reset_ttl_on_authenticate() {
            self.engine.touch(&id).await?;
        }

        if !principal.is_active() {
            tracing::debug!(principal = %id, "inactive principal rejected");
            return Err(AuthError::PrincipalInactive { principal: id });
        }

        Ok(Authenticated { principal, credential: CredentialHandle::new(presented, id) })
    }

    /// Revokes the credential of a previous authentication (logout).
    ///
    /// # Errors
    ///
    /// See [`CredentialEngine::revoke_one`].
    pub async fn logout(&self, authenticated: &Authenticated<D::Principal>) -> Result<bool> {
        self.engine.revoke_one(authenticated.credential.expose_credential()).await
    }
}
