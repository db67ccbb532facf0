//! Principal identifiers and the directory that resolves them.
//!
//! A principal is the entity a credential authenticates as. This crate never
//! owns principals: it stores their opaque [`PrincipalId`] and asks a
//! [`PrincipalDirectory`] for the rest when authenticating.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque identifier of a principal, as supplied by the external directory.
///
/// Numeric and string primary keys are both stored as their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Creates an identifier from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as stored in the index.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<u64> for PrincipalId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for PrincipalId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for PrincipalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What the authentication adapter needs to know about a principal.
pub trait Principal: Send + Sync {
    /// The principal's identifier.
    fn id(&self) -> &PrincipalId;

    /// Whether the principal may authenticate.
    fn is_active(&self) -> bool;
}

/// External source of truth for principals.
///
/// Implementations map their own failures to
/// [`AuthError::Directory`](crate::AuthError::Directory).
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// The principal type this directory returns.
    type Principal: Principal;

    /// Looks up a principal by identifier.
    ///
    /// Returns `Ok(None)` when no such principal exists.
    async fn lookup(&self, id: &PrincipalId) -> Result<Option<Self::Principal>>;
}

#[async_trait]
impl<D: PrincipalDirectory + ?Sized> PrincipalDirectory for Arc<D> {
    type Principal = D::Principal;

    async fn lookup(&self, id: &PrincipalId) -> Result<Option<Self::Principal>> {
        (**self).lookup(id).await
    }
}

/// A minimal principal: an identifier and an active flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalRecord {
    id: PrincipalId,
    active: bool,
}

impl PrincipalRecord {
    /// Creates an active principal.
    #[must_use]
    pub fn active(id: impl Into<PrincipalId>) -> Self {
        Self { id: id.into(), active: true }
    }

    /// Creates an inactive principal.
    #[must_use]
    pub fn inactive(id: impl Into<PrincipalId>) -> Self {
        Self { id: id.into(), active: false }
    }
}

impl Principal for PrincipalRecord {
    fn id(&self) -> &PrincipalId {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// In-memory [`PrincipalDirectory`] for tests and development.
///
/// Cheaply cloneable; clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryPrincipalDirectory {
    records: Arc<RwLock<HashMap<PrincipalId, PrincipalRecord>>>,
}

impl MemoryPrincipalDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a principal.
    pub fn insert(&self, record: PrincipalRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    /// Flips a principal's active flag. Returns `false` if it is unknown.
    pub fn set_active(&self, id: &PrincipalId, active: bool) -> bool {
        match self.records.write().get_mut(id) {
            Some(record) => {
                record.active = active;
                true
            },
            None => false,
        }
    }

    /// Removes a principal. Returns `true` if it existed.
    pub fn remove(&self, id: &PrincipalId) -> bool {
        self.records.write().remove(id).is_some()
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryPrincipalDirectory {
    type Principal = PrincipalRecord;

    async fn lookup(&self, id: &PrincipalId) -> Result<Option<PrincipalRecord>> {
        Ok(self.records.read().get(id).cloned())
    }
}
