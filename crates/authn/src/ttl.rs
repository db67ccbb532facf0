//! TTL reconciliation policy.
//!
//! Decides, per key, whether a stored key keeps, gains, loses or renews its
//! expiration when it is written or refreshed:
//!
//! | current TTL    | desired TTL | action                                     |
//! |----------------|-------------|--------------------------------------------|
//! | none           | none        | keep persistent                            |
//! | none           | `D`         | expire in `D` only if `overwrite_none_ttl` |
//! | has expiration | none        | persist                                    |
//! | has expiration | `D`         | expire in `D`                              |
//!
//! Absent keys are never refreshed; when written they get the desired TTL.

use std::time::Duration;

use multitoken_storage::{KeyTtl, KeyValueStore, StorageResult};

/// What [`TtlPolicy::reconcile`] decided for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlAction {
    /// Leave the key's expiration as it is.
    Keep,
    /// Make the key expire after the given duration.
    Expire(Duration),
    /// Remove the key's expiration.
    Persist,
}

/// The desired TTL plus the flag that governs persistent keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    desired: Option<Duration>,
    overwrite_none_ttl: bool,
}

impl TtlPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(desired: Option<Duration>, overwrite_none_ttl: bool) -> Self {
        Self { desired, overwrite_none_ttl }
    }

    /// The configured TTL preference.
    #[must_use]
    pub const fn desired(&self) -> Option<Duration> {
        self.desired
    }

    /// Whether persistent keys gain the desired TTL.
    #[must_use]
    pub const fn overwrite_none_ttl(&self) -> bool {
        self.overwrite_none_ttl
    }

    /// Decides how to refresh a key currently in state `current`.
    #[must_use]
    pub fn reconcile(&self, current: KeyTtl) -> TtlAction {
        match (current, self.desired) {
            (KeyTtl::Absent, _) | (KeyTtl::Persistent, None) => TtlAction::Keep,
            (KeyTtl::Persistent, Some(d)) if self.overwrite_none_ttl => TtlAction::Expire(d),
            (KeyTtl::Persistent, Some(_)) => TtlAction::Keep,
            (KeyTtl::Expires(_), None) => TtlAction::Persist,
            (KeyTtl::Expires(_), Some(d)) => TtlAction::Expire(d),
        }
    }

    /// The TTL to write a key with, given its state before the write.
    ///
    /// Writes replace a key's expiration, so this is the state the matrix
    /// leaves the key in: a persistent key stays persistent when
    /// `overwrite_none_ttl` is off, and a new key gets the desired TTL.
    #[must_use]
    pub fn ttl_for_write(&self, current: KeyTtl) -> Option<Duration> {
        match (current, self.desired) {
            (KeyTtl::Persistent, Some(_)) if !self.overwrite_none_ttl => None,
            (_, desired) => desired,
        }
    }

    /// Reads `key`'s TTL and applies the reconciled action to it.
    ///
    /// Returns the action taken. A key that vanishes between the read and
    /// the adjustment is left absent.
    ///
    /// # Errors
    ///
    /// Propagates store errors unchanged.
    pub async fn apply(&self, store: &dyn KeyValueStore, key: &[u8]) -> StorageResult<TtlAction> {
        let action = self.reconcile(store.ttl(key).await?);
        match action {
            TtlAction::Keep => {},
            TtlAction::Expire(ttl) => {
                store.expire(key, ttl).await?;
            },
            TtlAction::Persist => {
                store.persist(key).await?;
            },
        }
        Ok(action)
    }
}
