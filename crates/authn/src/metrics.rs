//! Credential lifecycle counters.
//!
//! [`CredentialMetrics`] is a set of lock-free counters shared by the index
//! and the engine. Counters use `Ordering::Relaxed`: each value is
//! individually accurate, but a [`snapshot`](CredentialMetrics::snapshot)
//! taken under load may mix values from slightly different instants.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Point-in-time copy of [`CredentialMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
pub struct CredentialMetricsSnapshot {
    /// Credentials issued.
    #[builder(default)]
    pub issued: u64,
    /// Issuances that created a principal's first live credential.
    #[builder(default)]
    pub first_device_issued: u64,
    /// Presented credentials resolved to a principal.
    #[builder(default)]
    pub resolved: u64,
    /// Presented credentials that failed to resolve.
    #[builder(default)]
    pub resolve_failures: u64,
    /// Single credentials revoked.
    #[builder(default)]
    pub revoked: u64,
    /// Revoke-all calls that removed at least one credential.
    #[builder(default)]
    pub bulk_revocations: u64,
    /// Credentials removed by revoke-all calls.
    #[builder(default)]
    pub bulk_revoked_credentials: u64,
    /// Keys evaluated by TTL refreshes.
    #[builder(default)]
    pub ttl_keys_refreshed: u64,
    /// Compare-and-set conflicts on credential sequences.
    #[builder(default)]
    pub cas_conflicts: u64,
    /// Sequence updates abandoned after exhausting the attempt budget.
    #[builder(default)]
    pub contention_failures: u64,
}

impl CredentialMetricsSnapshot {
    /// Fraction of presented credentials that failed to resolve.
    #[must_use]
    pub fn resolve_failure_rate(&self) -> f64 {
        let total = self.resolved + self.resolve_failures;
        if total == 0 { 0.0 } else { self.resolve_failures as f64 / total as f64 }
    }
}

/// Shared credential counters. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct CredentialMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    issued: AtomicU64,
    first_device_issued: AtomicU64,
    resolved: AtomicU64,
    resolve_failures: AtomicU64,
    revoked: AtomicU64,
    bulk_revocations: AtomicU64,
    bulk_revoked_credentials: AtomicU64,
    ttl_keys_refreshed: AtomicU64,
    cas_conflicts: AtomicU64,
    contention_failures: AtomicU64,
}

impl CredentialMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issued credential.
    pub fn record_issued(&self, first_device: bool) {
        self.inner.issued.fetch_add(1, Ordering::Relaxed);
        if first_device {
            self.inner.first_device_issued.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a successful resolution.
    pub fn record_resolved(&self) {
        self.inner.resolved.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed resolution.
    pub fn record_resolve_failure(&self) {
        self.inner.resolve_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a single revocation.
    pub fn record_revoked(&self) {
        self.inner.revoked.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a revoke-all that removed `count` credentials.
    pub fn record_bulk_revocation(&self, count: usize) {
        if count > 0 {
            self.inner.bulk_revocations.fetch_add(1, Ordering::Relaxed);
            self.inner.bulk_revoked_credentials.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Records a TTL refresh that evaluated `keys` keys.
    pub fn record_ttl_refresh(&self, keys: usize) {
        self.inner.ttl_keys_refreshed.fetch_add(keys as u64, Ordering::Relaxed);
    }

    /// Records a compare-and-set conflict.
    pub fn record_cas_conflict(&self) {
        self.inner.cas_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an abandoned sequence update.
    pub fn record_contention_failure(&self) {
        self.inner.contention_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> CredentialMetricsSnapshot {
        let inner = &self.inner;
        CredentialMetricsSnapshot {
            issued: inner.issued.load(Ordering::Relaxed),
            first_device_issued: inner.first_device_issued.load(Ordering::Relaxed),
            resolved: inner.resolved.load(Ordering::Relaxed),
            resolve_failures: inner.resolve_failures.load(Ordering::Relaxed),
            revoked: inner.revoked.load(Ordering::Relaxed),
            bulk_revocations: inner.bulk_revocations.load(Ordering::Relaxed),
            bulk_revoked_credentials: inner.bulk_revoked_credentials.load(Ordering::Relaxed),
            ttl_keys_refreshed: inner.ttl_keys_refreshed.load(Ordering::Relaxed),
            cas_conflicts: inner.cas_conflicts.load(Ordering::Relaxed),
            contention_failures: inner.contention_failures.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.issued,
            &inner.first_device_issued,
            &inner.resolved,
            &inner.resolve_failures,
            &inner.revoked,
            &inner.bulk_revocations,
            &inner.bulk_revoked_credentials,
            &inner.ttl_keys_refreshed,
            &inner.cas_conflicts,
            &inner.contention_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Logs current counters at INFO level, warning on a high failure rate.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();

        tracing::info!(
            issued = snapshot.issued,
            first_device_issued = snapshot.first_device_issued,
            resolved = snapshot.resolved,
            resolve_failures = snapshot.resolve_failures,
            revoked = snapshot.revoked,
            bulk_revocations = snapshot.bulk_revocations,
            ttl_keys_refreshed = snapshot.ttl_keys_refreshed,
            cas_conflicts = snapshot.cas_conflicts,
            "Credential metrics snapshot"
        );

        if snapshot.resolve_failures >= 10 && snapshot.resolve_failure_rate() > 0.5 {
            tracing::warn!(
                resolve_failure_rate = snapshot.resolve_failure_rate(),
                resolve_failures = snapshot.resolve_failures,
                "High credential resolve failure rate detected"
            );
        }

        if snapshot.contention_failures > 0 {
            tracing::warn!(
                contention_failures = snapshot.contention_failures,
                "Credential sequence updates abandoned under contention"
            );
        }
    }
}
