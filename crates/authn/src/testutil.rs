//! Shared test utilities for credential testing.
//!
//! This module provides a cheap Argon2id cost, ready-made configurations,
//! engines and authenticators over [`MemoryBackend`], and a helper for
//! forging presented credentials (for attack testing). It is feature-gated
//! behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! multitoken-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use multitoken_authn::testutil::{memory_engine, test_config};
//! ```

use std::{sync::Arc, time::Duration};

use multitoken_storage::MemoryBackend;
use zeroize::Zeroizing;

use crate::{
    authenticator::Authenticator,
    config::{HashCost, TokenConfig},
    engine::CredentialEngine,
    principal::MemoryPrincipalDirectory,
    secret::{join_credential, split_credential},
};

/// The cheapest Argon2id cost Argon2 accepts comfortably: 1 MiB, one pass,
/// one lane. Keeps hashing-heavy tests fast.
#[must_use]
pub fn fast_hash_cost() -> HashCost {
    HashCost::builder().memory_kib(1024).iterations(1).parallelism(1).build()
}

/// Default namespace, no TTL, fast hashing.
#[must_use]
pub fn test_config() -> TokenConfig {
    TokenConfig { hash_cost: fast_hash_cost(), ..TokenConfig::default() }
}

/// Like [`test_config`], with a desired TTL and overwrite flag.
#[must_use]
pub fn test_config_with_ttl(ttl: Option<Duration>, overwrite_none_ttl: bool) -> TokenConfig {
    TokenConfig { ttl, overwrite_none_ttl, ..test_config() }
}

/// An engine with `config` over a clone of `store`.
///
/// # Panics
///
/// Panics if `config` is invalid.
#[must_use]
pub fn engine_with_config(store: &MemoryBackend, config: TokenConfig) -> CredentialEngine {
    CredentialEngine::new(Arc::new(store.clone()), config).expect("valid test config")
}

/// A fresh store and an engine over it with [`test_config`].
#[must_use]
pub fn memory_engine() -> (MemoryBackend, CredentialEngine) {
    let store = MemoryBackend::new();
    let engine = engine_with_config(&store, test_config());
    (store, engine)
}

/// A fresh store, an empty directory and an authenticator over both that
/// slides TTLs on success.
#[must_use]
pub fn memory_authenticator()
-> (MemoryBackend, Arc<MemoryPrincipalDirectory>, Authenticator<MemoryPrincipalDirectory>) {
    let (store, engine) = memory_engine();
    let directory = Arc::new(MemoryPrincipalDirectory::new());
    let authenticator = Authenticator::new(engine, Arc::clone(&directory));
    (store, directory, authenticator)
}

/// Keeps the verifier of `presented` but swaps in `secret`.
#[must_use]
pub fn forge_with_secret(presented: &str, secret: &str) -> Zeroizing<String> {
    let (_, verifier) = split_credential(presented);
    join_credential(secret, verifier)
}
