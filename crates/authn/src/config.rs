//! Configuration for the credential engine.
//!
//! [`TokenConfig`] is resolved once at startup, either deserialized from a
//! configuration file or assembled with its validating builder, and then
//! handed to [`CredentialEngine::new`](crate::CredentialEngine::new).
//! Defaults are applied at construction; nothing is looked up lazily.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, ttl::TtlPolicy};

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "tokens";

/// Default compare-and-set budget for credential sequence updates.
pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 8;

/// Argon2id cost parameters used for new verifiers, and the ceiling
/// accepted when verifying.
///
/// A stored verifier carries its own cost. Verification refuses any verifier
/// whose cost exceeds the `max_*` ceiling, which defaults to the cost used
/// for new verifiers. Raise the ceiling before lowering the cost if
/// credentials issued at the old cost must keep working.
///
/// Defaults follow the OWASP baseline for Argon2id (19 MiB, 2 passes, one
/// lane).
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashCost {
    /// Memory cost in KiB.
    #[serde(default = "default_memory_kib")]
    #[builder(default = default_memory_kib())]
    pub memory_kib: u32,

    /// Number of passes.
    #[serde(default = "default_iterations")]
    #[builder(default = default_iterations())]
    pub iterations: u32,

    /// Degree of parallelism.
    #[serde(default = "default_parallelism")]
    #[builder(default = default_parallelism())]
    pub parallelism: u32,

    /// Highest memory cost accepted on verification (default: `memory_kib`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_kib: Option<u32>,

    /// Highest pass count accepted on verification (default: `iterations`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// Highest parallelism accepted on verification (default: `parallelism`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<u32>,
}

fn default_memory_kib() -> u32 {
    19_456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
            max_memory_kib: None,
            max_iterations: None,
            max_parallelism: None,
        }
    }
}

impl HashCost {
    /// Converts to Argon2 parameters, checking Argon2's own bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHashCost`] when Argon2 rejects the
    /// combination (for example less than 8 KiB of memory per lane).
    pub fn to_params(&self) -> Result<argon2::Params, ConfigError> {
        argon2::Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| ConfigError::InvalidHashCost(e.to_string()))
    }

    /// Checks the verification ceiling against the cost itself.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHashCost`] if Argon2 rejects the cost or
    /// any ceiling is below the matching cost.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_params()?;
        for (name, ceiling, cost) in [
            ("max_memory_kib", self.max_memory_kib, self.memory_kib),
            ("max_iterations", self.max_iterations, self.iterations),
            ("max_parallelism", self.max_parallelism, self.parallelism),
        ] {
            if ceiling.is_some_and(|ceiling| ceiling < cost) {
                return Err(ConfigError::InvalidHashCost(format!(
                    "{name} is below the configured cost"
                )));
            }
        }
        Ok(())
    }

    /// Whether a verifier hashed with `params` is cheap enough to check.
    #[must_use]
    pub fn admits(&self, params: &argon2::Params) -> bool {
        params.m_cost() <= self.max_memory_kib.unwrap_or(self.memory_kib)
            && params.t_cost() <= self.max_iterations.unwrap_or(self.iterations)
            && params.p_cost() <= self.max_parallelism.unwrap_or(self.parallelism)
    }
}

/// Credential engine configuration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use multitoken_authn::TokenConfig;
///
/// let config = TokenConfig::builder()
///     .namespace("sessions")
///     .ttl(Duration::from_secs(3600))
///     .overwrite_none_ttl(false)
///     .build()?;
///
/// assert_eq!(config.namespace(), "sessions");
/// assert!(config.reset_ttl_on_authenticate());
/// # Ok::<(), multitoken_authn::ConfigError>(())
/// ```
///
/// Deserialized configurations accept human-readable durations:
///
/// ```
/// use multitoken_authn::TokenConfig;
///
/// let config: TokenConfig = serde_json::from_str(r#"{ "ttl": "30m" }"#)?;
/// assert_eq!(config.ttl(), Some(std::time::Duration::from_secs(1800)));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Prefix of every key the index writes.
    #[serde(default = "default_namespace")]
    pub(crate) namespace: String,

    /// Desired key lifetime; `None` means credentials never expire.
    #[serde(default, with = "humantime_serde")]
    pub(crate) ttl: Option<Duration>,

    /// Whether a persistent key gains the desired TTL on refresh or rewrite.
    #[serde(default = "default_true")]
    pub(crate) overwrite_none_ttl: bool,

    /// Whether a successful authentication slides the principal's TTLs.
    #[serde(default = "default_true")]
    pub(crate) reset_ttl_on_authenticate: bool,

    /// Whether revoking a single credential requires it to verify first.
    #[serde(default)]
    pub(crate) require_verified_revocation: bool,

    /// Compare-and-set budget for credential sequence updates.
    #[serde(default = "default_max_cas_attempts")]
    pub(crate) max_cas_attempts: u32,

    /// Argon2id cost for new verifiers.
    #[serde(default)]
    pub(crate) hash_cost: HashCost,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_max_cas_attempts() -> u32 {
    DEFAULT_MAX_CAS_ATTEMPTS
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            ttl: None,
            overwrite_none_ttl: true,
            reset_ttl_on_authenticate: true,
            require_verified_revocation: false,
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            hash_cost: HashCost::default(),
        }
    }
}

#[bon::bon]
impl TokenConfig {
    /// Creates a new configuration, validating every field.
    ///
    /// # Optional Fields
    ///
    /// * `namespace` - Key prefix (default: `"tokens"`).
    /// * `ttl` - Desired key lifetime (default: none, keys never expire).
    /// * `overwrite_none_ttl` - Let persistent keys gain the TTL (default: true).
    /// * `reset_ttl_on_authenticate` - Sliding expiration (default: true).
    /// * `require_verified_revocation` - Verify before single revocation (default: false).
    /// * `max_cas_attempts` - Sequence update budget (default: 8).
    /// * `hash_cost` - Argon2id cost (default: [`HashCost::default`]).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the namespace is empty or contains `/`,
    /// the TTL is zero, `max_cas_attempts` is zero, Argon2 rejects the hash
    /// cost, or a verification ceiling is below the hash cost.
    #[builder]
    pub fn new(
        #[builder(into, default = default_namespace())] namespace: String,
        ttl: Option<Duration>,
        #[builder(default = true)] overwrite_none_ttl: bool,
        #[builder(default = true)] reset_ttl_on_authenticate: bool,
        #[builder(default)] require_verified_revocation: bool,
        #[builder(default = DEFAULT_MAX_CAS_ATTEMPTS)] max_cas_attempts: u32,
        #[builder(default)] hash_cost: HashCost,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            namespace,
            ttl,
            overwrite_none_ttl,
            reset_ttl_on_authenticate,
            require_verified_revocation,
            max_cas_attempts,
            hash_cost,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// Deserialized configurations bypass the builder, so the engine calls
    /// this again on construction.
    ///
    /// # Errors
    ///
    /// See [`TokenConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.namespace.contains('/') {
            return Err(ConfigError::InvalidNamespace(self.namespace.clone()));
        }
        if self.ttl == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTtl);
        }
        if self.max_cas_attempts == 0 {
            return Err(ConfigError::ZeroCasAttempts);
        }
        self.hash_cost.validate()?;
        Ok(())
    }

    /// Returns the key namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the desired key lifetime.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns whether persistent keys gain the desired TTL.
    #[must_use]
    pub fn overwrite_none_ttl(&self) -> bool {
        self.overwrite_none_ttl
    }

    /// Returns whether authentication slides TTLs.
    #[must_use]
    pub fn reset_ttl_on_authenticate(&self) -> bool {
        self.reset_ttl_on_authenticate
    }

    /// Returns whether single revocation verifies the credential first.
    #[must_use]
    pub fn require_verified_revocation(&self) -> bool {
        self.require_verified_revocation
    }

    /// Returns the compare-and-set budget.
    #[must_use]
    pub fn max_cas_attempts(&self) -> u32 {
        self.max_cas_attempts
    }

    /// Returns the Argon2id cost.
    #[must_use]
    pub fn hash_cost(&self) -> &HashCost {
        &self.hash_cost
    }

    /// The TTL reconciliation policy these settings describe.
    #[must_use]
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::new(self.ttl, self.overwrite_none_ttl)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TokenConfig::builder().build().unwrap();
        assert_eq!(config, TokenConfig::default());
        assert_eq!(config.namespace(), "tokens");
        assert_eq!(config.ttl(), None);
        assert!(config.overwrite_none_ttl());
        assert!(config.reset_ttl_on_authenticate());
        assert!(!config.require_verified_revocation());
        assert_eq!(config.max_cas_attempts(), 8);
        assert_eq!(config.hash_cost(), &HashCost::default());
    }

    #[test]
    fn test_builder_overrides() {
        let config = TokenConfig::builder()
            .namespace("sessions")
            .ttl(Duration::from_secs(60))
            .overwrite_none_ttl(false)
            .reset_ttl_on_authenticate(false)
            .require_verified_revocation(true)
            .max_cas_attempts(3)
            .build()
            .unwrap();

        assert_eq!(config.namespace(), "sessions");
        assert_eq!(config.ttl(), Some(Duration::from_secs(60)));
        assert!(!config.overwrite_none_ttl());
        assert!(!config.reset_ttl_on_authenticate());
        assert!(config.require_verified_revocation());
        assert_eq!(config.max_cas_attempts(), 3);
        assert_eq!(config.ttl_policy(), TtlPolicy::new(Some(Duration::from_secs(60)), false));
    }

    #[test]
    fn test_rejects_empty_namespace() {
        let result = TokenConfig::builder().namespace("").build();
        assert_eq!(result.unwrap_err(), ConfigError::EmptyNamespace);
    }

    #[test]
    fn test_rejects_nested_namespace() {
        let result = TokenConfig::builder().namespace("a/b").build();
        assert!(matches!(result, Err(ConfigError::InvalidNamespace(ns)) if ns == "a/b"));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let result = TokenConfig::builder().ttl(Duration::ZERO).build();
        assert_eq!(result.unwrap_err(), ConfigError::ZeroTtl);
    }

    #[test]
    fn test_rejects_zero_cas_attempts() {
        let result = TokenConfig::builder().max_cas_attempts(0).build();
        assert_eq!(result.unwrap_err(), ConfigError::ZeroCasAttempts);
    }

    #[test]
    fn test_rejects_invalid_hash_cost() {
        let cost = HashCost::builder().memory_kib(1).build();
        let result = TokenConfig::builder().hash_cost(cost).build();
        assert!(matches!(result, Err(ConfigError::InvalidHashCost(_))));
    }

    #[test]
    fn test_rejects_ceiling_below_cost() {
        let cost = HashCost::builder().iterations(3).max_iterations(2).build();
        let result = TokenConfig::builder().hash_cost(cost).build();
        assert!(
            matches!(result, Err(ConfigError::InvalidHashCost(msg)) if msg.contains("max_iterations"))
        );
    }

    #[test]
    fn test_ceiling_defaults_to_cost() {
        let cost = HashCost::default();
        let at_cost = argon2::Params::new(19_456, 2, 1, None).unwrap();
        let more_passes = argon2::Params::new(19_456, 3, 1, None).unwrap();
        let more_memory = argon2::Params::new(19_457, 2, 1, None).unwrap();
        let more_lanes = argon2::Params::new(19_456, 2, 2, None).unwrap();
        let cheaper = argon2::Params::new(8, 1, 1, None).unwrap();

        assert!(cost.admits(&at_cost));
        assert!(cost.admits(&cheaper));
        assert!(!cost.admits(&more_passes));
        assert!(!cost.admits(&more_memory));
        assert!(!cost.admits(&more_lanes));
    }

    #[test]
    fn test_raised_ceiling_admits_older_cost() {
        let cost = HashCost::builder().memory_kib(8192).max_memory_kib(19_456).build();
        cost.validate().unwrap();
        assert!(cost.admits(&argon2::Params::new(19_456, 2, 1, None).unwrap()));
        assert!(!cost.admits(&argon2::Params::new(65_536, 2, 1, None).unwrap()));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: TokenConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TokenConfig::default());
    }

    #[test]
    fn test_deserialize_humantime_ttl() {
        let config: TokenConfig = serde_json::from_str(
            r#"{ "namespace": "api", "ttl": "15m", "overwrite_none_ttl": false,
                 "hash_cost": { "memory_kib": 4096 } }"#,
        )
        .unwrap();

        assert_eq!(config.namespace(), "api");
        assert_eq!(config.ttl(), Some(Duration::from_secs(900)));
        assert!(!config.overwrite_none_ttl());
        assert_eq!(config.hash_cost().memory_kib, 4096);
        assert_eq!(config.hash_cost().iterations, 2);
        assert_eq!(config.hash_cost().max_memory_kib, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: Result<TokenConfig, _> = serde_json::from_str(r#"{ "timeout": "5s" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialized_zero_ttl_fails_validation() {
        let config: TokenConfig = serde_json::from_str(r#"{ "ttl": "0s" }"#).unwrap();
        assert_eq!(config.validate().unwrap_err(), ConfigError::ZeroTtl);
    }

    #[test]
    fn test_serialize_round_trip_keeps_ttl_readable() {
        let config = TokenConfig::builder().ttl(Duration::from_secs(90)).build().unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["ttl"], "1m 30s");
    }
}
