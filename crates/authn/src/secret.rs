//! Secret generation, verifier hashing and credential splitting.
//!
//! A presented credential is `secret + ":hash:" + verifier`:
//!
//! ```text
//! 3f9c…e1 (40 hex chars) :hash: $argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>
//! └──────── secret ────┘        └────────────────── verifier ───────────────────┘
//! ```
//!
//! Only the verifier is stored. The separator cannot occur in either part:
//! the secret is hex and PHC strings use `$`, `,`, `=` and base64.

use std::fmt;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::{
    config::HashCost,
    error::{AuthError, ConfigError, Result},
};

/// Separator between the secret and the verifier in a presented credential.
pub const TOKEN_SEPARATOR: &str = ":hash:";

/// Secret substituted for a credential that does not split into two parts.
pub const WRONG_SECRET: &str = "wrong_token";

/// Verifier substituted for a credential that does not split into two parts.
pub const WRONG_VERIFIER: &str = "wrong_hash";

/// Random bytes per secret (hex-encoded to twice as many characters).
pub const SECRET_BYTES: usize = 20;

/// Splits a presented credential into `(secret, verifier)`.
///
/// Anything that does not split into exactly two parts yields
/// `(WRONG_SECRET, WRONG_VERIFIER)`, which never verifies and never matches
/// an index entry. Never fails and never allocates.
///
/// ```
/// use multitoken_authn::secret::{WRONG_SECRET, WRONG_VERIFIER, split_credential};
///
/// assert_eq!(split_credential("abc:hash:$argon2id$x"), ("abc", "$argon2id$x"));
/// assert_eq!(split_credential("no-separator"), (WRONG_SECRET, WRONG_VERIFIER));
/// assert_eq!(split_credential("a:hash:b:hash:c"), (WRONG_SECRET, WRONG_VERIFIER));
/// ```
#[must_use]
pub fn split_credential(presented: &str) -> (&str, &str) {
    let mut parts = presented.split(TOKEN_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(secret), Some(verifier), None) => (secret, verifier),
        _ => (WRONG_SECRET, WRONG_VERIFIER),
    }
}

/// Joins a secret and its verifier into a presented credential.
#[must_use]
pub fn join_credential(secret: &str, verifier: &str) -> Zeroizing<String> {
    let mut presented = String::with_capacity(secret.len() + TOKEN_SEPARATOR.len() + verifier.len());
    presented.push_str(secret);
    presented.push_str(TOKEN_SEPARATOR);
    presented.push_str(verifier);
    Zeroizing::new(presented)
}

/// A freshly generated secret with its verifier and presented credential.
///
/// The secret and presented forms are zeroized on drop. `Debug` shows only
/// the verifier.
pub struct GeneratedSecret {
    secret: Zeroizing<String>,
    verifier: String,
    presented: Zeroizing<String>,
}

impl GeneratedSecret {
    /// The raw secret. Never stored.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// The stored one-way verifier.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The credential handed to the client.
    #[must_use]
    pub fn presented(&self) -> &str {
        &self.presented
    }

    /// Consumes the secret, keeping only the presented credential.
    #[must_use]
    pub fn into_presented(self) -> Zeroizing<String> {
        self.presented
    }
}

impl fmt::Debug for GeneratedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedSecret")
            .field("secret", &"[REDACTED]")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

/// Produces secrets and Argon2id verifiers, and checks secrets against them.
///
/// Hashing is deliberately slow. Call [`generate`](Self::generate) and
/// [`verify`](Self::verify) from a blocking context; the engine runs them on
/// Tokio's blocking pool.
#[derive(Clone)]
pub struct SecretGenerator {
    argon2: Argon2<'static>,
    cost: HashCost,
}

impl fmt::Debug for SecretGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretGenerator")
            .field("params", self.argon2.params())
            .field("max_memory_kib", &self.cost.max_memory_kib)
            .field("max_iterations", &self.cost.max_iterations)
            .field("max_parallelism", &self.cost.max_parallelism)
            .finish()
    }
}

impl SecretGenerator {
    /// Creates a generator hashing with the given Argon2id cost.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHashCost`] if Argon2 rejects the cost or
    /// a verification ceiling is below it.
    pub fn new(cost: &HashCost) -> std::result::Result<Self, ConfigError> {
        cost.validate()?;
        let params = cost.to_params()?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            cost: cost.clone(),
        })
    }

    /// Generates a fresh secret, its verifier and the presented credential.
    ///
    /// Each call draws a new secret from the OS CSPRNG and a new salt, so two
    /// verifiers are never equal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Hashing`] if Argon2 fails.
    pub fn generate(&self) -> Result<GeneratedSecret> {
        let mut bytes = Zeroizing::new([0u8; SECRET_BYTES]);
        OsRng.fill_bytes(&mut bytes[..]);
        let secret = Zeroizing::new(hex::encode(&bytes[..]));

        let verifier = self.hash(&secret)?;
        let presented = join_credential(&secret, &verifier);

        Ok(GeneratedSecret { secret, verifier, presented })
    }

    /// Hashes `secret` into a PHC-format verifier with a fresh salt.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Hashing`] if Argon2 fails.
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::hashing(e.to_string()))
    }

    /// Checks `secret` against `verifier`.
    ///
    /// Returns `false` without hashing when the verifier is not a valid PHC
    /// string or its cost exceeds the ceiling in [`HashCost`]. Never fails.
    #[must_use]
    pub fn verify(&self, secret: &str, verifier: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(verifier) else {
            return false;
        };
        let Ok(params) = Params::try_from(&parsed) else {
            return false;
        };
        if !self.cost.admits(&params) {
            return false;
        }
        self.argon2.verify_password(secret.as_bytes(), &parsed).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::testutil::fast_hash_cost;

    fn generator() -> SecretGenerator {
        SecretGenerator::new(&fast_hash_cost()).unwrap()
    }

    #[test]
    fn test_generate_shapes() {
        let generated = generator().generate().unwrap();

        assert_eq!(generated.secret().len(), SECRET_BYTES * 2);
        assert!(generated.secret().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(generated.verifier().starts_with("$argon2id$v=19$"));
        assert!(!generated.verifier().contains(TOKEN_SEPARATOR));
        assert_eq!(
            generated.presented(),
            format!("{}{TOKEN_SEPARATOR}{}", generated.secret(), generated.verifier())
        );
    }

    #[test]
    fn test_generate_round_trips_through_split_and_verify() {
        let generator = generator();
        let generated = generator.generate().unwrap();

        let (secret, verifier) = split_credential(generated.presented());
        assert_eq!(secret, generated.secret());
        assert_eq!(verifier, generated.verifier());
        assert!(generator.verify(secret, verifier));
    }

    #[test]
    fn test_same_secret_hashes_to_distinct_verifiers() {
        let generator = generator();
        let a = generator.hash("same-secret").unwrap();
        let b = generator.hash("same-secret").unwrap();

        assert_ne!(a, b, "fresh salt per call");
        assert!(generator.verify("same-secret", &a));
        assert!(generator.verify("same-secret", &b));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let generator = generator();
        let generated = generator.generate().unwrap();
        assert!(!generator.verify("0000", generated.verifier()));
    }

    #[test]
    fn test_verify_never_fails_on_malformed_verifier() {
        let generator = generator();
        assert!(!generator.verify(WRONG_SECRET, WRONG_VERIFIER));
        assert!(!generator.verify("abc", ""));
        assert!(!generator.verify("abc", "$argon2id$"));
        assert!(!generator.verify("abc", "$pbkdf2-sha256$29000$c2FsdA$aGFzaA"));
    }

    #[test]
    fn test_verify_accepts_cost_below_ceiling() {
        let cheap = generator();
        let verifier = cheap.hash("secret").unwrap();

        let other_cost = HashCost::builder().memory_kib(2048).iterations(2).build();
        let other = SecretGenerator::new(&other_cost).unwrap();
        assert!(other.verify("secret", &verifier));
    }

    #[test]
    fn test_verify_refuses_cost_above_ceiling() {
        let dearer_cost = HashCost::builder().memory_kib(1024).iterations(2).parallelism(1).build();
        let verifier = SecretGenerator::new(&dearer_cost).unwrap().hash("secret").unwrap();

        // Correct secret, but the verifier asks for more passes than allowed.
        assert!(!generator().verify("secret", &verifier));

        let raised = HashCost { max_iterations: Some(2), ..fast_hash_cost() };
        assert!(SecretGenerator::new(&raised).unwrap().verify("secret", &verifier));
    }

    #[test]
    fn test_verify_refuses_inflated_cost_without_hashing() {
        let verifier = generator().hash("secret").unwrap();
        let inflated = verifier.replacen("t=1,", "t=4000000000,", 1);
        assert_ne!(inflated, verifier);

        let started = std::time::Instant::now();
        assert!(!generator().verify("secret", &inflated));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_new_rejects_ceiling_below_cost() {
        let cost = HashCost { max_memory_kib: Some(512), ..fast_hash_cost() };
        assert!(matches!(SecretGenerator::new(&cost), Err(ConfigError::InvalidHashCost(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let generated = generator().generate().unwrap();
        let debug = format!("{generated:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(generated.secret()));
    }

    #[test]
    fn test_split_edge_cases() {
        assert_eq!(split_credential(""), (WRONG_SECRET, WRONG_VERIFIER));
        assert_eq!(split_credential(":hash:"), ("", ""));
        assert_eq!(split_credential("abc:hash:"), ("abc", ""));
        assert_eq!(split_credential(":hash::hash:"), (WRONG_SECRET, WRONG_VERIFIER));
        assert_eq!(split_credential("abc:HASH:def"), (WRONG_SECRET, WRONG_VERIFIER));
    }

    proptest! {
        #[test]
        fn split_inverts_join_for_separator_free_parts(
            secret in "[0-9a-f]{0,40}",
            verifier in "[$A-Za-z0-9+/=,.-]{0,64}",
        ) {
            let joined = join_credential(&secret, &verifier);
            prop_assert_eq!(split_credential(&joined), (secret.as_str(), verifier.as_str()));
        }

        #[test]
        fn split_yields_sentinels_unless_exactly_one_separator(input in ".{0,80}") {
            let (secret, verifier) = split_credential(&input);
            if input.matches(TOKEN_SEPARATOR).count() == 1 {
                prop_assert_eq!(format!("{secret}{TOKEN_SEPARATOR}{verifier}"), input);
            } else {
                prop_assert_eq!((secret, verifier), (WRONG_SECRET, WRONG_VERIFIER));
            }
        }
    }
}
