//! Fuzz target for presented-credential parsing and resolution.
//!
//! Feeds arbitrary byte strings as presented credentials to the splitter and
//! to `CredentialEngine::resolve`. Splitting must be total, and resolving
//! anything but the one issued credential must fail with
//! `CredentialNotFound`, never panic or fault.

#![no_main]

use std::sync::{Arc, LazyLock};

use libfuzzer_sys::fuzz_target;
use multitoken_authn::{
    AuthError, CredentialEngine, PrincipalId, TOKEN_SEPARATOR,
    secret::{WRONG_SECRET, WRONG_VERIFIER, split_credential},
    testutil::test_config,
};
use multitoken_storage::MemoryBackend;
use tokio::runtime::Runtime;

struct Harness {
    rt: Runtime,
    engine: CredentialEngine,
    issued: String,
}

static HARNESS: LazyLock<Harness> = LazyLock::new(|| {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");
    let engine = rt
        .block_on(async { CredentialEngine::new(Arc::new(MemoryBackend::new()), test_config()) })
        .expect("valid engine");
    let issued = rt
        .block_on(engine.issue(&PrincipalId::from(1u64)))
        .expect("issue failed")
        .credential
        .to_string();
    Harness { rt, engine, issued }
});

fuzz_target!(|data: &[u8]| {
    // Presented credentials arrive as header strings, always UTF-8
    let Ok(presented) = std::str::from_utf8(data) else {
        return;
    };

    let (secret, verifier) = split_credential(presented);
    if presented.matches(TOKEN_SEPARATOR).count() != 1 {
        assert_eq!((secret, verifier), (WRONG_SECRET, WRONG_VERIFIER));
    }

    let harness = &*HARNESS;
    let result = harness.rt.block_on(harness.engine.resolve(presented));
    if presented != harness.issued {
        assert!(matches!(result, Err(AuthError::CredentialNotFound)), "{result:?}");
    }
});
