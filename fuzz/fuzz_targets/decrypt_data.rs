#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

use vaultcore::keystore::InMemoryBackend;
use vaultcore::{CryptoConfig, CryptoContext};

static CTX: Lazy<CryptoContext> = Lazy::new(|| {
    let config = CryptoConfig {
        kdf_iterations: 1,
        retry_attempts: 1,
        retry_delay_ms: 0,
        ..CryptoConfig::new("fuzz-master-secret")
    };
    CryptoContext::builder(config)
        .backend(Arc::new(InMemoryBackend::new()))
        .build()
        .unwrap()
});

fuzz_target!(|data: &[u8]| {
    // Must never panic, whatever the strategy that ends up running.
    let _ = CTX.decrypt_data(data);
    let _ = CTX.decrypt(data);
});
