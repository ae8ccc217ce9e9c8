use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use vaultcore::keystore::InMemoryBackend;
use vaultcore::wire::CipherType;
use vaultcore::{CryptoConfig, CryptoContext, KeyDeriver, DEFAULT_KDF_ITERATIONS};

fn time_it<F: FnMut()>(label: &str, iters: usize, mut f: F) {
    // warmup
    for _ in 0..(iters / 10).max(10) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();

    let per_iter = elapsed / (iters as u32);
    println!("{:<24} total={:?}  per_iter={:?}", label, elapsed, per_iter);
}

fn main() {
    let config = CryptoConfig {
        emergency_recovery: false,
        ..CryptoConfig::new("bench-master-secret")
    };
    let ctx = CryptoContext::builder(config)
        .backend(Arc::new(InMemoryBackend::new()))
        .build()
        .unwrap();

    let plaintext = vec![0x42u8; 1024];
    let iters = 5_000;

    for cipher in CipherType::ALL {
        let frame = ctx.encrypt_with(&plaintext, cipher).unwrap();
        let mut tampered = frame.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;

        time_it(&format!("encrypt/{}", cipher), iters, || {
            black_box(ctx.encrypt_with(black_box(&plaintext), cipher).unwrap());
        });
        time_it(&format!("valid/{}", cipher), iters, || {
            black_box(ctx.decrypt_strict(black_box(&frame)).unwrap());
        });
        // Rejection should cost about the same as acceptance.
        time_it(&format!("tampered/{}", cipher), iters, || {
            black_box(ctx.decrypt_strict(black_box(&tampered)).err());
        });
    }

    time_it("short", iters, || {
        black_box(ctx.decrypt_strict(black_box(b"shor")).err());
    });

    let deriver = KeyDeriver::new(b"bench-master-secret", DEFAULT_KDF_ITERATIONS).unwrap();
    let mut version = 0u32;
    time_it("kdf/cold", 20, || {
        version += 1;
        black_box(deriver.derive(version).unwrap());
    });
    time_it("kdf/cached", iters, || {
        black_box(deriver.derive(1).unwrap());
    });

    println!("\nDone.");
}
