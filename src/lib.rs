//! # Vaultcore
//!
//! Versioned multi-cipher authenticated encryption with automatic key
//! rotation, layered encryption and emergency recovery.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vaultcore::{CryptoConfig, CryptoContext};
//!
//! let config = CryptoConfig {
//!     data_dir: "/var/lib/vaultcore".into(),
//!     ..CryptoConfig::new("master-secret")
//! };
//! let ctx = CryptoContext::from_config(config)?;
//!
//! let frame = ctx.encrypt(b"secret")?;
//! assert_eq!(ctx.decrypt(&frame)?, b"secret");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Frame format
//!
//! ```text
//! version[4, BE] || cipher_type[1] || nonce[12 | 24] || tag[16] || ciphertext
//! ```
//!
//! The version is authenticated as associated data and selects the key:
//! `PBKDF2-HMAC-SHA256(master_secret, "vaultcore.kdf.v1:" || version)`.
//!
//! ## Security Properties
//!
//! - **Key rotation**: the key version advances every 30-90 days (random);
//!   old frames stay decryptable because derivation is reproducible
//! - **Opaque failures**: authentication errors carry no detail
//! - **Tamper-evident key store**: checksum, HMAC and canaries
//!
//! ## What's NOT Provided
//!
//! - Password hashing
//! - Cross-process locking of the key-store file
//! - Streaming encryption

#![deny(unsafe_code)]

pub mod aead;
pub mod config;
pub mod context;
pub mod emergency;
pub mod error;
pub mod kdf;
pub mod layered;
pub mod registry;
pub mod retry;
pub mod task;
pub mod wire;

pub use vaultcore_keystore as keystore;

pub use aead::{CipherSuite, FrameCipher};
pub use config::CryptoConfig;
pub use context::{open_key_store, CryptoContext, CryptoContextBuilder, FALLBACK_KEY_VERSION};
pub use emergency::{seal_legacy, EmergencyDecryptor, Recovered, RecoveryStrategy};
pub use error::{
    ConfigError, CryptoError, DecryptionError, EncryptionError, FrameError, KeyDerivationError,
    RegistryError,
};
pub use kdf::{derive_key, DerivedKey, KeyDeriver, DEFAULT_KDF_ITERATIONS};
pub use layered::LayeredCipher;
pub use registry::{Cipher, CipherRegistry, UseCase};
pub use retry::{Backoff, RetryPolicy};
pub use task::{decrypt_async, encrypt_async};
pub use wire::CipherType;
