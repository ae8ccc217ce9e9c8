//! The encryption facade.
//!
//! A [`CryptoContext`] owns everything one deployment needs: the cipher
//! registry, the key deriver and the key-version store. Contexts are
//! independent of each other, so tests can run many side by side.
//!
//! Pipeline:
//!
//! ```text
//! encrypt: current_key_version -> derive(version) -> registry.get(cipher) -> frame
//! decrypt: frame.version -> derive(version) -> registry.get(frame.type) -> plaintext
//!          (on failure) -> EmergencyDecryptor
//! ```

use std::path::Path;
use std::sync::Arc;

use vaultcore_keystore::{Clock, FileBackend, KeyVersionStore, StoreBackend};

use crate::aead::FrameCipher;
use crate::config::CryptoConfig;
use crate::emergency::{EmergencyDecryptor, Recovered};
use crate::error::{ConfigError, CryptoError, DecryptionError, EncryptionError};
use crate::kdf::KeyDeriver;
use crate::registry::{CipherRegistry, UseCase};
use crate::retry::RetryPolicy;
use crate::wire::{self, CipherType, FRAME_PREFIX_BYTES};

/// Key version used when the store cannot be read.
pub const FALLBACK_KEY_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct CryptoContextBuilder {
    config: CryptoConfig,
    backend: Option<Arc<dyn StoreBackend>>,
    clock: Option<Arc<dyn Clock>>,
    registry: Option<CipherRegistry>,
    retry: Option<RetryPolicy>,
}

impl CryptoContextBuilder {
    /// Store backend; defaults to `data_dir/keystore.bin`.
    pub fn backend(mut self, backend: Arc<dyn StoreBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Registry; defaults to every supported cipher.
    pub fn registry(mut self, registry: CipherRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Retry policy; defaults to the one described by the config.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<CryptoContext, ConfigError> {
        let config = self.config;
        config.validate()?;

        let registry = self.registry.unwrap_or_else(CipherRegistry::with_defaults);
        if !registry.contains(config.default_cipher) {
            return Err(ConfigError::Invalid {
                key: "default_cipher",
                reason: format!("{} is not registered", config.default_cipher),
            });
        }
        if config.layered_mode && !registry.contains(CipherType::Layered) {
            return Err(ConfigError::Invalid {
                key: "layered_mode",
                reason: "layered cipher is not registered".into(),
            });
        }

        let secret = config.master_secret.as_bytes();
        let backend: Arc<dyn StoreBackend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(FileBackend::in_dir(&config.data_dir)?),
        };
        let mut store = KeyVersionStore::new(backend, secret, config.keystore_options()?)?;
        if let Some(clock) = self.clock {
            store = store.with_clock(clock);
        }
        let deriver = KeyDeriver::new(secret, config.kdf_iterations)?;

        tracing::info!(
            default_cipher = %config.default_cipher,
            layered_mode = config.layered_mode,
            ciphers = registry.registered().count(),
            kdf_iterations = config.kdf_iterations,
            "crypto context ready"
        );

        Ok(CryptoContext {
            retry: self.retry.unwrap_or_else(|| config.retry_policy()),
            registry,
            deriver,
            store,
            default_cipher: config.default_cipher,
            layered_mode: config.layered_mode,
            max_plaintext_bytes: config.max_plaintext_bytes,
            emergency_recovery: config.emergency_recovery,
        })
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub struct CryptoContext {
    registry: CipherRegistry,
    deriver: KeyDeriver,
    store: KeyVersionStore,
    default_cipher: CipherType,
    layered_mode: bool,
    max_plaintext_bytes: usize,
    emergency_recovery: bool,
    retry: RetryPolicy,
}

impl CryptoContext {
    pub fn builder(config: CryptoConfig) -> CryptoContextBuilder {
        CryptoContextBuilder {
            config,
            backend: None,
            clock: None,
            registry: None,
            retry: None,
        }
    }

    /// File-backed context with default registry and retry policy.
    pub fn from_config(config: CryptoConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(CryptoConfig::from_env()?)
    }

    pub fn registry(&self) -> &CipherRegistry {
        &self.registry
    }

    pub fn key_store(&self) -> &KeyVersionStore {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn emergency(&self) -> EmergencyDecryptor<'_> {
        EmergencyDecryptor::new(&self.registry, &self.deriver)
    }

    // -----------------------------------------------------------------------
    // Key version
    // -----------------------------------------------------------------------

    /// Current key version. Store failures fall back to version 1 so that
    /// encryption keeps working; the failure is logged.
    pub fn current_key_version(&self) -> u32 {
        match self.store.current_version() {
            Ok(version) => version,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    fallback_version = FALLBACK_KEY_VERSION,
                    "key store unavailable, using fallback key version"
                );
                FALLBACK_KEY_VERSION
            }
        }
    }

    // -----------------------------------------------------------------------
    // Encrypt
    // -----------------------------------------------------------------------

    /// Encrypt with the default cipher (or the layered cipher in layered mode).
    pub fn encrypt_data(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        self.encrypt_inner(plaintext, None)
    }

    /// Encrypt with `cipher`. Layered mode still takes precedence.
    pub fn encrypt_with(
        &self,
        plaintext: &[u8],
        cipher: CipherType,
    ) -> Result<Vec<u8>, EncryptionError> {
        self.encrypt_inner(plaintext, Some(cipher))
    }

    pub fn encrypt_for(
        &self,
        plaintext: &[u8],
        use_case: UseCase,
    ) -> Result<Vec<u8>, EncryptionError> {
        self.encrypt_with(plaintext, CipherRegistry::recommend(use_case))
    }

    fn encrypt_inner(
        &self,
        plaintext: &[u8],
        preference: Option<CipherType>,
    ) -> Result<Vec<u8>, EncryptionError> {
        if plaintext.len() > self.max_plaintext_bytes {
            return Err(EncryptionError::PlaintextTooLarge {
                size: plaintext.len(),
                limit: self.max_plaintext_bytes,
            });
        }

        let version = self.current_key_version();
        let key = self.deriver.derive(version)?;
        let cipher_type = if self.layered_mode {
            CipherType::Layered
        } else {
            preference.unwrap_or(self.default_cipher)
        };
        let frame = self
            .registry
            .get(cipher_type)?
            .encrypt(plaintext, key.as_bytes(), version)?;

        tracing::debug!(version, cipher = %cipher_type, size = plaintext.len(), "encrypted");
        Ok(frame)
    }

    /// [`CryptoContext::encrypt_data`] under the retry policy.
    pub fn encrypt_with_failsafe(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        self.retry.run("encrypt", |_| self.encrypt_data(plaintext))
    }

    // -----------------------------------------------------------------------
    // Decrypt
    // -----------------------------------------------------------------------

    /// Normal path only: version and cipher come from the frame header.
    /// The header is unauthenticated until the open succeeds, so the key is
    /// cached only then.
    pub fn decrypt_strict(&self, frame: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let (version, _) = wire::peek_prefix(frame)?;
        let cipher_type = self.registry.detect_type(frame)?;
        let key = self.deriver.derive_transient(version)?;
        let plaintext = self
            .registry
            .get(cipher_type)?
            .decrypt(frame, key.as_bytes(), version)?;
        self.deriver.remember(version, &key);
        Ok(plaintext)
    }

    /// Normal path, then emergency recovery when enabled. Frames too short
    /// to carry a prefix are rejected outright. If recovery also fails the
    /// normal-path error is returned.
    pub fn decrypt_data(&self, frame: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        match self.decrypt_strict(frame) {
            Ok(plaintext) => Ok(plaintext),
            Err(e) if frame.len() < FRAME_PREFIX_BYTES || !self.emergency_recovery => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, len = frame.len(), "normal decrypt failed, trying recovery");
                self.emergency()
                    .decrypt(frame)
                    .map(|found| found.plaintext)
                    .map_err(|_| e)
            }
        }
    }

    /// Retry the normal path, then run emergency recovery once when enabled.
    pub fn decrypt_with_failsafe(&self, frame: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        match self.retry.run("decrypt", |_| self.decrypt_strict(frame)) {
            Ok(plaintext) => Ok(plaintext),
            Err(e) if !self.emergency_recovery => Err(e),
            Err(e) => self
                .emergency()
                .decrypt(frame)
                .map(|found| found.plaintext)
                .map_err(|_| e),
        }
    }

    /// Emergency recovery with additional master secrets to try.
    pub fn recover_with_fallback_secrets(
        &self,
        frame: &[u8],
        fallback_secrets: &[&[u8]],
    ) -> Result<Recovered, DecryptionError> {
        self.emergency()
            .decrypt_with_fallback_keys(frame, fallback_secrets)
    }

    // -----------------------------------------------------------------------
    // Boundary
    // -----------------------------------------------------------------------

    /// External entry point: failsafe encryption with an opaque error.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encrypt_with_failsafe(plaintext)
            .map_err(CryptoError::Encryption)
    }

    /// External entry point: failsafe decryption with an opaque error.
    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_with_failsafe(frame)
            .map_err(CryptoError::Decryption)
    }
}

/// File-backed store for `config` at an explicit directory. Used by tooling
/// that inspects a data directory without building a full context.
pub fn open_key_store(
    data_dir: impl AsRef<Path>,
    config: &CryptoConfig,
) -> Result<KeyVersionStore, ConfigError> {
    Ok(KeyVersionStore::open_in_dir(
        data_dir,
        config.master_secret.as_bytes(),
        config.keystore_options()?,
    )?)
}
