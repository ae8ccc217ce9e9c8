//! Error types for the encryption core.
//!
//! Cipher-level errors are typed so callers and logs can tell a malformed
//! frame from an authentication failure. At the external boundary they
//! collapse into [`CryptoError`], whose message never says more than
//! "encryption failed" or "decryption failed".

use thiserror::Error;
use vaultcore_keystore::KeyStoreError;

use crate::wire::CipherType;

/// Structural problems with a ciphertext frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short")]
    TooShort,
    #[error("frame carries cipher tag {found:#04x}, expected {expected:#04x}")]
    TypeMismatch { expected: u8, found: u8 },
    #[error("frame version {found} does not match requested version {expected}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("frame version {0} outside the recoverable range")]
    VersionOutOfRange(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyDerivationError {
    #[error("master secret is empty")]
    EmptySecret,
    #[error("iteration count must be non-zero")]
    ZeroIterations,
    #[error("key derivation failed")]
    Primitive,
    #[error("key cache lock poisoned")]
    CachePoisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("cipher {0} is not registered")]
    Unsupported(CipherType),
    #[error("unknown cipher tag {0:#04x}")]
    Unknown(u8),
}

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("plaintext of {size} bytes exceeds limit of {limit} bytes")]
    PlaintextTooLarge { size: usize, limit: usize },
    #[error("random number generator failure")]
    Rng,
    #[error("AEAD seal failed")]
    Seal,
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("blocking task did not complete")]
    BlockingTask,
}

#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Tag mismatch, wrong key or altered associated data. Deliberately
    /// carries no detail.
    #[error("authentication failed")]
    Authentication,
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("all recovery strategies exhausted")]
    RecoveryExhausted,
    #[error("blocking task did not complete")]
    BlockingTask,
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("master secret is not configured")]
    MissingMasterSecret,
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
}

/// Boundary error for [`crate::CryptoContext::encrypt`] and
/// [`crate::CryptoContext::decrypt`]. The cause is reachable through
/// `source()` for operators but never printed.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encryption(#[source] EncryptionError),
    #[error("decryption failed")]
    Decryption(#[source] DecryptionError),
}

impl CryptoError {
    pub fn is_encryption(&self) -> bool {
        matches!(self, Self::Encryption(_))
    }

    pub fn is_decryption(&self) -> bool {
        matches!(self, Self::Decryption(_))
    }
}
