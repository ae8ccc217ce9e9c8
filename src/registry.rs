//! Cipher registry: type tag -> cipher, plus use-case recommendations.
//!
//! The set of ciphers is closed ([`Cipher`]); the registry only decides
//! which of them a context accepts. It is filled once at construction and
//! read concurrently afterwards without locking.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aead::{CipherSuite, FrameCipher};
use crate::error::{DecryptionError, EncryptionError, RegistryError};
use crate::layered::LayeredCipher;
use crate::wire::{self, CipherType, KEY_BYTES};

// ---------------------------------------------------------------------------
// Cipher
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cipher {
    Suite(CipherSuite),
    Layered(LayeredCipher),
}

impl Cipher {
    pub fn for_type(cipher: CipherType) -> Self {
        match CipherSuite::from_type(cipher) {
            Some(suite) => Cipher::Suite(suite),
            None => Cipher::Layered(LayeredCipher::new()),
        }
    }
}

impl FrameCipher for Cipher {
    fn cipher_type(&self) -> CipherType {
        match self {
            Cipher::Suite(s) => s.cipher_type(),
            Cipher::Layered(l) => l.cipher_type(),
        }
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, EncryptionError> {
        match self {
            Cipher::Suite(s) => s.encrypt(plaintext, key, version),
            Cipher::Layered(l) => l.encrypt(plaintext, key, version),
        }
    }

    fn decrypt(
        &self,
        frame: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError> {
        match self {
            Cipher::Suite(s) => s.decrypt(frame, key, version),
            Cipher::Layered(l) => l.decrypt(frame, key, version),
        }
    }

    fn decrypt_as(
        &self,
        frame: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError> {
        match self {
            Cipher::Suite(s) => s.decrypt_as(frame, key, version),
            Cipher::Layered(l) => l.decrypt_as(frame, key, version),
        }
    }
}

impl From<CipherSuite> for Cipher {
    fn from(suite: CipherSuite) -> Self {
        Cipher::Suite(suite)
    }
}

impl From<LayeredCipher> for Cipher {
    fn from(layered: LayeredCipher) -> Self {
        Cipher::Layered(layered)
    }
}

// ---------------------------------------------------------------------------
// Use cases
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    Realtime,
    Deterministic,
    HighSecurity,
    Legacy,
}

impl UseCase {
    pub fn as_str(self) -> &'static str {
        match self {
            UseCase::Realtime => "realtime",
            UseCase::Deterministic => "deterministic",
            UseCase::HighSecurity => "high_security",
            UseCase::Legacy => "legacy",
        }
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UseCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "realtime" => Ok(UseCase::Realtime),
            "deterministic" => Ok(UseCase::Deterministic),
            "high_security" => Ok(UseCase::HighSecurity),
            "legacy" => Ok(UseCase::Legacy),
            _ => Err(format!("unknown use case '{}'", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct CipherRegistry {
    ciphers: BTreeMap<CipherType, Cipher>,
}

impl CipherRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every supported cipher, layered included.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for cipher in CipherType::ALL {
            registry.register(Cipher::for_type(cipher));
        }
        registry
    }

    /// Register `cipher`, returning any cipher it replaced.
    pub fn register(&mut self, cipher: impl Into<Cipher>) -> Option<Cipher> {
        let cipher = cipher.into();
        self.ciphers.insert(cipher.cipher_type(), cipher)
    }

    pub fn get(&self, cipher: CipherType) -> Result<&Cipher, RegistryError> {
        self.ciphers
            .get(&cipher)
            .ok_or(RegistryError::Unsupported(cipher))
    }

    pub fn contains(&self, cipher: CipherType) -> bool {
        self.ciphers.contains_key(&cipher)
    }

    /// Registered cipher types in tag order.
    pub fn registered(&self) -> impl Iterator<Item = CipherType> + '_ {
        self.ciphers.keys().copied()
    }

    pub fn ciphers(&self) -> impl Iterator<Item = &Cipher> + '_ {
        self.ciphers.values()
    }

    /// Read the type tag after the version field.
    pub fn detect_type(&self, frame: &[u8]) -> Result<CipherType, DecryptionError> {
        let (_, tag) = wire::peek_prefix(frame)?;
        match CipherType::from_tag(tag) {
            Some(cipher) if self.contains(cipher) => Ok(cipher),
            _ => Err(RegistryError::Unknown(tag).into()),
        }
    }

    /// Static lookup; independent of what is registered.
    pub fn recommend(use_case: UseCase) -> CipherType {
        match use_case {
            UseCase::Realtime => CipherType::ChaCha20Poly1305,
            UseCase::Deterministic => CipherType::AesSiv,
            UseCase::HighSecurity => CipherType::Layered,
            UseCase::Legacy => CipherType::AesGcm,
        }
    }
}
