//! Emergency decryption for data written under superseded framings.
//!
//! Strategies run in a fixed order and the first success wins:
//!
//! 1. `SmartDetect`: key version 1, cipher read from the frame's type byte.
//! 2. `LegacyFixed`: no version prefix, `nonce[12] || tag[16] || ciphertext`
//!    under AES-256-GCM with empty associated data, key version 1.
//! 3. `VersionScan`: key for the frame's own version (when `0 < v < 100`),
//!    tried with every registered cipher's layout.
//!
//! The authenticated version bytes are never rewritten, so a frame whose
//! header was altered cannot be "recovered" by any strategy.

use core::fmt;

use getrandom::getrandom;

use crate::aead::{open_detached, seal_detached, CipherSuite, FrameCipher};
use crate::error::{DecryptionError, EncryptionError, FrameError};
use crate::kdf::KeyDeriver;
use crate::registry::CipherRegistry;
use crate::wire::{self, CipherType, KEY_BYTES, NONCE_BYTES, TAG_BYTES};

/// Exclusive upper bound for the version scan.
pub const VERSION_SCAN_LIMIT: u32 = 100;

/// Key version assumed for data that predates versioned frames.
pub const LEGACY_KEY_VERSION: u32 = 1;

pub const LEGACY_MIN_BYTES: usize = NONCE_BYTES + TAG_BYTES;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoveryStrategy {
    SmartDetect,
    LegacyFixed,
    VersionScan,
}

impl RecoveryStrategy {
    pub const ORDER: [RecoveryStrategy; 3] = [
        RecoveryStrategy::SmartDetect,
        RecoveryStrategy::LegacyFixed,
        RecoveryStrategy::VersionScan,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryStrategy::SmartDetect => "smart_detect",
            RecoveryStrategy::LegacyFixed => "legacy_fixed",
            RecoveryStrategy::VersionScan => "version_scan",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plaintext plus how it was obtained.
#[derive(Clone, PartialEq, Eq)]
pub struct Recovered {
    pub plaintext: Vec<u8>,
    pub strategy: RecoveryStrategy,
    /// Version the key was derived for.
    pub key_version: u32,
    /// `None` for the legacy format.
    pub cipher: Option<CipherType>,
    /// Index into the fallback secret list, `None` for the primary secret.
    pub fallback_index: Option<usize>,
}

impl fmt::Debug for Recovered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recovered")
            .field("plaintext_len", &self.plaintext.len())
            .field("strategy", &self.strategy)
            .field("key_version", &self.key_version)
            .field("cipher", &self.cipher)
            .field("fallback_index", &self.fallback_index)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Legacy format
// ---------------------------------------------------------------------------

/// Produce the legacy unversioned format: `nonce[12] || tag[16] || ct`.
pub fn seal_legacy(plaintext: &[u8], key: &[u8; KEY_BYTES]) -> Result<Vec<u8>, EncryptionError> {
    let mut nonce = [0u8; NONCE_BYTES];
    getrandom(&mut nonce).map_err(|_| EncryptionError::Rng)?;
    let mut buf = plaintext.to_vec();
    let tag = seal_detached(CipherSuite::AesGcm, key, &nonce, &[], &mut buf)?;

    let mut out = Vec::with_capacity(LEGACY_MIN_BYTES + buf.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&tag);
    out.extend_from_slice(&buf);
    Ok(out)
}

pub fn open_legacy(data: &[u8], key: &[u8; KEY_BYTES]) -> Result<Vec<u8>, DecryptionError> {
    if data.len() < LEGACY_MIN_BYTES {
        return Err(FrameError::TooShort.into());
    }
    let (nonce, rest) = data.split_at(NONCE_BYTES);
    let (tag, ct) = rest.split_at(TAG_BYTES);
    let tag: &[u8; TAG_BYTES] = tag.try_into().map_err(|_| FrameError::TooShort)?;

    let mut buf = ct.to_vec();
    open_detached(CipherSuite::AesGcm, key, nonce, &[], &mut buf, tag)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Decryptor
// ---------------------------------------------------------------------------

pub struct EmergencyDecryptor<'a> {
    registry: &'a CipherRegistry,
    deriver: &'a KeyDeriver,
}

impl<'a> EmergencyDecryptor<'a> {
    pub fn new(registry: &'a CipherRegistry, deriver: &'a KeyDeriver) -> Self {
        Self { registry, deriver }
    }

    /// Run every strategy with the primary secret.
    pub fn decrypt(&self, data: &[u8]) -> Result<Recovered, DecryptionError> {
        self.run(self.deriver, data, None)
            .ok_or(DecryptionError::RecoveryExhausted)
    }

    /// Primary secret first, then each fallback secret in order. Used when
    /// the master secret itself has changed.
    pub fn decrypt_with_fallback_keys(
        &self,
        data: &[u8],
        fallback_secrets: &[&[u8]],
    ) -> Result<Recovered, DecryptionError> {
        if let Some(found) = self.run(self.deriver, data, None) {
            return Ok(found);
        }

        for (index, secret) in fallback_secrets.iter().enumerate() {
            let deriver = match KeyDeriver::new(secret, self.deriver.iterations()) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!(fallback_index = index, error = %e, "skipping fallback secret");
                    continue;
                }
            };
            if let Some(found) = self.run(&deriver, data, Some(index)) {
                return Ok(found);
            }
        }
        Err(DecryptionError::RecoveryExhausted)
    }

    fn run(
        &self,
        deriver: &KeyDeriver,
        data: &[u8],
        fallback_index: Option<usize>,
    ) -> Option<Recovered> {
        for strategy in RecoveryStrategy::ORDER {
            match self.attempt(strategy, deriver, data) {
                Ok(mut found) => {
                    found.fallback_index = fallback_index;
                    tracing::warn!(
                        strategy = %strategy,
                        key_version = found.key_version,
                        cipher = ?found.cipher,
                        fallback_index = ?fallback_index,
                        "ciphertext recovered by emergency path"
                    );
                    return Some(found);
                }
                Err(e) => {
                    tracing::debug!(
                        strategy = %strategy,
                        fallback_index = ?fallback_index,
                        error = %e,
                        "recovery strategy failed"
                    );
                }
            }
        }
        None
    }

    fn attempt(
        &self,
        strategy: RecoveryStrategy,
        deriver: &KeyDeriver,
        data: &[u8],
    ) -> Result<Recovered, DecryptionError> {
        match strategy {
            RecoveryStrategy::SmartDetect => {
                let (version, _) = wire::peek_prefix(data)?;
                let cipher = self.registry.detect_type(data)?;
                let key = deriver.derive(LEGACY_KEY_VERSION)?;
                let plaintext = self
                    .registry
                    .get(cipher)?
                    .decrypt(data, key.as_bytes(), version)?;
                Ok(Recovered {
                    plaintext,
                    strategy,
                    key_version: LEGACY_KEY_VERSION,
                    cipher: Some(cipher),
                    fallback_index: None,
                })
            }
            RecoveryStrategy::LegacyFixed => {
                let key = deriver.derive(LEGACY_KEY_VERSION)?;
                let plaintext = open_legacy(data, key.as_bytes())?;
                Ok(Recovered {
                    plaintext,
                    strategy,
                    key_version: LEGACY_KEY_VERSION,
                    cipher: None,
                    fallback_index: None,
                })
            }
            RecoveryStrategy::VersionScan => {
                let (version, _) = wire::peek_prefix(data)?;
                if version == 0 || version >= VERSION_SCAN_LIMIT {
                    return Err(FrameError::VersionOutOfRange(version).into());
                }
                let key = deriver.derive_transient(version)?;
                for cipher in self.registry.ciphers() {
                    if let Ok(plaintext) = cipher.decrypt_as(data, key.as_bytes(), version) {
                        deriver.remember(version, &key);
                        return Ok(Recovered {
                            plaintext,
                            strategy,
                            key_version: version,
                            cipher: Some(cipher.cipher_type()),
                            fallback_index: None,
                        });
                    }
                }
                Err(DecryptionError::Authentication)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FRAME_PREFIX_BYTES;

    const SECRET: &[u8] = b"emergency-secret";
    const ITER: u32 = 5;

    fn deriver() -> KeyDeriver {
        KeyDeriver::new(SECRET, ITER).unwrap()
    }

    #[test]
    fn test_legacy_roundtrip() {
        let d = deriver();
        let key = d.derive(1).unwrap();
        let blob = seal_legacy(b"old data", key.as_bytes()).unwrap();
        assert_eq!(blob.len(), LEGACY_MIN_BYTES + 8);
        assert_eq!(open_legacy(&blob, key.as_bytes()).unwrap(), b"old data");
        assert!(open_legacy(&blob[..27], key.as_bytes()).is_err());
    }

    #[test]
    fn test_smart_detect_recovers_version_one() {
        let registry = CipherRegistry::with_defaults();
        let d = deriver();
        let frame = CipherSuite::ChaCha20Poly1305
            .encrypt(b"v1 data", d.derive(1).unwrap().as_bytes(), 1)
            .unwrap();

        let found = EmergencyDecryptor::new(&registry, &d).decrypt(&frame).unwrap();
        assert_eq!(found.plaintext, b"v1 data");
        assert_eq!(found.strategy, RecoveryStrategy::SmartDetect);
        assert_eq!(found.cipher, Some(CipherType::ChaCha20Poly1305));
    }

    #[test]
    fn test_legacy_strategy() {
        let registry = CipherRegistry::with_defaults();
        let d = deriver();
        let blob = seal_legacy(b"unversioned", d.derive(1).unwrap().as_bytes()).unwrap();

        let found = EmergencyDecryptor::new(&registry, &d).decrypt(&blob).unwrap();
        assert_eq!(found.plaintext, b"unversioned");
        assert_eq!(found.strategy, RecoveryStrategy::LegacyFixed);
        assert_eq!(found.cipher, None);
    }

    #[test]
    fn test_version_scan_ignores_type_byte() {
        let registry = CipherRegistry::with_defaults();
        let d = deriver();
        let mut frame = CipherSuite::CamelliaGcm
            .encrypt(b"mislabelled", d.derive(7).unwrap().as_bytes(), 7)
            .unwrap();
        frame[FRAME_PREFIX_BYTES - 1] = 0x01; // claims AES-GCM

        let found = EmergencyDecryptor::new(&registry, &d).decrypt(&frame).unwrap();
        assert_eq!(found.plaintext, b"mislabelled");
        assert_eq!(found.strategy, RecoveryStrategy::VersionScan);
        assert_eq!(found.key_version, 7);
        assert_eq!(found.cipher, Some(CipherType::CamelliaGcm));
    }

    #[test]
    fn test_version_scan_bounds() {
        let registry = CipherRegistry::with_defaults();
        let d = deriver();
        let mut mislabelled = CipherSuite::AesGcm
            .encrypt(b"too new", d.derive(100).unwrap().as_bytes(), 100)
            .unwrap();
        mislabelled[4] = 0x05;
        assert!(matches!(
            EmergencyDecryptor::new(&registry, &d).decrypt(&mislabelled),
            Err(DecryptionError::RecoveryExhausted)
        ));
    }

    #[test]
    fn test_altered_version_is_never_recovered() {
        let registry = CipherRegistry::with_defaults();
        let d = deriver();
        let mut frame = CipherSuite::AesGcm
            .encrypt(b"secret", d.derive(1).unwrap().as_bytes(), 1)
            .unwrap();
        frame[3] = 2;
        assert!(EmergencyDecryptor::new(&registry, &d).decrypt(&frame).is_err());
    }

    #[test]
    fn test_fallback_secret() {
        let registry = CipherRegistry::with_defaults();
        let old = KeyDeriver::new(b"old-master", ITER).unwrap();
        let frame = CipherSuite::XChaCha20Poly1305
            .encrypt(b"pre-rotation", old.derive(4).unwrap().as_bytes(), 4)
            .unwrap();

        let d = deriver();
        let e = EmergencyDecryptor::new(&registry, &d);
        assert!(e.decrypt(&frame).is_err());

        let found = e
            .decrypt_with_fallback_keys(&frame, &[&b""[..], &b"wrong"[..], &b"old-master"[..]])
            .unwrap();
        assert_eq!(found.plaintext, b"pre-rotation");
        assert_eq!(found.fallback_index, Some(2));
        assert_eq!(found.strategy, RecoveryStrategy::VersionScan);
    }

    #[test]
    fn test_debug_hides_plaintext() {
        let r = Recovered {
            plaintext: b"top secret".to_vec(),
            strategy: RecoveryStrategy::LegacyFixed,
            key_version: 1,
            cipher: None,
            fallback_index: None,
        };
        assert!(!format!("{:?}", r).contains("top secret"));
    }
}
