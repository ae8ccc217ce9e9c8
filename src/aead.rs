//! AEAD cipher suites.
//!
//! Every suite produces the same self-describing frame (see [`crate::wire`])
//! with the 4-byte version as associated data. AES-SIV is deterministic;
//! the others draw a fresh random nonce per call.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, AesGcm};
use aes_siv::siv::Aes256Siv;
use camellia::Camellia256;
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use getrandom::getrandom;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{DecryptionError, EncryptionError, FrameError};
use crate::wire::{self, CipherType, KEY_BYTES, NONCE_BYTES, TAG_BYTES, XNONCE_BYTES};

type Camellia256Gcm = AesGcm<Camellia256, U12>;

/// HKDF label used to stretch a 32-byte key into the 64-byte AES-SIV key.
const SIV_KEY_INFO: &[u8] = b"vaultcore.aes-siv.v1";

// ---------------------------------------------------------------------------
// Common contract
// ---------------------------------------------------------------------------

/// Anything that turns plaintext into a versioned frame and back.
pub trait FrameCipher {
    fn cipher_type(&self) -> CipherType;

    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, EncryptionError>;

    /// `version` must match the frame header; the key is expected to be
    /// the one derived for it.
    fn decrypt(
        &self,
        frame: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError>;

    /// Like [`FrameCipher::decrypt`] but reads the frame with this cipher's
    /// layout regardless of its type byte. Recovery only.
    fn decrypt_as(
        &self,
        frame: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError>;
}

// ---------------------------------------------------------------------------
// Cipher suites
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    AesGcm,
    ChaCha20Poly1305,
    XChaCha20Poly1305,
    AesSiv,
    CamelliaGcm,
}

impl CipherSuite {
    pub const ALL: [CipherSuite; 5] = [
        CipherSuite::AesGcm,
        CipherSuite::ChaCha20Poly1305,
        CipherSuite::XChaCha20Poly1305,
        CipherSuite::AesSiv,
        CipherSuite::CamelliaGcm,
    ];

    pub fn from_type(cipher: CipherType) -> Option<Self> {
        match cipher {
            CipherType::AesGcm => Some(CipherSuite::AesGcm),
            CipherType::ChaCha20Poly1305 => Some(CipherSuite::ChaCha20Poly1305),
            CipherType::XChaCha20Poly1305 => Some(CipherSuite::XChaCha20Poly1305),
            CipherType::AesSiv => Some(CipherSuite::AesSiv),
            CipherType::CamelliaGcm => Some(CipherSuite::CamelliaGcm),
            CipherType::Layered => None,
        }
    }

    pub fn is_deterministic(self) -> bool {
        self == CipherSuite::AesSiv
    }

    /// Fresh nonce for one encryption. AES-SIV gets an all-zero slot.
    fn nonce(self) -> Result<Vec<u8>, EncryptionError> {
        let len = self.cipher_type().nonce_len();
        let mut n = vec![0u8; len];
        if !self.is_deterministic() {
            getrandom(&mut n).map_err(|_| EncryptionError::Rng)?;
        }
        Ok(n)
    }

    /// Encrypt and frame under an explicit type slot.
    pub(crate) fn seal_frame(
        self,
        slot: CipherType,
        plaintext: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, EncryptionError> {
        let nonce = self.nonce()?;
        let aad = wire::version_aad(version);
        let mut buf = plaintext.to_vec();
        let tag = seal_detached(self, key, &nonce, &aad, &mut buf)?;
        Ok(wire::encode_frame(version, slot, &nonce, &tag, &buf))
    }

    /// Parse with `layout`, check the version, authenticate and decrypt.
    pub(crate) fn open_frame(
        self,
        frame: wire::Frame<'_>,
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError> {
        if frame.version != version {
            return Err(FrameError::VersionMismatch {
                expected: version,
                found: frame.version,
            }
            .into());
        }
        let aad = wire::version_aad(version);
        let mut buf = frame.ciphertext.to_vec();
        open_detached(self, key, frame.nonce, &aad, &mut buf, frame.tag)?;
        Ok(buf)
    }
}

impl FrameCipher for CipherSuite {
    fn cipher_type(&self) -> CipherType {
        match self {
            CipherSuite::AesGcm => CipherType::AesGcm,
            CipherSuite::ChaCha20Poly1305 => CipherType::ChaCha20Poly1305,
            CipherSuite::XChaCha20Poly1305 => CipherType::XChaCha20Poly1305,
            CipherSuite::AesSiv => CipherType::AesSiv,
            CipherSuite::CamelliaGcm => CipherType::CamelliaGcm,
        }
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, EncryptionError> {
        self.seal_frame(self.cipher_type(), plaintext, key, version)
    }

    fn decrypt(
        &self,
        frame: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError> {
        let parsed = wire::decode_frame(frame, self.cipher_type())?;
        self.open_frame(parsed, key, version)
    }

    fn decrypt_as(
        &self,
        frame: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError> {
        let parsed = wire::decode_frame_as(frame, self.cipher_type())?;
        self.open_frame(parsed, key, version)
    }
}

// ---------------------------------------------------------------------------
// Detached AEAD primitives
// ---------------------------------------------------------------------------

/// Encrypt `buf` in place and return the tag.
pub(crate) fn seal_detached(
    suite: CipherSuite,
    key: &[u8; KEY_BYTES],
    nonce: &[u8],
    aad: &[u8],
    buf: &mut [u8],
) -> Result<[u8; TAG_BYTES], EncryptionError> {
    let tag = match suite {
        CipherSuite::AesGcm => {
            check_nonce(nonce, NONCE_BYTES).ok_or(EncryptionError::Seal)?;
            Aes256Gcm::new_from_slice(key)
                .map_err(|_| EncryptionError::Seal)?
                .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf)
                .map_err(|_| EncryptionError::Seal)?
        }
        CipherSuite::ChaCha20Poly1305 => {
            check_nonce(nonce, NONCE_BYTES).ok_or(EncryptionError::Seal)?;
            ChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| EncryptionError::Seal)?
                .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf)
                .map_err(|_| EncryptionError::Seal)?
        }
        CipherSuite::XChaCha20Poly1305 => {
            check_nonce(nonce, XNONCE_BYTES).ok_or(EncryptionError::Seal)?;
            XChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| EncryptionError::Seal)?
                .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf)
                .map_err(|_| EncryptionError::Seal)?
        }
        CipherSuite::CamelliaGcm => {
            check_nonce(nonce, NONCE_BYTES).ok_or(EncryptionError::Seal)?;
            Camellia256Gcm::new_from_slice(key)
                .map_err(|_| EncryptionError::Seal)?
                .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf)
                .map_err(|_| EncryptionError::Seal)?
        }
        CipherSuite::AesSiv => {
            let siv_key = siv_key(key).ok_or(EncryptionError::Seal)?;
            Aes256Siv::new_from_slice(siv_key.as_ref())
                .map_err(|_| EncryptionError::Seal)?
                .encrypt_in_place_detached([aad, nonce], buf)
                .map_err(|_| EncryptionError::Seal)?
        }
    };

    let mut out = [0u8; TAG_BYTES];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// Authenticate and decrypt `buf` in place. Every failure is the same
/// opaque error.
pub(crate) fn open_detached(
    suite: CipherSuite,
    key: &[u8; KEY_BYTES],
    nonce: &[u8],
    aad: &[u8],
    buf: &mut [u8],
    tag: &[u8; TAG_BYTES],
) -> Result<(), DecryptionError> {
    let tag = GenericArray::from_slice(tag);
    let result = match suite {
        CipherSuite::AesGcm => {
            check_nonce(nonce, NONCE_BYTES).ok_or(DecryptionError::Authentication)?;
            Aes256Gcm::new_from_slice(key)
                .map_err(|_| DecryptionError::Authentication)?
                .decrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf, tag)
        }
        CipherSuite::ChaCha20Poly1305 => {
            check_nonce(nonce, NONCE_BYTES).ok_or(DecryptionError::Authentication)?;
            ChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| DecryptionError::Authentication)?
                .decrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf, tag)
        }
        CipherSuite::XChaCha20Poly1305 => {
            check_nonce(nonce, XNONCE_BYTES).ok_or(DecryptionError::Authentication)?;
            XChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| DecryptionError::Authentication)?
                .decrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf, tag)
        }
        CipherSuite::CamelliaGcm => {
            check_nonce(nonce, NONCE_BYTES).ok_or(DecryptionError::Authentication)?;
            Camellia256Gcm::new_from_slice(key)
                .map_err(|_| DecryptionError::Authentication)?
                .decrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf, tag)
        }
        CipherSuite::AesSiv => {
            let siv_key = siv_key(key).ok_or(DecryptionError::Authentication)?;
            Aes256Siv::new_from_slice(siv_key.as_ref())
                .map_err(|_| DecryptionError::Authentication)?
                .decrypt_in_place_detached([aad, nonce], buf, tag)
        }
    };
    result.map_err(|_| DecryptionError::Authentication)
}

fn check_nonce(nonce: &[u8], len: usize) -> Option<()> {
    (nonce.len() == len).then_some(())
}

fn siv_key(key: &[u8; KEY_BYTES]) -> Option<Zeroizing<[u8; 64]>> {
    let mut out = Zeroizing::new([0u8; 64]);
    Hkdf::<Sha256>::new(None, key)
        .expand(SIV_KEY_INFO, out.as_mut())
        .ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn test_roundtrip_all_suites() {
        for suite in CipherSuite::ALL {
            for pt in [&b""[..], &b"x"[..], &b"hello world"[..], &[0xa5u8; 4096][..]] {
                let frame = suite.encrypt(pt, &KEY, 7).unwrap();
                assert_eq!(frame.len(), suite.cipher_type().header_len() + pt.len());
                assert_eq!(frame[4], suite.cipher_type().tag());
                assert_eq!(suite.decrypt(&frame, &KEY, 7).unwrap(), pt, "{:?}", suite);
            }
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        for suite in CipherSuite::ALL {
            let frame = suite.encrypt(b"secret", &KEY, 1).unwrap();
            let err = suite.decrypt(&frame, &[0x43; 32], 1).unwrap_err();
            assert!(matches!(err, DecryptionError::Authentication), "{:?}", suite);
        }
    }

    #[test]
    fn test_version_argument_must_match_header() {
        let frame = CipherSuite::AesGcm.encrypt(b"secret", &KEY, 3).unwrap();
        assert!(matches!(
            CipherSuite::AesGcm.decrypt(&frame, &KEY, 4),
            Err(DecryptionError::Frame(FrameError::VersionMismatch { expected: 4, found: 3 }))
        ));
    }

    #[test]
    fn test_version_is_authenticated() {
        for suite in CipherSuite::ALL {
            let mut frame = suite.encrypt(b"secret", &KEY, 1).unwrap();
            frame[3] ^= 0x02; // version 1 -> 3
            assert!(suite.decrypt(&frame, &KEY, 3).is_err(), "{:?}", suite);
        }
    }

    #[test]
    fn test_every_bit_flip_detected() {
        for suite in CipherSuite::ALL {
            let frame = suite.encrypt(b"tamper me", &KEY, 1).unwrap();
            for i in 0..frame.len() {
                for bit in 0..8 {
                    let mut t = frame.clone();
                    t[i] ^= 1 << bit;
                    assert!(suite.decrypt(&t, &KEY, 1).is_err(), "{:?} byte {} bit {}", suite, i, bit);
                }
            }
        }
    }

    #[test]
    fn test_nonces_are_fresh() {
        let a = CipherSuite::ChaCha20Poly1305.encrypt(b"same", &KEY, 1).unwrap();
        let b = CipherSuite::ChaCha20Poly1305.encrypt(b"same", &KEY, 1).unwrap();
        assert_ne!(a, b);
        assert_ne!(a[5..17], b[5..17]);
    }

    #[test]
    fn test_siv_is_deterministic() {
        let a = CipherSuite::AesSiv.encrypt(b"same", &KEY, 1).unwrap();
        let b = CipherSuite::AesSiv.encrypt(b"same", &KEY, 1).unwrap();
        assert_eq!(a, b);
        assert!(a[5..17].iter().all(|&x| x == 0));

        let c = CipherSuite::AesSiv.encrypt(b"same", &KEY, 2).unwrap();
        assert_ne!(a[17..], c[17..]);
    }

    #[test]
    fn test_suites_do_not_cross_decrypt() {
        let frame = CipherSuite::AesGcm.encrypt(b"secret", &KEY, 1).unwrap();
        assert!(matches!(
            CipherSuite::CamelliaGcm.decrypt(&frame, &KEY, 1),
            Err(DecryptionError::Frame(FrameError::TypeMismatch { .. }))
        ));
        assert!(CipherSuite::CamelliaGcm.decrypt_as(&frame, &KEY, 1).is_err());
        assert_eq!(CipherSuite::AesGcm.decrypt_as(&frame, &KEY, 1).unwrap(), b"secret");
    }
}
