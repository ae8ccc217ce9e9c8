//! Layered ("double") encryption.
//!
//! inner = XChaCha20-Poly1305 frame of the plaintext under sub-key A
//! outer = AES-256-GCM frame of `inner` under sub-key B, type slot LAYERED
//!
//! Both frames carry the same version bytes as associated data. Decryption
//! authenticates the outer frame before the inner one is parsed.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::aead::{CipherSuite, FrameCipher};
use crate::error::{DecryptionError, EncryptionError};
use crate::wire::{self, CipherType, KEY_BYTES};

pub const OUTER_LAYER_LABEL: &[u8] = b"aes_layer";
pub const INNER_LAYER_LABEL: &[u8] = b"xchacha_layer";

const OUTER: CipherSuite = CipherSuite::AesGcm;
const INNER: CipherSuite = CipherSuite::XChaCha20Poly1305;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayeredCipher;

impl LayeredCipher {
    pub fn new() -> Self {
        Self
    }

    /// Independent (outer, inner) sub-keys; neither layer sees `key`.
    pub fn sub_keys(
        key: &[u8; KEY_BYTES],
    ) -> (Zeroizing<[u8; KEY_BYTES]>, Zeroizing<[u8; KEY_BYTES]>) {
        (sub_key(key, OUTER_LAYER_LABEL), sub_key(key, INNER_LAYER_LABEL))
    }

    fn open_outer(
        frame: wire::Frame<'_>,
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError> {
        let (outer_key, inner_key) = Self::sub_keys(key);
        let inner = Zeroizing::new(OUTER.open_frame(frame, &outer_key, version)?);
        INNER.decrypt(&inner, &inner_key, version)
    }
}

fn sub_key(key: &[u8; KEY_BYTES], label: &[u8]) -> Zeroizing<[u8; KEY_BYTES]> {
    let mut h = Sha256::new();
    h.update(key);
    h.update(label);
    let mut out = Zeroizing::new([0u8; KEY_BYTES]);
    out.copy_from_slice(&h.finalize());
    out
}

impl FrameCipher for LayeredCipher {
    fn cipher_type(&self) -> CipherType {
        CipherType::Layered
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, EncryptionError> {
        let (outer_key, inner_key) = Self::sub_keys(key);
        let inner = Zeroizing::new(INNER.encrypt(plaintext, &inner_key, version)?);
        OUTER.seal_frame(CipherType::Layered, &inner, &outer_key, version)
    }

    fn decrypt(
        &self,
        frame: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError> {
        let parsed = wire::decode_frame(frame, CipherType::Layered)?;
        Self::open_outer(parsed, key, version)
    }

    fn decrypt_as(
        &self,
        frame: &[u8],
        key: &[u8; KEY_BYTES],
        version: u32,
    ) -> Result<Vec<u8>, DecryptionError> {
        let parsed = wire::decode_frame_as(frame, CipherType::Layered)?;
        Self::open_outer(parsed, key, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::wire::{FRAME_PREFIX_BYTES, NONCE_BYTES};

    const KEY: [u8; 32] = [0x11; 32];

    #[test]
    fn test_roundtrip() {
        let l = LayeredCipher::new();
        for pt in [&b""[..], &b"defense in depth"[..], &[0u8; 10_000][..]] {
            let frame = l.encrypt(pt, &KEY, 9).unwrap();
            assert_eq!(frame[4], CipherType::Layered.tag());
            assert_eq!(l.decrypt(&frame, &KEY, 9).unwrap(), pt);
        }
    }

    #[test]
    fn test_frame_nests_inner_xchacha_frame() {
        let frame = LayeredCipher::new().encrypt(b"abc", &KEY, 2).unwrap();
        let expected_len = CipherType::Layered.header_len() + CipherType::XChaCha20Poly1305.header_len() + 3;
        assert_eq!(frame.len(), expected_len);

        // Peel the outer layer by hand and check the inner header.
        let (outer_key, inner_key) = LayeredCipher::sub_keys(&KEY);
        let parsed = wire::decode_frame(&frame, CipherType::Layered).unwrap();
        let inner = OUTER.open_frame(parsed, &outer_key, 2).unwrap();
        assert_eq!(&inner[..5], &[0, 0, 0, 2, CipherType::XChaCha20Poly1305.tag()]);
        assert_eq!(INNER.decrypt(&inner, &inner_key, 2).unwrap(), b"abc");
    }

    #[test]
    fn test_sub_keys_are_distinct_from_master() {
        let (outer, inner) = LayeredCipher::sub_keys(&KEY);
        assert_ne!(*outer, KEY);
        assert_ne!(*inner, KEY);
        assert_ne!(*outer, *inner);
    }

    #[test]
    fn test_outer_tag_tamper_fails_at_outer_layer() {
        let mut frame = LayeredCipher::new().encrypt(b"abc", &KEY, 1).unwrap();
        frame[FRAME_PREFIX_BYTES + NONCE_BYTES] ^= 0x01;

        // The outer open fails on its own, before the inner frame exists.
        let (outer_key, _) = LayeredCipher::sub_keys(&KEY);
        let parsed = wire::decode_frame(&frame, CipherType::Layered).unwrap();
        assert!(matches!(
            OUTER.open_frame(parsed, &outer_key, 1),
            Err(DecryptionError::Authentication)
        ));
        assert!(LayeredCipher::new().decrypt(&frame, &KEY, 1).is_err());
    }

    #[test]
    fn test_plain_aes_gcm_frame_is_not_layered() {
        let frame = CipherSuite::AesGcm.encrypt(b"abc", &KEY, 1).unwrap();
        assert!(matches!(
            LayeredCipher::new().decrypt(&frame, &KEY, 1),
            Err(DecryptionError::Frame(FrameError::TypeMismatch { .. }))
        ));
    }
}
