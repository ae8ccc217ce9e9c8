//! Ciphertext frame format
//!
//! Format:
//!   version[4, BE] || cipher_type[1] || nonce[12 | 24] || tag[16] || ciphertext[*]
//!
//! The version bytes are the associated data of every AEAD call, so they
//! are authenticated together with the ciphertext.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

pub const VERSION_BYTES: usize = 4;
pub const TYPE_BYTES: usize = 1;

/// version + cipher_type: the minimum needed to dispatch a frame.
pub const FRAME_PREFIX_BYTES: usize = VERSION_BYTES + TYPE_BYTES; // 5

pub const NONCE_BYTES: usize = 12;
pub const XNONCE_BYTES: usize = 24;
pub const TAG_BYTES: usize = 16;
pub const KEY_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Cipher tags
// ---------------------------------------------------------------------------

/// On-wire cipher identifier. The tag alone fixes the nonce length and the
/// AEAD algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CipherType {
    #[serde(rename = "aes_gcm")]
    AesGcm = 0x01,
    #[serde(rename = "chacha20_poly1305")]
    ChaCha20Poly1305 = 0x02,
    #[serde(rename = "xchacha20_poly1305")]
    XChaCha20Poly1305 = 0x03,
    #[serde(rename = "aes_siv")]
    AesSiv = 0x04,
    #[serde(rename = "camellia_gcm")]
    CamelliaGcm = 0x05,
    /// Outer AES-256-GCM frame whose payload is an inner XChaCha20-Poly1305 frame.
    #[serde(rename = "layered")]
    Layered = 0x10,
}

impl CipherType {
    pub const ALL: [CipherType; 6] = [
        CipherType::AesGcm,
        CipherType::ChaCha20Poly1305,
        CipherType::XChaCha20Poly1305,
        CipherType::AesSiv,
        CipherType::CamelliaGcm,
        CipherType::Layered,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }

    pub fn nonce_len(self) -> usize {
        match self {
            CipherType::XChaCha20Poly1305 => XNONCE_BYTES,
            _ => NONCE_BYTES,
        }
    }

    /// Bytes before the ciphertext: prefix, nonce and tag.
    pub fn header_len(self) -> usize {
        FRAME_PREFIX_BYTES + self.nonce_len() + TAG_BYTES
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherType::AesGcm => "AES-256-GCM",
            CipherType::ChaCha20Poly1305 => "ChaCha20-Poly1305",
            CipherType::XChaCha20Poly1305 => "XChaCha20-Poly1305",
            CipherType::AesSiv => "AES-SIV",
            CipherType::CamelliaGcm => "Camellia-256-GCM",
            CipherType::Layered => "Layered",
        }
    }
}

impl fmt::Display for CipherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "aes_gcm" | "aes_256_gcm" | "aes256gcm" => Ok(CipherType::AesGcm),
            "chacha20" | "chacha20_poly1305" => Ok(CipherType::ChaCha20Poly1305),
            "xchacha20" | "xchacha20_poly1305" => Ok(CipherType::XChaCha20Poly1305),
            "aes_siv" | "siv" => Ok(CipherType::AesSiv),
            "camellia" | "camellia_gcm" | "camellia_256_gcm" => Ok(CipherType::CamelliaGcm),
            "layered" => Ok(CipherType::Layered),
            _ => Err(format!("unknown cipher '{}'", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame codec
// ---------------------------------------------------------------------------

/// Associated data for a frame at `version`.
pub fn version_aad(version: u32) -> [u8; VERSION_BYTES] {
    version.to_be_bytes()
}

/// Read version and raw type byte without interpreting the rest.
pub fn peek_prefix(data: &[u8]) -> Result<(u32, u8), FrameError> {
    if data.len() < FRAME_PREFIX_BYTES {
        return Err(FrameError::TooShort);
    }
    let version = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    Ok((version, data[VERSION_BYTES]))
}

/// Borrowed view of a parsed frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub version: u32,
    pub type_tag: u8,
    pub nonce: &'a [u8],
    pub tag: &'a [u8; TAG_BYTES],
    pub ciphertext: &'a [u8],
}

/// Parse a frame that must carry `expected`'s type tag.
pub fn decode_frame(data: &[u8], expected: CipherType) -> Result<Frame<'_>, FrameError> {
    let (_, found) = peek_prefix(data)?;
    if found != expected.tag() {
        return Err(FrameError::TypeMismatch {
            expected: expected.tag(),
            found,
        });
    }
    decode_frame_as(data, expected)
}

/// Parse `data` with `layout`'s nonce length, whatever its type byte says.
pub fn decode_frame_as(data: &[u8], layout: CipherType) -> Result<Frame<'_>, FrameError> {
    let (version, type_tag) = peek_prefix(data)?;
    if data.len() < layout.header_len() {
        return Err(FrameError::TooShort);
    }

    let nonce_end = FRAME_PREFIX_BYTES + layout.nonce_len();
    let tag_end = nonce_end + TAG_BYTES;
    let tag: &[u8; TAG_BYTES] = data[nonce_end..tag_end]
        .try_into()
        .map_err(|_| FrameError::TooShort)?;

    Ok(Frame {
        version,
        type_tag,
        nonce: &data[FRAME_PREFIX_BYTES..nonce_end],
        tag,
        ciphertext: &data[tag_end..],
    })
}

pub fn encode_frame(
    version: u32,
    cipher: CipherType,
    nonce: &[u8],
    tag: &[u8; TAG_BYTES],
    ciphertext: &[u8],
) -> Vec<u8> {
    debug_assert_eq!(nonce.len(), cipher.nonce_len());

    let mut out = Vec::with_capacity(cipher.header_len() + ciphertext.len());
    out.extend_from_slice(&version_aad(version));
    out.push(cipher.tag());
    out.extend_from_slice(nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_unique() {
        for a in CipherType::ALL {
            assert_eq!(CipherType::from_tag(a.tag()), Some(a));
        }
        assert_eq!(CipherType::from_tag(0x00), None);
        assert_eq!(CipherType::from_tag(0xff), None);
    }

    #[test]
    fn test_header_lengths() {
        assert_eq!(CipherType::AesGcm.header_len(), 33);
        assert_eq!(CipherType::XChaCha20Poly1305.header_len(), 45);
        assert_eq!(CipherType::Layered.header_len(), 33);
    }

    #[test]
    fn test_encode_decode() {
        let nonce = [9u8; NONCE_BYTES];
        let tag = [7u8; TAG_BYTES];
        let bytes = encode_frame(0x0102_0304, CipherType::CamelliaGcm, &nonce, &tag, b"ct");
        assert_eq!(&bytes[..5], &[1, 2, 3, 4, 0x05]);

        let frame = decode_frame(&bytes, CipherType::CamelliaGcm).unwrap();
        assert_eq!(frame.version, 0x0102_0304);
        assert_eq!(frame.nonce, &nonce);
        assert_eq!(frame.tag, &tag);
        assert_eq!(frame.ciphertext, b"ct");
    }

    #[test]
    fn test_decode_rejects_wrong_type_and_short() {
        let bytes = encode_frame(1, CipherType::AesGcm, &[0u8; 12], &[0u8; 16], b"");
        assert_eq!(
            decode_frame(&bytes, CipherType::ChaCha20Poly1305).unwrap_err(),
            FrameError::TypeMismatch { expected: 0x02, found: 0x01 }
        );
        assert_eq!(
            decode_frame(&bytes[..32], CipherType::AesGcm).unwrap_err(),
            FrameError::TooShort
        );
        assert_eq!(peek_prefix(&[0, 0, 0, 1]).unwrap_err(), FrameError::TooShort);
        // Layout override ignores the type byte.
        assert!(decode_frame_as(&bytes, CipherType::ChaCha20Poly1305).is_ok());
    }

    #[test]
    fn test_cipher_names_parse() {
        assert_eq!("aes-gcm".parse::<CipherType>().unwrap(), CipherType::AesGcm);
        assert_eq!("XChaCha20".parse::<CipherType>().unwrap(), CipherType::XChaCha20Poly1305);
        assert_eq!("layered".parse::<CipherType>().unwrap(), CipherType::Layered);
        assert!("rot13".parse::<CipherType>().is_err());
    }
}
