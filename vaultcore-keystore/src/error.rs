//! Error types for the key-version store.

use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Which integrity check rejected a store file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TamperKind {
    /// SHA-256 of the recovered payload does not match the stored checksum.
    Checksum,
    /// HMAC signature missing or invalid.
    Hmac,
    /// Top-level or nested canary missing or invalid.
    Canary,
}

impl fmt::Display for TamperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TamperKind::Checksum => write!(f, "checksum mismatch"),
            TamperKind::Hmac => write!(f, "HMAC mismatch"),
            TamperKind::Canary => write!(f, "canary mismatch"),
        }
    }
}

/// Why a file was rejected as "not our format".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormatKind {
    BadMagic,
    Truncated,
    /// Trailing bytes after the declared sections.
    LengthMismatch,
}

impl fmt::Display for FileFormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormatKind::BadMagic => write!(f, "magic bytes do not match"),
            FileFormatKind::Truncated => write!(f, "file is truncated"),
            FileFormatKind::LengthMismatch => write!(f, "declared section sizes do not match file length"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// I/O, serialization or bookkeeping failure not attributable to tampering.
    #[error("key management error: {0}")]
    KeyManagement(String),

    #[error("key store file format error: {0}")]
    FileFormat(FileFormatKind),

    #[error("key store tampering detected: {0}")]
    TamperingDetected(TamperKind),
}

impl KeyStoreError {
    pub(crate) fn io(what: &str, err: std::io::Error) -> Self {
        Self::KeyManagement(format!("{}: {}", what, err))
    }

    pub(crate) fn serde(what: &str, err: serde_json::Error) -> Self {
        Self::KeyManagement(format!("{}: {}", what, err))
    }

    /// True for failures that mean the file on disk cannot be trusted.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::FileFormat(_) | Self::TamperingDetected(_))
    }

    pub fn is_tampering(&self) -> bool {
        matches!(self, Self::TamperingDetected(_))
    }
}
