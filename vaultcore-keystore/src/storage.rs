//! Key-store file format and storage backends.
//!
//! On-disk layout (all integers big-endian):
//!
//! ```text
//! [magic "VCKSTOR1" : 8]
//! [obfuscated_payload_size : u32]
//! [hmac_size : u32]
//! [sha256_checksum : 32]
//! [hmac_signature : hmac_size]
//! [obfuscated_payload : obfuscated_payload_size]
//! ```
//!
//! The checksum and HMAC both cover the canonical JSON *before*
//! obfuscation.

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use subtle::ConstantTimeEq;

use crate::error::{FileFormatKind, KeyStoreError, TamperKind};
use crate::integrity::IntegrityGuard;
use crate::obfuscation::Obfuscator;
use crate::types::VersionRecord;

pub const MAGIC: &[u8; 8] = b"VCKSTOR1";
pub const CHECKSUM_BYTES: usize = 32;
/// magic + payload size + hmac size + checksum
pub const HEADER_BYTES: usize = 8 + 4 + 4 + CHECKSUM_BYTES;

pub const STORE_FILE_NAME: &str = "keystore.bin";

// ---------------------------------------------------------------------------
// Binary container
// ---------------------------------------------------------------------------

/// Parsed sections of a key-store file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreFile {
    pub checksum: [u8; CHECKSUM_BYTES],
    pub hmac: Vec<u8>,
    /// Still obfuscated.
    pub payload: Vec<u8>,
}

pub fn encode_store_file(file: &StoreFile) -> Result<Vec<u8>, KeyStoreError> {
    let payload_len = u32::try_from(file.payload.len())
        .map_err(|_| KeyStoreError::KeyManagement("store payload too large".into()))?;
    let hmac_len = u32::try_from(file.hmac.len())
        .map_err(|_| KeyStoreError::KeyManagement("store signature too large".into()))?;

    let mut out = Vec::with_capacity(HEADER_BYTES + file.hmac.len() + file.payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&payload_len.to_be_bytes());
    out.extend_from_slice(&hmac_len.to_be_bytes());
    out.extend_from_slice(&file.checksum);
    out.extend_from_slice(&file.hmac);
    out.extend_from_slice(&file.payload);
    Ok(out)
}

/// Split a key-store file into its sections.
///
/// A wrong magic is reported before any length check, so a short file of
/// some other format is still classified as "not ours".
pub fn decode_store_file(bytes: &[u8]) -> Result<StoreFile, KeyStoreError> {
    if bytes.len() < MAGIC.len() {
        return Err(KeyStoreError::FileFormat(FileFormatKind::Truncated));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(KeyStoreError::FileFormat(FileFormatKind::BadMagic));
    }
    if bytes.len() < HEADER_BYTES {
        return Err(KeyStoreError::FileFormat(FileFormatKind::Truncated));
    }

    let payload_len = read_u32(&bytes[8..12]) as usize;
    let hmac_len = read_u32(&bytes[12..16]) as usize;
    let mut checksum = [0u8; CHECKSUM_BYTES];
    checksum.copy_from_slice(&bytes[16..HEADER_BYTES]);

    let total = HEADER_BYTES
        .checked_add(hmac_len)
        .and_then(|n| n.checked_add(payload_len))
        .ok_or(KeyStoreError::FileFormat(FileFormatKind::LengthMismatch))?;
    if bytes.len() < total {
        return Err(KeyStoreError::FileFormat(FileFormatKind::Truncated));
    }
    if bytes.len() > total {
        return Err(KeyStoreError::FileFormat(FileFormatKind::LengthMismatch));
    }

    let hmac_end = HEADER_BYTES + hmac_len;
    Ok(StoreFile {
        checksum,
        hmac: bytes[HEADER_BYTES..hmac_end].to_vec(),
        payload: bytes[hmac_end..].to_vec(),
    })
}

fn read_u32(b: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(b);
    u32::from_be_bytes(buf)
}

// ---------------------------------------------------------------------------
// Record codec
// ---------------------------------------------------------------------------

/// Turns a [`VersionRecord`] into key-store file bytes and back, applying
/// canaries, checksum, HMAC and obfuscation.
pub struct RecordCodec {
    guard: IntegrityGuard,
    obfuscator: Obfuscator,
    hmac_enabled: bool,
    canaries_enabled: bool,
}

impl RecordCodec {
    pub fn new(
        guard: IntegrityGuard,
        obfuscator: Obfuscator,
        hmac_enabled: bool,
        canaries_enabled: bool,
    ) -> Self {
        Self {
            guard,
            obfuscator,
            hmac_enabled,
            canaries_enabled,
        }
    }

    pub fn seal(&self, record: &VersionRecord) -> Result<Vec<u8>, KeyStoreError> {
        let map = match serde_json::to_value(record).map_err(|e| KeyStoreError::serde("serialize record", e))? {
            Value::Object(map) => map,
            _ => return Err(KeyStoreError::KeyManagement("record did not serialize to an object".into())),
        };
        let map = if self.canaries_enabled {
            IntegrityGuard::embed_canaries(map)
        } else {
            map
        };

        let plain = Value::Object(map).to_string().into_bytes();
        let mut checksum = [0u8; CHECKSUM_BYTES];
        checksum.copy_from_slice(&Sha256::digest(&plain));
        let hmac = if self.hmac_enabled {
            self.guard.sign(&plain)?.to_vec()
        } else {
            Vec::new()
        };

        encode_store_file(&StoreFile {
            checksum,
            hmac,
            payload: self.obfuscator.obfuscate(&plain),
        })
    }

    /// Checks run in order: container format, checksum, HMAC, JSON shape,
    /// canaries. The first failure wins.
    pub fn open(&self, bytes: &[u8]) -> Result<VersionRecord, KeyStoreError> {
        let file = decode_store_file(bytes)?;
        let plain = self.obfuscator.deobfuscate(&file.payload);

        let actual = Sha256::digest(&plain);
        if !bool::from(actual.as_slice().ct_eq(&file.checksum)) {
            return Err(KeyStoreError::TamperingDetected(TamperKind::Checksum));
        }

        // A stripped signature is as bad as a wrong one.
        if self.hmac_enabled && (file.hmac.is_empty() || !self.guard.verify(&plain, &file.hmac)) {
            return Err(KeyStoreError::TamperingDetected(TamperKind::Hmac));
        }

        let map = match serde_json::from_slice::<Value>(&plain).map_err(|e| KeyStoreError::serde("parse record", e))? {
            Value::Object(map) => map,
            _ => return Err(KeyStoreError::KeyManagement("record is not a JSON object".into())),
        };

        if self.canaries_enabled && !IntegrityGuard::verify_canaries(&map) {
            return Err(KeyStoreError::TamperingDetected(TamperKind::Canary));
        }

        let map = IntegrityGuard::strip_canaries(map);
        serde_json::from_value(Value::Object(map)).map_err(|e| KeyStoreError::serde("decode record", e))
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Where the key-store bytes live.
pub trait StoreBackend: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> Result<Option<Vec<u8>>, KeyStoreError>;
    /// Replace the stored bytes.
    fn write(&self, bytes: &[u8]) -> Result<(), KeyStoreError>;
    /// Move the current bytes aside so the next read sees an empty store.
    fn quarantine(&self) -> Result<(), KeyStoreError>;
}

fn timestamp_suffix() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%.9fZ").to_string()
}

// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// Single-file backend.
///
/// ```text
/// data_dir/
///   keystore.bin
///   keystore.bin.<ts>.bak          one per overwrite
///   keystore.bin.corrupted_<ts>    quarantined files
/// ```
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| KeyStoreError::io("create dir", e))?;
        }
        Ok(Self { path })
    }

    /// `dir/keystore.bin`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self, KeyStoreError> {
        Self::new(dir.as_ref().join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

impl StoreBackend for FileBackend {
    fn read(&self) -> Result<Option<Vec<u8>>, KeyStoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeyStoreError::io("read store", e)),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<(), KeyStoreError> {
        if self.path.exists() {
            let backup = self.sibling(&format!(".{}.bak", timestamp_suffix()));
            std::fs::copy(&self.path, &backup).map_err(|e| KeyStoreError::io("backup store", e))?;
            tracing::debug!(backup = %backup.display(), "key store backup written");
        }

        // Atomic write: write to temp, then rename
        let tmp = self.sibling(".tmp");
        std::fs::write(&tmp, bytes).map_err(|e| KeyStoreError::io("write store", e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| KeyStoreError::io("rename store", e))?;
        Ok(())
    }

    fn quarantine(&self) -> Result<(), KeyStoreError> {
        if !self.path.exists() {
            return Ok(());
        }
        let target = self.sibling(&format!(".corrupted_{}", timestamp_suffix()));
        std::fs::rename(&self.path, &target).map_err(|e| KeyStoreError::io("quarantine store", e))?;
        tracing::warn!(quarantined = %target.display(), "key store file moved aside");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-memory storage (for testing and ephemeral use).
#[derive(Default)]
pub struct InMemoryBackend {
    current: Mutex<Option<Vec<u8>>>,
    quarantined: Mutex<Vec<Vec<u8>>>,
    writes: Mutex<usize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored bytes without counting a write.
    pub fn set_raw(&self, bytes: Option<Vec<u8>>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = bytes;
    }

    pub fn raw(&self) -> Option<Vec<u8>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn quarantined(&self) -> Vec<Vec<u8>> {
        self.quarantined.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl StoreBackend for InMemoryBackend {
    fn read(&self) -> Result<Option<Vec<u8>>, KeyStoreError> {
        Ok(self.raw())
    }

    fn write(&self, bytes: &[u8]) -> Result<(), KeyStoreError> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    fn quarantine(&self) -> Result<(), KeyStoreError> {
        if let Some(bytes) = self.current.lock().unwrap_or_else(PoisonError::into_inner).take() {
            self.quarantined
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(bytes);
        }
        Ok(())
    }
}
