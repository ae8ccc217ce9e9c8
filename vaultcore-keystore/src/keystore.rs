//! Key-version store: the current key version and its rotation schedule.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::error::KeyStoreError;
use crate::integrity::IntegrityGuard;
use crate::obfuscation::Obfuscator;
use crate::policy::RotationSchedule;
use crate::storage::{FileBackend, RecordCodec, StoreBackend};
use crate::types::VersionRecord;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyStoreOptions {
    pub rotation: RotationSchedule,
    pub hmac_enabled: bool,
    pub canaries_enabled: bool,
}

impl Default for KeyStoreOptions {
    fn default() -> Self {
        Self {
            rotation: RotationSchedule::default(),
            hmac_enabled: true,
            canaries_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Persists the current key version and rotates it on schedule.
///
/// State machine:
///
/// ```text
/// Uninitialized --current_version()--> Active(1)
/// Active(v) --current_version(), now >= next_rotation--> Active(v + 1)
/// Active(v) --current_version(), now <  next_rotation--> Active(v)   (no write)
/// ```
///
/// The whole read, decide and write sequence runs under one mutex, so
/// concurrent callers in a process observe exactly one rotation per
/// boundary. Files that fail a format or integrity check are quarantined
/// and the typed error is returned; nothing is silently re-initialised in
/// the same call.
pub struct KeyVersionStore {
    backend: Arc<dyn StoreBackend>,
    codec: RecordCodec,
    schedule: RotationSchedule,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl KeyVersionStore {
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        master_secret: &[u8],
        options: KeyStoreOptions,
    ) -> Result<Self, KeyStoreError> {
        let guard = IntegrityGuard::from_master_secret(master_secret)?;
        Ok(Self {
            backend,
            codec: RecordCodec::new(
                guard,
                Obfuscator::default(),
                options.hmac_enabled,
                options.canaries_enabled,
            ),
            schedule: options.rotation,
            clock: Arc::new(SystemClock),
            lock: Mutex::new(()),
        })
    }

    /// File-backed store at `data_dir/keystore.bin`.
    pub fn open_in_dir(
        data_dir: impl AsRef<Path>,
        master_secret: &[u8],
        options: KeyStoreOptions,
    ) -> Result<Self, KeyStoreError> {
        let backend = FileBackend::in_dir(data_dir)?;
        Self::new(Arc::new(backend), master_secret, options)
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn schedule(&self) -> RotationSchedule {
        self.schedule
    }

    /// Current key version, initialising or rotating as needed.
    pub fn current_version(&self) -> Result<u32, KeyStoreError> {
        let _held = self
            .lock
            .lock()
            .map_err(|_| KeyStoreError::KeyManagement("key store lock poisoned".into()))?;
        let now = self.clock.now();

        match self.load_locked()? {
            None => {
                let record = VersionRecord::initial(now, self.schedule.next_rotation(now));
                self.persist_locked(&record)?;
                tracing::info!(
                    version = record.current_version,
                    next_rotation = %record.next_rotation,
                    "key store initialised"
                );
                Ok(record.current_version)
            }
            Some(mut record) if record.rotation_due(now) => {
                let previous = record.current_version;
                let version = record.rotate(now, self.schedule.next_rotation(now))?;
                self.persist_locked(&record)?;
                tracing::info!(
                    previous,
                    version,
                    next_rotation = %record.next_rotation,
                    "key version rotated"
                );
                Ok(version)
            }
            Some(record) => Ok(record.current_version),
        }
    }

    /// The persisted record, without initialising or rotating. A file that
    /// fails its checks is reported but left in place.
    pub fn read_record(&self) -> Result<Option<VersionRecord>, KeyStoreError> {
        let _held = self
            .lock
            .lock()
            .map_err(|_| KeyStoreError::KeyManagement("key store lock poisoned".into()))?;
        self.decode_locked()
    }

    fn decode_locked(&self) -> Result<Option<VersionRecord>, KeyStoreError> {
        match self.backend.read()? {
            Some(bytes) => self.codec.open(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn load_locked(&self) -> Result<Option<VersionRecord>, KeyStoreError> {
        match self.decode_locked() {
            Err(e) if e.is_integrity_failure() => {
                tracing::error!(error = %e, "key store file rejected");
                if let Err(q) = self.backend.quarantine() {
                    tracing::warn!(error = %q, "failed to quarantine key store file");
                }
                Err(e)
            }
            other => other,
        }
    }

    fn persist_locked(&self, record: &VersionRecord) -> Result<(), KeyStoreError> {
        let bytes = self.codec.seal(record)?;
        self.backend.write(&bytes)
    }
}
