//! # Vaultcore Keystore
//!
//! Tamper-evident key-version store with randomized rotation.
//!
//! Persists a single [`VersionRecord`] (current key version, rotation
//! schedule, history) in a binary file protected by a SHA-256 checksum,
//! an HMAC-SHA256 signature and structural canaries. The payload is
//! obfuscated so it is not readable at a glance.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vaultcore_keystore::{KeyStoreOptions, KeyVersionStore};
//!
//! let store = KeyVersionStore::open_in_dir("/var/lib/vaultcore", b"master-secret", KeyStoreOptions::default())?;
//! let version = store.current_version()?; // 1 on first use, then rotates every 30-90 days
//! # let _ = version;
//! # Ok::<(), vaultcore_keystore::KeyStoreError>(())
//! ```

pub mod clock;
pub mod error;
pub mod integrity;
pub mod keystore;
pub mod obfuscation;
pub mod policy;
pub mod storage;
pub mod types;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FileFormatKind, KeyStoreError, TamperKind};
pub use integrity::IntegrityGuard;
pub use keystore::{KeyStoreOptions, KeyVersionStore};
pub use obfuscation::Obfuscator;
pub use policy::{RotationSchedule, DEFAULT_MAX_ROTATION_DAYS, DEFAULT_MIN_ROTATION_DAYS};
pub use storage::{FileBackend, InMemoryBackend, StoreBackend, STORE_FILE_NAME};
pub use types::{HistoryEntry, VersionRecord};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
