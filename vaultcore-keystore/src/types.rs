//! Core types: VersionRecord, HistoryEntry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::KeyStoreError;

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One entry per key version ever made current.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Version record
// ---------------------------------------------------------------------------

/// The persisted key-version state.
///
/// `current_version` only ever grows by one per rotation, and
/// `next_rotation` is always drawn from the rotation window relative
/// to `last_rotation`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub current_version: u32,
    pub last_rotation: DateTime<Utc>,
    pub next_rotation: DateTime<Utc>,
    /// Keyed by the decimal version string ("1", "2", ...).
    pub history: BTreeMap<String, HistoryEntry>,
}

impl VersionRecord {
    /// Fresh record at version 1.
    pub fn initial(now: DateTime<Utc>, next_rotation: DateTime<Utc>) -> Self {
        let mut history = BTreeMap::new();
        history.insert("1".to_string(), HistoryEntry { created_at: now });
        Self {
            current_version: 1,
            last_rotation: now,
            next_rotation,
            history,
        }
    }

    pub fn rotation_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_rotation
    }

    /// Advance to the next version and record it. Returns the new version.
    pub fn rotate(
        &mut self,
        now: DateTime<Utc>,
        next_rotation: DateTime<Utc>,
    ) -> Result<u32, KeyStoreError> {
        let next = self
            .current_version
            .checked_add(1)
            .ok_or_else(|| KeyStoreError::KeyManagement("key version space exhausted".into()))?;

        self.current_version = next;
        self.last_rotation = now;
        self.next_rotation = next_rotation;
        self.history
            .insert(next.to_string(), HistoryEntry { created_at: now });
        Ok(next)
    }

    pub fn created_at(&self, version: u32) -> Option<DateTime<Utc>> {
        self.history.get(&version.to_string()).map(|h| h.created_at)
    }
}
