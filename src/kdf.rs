//! KDF: master secret + key version -> 256-bit data key
//!
//! salt = KDF_SALT_PREFIX || version[4, BE]
//! key  = PBKDF2-HMAC-SHA256(master_secret, salt, iterations, len=32)

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use hmac::Hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::KeyDerivationError;
use crate::wire::KEY_BYTES;

pub const KDF_SALT_PREFIX: &[u8] = b"vaultcore.kdf.v1:";
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Frame headers are untrusted input, so the cache is capped.
pub const MAX_CACHED_VERSIONS: usize = 256;

/// A derived data key. Zeroed on drop.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: Zeroizing<[u8; KEY_BYTES]>,
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.bytes
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

fn salt(version: u32) -> Vec<u8> {
    let mut salt = Vec::with_capacity(KDF_SALT_PREFIX.len() + 4);
    salt.extend_from_slice(KDF_SALT_PREFIX);
    salt.extend_from_slice(&version.to_be_bytes());
    salt
}

/// Derive the key for `version`. Deterministic in all three inputs.
pub fn derive_key(
    master_secret: &[u8],
    version: u32,
    iterations: u32,
) -> Result<DerivedKey, KeyDerivationError> {
    if master_secret.is_empty() {
        return Err(KeyDerivationError::EmptySecret);
    }
    if iterations == 0 {
        return Err(KeyDerivationError::ZeroIterations);
    }

    let mut bytes = Zeroizing::new([0u8; KEY_BYTES]);
    pbkdf2::pbkdf2::<Hmac<Sha256>>(master_secret, &salt(version), iterations, bytes.as_mut())
        .map_err(|_| KeyDerivationError::Primitive)?;
    Ok(DerivedKey { bytes })
}

// ---------------------------------------------------------------------------
// Caching deriver
// ---------------------------------------------------------------------------

/// Holds the master secret and caches one derived key per version.
///
/// PBKDF2 at the default cost takes tens of milliseconds; versions change
/// at most every few weeks, so the cache stays tiny.
pub struct KeyDeriver {
    secret: Zeroizing<Vec<u8>>,
    iterations: u32,
    cache: RwLock<HashMap<u32, DerivedKey>>,
}

impl KeyDeriver {
    pub fn new(master_secret: &[u8], iterations: u32) -> Result<Self, KeyDerivationError> {
        if master_secret.is_empty() {
            return Err(KeyDerivationError::EmptySecret);
        }
        if iterations == 0 {
            return Err(KeyDerivationError::ZeroIterations);
        }
        Ok(Self {
            secret: Zeroizing::new(master_secret.to_vec()),
            iterations,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive and cache. Only for versions the caller trusts, such as the
    /// one handed out by the key store.
    pub fn derive(&self, version: u32) -> Result<DerivedKey, KeyDerivationError> {
        let key = self.derive_transient(version)?;
        self.remember(version, &key);
        Ok(key)
    }

    /// Derive without touching the cache on a miss. Versions read from an
    /// unauthenticated frame header go through here; the caller calls
    /// [`KeyDeriver::remember`] once the frame has opened.
    pub fn derive_transient(&self, version: u32) -> Result<DerivedKey, KeyDerivationError> {
        if let Some(key) = self
            .cache
            .read()
            .map_err(|_| KeyDerivationError::CachePoisoned)?
            .get(&version)
        {
            return Ok(key.clone());
        }

        // Derive outside the lock; a racing thread computes the same key.
        derive_key(&self.secret, version, self.iterations)
    }

    /// Cache `key` for `version` unless the cache is full.
    pub fn remember(&self, version: u32, key: &DerivedKey) {
        if let Ok(mut cache) = self.cache.write() {
            if cache.len() < MAX_CACHED_VERSIONS {
                cache.entry(version).or_insert_with(|| key.clone());
            }
        }
    }

    pub fn cached_versions(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("secret", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .field("cached_versions", &self.cached_versions())
            .finish()
    }
}
