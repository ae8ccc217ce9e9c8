//! Integrity guard: HMAC-SHA256 signing plus structural canaries.
//!
//! The HMAC covers every bit of the serialized record. Canaries are a
//! second, structural check that survives deserialization: a top-level
//! `_canary` derived from the canonical record, and one nested `_canary`
//! inside every object-valued field, bound to the top canary and the
//! field name.
//!
//! Canonical form is `serde_json::Value` rendered with sorted keys (the
//! default `Map` is ordered), so both sides hash identical bytes.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::KeyStoreError;

type HmacSha256 = Hmac<Sha256>;

pub const HMAC_BYTES: usize = 32;
pub const HMAC_KEY_INFO: &[u8] = b"vaultcore.keystore.hmac.v1";

pub const CANARY_FIELD: &str = "_canary";
/// Canaries are the leading hex characters of a SHA-256 digest.
pub const CANARY_HEX_LEN: usize = 16;

pub struct IntegrityGuard {
    hmac_key: Zeroizing<[u8; 32]>,
}

impl IntegrityGuard {
    /// Derive the signing key from the master secret. The key is bound to
    /// its own HKDF label and never used for data encryption.
    pub fn from_master_secret(master_secret: &[u8]) -> Result<Self, KeyStoreError> {
        let mut key = Zeroizing::new([0u8; 32]);
        Hkdf::<Sha256>::new(None, master_secret)
            .expand(HMAC_KEY_INFO, key.as_mut())
            .map_err(|_| KeyStoreError::KeyManagement("HMAC key expansion failed".into()))?;
        Ok(Self { hmac_key: key })
    }

    pub fn sign(&self, payload: &[u8]) -> Result<[u8; HMAC_BYTES], KeyStoreError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        let mut out = [0u8; HMAC_BYTES];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }

    /// Constant-time check of `signature` over `payload`.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        match self.mac() {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(signature).is_ok()
            }
            Err(_) => false,
        }
    }

    fn mac(&self) -> Result<HmacSha256, KeyStoreError> {
        <HmacSha256 as Mac>::new_from_slice(self.hmac_key.as_ref())
            .map_err(|_| KeyStoreError::KeyManagement("HMAC key rejected".into()))
    }

    // -----------------------------------------------------------------------
    // Canaries
    // -----------------------------------------------------------------------

    /// Add the top-level canary and one canary per nested object.
    /// Existing canaries are replaced.
    pub fn embed_canaries(record: Map<String, Value>) -> Map<String, Value> {
        let mut record = Self::strip_canaries(record);
        let top = top_canary(&record);

        for (field, value) in record.iter_mut() {
            if let Value::Object(inner) = value {
                inner.insert(CANARY_FIELD.to_string(), Value::String(nested_canary(&top, field)));
            }
        }
        record.insert(CANARY_FIELD.to_string(), Value::String(top));
        record
    }

    pub fn verify_canaries(record: &Map<String, Value>) -> bool {
        let found = match record.get(CANARY_FIELD) {
            Some(Value::String(c)) => c,
            _ => return false,
        };

        let expected = top_canary(&Self::strip_canaries(record.clone()));
        if !ct_str_eq(found, &expected) {
            return false;
        }

        for (field, value) in record {
            if let Value::Object(inner) = value {
                match inner.get(CANARY_FIELD) {
                    Some(Value::String(c)) if ct_str_eq(c, &nested_canary(&expected, field)) => {}
                    _ => return false,
                }
            }
        }
        true
    }

    /// Remove canaries from the top level and from nested objects.
    pub fn strip_canaries(mut record: Map<String, Value>) -> Map<String, Value> {
        record.remove(CANARY_FIELD);
        for value in record.values_mut() {
            if let Value::Object(inner) = value {
                inner.remove(CANARY_FIELD);
            }
        }
        record
    }
}

/// `record` must already be canary-free.
fn top_canary(record: &Map<String, Value>) -> String {
    let canonical = Value::Object(record.clone()).to_string();
    truncated_digest(&[canonical.as_bytes()])
}

fn nested_canary(top: &str, field: &str) -> String {
    truncated_digest(&[top.as_bytes(), field.as_bytes()])
}

fn truncated_digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..CANARY_HEX_LEN / 2])
}

fn ct_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
