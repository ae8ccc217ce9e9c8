//! Runtime configuration for a [`crate::CryptoContext`].
//!
//! Defaults match production; everything can be overridden from
//! `VAULTCORE_*` environment variables or deserialized from a config file.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vaultcore_keystore::{KeyStoreOptions, RotationSchedule, STORE_FILE_NAME};

use crate::error::ConfigError;
use crate::kdf::DEFAULT_KDF_ITERATIONS;
use crate::retry::RetryPolicy;
use crate::wire::CipherType;

pub const DEFAULT_MAX_PLAINTEXT_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

pub const ENV_PREFIX: &str = "VAULTCORE_";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Never serialized.
    #[serde(skip_serializing)]
    pub master_secret: String,
    pub default_cipher: CipherType,
    /// Encrypt everything with the layered cipher, ignoring preferences.
    pub layered_mode: bool,
    pub min_rotation_days: u32,
    pub max_rotation_days: u32,
    pub hmac_enabled: bool,
    pub canaries_enabled: bool,
    pub max_plaintext_bytes: usize,
    /// Directory holding `keystore.bin`.
    pub data_dir: PathBuf,
    pub kdf_iterations: u32,
    /// Let `decrypt_data` fall back to emergency recovery.
    pub emergency_recovery: bool,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            master_secret: String::new(),
            default_cipher: CipherType::AesGcm,
            layered_mode: false,
            min_rotation_days: vaultcore_keystore::DEFAULT_MIN_ROTATION_DAYS,
            max_rotation_days: vaultcore_keystore::DEFAULT_MAX_ROTATION_DAYS,
            hmac_enabled: true,
            canaries_enabled: true,
            max_plaintext_bytes: DEFAULT_MAX_PLAINTEXT_BYTES,
            data_dir: PathBuf::from("data"),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            emergency_recovery: true,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("master_secret", &"[REDACTED]")
            .field("default_cipher", &self.default_cipher)
            .field("layered_mode", &self.layered_mode)
            .field("min_rotation_days", &self.min_rotation_days)
            .field("max_rotation_days", &self.max_rotation_days)
            .field("hmac_enabled", &self.hmac_enabled)
            .field("canaries_enabled", &self.canaries_enabled)
            .field("max_plaintext_bytes", &self.max_plaintext_bytes)
            .field("data_dir", &self.data_dir)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("emergency_recovery", &self.emergency_recovery)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl CryptoConfig {
    pub fn new(master_secret: impl Into<String>) -> Self {
        Self {
            master_secret: master_secret.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `VAULTCORE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`CryptoConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut cfg = Self::default();

        cfg.master_secret = var("MASTER_SECRET").ok_or(ConfigError::MissingMasterSecret)?;
        if let Some(v) = var("DEFAULT_CIPHER") {
            cfg.default_cipher = parse("DEFAULT_CIPHER", &v)?;
        }
        if let Some(v) = var("LAYERED_MODE") {
            cfg.layered_mode = parse_bool("LAYERED_MODE", &v)?;
        }
        if let Some(v) = var("MIN_ROTATION_DAYS") {
            cfg.min_rotation_days = parse("MIN_ROTATION_DAYS", &v)?;
        }
        if let Some(v) = var("MAX_ROTATION_DAYS") {
            cfg.max_rotation_days = parse("MAX_ROTATION_DAYS", &v)?;
        }
        if let Some(v) = var("HMAC_ENABLED") {
            cfg.hmac_enabled = parse_bool("HMAC_ENABLED", &v)?;
        }
        if let Some(v) = var("CANARIES_ENABLED") {
            cfg.canaries_enabled = parse_bool("CANARIES_ENABLED", &v)?;
        }
        if let Some(v) = var("MAX_PLAINTEXT_BYTES") {
            cfg.max_plaintext_bytes = parse("MAX_PLAINTEXT_BYTES", &v)?;
        }
        if let Some(v) = var("DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("KDF_ITERATIONS") {
            cfg.kdf_iterations = parse("KDF_ITERATIONS", &v)?;
        }
        if let Some(v) = var("EMERGENCY_RECOVERY") {
            cfg.emergency_recovery = parse_bool("EMERGENCY_RECOVERY", &v)?;
        }
        if let Some(v) = var("RETRY_ATTEMPTS") {
            cfg.retry_attempts = parse("RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("RETRY_DELAY_MS") {
            cfg.retry_delay_ms = parse("RETRY_DELAY_MS", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.master_secret.is_empty() {
            return Err(ConfigError::MissingMasterSecret);
        }
        if self.max_plaintext_bytes == 0 {
            return Err(invalid("max_plaintext_bytes", "must be non-zero"));
        }
        if self.kdf_iterations == 0 {
            return Err(invalid("kdf_iterations", "must be non-zero"));
        }
        if self.retry_attempts == 0 {
            return Err(invalid("retry_attempts", "must be at least 1"));
        }
        self.rotation_schedule()?;
        Ok(())
    }

    pub fn rotation_schedule(&self) -> Result<RotationSchedule, ConfigError> {
        Ok(RotationSchedule::new(self.min_rotation_days, self.max_rotation_days)?)
    }

    pub fn keystore_options(&self) -> Result<KeyStoreOptions, ConfigError> {
        Ok(KeyStoreOptions {
            rotation: self.rotation_schedule()?,
            hmac_enabled: self.hmac_enabled,
            canaries_enabled: self.canaries_enabled,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| invalid(key, e.to_string()))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(key, format!("expected a boolean, got '{}'", other))),
    }
}
