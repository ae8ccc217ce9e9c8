//! Key-version store against a real data directory.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use vaultcore::keystore::storage::{HEADER_BYTES, MAGIC};
use vaultcore::keystore::{
    FileFormatKind, KeyStoreError, ManualClock, TamperKind, STORE_FILE_NAME,
};
use vaultcore::{open_key_store, CryptoConfig, CryptoContext};

fn config(dir: &Path) -> CryptoConfig {
    CryptoConfig {
        data_dir: dir.to_path_buf(),
        kdf_iterations: 10,
        retry_delay_ms: 0,
        ..CryptoConfig::new("file-test-secret")
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn store_bytes(dir: &Path) -> Vec<u8> {
    std::fs::read(dir.join(STORE_FILE_NAME)).unwrap()
}

#[test]
fn file_layout() {
    let dir = TempDir::new().unwrap();
    let store = open_key_store(dir.path(), &config(dir.path())).unwrap();
    assert_eq!(store.current_version().unwrap(), 1);

    let bytes = store_bytes(dir.path());
    assert_eq!(&bytes[..8], MAGIC);
    let payload_len = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let hmac_len = u32::from_be_bytes(bytes[12..16].try_into().unwrap()) as usize;
    assert_eq!(hmac_len, 32);
    assert_eq!(bytes.len(), HEADER_BYTES + hmac_len + payload_len);

    // Payload is obfuscated.
    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("current_version"));
    assert!(!text.contains("_canary"));
}

#[test]
fn one_byte_corruption_is_tampering() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    open_key_store(dir.path(), &cfg).unwrap().current_version().unwrap();
    let pristine = store_bytes(dir.path());

    // Checksum, signature and payload regions.
    for offset in [16, 40, HEADER_BYTES, HEADER_BYTES + 31, pristine.len() - 1] {
        let mut bad = pristine.clone();
        bad[offset] ^= 0x01;
        std::fs::write(dir.path().join(STORE_FILE_NAME), &bad).unwrap();

        let err = open_key_store(dir.path(), &cfg)
            .unwrap()
            .current_version()
            .unwrap_err();
        assert!(err.is_tampering(), "offset {}: {}", offset, err);
        assert!(!dir.path().join(STORE_FILE_NAME).exists());
    }

    let quarantined = entries(dir.path())
        .into_iter()
        .filter(|n| n.starts_with("keystore.bin.corrupted_"))
        .count();
    assert_eq!(quarantined, 5);
}

#[test]
fn signature_region_reports_hmac() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    open_key_store(dir.path(), &cfg).unwrap().current_version().unwrap();

    let mut bad = store_bytes(dir.path());
    bad[HEADER_BYTES] ^= 0xFF;
    std::fs::write(dir.path().join(STORE_FILE_NAME), &bad).unwrap();

    let err = open_key_store(dir.path(), &cfg)
        .unwrap()
        .current_version()
        .unwrap_err();
    assert!(matches!(err, KeyStoreError::TamperingDetected(TamperKind::Hmac)));
}

#[test]
fn quarantined_store_reinitialises_on_next_call() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let store = open_key_store(dir.path(), &cfg).unwrap();
    store.current_version().unwrap();

    let mut bad = store_bytes(dir.path());
    let last = bad.len() - 1;
    bad[last] ^= 0x20;
    std::fs::write(dir.path().join(STORE_FILE_NAME), &bad).unwrap();

    assert!(store.current_version().is_err());
    assert_eq!(store.current_version().unwrap(), 1);
    assert!(dir.path().join(STORE_FILE_NAME).exists());
}

#[test]
fn foreign_file_is_format_error() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    std::fs::write(dir.path().join(STORE_FILE_NAME), b"{\"current_version\": 7}").unwrap();

    let err = open_key_store(dir.path(), &cfg)
        .unwrap()
        .current_version()
        .unwrap_err();
    assert!(matches!(err, KeyStoreError::FileFormat(FileFormatKind::BadMagic)));
    assert!(!err.is_tampering());
}

#[test]
fn rotation_keeps_backups() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()));
    let store = open_key_store(dir.path(), &config(dir.path()))
        .unwrap()
        .with_clock(clock.clone());

    assert_eq!(store.current_version().unwrap(), 1);
    clock.advance(Duration::days(90));
    assert_eq!(store.current_version().unwrap(), 2);
    clock.advance(Duration::days(90));
    assert_eq!(store.current_version().unwrap(), 3);

    let backups = entries(dir.path())
        .into_iter()
        .filter(|n| n.ends_with(".bak"))
        .count();
    assert_eq!(backups, 2);

    let record = store.read_record().unwrap().unwrap();
    assert_eq!(record.current_version, 3);
    assert_eq!(record.history.len(), 3);
    assert!(record.created_at(2).unwrap() < record.created_at(3).unwrap());
}

#[test]
fn version_survives_restart() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()));

    let first = CryptoContext::builder(config(dir.path()))
        .clock(clock.clone())
        .build()
        .unwrap();
    first.current_key_version();
    clock.advance(Duration::days(95));
    let frame = first.encrypt_data(b"persisted").unwrap();
    assert_eq!(&frame[..4], &2u32.to_be_bytes());
    drop(first);

    let second = CryptoContext::builder(config(dir.path()))
        .clock(clock.clone())
        .build()
        .unwrap();
    assert_eq!(second.current_key_version(), 2);
    assert_eq!(second.decrypt_data(&frame).unwrap(), b"persisted");
}

#[test]
fn wrong_secret_cannot_read_store() {
    let dir = TempDir::new().unwrap();
    open_key_store(dir.path(), &config(dir.path()))
        .unwrap()
        .current_version()
        .unwrap();

    let other = CryptoConfig {
        master_secret: "someone-else".into(),
        ..config(dir.path())
    };
    let err = open_key_store(dir.path(), &other)
        .unwrap()
        .current_version()
        .unwrap_err();
    assert!(matches!(err, KeyStoreError::TamperingDetected(TamperKind::Hmac)));
}

#[test]
fn corrupted_store_does_not_block_encryption() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(STORE_FILE_NAME), b"VCKSTOR1 but not really").unwrap();

    let ctx = CryptoContext::from_config(config(dir.path())).unwrap();
    let frame = ctx.encrypt_data(b"still works").unwrap();
    assert_eq!(&frame[..4], &1u32.to_be_bytes());
    assert_eq!(ctx.decrypt_data(&frame).unwrap(), b"still works");
}
