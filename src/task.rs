//! Async wrappers.
//!
//! The pipeline is CPU-bound and may touch the key-store file, so async
//! callers run it on tokio's blocking pool instead of a runtime worker.

use std::sync::Arc;

use crate::context::CryptoContext;
use crate::error::{CryptoError, DecryptionError, EncryptionError};

pub async fn encrypt_async(
    ctx: Arc<CryptoContext>,
    plaintext: Vec<u8>,
) -> Result<Vec<u8>, CryptoError> {
    match tokio::task::spawn_blocking(move || ctx.encrypt(&plaintext)).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "encrypt task failed");
            Err(CryptoError::Encryption(EncryptionError::BlockingTask))
        }
    }
}

pub async fn decrypt_async(
    ctx: Arc<CryptoContext>,
    frame: Vec<u8>,
) -> Result<Vec<u8>, CryptoError> {
    match tokio::task::spawn_blocking(move || ctx.decrypt(&frame)).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "decrypt task failed");
            Err(CryptoError::Decryption(DecryptionError::BlockingTask))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CryptoConfig;
    use vaultcore_keystore::InMemoryBackend;

    fn ctx() -> Arc<CryptoContext> {
        let config = CryptoConfig {
            kdf_iterations: 10,
            retry_delay_ms: 0,
            ..CryptoConfig::new("task-secret")
        };
        Arc::new(
            CryptoContext::builder(config)
                .backend(Arc::new(InMemoryBackend::new()))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let ctx = ctx();
        let frame = encrypt_async(ctx.clone(), b"async".to_vec()).await.unwrap();
        assert_eq!(decrypt_async(ctx, frame).await.unwrap(), b"async");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_tasks() {
        let ctx = ctx();
        let handles: Vec<_> = (0..16u8)
            .map(|i| {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let frame = encrypt_async(ctx.clone(), vec![i; 64]).await.unwrap();
                    decrypt_async(ctx, frame).await.unwrap()
                })
            })
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await.unwrap(), vec![i as u8; 64]);
        }
    }

    #[tokio::test]
    async fn test_async_failure_is_opaque() {
        let err = decrypt_async(ctx(), vec![1, 2, 3]).await.unwrap_err();
        assert_eq!(err.to_string(), "decryption failed");
    }
}
