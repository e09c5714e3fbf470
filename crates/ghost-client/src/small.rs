//! Non-chunked path for files below the multipart threshold
//!
//! One seal, one `PUT`; one `GET`, one open. The blob has the same
//! `IV ‖ ciphertext ‖ tag` layout as a single chunk. AEAD work runs on the
//! blocking thread pool rather than the crypto worker pool.

use crate::{
    ClientError, Result,
    api::DriveApi,
    retry::{RetryPolicy, with_retry},
    source::ChunkSource,
    transport::ObjectTransport,
    types::UploadOutcome,
};
use bytes::Bytes;
use ghost_crypto::{FileEncryptionKey, chunk::CHUNK_OVERHEAD, symmetric};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Seal a whole file on the blocking pool
pub async fn seal(key: &FileEncryptionKey, plaintext: Bytes) -> Result<Bytes> {
    let key = key.clone();
    let sealed = tokio::task::spawn_blocking(move || symmetric::encrypt(&key, &plaintext)).await??;
    Ok(Bytes::from(sealed))
}

/// Open a whole-file blob on the blocking pool and check its size
pub async fn open(key: &FileEncryptionKey, blob: Bytes, expected_size: u64) -> Result<Bytes> {
    let key = key.clone();
    let opened = tokio::task::spawn_blocking(move || symmetric::decrypt(&key, &blob)).await??;

    if opened.len() as u64 != expected_size {
        return Err(ClientError::Protocol(format!(
            "decrypted {} bytes, expected {}",
            opened.len(),
            expected_size
        )));
    }
    Ok(Bytes::from(opened))
}

/// Encrypt `source` in one pass and `PUT` it to a single-object URL
#[instrument(skip(api, transport, retry, cancel, source, key), fields(size = source.len()))]
pub async fn upload(
    api: &dyn DriveApi,
    transport: &dyn ObjectTransport,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    object_key: &str,
    source: &dyn ChunkSource,
    key: &FileEncryptionKey,
) -> Result<UploadOutcome> {
    let size = source.len();
    let plaintext = source.read_range(0..size).await?;
    let sealed = seal(key, plaintext).await?;
    let encrypted_size = sealed.len() as u64;

    let target = with_retry(retry, cancel, "get_upload_url", || api.get_upload_url(object_key)).await?;
    with_retry(retry, cancel, "put_object", || {
        transport.put(&target.upload_url, sealed.clone())
    })
    .await?;

    debug!(encrypted_size, "small file uploaded");
    Ok(UploadOutcome {
        object_name: object_key.to_string(),
        plaintext_size: size,
        encrypted_size,
        parts: Vec::new(),
        multipart: false,
    })
}

/// `GET` a whole-file blob and open it
pub async fn download(
    transport: &dyn ObjectTransport,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    url: &str,
    expected_size: u64,
    key: &FileEncryptionKey,
) -> Result<Bytes> {
    let blob = with_retry(retry, cancel, "get_object", || transport.get(url)).await?;
    if blob.len() as u64 > expected_size + CHUNK_OVERHEAD {
        return Err(ClientError::Protocol(format!(
            "object is {} bytes, expected {}",
            blob.len(),
            expected_size + CHUNK_OVERHEAD
        )));
    }
    open(key, blob, expected_size).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use ghost_crypto::CryptoError;

    #[tokio::test]
    async fn test_seal_open_round_trip() {
        let key = FileEncryptionKey::generate();
        let sealed = seal(&key, Bytes::from_static(b"small file")).await.unwrap();
        assert_eq!(sealed.len(), 10 + 28);

        let opened = open(&key, sealed, 10).await.unwrap();
        assert_eq!(opened, Bytes::from_static(b"small file"));
    }

    #[tokio::test]
    async fn test_empty_file_is_a_28_byte_blob() {
        let key = FileEncryptionKey::generate();
        let sealed = seal(&key, Bytes::new()).await.unwrap();
        assert_eq!(sealed.len(), 28);
        assert!(open(&key, sealed, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_size_mismatch_is_protocol_failure() {
        let key = FileEncryptionKey::generate();
        let sealed = seal(&key, Bytes::from_static(b"abc")).await.unwrap();
        assert!(matches!(open(&key, sealed, 4).await, Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_upload_then_download_through_memory_backend() {
        let backend = MemoryBackend::new();
        let key = FileEncryptionKey::generate();
        let cancel = CancellationToken::new();
        let retry = RetryPolicy::none();
        let data = Bytes::from(vec![0x5Au8; 4096]);

        let outcome = upload(&backend, &backend, &retry, &cancel, "notes.txt", &data, &key)
            .await
            .unwrap();
        assert!(!outcome.multipart);
        assert_eq!(outcome.encrypted_size, 4096 + 28);
        assert_eq!(backend.object("notes.txt").unwrap().len(), 4096 + 28);

        let url = backend.get_download_url("notes.txt").await.unwrap().download_url;
        let restored = download(&backend, &retry, &cancel, &url, 4096, &key).await.unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_wrong_key_fails_download() {
        let backend = MemoryBackend::new();
        let cancel = CancellationToken::new();
        let retry = RetryPolicy::none();
        let data = Bytes::from_static(b"secret");

        upload(&backend, &backend, &retry, &cancel, "a", &data, &FileEncryptionKey::generate())
            .await
            .unwrap();

        let url = backend.get_download_url("a").await.unwrap().download_url;
        let err = download(&backend, &retry, &cancel, &url, 6, &FileEncryptionKey::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Crypto(CryptoError::DecryptionFailed)));
    }
}
