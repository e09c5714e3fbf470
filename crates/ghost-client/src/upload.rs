//! Encrypted upload pipeline
//!
//! Files below the multipart threshold take the small path. Everything else
//! is split by the chunk planner and pushed through a multipart upload, one
//! chunk at a time:
//!
//! ```text
//! read range ─► worker seal ─► PUT part ─► record {part, ETag} ─► progress
//! ```
//!
//! Only one chunk of plaintext and one of ciphertext are resident at a time.
//! The pool is created per upload and torn down on every exit path.

use crate::{
    ClientError, Config, Result,
    api::DriveApi,
    retry::{RetryPolicy, with_retry},
    small,
    source::ChunkSource,
    transport::ObjectTransport,
    types::*,
};
use ghost_crypto::{
    CryptoWorkerPool, FileEncryptionKey, WorkerRequest,
    chunk::{self, Chunk},
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Where an upload currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    /// Not started
    Idle,
    /// Computing the chunk plan and requesting part URLs
    Planning,
    /// Sealing chunk `i`
    Encrypting(u32),
    /// Uploading chunk `i`
    Uploading(u32),
    /// Completing the multipart upload
    Finalizing,
    /// Finished successfully
    Done,
    /// Aborted
    Failed,
}

/// Drives one encrypted upload
pub struct UploadPipeline {
    api: Arc<dyn DriveApi>,
    transport: Arc<dyn ObjectTransport>,
    retry: RetryPolicy,
    chunk_size: u64,
    multipart_threshold: u64,
    workers: usize,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
    state: UploadState,
}

impl UploadPipeline {
    /// Create a pipeline using the chunking, retry and worker settings in `config`
    pub fn new(api: Arc<dyn DriveApi>, transport: Arc<dyn ObjectTransport>, config: &Config) -> Self {
        Self {
            api,
            transport,
            retry: RetryPolicy::from_config(config),
            chunk_size: config.chunk_size.max(1),
            multipart_threshold: config.multipart_threshold,
            workers: config.effective_workers(),
            progress: None,
            cancel: CancellationToken::new(),
            state: UploadState::Idle,
        }
    }

    /// Report progress after each chunk and once at completion
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Abort when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current state
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Encrypt and upload `source` as `object_key`
    #[instrument(skip(self, source, key), fields(size = source.len()))]
    pub async fn run(
        &mut self,
        object_key: &str,
        source: &dyn ChunkSource,
        key: &FileEncryptionKey,
    ) -> Result<UploadOutcome> {
        let result = self.run_inner(object_key, source, key).await;
        match &result {
            Ok(outcome) => {
                self.state = UploadState::Done;
                info!(
                    object = %outcome.object_name,
                    parts = outcome.parts.len(),
                    encrypted_size = outcome.encrypted_size,
                    "upload complete"
                );
            }
            Err(e) => {
                warn!(state = ?self.state, error = %e, "upload failed");
                self.state = UploadState::Failed;
            }
        }
        result
    }

    async fn run_inner(
        &mut self,
        object_key: &str,
        source: &dyn ChunkSource,
        key: &FileEncryptionKey,
    ) -> Result<UploadOutcome> {
        let size = source.len();

        if !chunk::uses_multipart(size, self.multipart_threshold) {
            self.state = UploadState::Encrypting(0);
            let outcome = small::upload(
                self.api.as_ref(),
                self.transport.as_ref(),
                &self.retry,
                &self.cancel,
                object_key,
                source,
                key,
            )
            .await?;
            self.report(1, 1, size, size);
            return Ok(outcome);
        }

        self.state = UploadState::Planning;
        let total = part_count(size, self.chunk_size)?;
        let chunks = chunk::plan(size, self.chunk_size);
        info!(object_key, size, chunks = total, "starting multipart upload");

        let api = Arc::clone(&self.api);
        let session = with_retry(&self.retry, &self.cancel, "get_upload_multipart_url", || {
            api.get_upload_multipart_url(object_key, total)
        })
        .await?;
        validate_session(&session, total)?;

        let mut pool = CryptoWorkerPool::new(self.workers)?;
        let mut parts = Vec::with_capacity(chunks.len());
        let mut bytes_done = 0u64;

        for chunk in &chunks {
            let part = self.upload_chunk(&mut pool, &session, chunk, source, key).await?;
            parts.push(part);
            bytes_done += chunk.plaintext_size();
            self.report(chunk.index + 1, total, bytes_done, size);
        }

        self.state = UploadState::Finalizing;
        parts.sort_by_key(|p| p.part_number);
        with_retry(&self.retry, &self.cancel, "complete_upload_multipart", || {
            api.complete_upload_multipart(&session.object_name, &session.upload_id, &parts)
        })
        .await?;

        self.report(total, total, size, size);
        pool.shutdown();

        Ok(UploadOutcome {
            object_name: session.object_name,
            plaintext_size: size,
            encrypted_size: chunk::encrypted_size(size, self.chunk_size),
            parts,
            multipart: true,
        })
    }

    async fn upload_chunk(
        &mut self,
        pool: &mut CryptoWorkerPool,
        session: &UploadSession,
        chunk: &Chunk,
        source: &dyn ChunkSource,
        key: &FileEncryptionKey,
    ) -> Result<CompletedPart> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let part_number = chunk.part_number();
        let url = session
            .url_for(part_number)
            .ok_or_else(|| ClientError::Protocol(format!("no URL for part {}", part_number)))?;

        let plaintext = source.read_range(chunk.plaintext_range.clone()).await?;
        if plaintext.len() as u64 != chunk.plaintext_size() {
            return Err(ClientError::Protocol(format!(
                "source returned {} bytes for chunk {}, expected {}",
                plaintext.len(),
                chunk.index,
                chunk.plaintext_size()
            )));
        }

        self.state = UploadState::Encrypting(chunk.index);
        let request = WorkerRequest::encrypt(chunk.index, plaintext, key.clone());
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            response = pool.submit(request) => response,
        };
        if response.chunk_index != chunk.index {
            return Err(ClientError::Protocol(format!(
                "worker answered chunk {} for chunk {}",
                response.chunk_index, chunk.index
            )));
        }
        let sealed = response.into_result()?;

        self.state = UploadState::Uploading(chunk.index);
        let transport = &self.transport;
        let etag = with_retry(&self.retry, &self.cancel, "put_part", || {
            transport.put(url, sealed.clone())
        })
        .await?
        .ok_or_else(|| ClientError::Protocol(format!("no ETag for part {}", part_number)))?;

        debug!(part_number, bytes = sealed.len(), "part uploaded");
        Ok(CompletedPart { part_number, etag })
    }

    fn report(&self, completed: u32, total: u32, bytes_transferred: u64, total_bytes: u64) {
        if let Some(cb) = &self.progress {
            cb(TransferProgress { completed, total, bytes_transferred, total_bytes });
        }
    }
}

/// Number of parts for a file, refusing sizes whose part numbers would not fit
/// in a `u32`
pub(crate) fn part_count(file_size: u64, chunk_size: u64) -> Result<u32> {
    let count = chunk::chunk_count(file_size, chunk_size);
    if count > chunk::MAX_CHUNKS {
        return Err(ClientError::Config(format!("{} chunks exceed the part limit", count)));
    }
    Ok(count as u32)
}

/// An upload plan must carry exactly one URL for each part `1..=total`
pub fn validate_session(session: &UploadSession, total: u32) -> Result<()> {
    if session.upload_id.is_empty() {
        return Err(ClientError::Protocol("upload plan has no upload id".to_string()));
    }
    if session.part_urls.len() != total as usize {
        return Err(ClientError::Protocol(format!(
            "upload plan has {} part URLs for {} chunks",
            session.part_urls.len(),
            total
        )));
    }

    let numbers: BTreeSet<u32> = session.part_urls.iter().map(|p| p.part_number).collect();
    if numbers.len() != total as usize || numbers.iter().copied().ne(1..=total) {
        return Err(ClientError::Protocol(
            "upload plan part numbers are not 1..=n".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Faults, MemoryBackend};
    use bytes::Bytes;
    use ghost_crypto::symmetric;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn config() -> Config {
        Config::default()
            .with_chunking(1000, 1000)
            .with_workers(2)
            .with_retries(3, Duration::from_millis(1))
    }

    fn pipeline(backend: &MemoryBackend) -> UploadPipeline {
        let backend = Arc::new(backend.clone());
        UploadPipeline::new(backend.clone(), backend, &config())
    }

    fn data(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    fn session(part_numbers: &[u32]) -> UploadSession {
        UploadSession {
            upload_id: "u".into(),
            object_name: "o".into(),
            part_urls: part_numbers
                .iter()
                .map(|&part_number| PartUrl { part_number, url: format!("http://s3/{}", part_number) })
                .collect(),
        }
    }

    struct Endless;

    #[async_trait::async_trait]
    impl ChunkSource for Endless {
        fn len(&self) -> u64 {
            u64::MAX
        }

        async fn read_range(&self, _range: std::ops::Range<u64>) -> Result<Bytes> {
            unreachable!("nothing is read before the part count is checked")
        }
    }

    #[tokio::test]
    async fn test_too_many_parts_rejected_before_planning() {
        let backend = MemoryBackend::new();
        let shared = Arc::new(backend.clone());
        let config = Config::default().with_chunking(1, 1);
        let mut upload = UploadPipeline::new(shared.clone(), shared, &config);

        let err = upload
            .run("huge", &Endless, &FileEncryptionKey::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert_eq!(upload.state(), UploadState::Failed);
        assert_eq!(backend.pending_uploads(), 0);
    }

    #[test]
    fn test_validate_session() {
        assert!(validate_session(&session(&[1, 2, 3]), 3).is_ok());
        assert!(validate_session(&session(&[3, 1, 2]), 3).is_ok());
        assert!(matches!(validate_session(&session(&[1, 2]), 3), Err(ClientError::Protocol(_))));
        assert!(matches!(validate_session(&session(&[1, 1, 2]), 3), Err(ClientError::Protocol(_))));
        assert!(matches!(validate_session(&session(&[0, 1, 2]), 3), Err(ClientError::Protocol(_))));
        assert!(matches!(validate_session(&session(&[1, 2, 4]), 3), Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_multipart_upload_stores_concatenated_blobs() {
        let backend = MemoryBackend::new();
        let key = FileEncryptionKey::generate();
        let source = data(2500);

        let mut upload = pipeline(&backend);
        assert_eq!(upload.state(), UploadState::Idle);
        let outcome = upload.run("doc.pdf", &source, &key).await.unwrap();

        assert_eq!(upload.state(), UploadState::Done);
        assert!(outcome.multipart);
        assert_eq!(outcome.parts.len(), 3);
        assert_eq!(outcome.encrypted_size, 2500 + 3 * 28);

        let stored = backend.object("doc.pdf").unwrap();
        assert_eq!(stored.len() as u64, outcome.encrypted_size);

        let chunks = chunk::plan(2500, 1000);
        for c in &chunks {
            let range = chunk::encrypted_offset_of(&chunks, c.index).unwrap();
            let opened = symmetric::decrypt(&key, &stored[range.start as usize..range.end as usize]).unwrap();
            assert_eq!(opened[..], source[c.plaintext_range.start as usize..c.plaintext_range.end as usize]);
        }
    }

    #[tokio::test]
    async fn test_small_file_skips_multipart() {
        let backend = MemoryBackend::new();
        let outcome = pipeline(&backend)
            .run("tiny", &data(999), &FileEncryptionKey::generate())
            .await
            .unwrap();

        assert!(!outcome.multipart);
        assert_eq!(backend.completed_uploads(), 0);
        assert_eq!(backend.pending_uploads(), 0);
        assert_eq!(backend.object("tiny").unwrap().len(), 999 + 28);
    }

    #[tokio::test]
    async fn test_threshold_size_uses_multipart() {
        let backend = MemoryBackend::new();
        let outcome = pipeline(&backend)
            .run("edge", &data(1000), &FileEncryptionKey::generate())
            .await
            .unwrap();

        assert!(outcome.multipart);
        assert_eq!(outcome.parts.len(), 1);
        assert_eq!(backend.completed_uploads(), 1);
    }

    #[tokio::test]
    async fn test_parts_are_sorted_when_urls_arrive_reversed() {
        let backend = MemoryBackend::new();
        backend.set_faults(Faults { reverse_part_urls: true, ..Default::default() });

        pipeline(&backend)
            .run("rev", &data(4500), &FileEncryptionKey::generate())
            .await
            .unwrap();

        let numbers: Vec<u32> = backend.last_completed_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_progress_is_reported_per_chunk_and_at_completion() {
        let backend = MemoryBackend::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        pipeline(&backend)
            .with_progress(Box::new(move |p| sink.lock().push(p)))
            .run("p", &data(2500), &FileEncryptionKey::generate())
            .await
            .unwrap();

        let seen = seen.lock();
        let completed: Vec<u32> = seen.iter().map(|p| p.completed).collect();
        assert_eq!(completed, vec![1, 2, 3, 3]);
        assert_eq!(seen[0].bytes_transferred, 1000);
        assert!(seen.last().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_missing_part_url_is_protocol_failure() {
        let backend = MemoryBackend::new();
        backend.set_faults(Faults { drop_part_url: Some(2), ..Default::default() });

        let mut upload = pipeline(&backend);
        let err = upload.run("m", &data(3000), &FileEncryptionKey::generate()).await.unwrap_err();

        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(upload.state(), UploadState::Failed);
        assert_eq!(backend.put_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_etag_is_protocol_failure() {
        let backend = MemoryBackend::new();
        backend.set_faults(Faults { omit_etags: true, ..Default::default() });

        let err = pipeline(&backend)
            .run("e", &data(2000), &FileEncryptionKey::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(backend.completed_uploads(), 0);
    }

    #[tokio::test]
    async fn test_transient_part_failure_is_retried() {
        let backend = MemoryBackend::new();
        backend.fail_next_puts(2, 503);

        let outcome = pipeline(&backend)
            .run("r", &data(2000), &FileEncryptionKey::generate())
            .await
            .unwrap();
        assert_eq!(outcome.parts.len(), 2);
        assert_eq!(backend.put_calls(), 4);
        assert_eq!(backend.completed_uploads(), 1);
    }

    #[tokio::test]
    async fn test_client_error_aborts_without_retry() {
        let backend = MemoryBackend::new();
        backend.fail_next_puts(1, 403);

        let mut upload = pipeline(&backend);
        let err = upload.run("f", &data(2000), &FileEncryptionKey::generate()).await.unwrap_err();

        assert!(matches!(err, ClientError::Network { status: 403, .. }));
        assert_eq!(upload.state(), UploadState::Failed);
        assert_eq!(backend.put_calls(), 1);
        assert_eq!(backend.completed_uploads(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_completion() {
        let backend = MemoryBackend::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let mut upload = pipeline(&backend)
            .with_cancellation(cancel)
            .with_progress(Box::new(move |p| {
                if p.completed == 1 {
                    trigger.cancel();
                }
            }));
        let err = upload.run("c", &data(5000), &FileEncryptionKey::generate()).await.unwrap_err();

        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(upload.state(), UploadState::Failed);
        assert_eq!(backend.put_calls(), 1);
        assert_eq!(backend.completed_uploads(), 0);
        assert!(backend.object("c").is_none());
    }
}
