//! Encrypted download pipeline
//!
//! The stored object is the concatenation of sealed chunks, so the caller
//! must supply the original plaintext size to recompute each chunk's
//! ciphertext range. Chunks are fetched with ranged `GET`s, opened by the
//! worker pool and written into their slot by index.

use crate::{
    ClientError, Config, Result,
    api::DriveApi,
    retry::{RetryPolicy, with_retry},
    small,
    transport::ObjectTransport,
    types::*,
    upload::part_count,
};
use bytes::{Bytes, BytesMut};
use ghost_crypto::{
    CryptoWorkerPool, FileEncryptionKey, WorkerRequest,
    chunk::{self, Chunk},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Positional buffer for decrypted chunks
#[derive(Debug)]
pub struct ChunkAssembler {
    slots: Vec<Option<Bytes>>,
    filled: usize,
}

impl ChunkAssembler {
    /// Create an assembler with one empty slot per chunk
    pub fn new(chunk_count: usize) -> Self {
        Self {
            slots: vec![None; chunk_count],
            filled: 0,
        }
    }

    /// Store the plaintext for chunk `index`
    pub fn insert(&mut self, index: u32, plaintext: Bytes) -> Result<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index as usize).ok_or_else(|| {
            ClientError::Protocol(format!("chunk {} outside a {}-chunk file", index, len))
        })?;
        if slot.is_some() {
            return Err(ClientError::Protocol(format!("chunk {} received twice", index)));
        }
        *slot = Some(plaintext);
        self.filled += 1;
        Ok(())
    }

    /// Number of chunks received
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Whether every slot holds a chunk
    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Concatenate all slots in index order
    pub fn finish(self) -> Result<Bytes> {
        let mut total = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(bytes) => total += bytes.len(),
                None => return Err(ClientError::Protocol(format!("chunk {} missing", index))),
            }
        }

        let mut out = BytesMut::with_capacity(total);
        for bytes in self.slots.into_iter().flatten() {
            out.extend_from_slice(&bytes);
        }
        Ok(out.freeze())
    }
}

/// Where a download currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadState {
    /// Not started
    Idle,
    /// Requesting the download URL and computing the chunk plan
    Planning,
    /// Fetching sealed chunk `i`
    Fetching(u32),
    /// Opening chunk `i`
    Decrypting(u32),
    /// Concatenating the opened chunks
    Assembling,
    /// Finished successfully
    Done,
    /// Aborted
    Failed,
}

/// Drives one encrypted download
pub struct DownloadPipeline {
    api: Arc<dyn DriveApi>,
    transport: Arc<dyn ObjectTransport>,
    retry: RetryPolicy,
    chunk_size: u64,
    multipart_threshold: u64,
    workers: usize,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
    state: DownloadState,
}

impl DownloadPipeline {
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
            state: DownloadState::Idle,
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
    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Fetch and decrypt `object_key`, whose plaintext is `file_size` bytes
    #[instrument(skip(self, key))]
    pub async fn run(
        &mut self,
        object_key: &str,
        file_size: u64,
        key: &FileEncryptionKey,
    ) -> Result<Bytes> {
        let result = self.run_inner(object_key, file_size, key).await;
        match &result {
            Ok(data) => {
                self.state = DownloadState::Done;
                info!(bytes = data.len(), "download complete");
            }
            Err(e) => {
                warn!(state = ?self.state, error = %e, "download failed");
                self.state = DownloadState::Failed;
            }
        }
        result
    }

    async fn run_inner(
        &mut self,
        object_key: &str,
        file_size: u64,
        key: &FileEncryptionKey,
    ) -> Result<Bytes> {
        self.state = DownloadState::Planning;
        let api = Arc::clone(&self.api);
        let url = with_retry(&self.retry, &self.cancel, "get_download_url", || {
            api.get_download_url(object_key)
        })
        .await?
        .download_url;

        if !chunk::uses_multipart(file_size, self.multipart_threshold) {
            self.state = DownloadState::Fetching(0);
            let data = small::download(
                self.transport.as_ref(),
                &self.retry,
                &self.cancel,
                &url,
                file_size,
                key,
            )
            .await?;
            self.report(1, 1, file_size, file_size);
            return Ok(data);
        }

        let total = part_count(file_size, self.chunk_size)?;
        let chunks = chunk::plan(file_size, self.chunk_size);
        info!(object_key, file_size, chunks = total, "starting chunked download");

        let mut pool = CryptoWorkerPool::new(self.workers)?;
        let mut assembler = ChunkAssembler::new(chunks.len());
        let mut bytes_done = 0u64;

        for chunk in &chunks {
            let plaintext = self.download_chunk(&mut pool, &url, &chunks, chunk, key).await?;
            assembler.insert(chunk.index, plaintext)?;
            bytes_done += chunk.plaintext_size();
            self.report(chunk.index + 1, total, bytes_done, file_size);
        }

        pool.shutdown();
        self.state = DownloadState::Assembling;
        let data = assembler.finish()?;
        self.report(total, total, file_size, file_size);
        Ok(data)
    }

    async fn download_chunk(
        &mut self,
        pool: &mut CryptoWorkerPool,
        url: &str,
        chunks: &[Chunk],
        chunk: &Chunk,
        key: &FileEncryptionKey,
    ) -> Result<Bytes> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let range = chunk::encrypted_offset_of(chunks, chunk.index)
            .ok_or_else(|| ClientError::Protocol(format!("chunk {} not in plan", chunk.index)))?;
        let expected = range.end - range.start;

        self.state = DownloadState::Fetching(chunk.index);
        let transport = &self.transport;
        let sealed = with_retry(&self.retry, &self.cancel, "get_range", || {
            transport.get_range(url, range.clone())
        })
        .await?;
        if sealed.len() as u64 > expected {
            return Err(ClientError::Protocol(format!(
                "range response for chunk {} is {} bytes, requested {}",
                chunk.index,
                sealed.len(),
                expected
            )));
        }
        debug!(chunk = chunk.index, bytes = sealed.len(), "chunk fetched");

        self.state = DownloadState::Decrypting(chunk.index);
        let request = WorkerRequest::decrypt(chunk.index, sealed, key.clone());
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
        let plaintext = response.into_result()?;

        if plaintext.len() as u64 != chunk.plaintext_size() {
            return Err(ClientError::Protocol(format!(
                "chunk {} decrypted to {} bytes, expected {}",
                chunk.index,
                plaintext.len(),
                chunk.plaintext_size()
            )));
        }
        Ok(plaintext)
    }

    fn report(&self, completed: u32, total: u32, bytes_transferred: u64, total_bytes: u64) {
        if let Some(cb) = &self.progress {
            cb(TransferProgress { completed, total, bytes_transferred, total_bytes });
        }
    }
}
