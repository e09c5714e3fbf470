//! Command implementations

use ghost_client::{
    CancellationToken, GhostClient, Result, TransferOptions, TransferProgress, UploadOutcome,
};
use ghost_crypto::chunk::{self, Chunk};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One row of a chunk plan
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedChunk {
    /// Chunk index
    pub index: u32,
    /// 1-based part number
    pub part_number: u32,
    /// Plaintext byte range `[start, end)`
    pub plaintext: (u64, u64),
    /// Ciphertext byte range `[start, end)` in the stored object
    pub ciphertext: (u64, u64),
}

/// How a file of a given size would be stored
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    /// Plaintext size
    pub file_size: u64,
    /// Whether the chunked path is used
    pub multipart: bool,
    /// Stored object size
    pub encrypted_size: u64,
    /// Chunks (empty for the small path)
    pub chunks: Vec<PlannedChunk>,
}

/// Describe how a file of `file_size` bytes is chunked and stored
pub fn plan_report(file_size: u64, chunk_size: u64, multipart_threshold: u64) -> PlanReport {
    if !chunk::uses_multipart(file_size, multipart_threshold) {
        return PlanReport {
            file_size,
            multipart: false,
            encrypted_size: file_size + chunk::CHUNK_OVERHEAD,
            chunks: Vec::new(),
        };
    }

    let plan = chunk::plan(file_size, chunk_size);
    let chunks = plan
        .iter()
        .filter_map(|c: &Chunk| {
            let sealed = chunk::encrypted_offset_of(&plan, c.index)?;
            Some(PlannedChunk {
                index: c.index,
                part_number: c.part_number(),
                plaintext: (c.plaintext_range.start, c.plaintext_range.end),
                ciphertext: (sealed.start, sealed.end),
            })
        })
        .collect();

    PlanReport {
        file_size,
        multipart: true,
        encrypted_size: chunk::encrypted_size(file_size, chunk_size),
        chunks,
    }
}

fn progress_logger(label: &'static str) -> Box<dyn Fn(TransferProgress) + Send + Sync> {
    Box::new(move |p: TransferProgress| {
        info!(
            "{}: {}/{} chunks, {:.1}%",
            label,
            p.completed,
            p.total,
            p.percentage()
        );
    })
}

/// Create a new file key protected by `pin` and store it on the account
pub async fn init_pin(client: &GhostClient, pin: &str) -> Result<()> {
    client.create_pin(pin).await?;
    Ok(())
}

/// Re-wrap the file key under a new PIN
pub async fn change_pin(client: &GhostClient, old_pin: &str, new_pin: &str) -> Result<()> {
    client.change_pin(old_pin, new_pin).await?;
    Ok(())
}

/// Unlock, then encrypt and upload `path` as `object_key`
pub async fn upload(
    client: &GhostClient,
    pin: &str,
    path: &Path,
    object_key: &str,
    cancel: CancellationToken,
) -> Result<UploadOutcome> {
    client.unlock_from_server(pin).await?;
    let options = TransferOptions::default()
        .with_progress(progress_logger("upload"))
        .with_cancellation(cancel);
    let outcome = client.upload_file(object_key, path, options).await;
    client.lock();
    outcome
}

/// Unlock, then download, decrypt and write `object_key` to `path`
pub async fn download(
    client: &GhostClient,
    pin: &str,
    object_key: &str,
    file_size: u64,
    path: &Path,
    cancel: CancellationToken,
) -> Result<()> {
    client.unlock_from_server(pin).await?;
    let options = TransferOptions::default()
        .with_progress(progress_logger("download"))
        .with_cancellation(cancel);
    let result = client.download_to_file(object_key, file_size, path, options).await;
    client.lock();
    result
}
