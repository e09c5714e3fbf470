//! Common types for the client SDK

use ghost_crypto::WrappedKey;
use serde::{Deserialize, Serialize};

/// Presigned URL for a single-object upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    /// URL accepting a raw `PUT`
    pub upload_url: String,
}

/// Presigned URL for downloading an object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    /// URL accepting `GET`, honoring `Range`
    pub download_url: String,
}

/// Presigned URL for one multipart part
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrl {
    /// 1-based part number
    pub part_number: u32,
    /// URL accepting a raw `PUT` of this part
    pub url: String,
}

/// An initiated multipart upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Storage-side upload id
    pub upload_id: String,
    /// Object name to use on completion
    pub object_name: String,
    /// One URL per part
    pub part_urls: Vec<PartUrl>,
}

impl UploadSession {
    /// Look up the URL for `part_number`
    pub fn url_for(&self, part_number: u32) -> Option<&str> {
        self.part_urls
            .iter()
            .find(|p| p.part_number == part_number)
            .map(|p| p.url.as_str())
    }
}

/// A part that storage has accepted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// 1-based part number
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    /// ETag returned by storage
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Backend user record.
///
/// Only the wrapped key is interpreted; every other field is carried through.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// PIN-wrapped file key, if the user has set a PIN
    #[serde(rename = "aesKeyEncrypted", default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<WrappedKey>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(TransferProgress) + Send + Sync>;

/// Transfer progress information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    /// Chunks finished so far
    pub completed: u32,
    /// Total chunks
    pub total: u32,
    /// Plaintext bytes finished so far
    pub bytes_transferred: u64,
    /// Total plaintext bytes
    pub total_bytes: u64,
}

impl TransferProgress {
    /// Get percentage complete
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
    }

    /// Whether everything has been transferred
    pub fn is_complete(&self) -> bool {
        self.completed == self.total && self.bytes_transferred == self.total_bytes
    }
}

/// Result of a finished upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Name of the stored object
    pub object_name: String,
    /// Size before encryption
    pub plaintext_size: u64,
    /// Size of the stored object
    pub encrypted_size: u64,
    /// Parts in completion order (empty for the small path)
    pub parts: Vec<CompletedPart>,
    /// Whether the chunked path was used
    pub multipart: bool,
}
