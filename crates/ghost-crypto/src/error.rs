//! Error types for the ghost-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// PIN is not exactly six ASCII digits
    #[error("invalid PIN: must be exactly 6 digits")]
    InvalidPin,

    /// AEAD tag verification failed (wrong key/PIN or corrupted data)
    #[error("decryption failed")]
    DecryptionFailed,

    /// Ciphertext shorter than IV + tag
    #[error("chunk too small: {len} bytes, need at least {min} bytes")]
    ChunkTooSmall { len: usize, min: usize },

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A worker thread could not be started
    #[error("failed to spawn crypto worker: {0}")]
    WorkerSpawn(String),

    /// The worker handling a request went away before replying
    #[error("crypto worker unavailable (chunk {chunk_index})")]
    WorkerUnavailable { chunk_index: u32 },
}

impl CryptoError {
    /// Whether this error means "wrong PIN or corrupted ciphertext"
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, Self::DecryptionFailed)
    }
}
