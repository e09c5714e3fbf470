//! # Ghost Crypto
//!
//! Client-side cryptography for Ghost Drive.
//!
//! This crate provides:
//! - **Key codec**: the per-user file-encryption key and its PIN-wrapped form
//! - **AEAD blobs**: AES-256-GCM `IV ‖ ciphertext ‖ tag` sealing
//! - **Chunk planning**: fixed-size chunk ranges and their sealed offsets
//! - **Worker pool**: isolated threads that seal/open chunks by message passing
//!
//! ## Security Model
//!
//! - All encryption happens client-side
//! - The file key is persisted only in wrapped form
//! - Storage only ever sees sealed blobs
//!
//! ## Example
//!
//! ```rust,ignore
//! use ghost_crypto::{FileEncryptionKey, CryptoWorkerPool, WorkerRequest};
//!
//! let key = FileEncryptionKey::generate();
//! let wrapped = key.wrap("123456")?;
//! let unlocked = wrapped.unwrap("123456")?;
//!
//! let mut pool = CryptoWorkerPool::with_default_size()?;
//! let sealed = pool
//!     .submit(WorkerRequest::encrypt(0, data, unlocked.clone()))
//!     .await
//!     .into_result()?;
//! ```

pub mod chunk;
pub mod error;
pub mod keys;
pub mod pin;
pub mod symmetric;
pub mod worker;

pub use chunk::{Chunk, CHUNK_OVERHEAD, CHUNK_SIZE, MULTIPART_THRESHOLD};
pub use error::{CryptoError, Result};
pub use keys::{FileEncryptionKey, WrappedKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use pin::Pin;
pub use symmetric::{Aead, Nonce, BLOB_OVERHEAD};
pub use worker::{CryptoOp, CryptoWorkerPool, PendingResult, WorkerRequest, WorkerResponse};
