//! # Ghost Client SDK
//!
//! Client-side encrypted transfers for Ghost Drive.
//!
//! ## Features
//!
//! - **Client-Side Encryption**: files are sealed before they leave the device
//! - **Multipart Upload**: large files go up as 25 MiB sealed parts
//! - **Ranged Download**: sealed chunks are fetched and opened one at a time
//! - **PIN-Protected Key**: the file key is stored only in wrapped form
//!
//! ## Example
//!
//! ```rust,ignore
//! use ghost_client::{GhostClient, Config, TransferOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = GhostClient::new(
//!         Config::new("https://api.example.com").with_token("your-jwt-token"),
//!     )?;
//!
//!     // Unlock the file key stored on the user record
//!     client.unlock_from_server("123456").await?;
//!
//!     // Upload a file
//!     let outcome = client
//!         .upload_file("photos/cat.jpg", "cat.jpg", TransferOptions::default())
//!         .await?;
//!
//!     // Download it again; the plaintext size is needed to locate chunks
//!     let data = client
//!         .download("photos/cat.jpg", outcome.plaintext_size, TransferOptions::default())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
mod client;
mod config;
pub mod download;
mod error;
pub mod memory;
pub mod retry;
pub mod session;
pub mod small;
pub mod source;
pub mod transport;
mod types;
pub mod upload;

pub use api::{DriveApi, HttpDriveApi};
pub use client::{GhostClient, TransferOptions};
pub use config::Config;
pub use download::{ChunkAssembler, DownloadPipeline, DownloadState};
pub use error::{ClientError, INVALID_PIN_MESSAGE, Result, TRANSFER_FAILED_MESSAGE};
pub use memory::{Faults, MemoryBackend};
pub use retry::RetryPolicy;
pub use session::KeySession;
pub use source::{ChunkSource, FileSource};
pub use transport::{HttpTransport, ObjectTransport};
pub use types::*;
pub use upload::{UploadPipeline, UploadState};

// Re-export the crypto types callers need to drive a transfer
pub use ghost_crypto::{CryptoError, FileEncryptionKey, WrappedKey};
pub use tokio_util::sync::CancellationToken;
