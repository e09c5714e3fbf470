//! Main client implementation

use crate::{
    ClientError, Config, Result,
    api::{DriveApi, HttpDriveApi, http_client},
    download::DownloadPipeline,
    retry::{RetryPolicy, with_retry},
    session::KeySession,
    source::{ChunkSource, FileSource},
    transport::{HttpTransport, ObjectTransport},
    types::*,
    upload::UploadPipeline,
};
use bytes::Bytes;
use ghost_crypto::{WrappedKey, chunk};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Per-transfer options
#[derive(Default)]
pub struct TransferOptions {
    /// Progress callback
    pub progress: Option<ProgressCallback>,
    /// Cancellation token
    pub cancel: Option<CancellationToken>,
}

impl TransferOptions {
    /// Options with a progress callback
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Options with a cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Ghost Drive encrypted storage client
pub struct GhostClient {
    config: Config,
    api: Arc<dyn DriveApi>,
    transport: Arc<dyn ObjectTransport>,
    session: KeySession,
}

impl GhostClient {
    /// Create a client talking HTTP to `config.endpoint`
    pub fn new(config: Config) -> Result<Self> {
        let http = http_client(&config)?;
        let api = Arc::new(HttpDriveApi::with_http(config.clone(), http.clone()));
        let transport = Arc::new(HttpTransport::new(http));
        Ok(Self::with_backend(config, api, transport))
    }

    /// Create with endpoint URL
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Self::new(Config::new(endpoint))
    }

    /// Create a client on top of any backend implementation
    pub fn with_backend(
        config: Config,
        api: Arc<dyn DriveApi>,
        transport: Arc<dyn ObjectTransport>,
    ) -> Self {
        Self {
            config,
            api,
            transport,
            session: KeySession::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The key session
    pub fn session(&self) -> &KeySession {
        &self.session
    }

    // ==================== Key Operations ====================

    /// Create a new file key protected by `pin` and store the wrapped form on
    /// the user record. On failure the session is left locked.
    #[instrument(skip(self, pin))]
    pub async fn create_pin(&self, pin: &str) -> Result<UserRecord> {
        let wrapped = self.session.create_pin(pin)?;
        let api = &self.api;
        let stored = with_retry(&self.retry(), &CancellationToken::new(), "update_wrapped_key", || {
            api.update_wrapped_key(&wrapped)
        })
        .await;

        if stored.is_err() {
            self.session.lock();
        }
        stored
    }

    /// Unlock with a wrapped key the caller already holds
    pub fn unlock(&self, wrapped: &WrappedKey, pin: &str) -> Result<()> {
        self.session.unlock(wrapped, pin)
    }

    /// Fetch the wrapped key from the user record and unlock with it
    #[instrument(skip(self, pin))]
    pub async fn unlock_from_server(&self, pin: &str) -> Result<()> {
        let wrapped = self.wrapped_key().await?;
        self.session.unlock(&wrapped, pin)
    }

    /// The wrapped key stored on the user record
    pub async fn wrapped_key(&self) -> Result<WrappedKey> {
        let api = &self.api;
        let user = with_retry(&self.retry(), &CancellationToken::new(), "get_user", || api.get_user())
            .await?;
        user.encrypted_key
            .ok_or_else(|| ClientError::InvalidResponse("user has no PIN set".to_string()))
    }

    /// Re-wrap the file key under `new_pin`. Files stay readable because the
    /// key itself does not change.
    #[instrument(skip(self, old_pin, new_pin))]
    pub async fn change_pin(&self, old_pin: &str, new_pin: &str) -> Result<UserRecord> {
        let wrapped = self.wrapped_key().await?;
        let key = wrapped.unwrap(old_pin)?;
        let rewrapped = key.wrap(new_pin)?;

        let api = &self.api;
        let user = with_retry(&self.retry(), &CancellationToken::new(), "update_wrapped_key", || {
            api.update_wrapped_key(&rewrapped)
        })
        .await?;
        self.session.unlock(&rewrapped, new_pin)?;
        info!("PIN changed");
        Ok(user)
    }

    /// Whether `pin` unlocks `wrapped`
    pub fn is_pin_valid(&self, wrapped: &WrappedKey, pin: &str) -> bool {
        self.session.is_pin_valid(wrapped, pin)
    }

    /// Forget the unlocked key
    pub fn lock(&self) {
        self.session.lock();
    }

    // ==================== Transfer Operations ====================

    /// A fresh upload pipeline with this client's settings
    pub fn upload_pipeline(&self) -> UploadPipeline {
        UploadPipeline::new(Arc::clone(&self.api), Arc::clone(&self.transport), &self.config)
    }

    /// A fresh download pipeline with this client's settings
    pub fn download_pipeline(&self) -> DownloadPipeline {
        DownloadPipeline::new(Arc::clone(&self.api), Arc::clone(&self.transport), &self.config)
    }

    /// Encrypt and upload from any source
    pub async fn upload(
        &self,
        object_key: &str,
        source: &dyn ChunkSource,
        options: TransferOptions,
    ) -> Result<UploadOutcome> {
        let key = self.session.key()?;
        let mut pipeline = self.upload_pipeline();
        if let Some(progress) = options.progress {
            pipeline = pipeline.with_progress(progress);
        }
        if let Some(cancel) = options.cancel {
            pipeline = pipeline.with_cancellation(cancel);
        }
        pipeline.run(object_key, source, &key).await
    }

    /// Encrypt and upload an in-memory buffer
    pub async fn upload_bytes(&self, object_key: &str, data: impl Into<Bytes>) -> Result<UploadOutcome> {
        let data: Bytes = data.into();
        self.upload(object_key, &data, TransferOptions::default()).await
    }

    /// Encrypt and upload a file, reading one chunk at a time
    #[instrument(skip(self, path, options), fields(path = %path.as_ref().display()))]
    pub async fn upload_file(
        &self,
        object_key: &str,
        path: impl AsRef<Path>,
        options: TransferOptions,
    ) -> Result<UploadOutcome> {
        let source = FileSource::open(path.as_ref()).await?;
        self.upload(object_key, &source, options).await
    }

    /// Download and decrypt an object whose plaintext is `file_size` bytes
    pub async fn download(
        &self,
        object_key: &str,
        file_size: u64,
        options: TransferOptions,
    ) -> Result<Bytes> {
        let key = self.session.key()?;
        let mut pipeline = self.download_pipeline();
        if let Some(progress) = options.progress {
            pipeline = pipeline.with_progress(progress);
        }
        if let Some(cancel) = options.cancel {
            pipeline = pipeline.with_cancellation(cancel);
        }
        pipeline.run(object_key, file_size, &key).await
    }

    /// Download, decrypt and write to `path`
    #[instrument(skip(self, path, options), fields(path = %path.as_ref().display()))]
    pub async fn download_to_file(
        &self,
        object_key: &str,
        file_size: u64,
        path: impl AsRef<Path>,
        options: TransferOptions,
    ) -> Result<()> {
        let data = self.download(object_key, file_size, options).await?;
        tokio::fs::write(path.as_ref(), &data).await?;
        info!(bytes = data.len(), "file written");
        Ok(())
    }

    /// Whether a file of `file_size` bytes takes the chunked path
    pub fn uses_multipart(&self, file_size: u64) -> bool {
        chunk::uses_multipart(file_size, self.config.multipart_threshold)
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config)
    }
}
