//! Client configuration

use ghost_crypto::{chunk, worker};
use std::time::Duration;

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend API endpoint URL
    pub endpoint: String,
    /// Access token (JWT)
    pub access_token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Maximum attempts per network call (1 disables retry)
    pub max_retries: u32,
    /// First retry backoff; doubles per attempt
    pub retry_base_delay: Duration,
    /// Upper bound on a single retry backoff
    pub retry_max_delay: Duration,
    /// Plaintext chunk size (bytes)
    pub chunk_size: u64,
    /// Files at or above this size use the chunked path (bytes)
    pub multipart_threshold: u64,
    /// Crypto worker count; `None` means `min(available parallelism, 8)`
    pub worker_count: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_string(),
            access_token: None,
            timeout: Duration::from_secs(300),
            user_agent: format!("ghost-client/{}", env!("CARGO_PKG_VERSION")),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(5),
            chunk_size: chunk::CHUNK_SIZE,
            multipart_threshold: chunk::MULTIPART_THRESHOLD,
            worker_count: None,
        }
    }
}

impl Config {
    /// Create a new config with the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry attempts and base backoff
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    /// Set chunk size and multipart threshold.
    ///
    /// Production uses 25 MiB for both; smaller values are useful for tests.
    pub fn with_chunking(mut self, chunk_size: u64, multipart_threshold: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.multipart_threshold = multipart_threshold.max(1);
        self
    }

    /// Set the crypto worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    /// Worker count to use for a new pool
    pub fn effective_workers(&self) -> usize {
        self.worker_count
            .unwrap_or_else(worker::default_worker_count)
            .clamp(1, worker::MAX_WORKERS)
    }

    /// Build the base URL for API requests
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}
