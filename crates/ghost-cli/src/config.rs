//! CLI configuration

use ghost_client::Config;
use std::time::Duration;

/// Settings gathered from flags, environment and `.env`
#[derive(Clone, Debug)]
pub struct CliConfig {
    /// Backend API endpoint
    pub endpoint: String,
    /// Bearer token for the backend API
    pub token: Option<String>,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
    /// Attempts per network call
    pub max_retries: u32,
    /// Crypto worker count; unset means `min(cores, 8)`
    pub workers: Option<usize>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_string(),
            token: None,
            timeout_secs: 300,
            max_retries: 3,
            workers: None,
        }
    }
}

impl CliConfig {
    /// Build the client configuration
    pub fn client_config(&self) -> Config {
        let mut config = Config::new(self.endpoint.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs));
        config.max_retries = self.max_retries;
        if let Some(token) = &self.token {
            config = config.with_token(token.clone());
        }
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_carries_settings() {
        let cli = CliConfig {
            endpoint: "https://drive.example.com".into(),
            token: Some("jwt".into()),
            timeout_secs: 12,
            max_retries: 5,
            workers: Some(2),
        };
        let config = cli.client_config();

        assert_eq!(config.base_url(), "https://drive.example.com");
        assert_eq!(config.access_token.as_deref(), Some("jwt"));
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.effective_workers(), 2);
        assert_eq!(config.chunk_size, ghost_crypto::CHUNK_SIZE);
    }

    #[test]
    fn test_defaults() {
        let config = CliConfig::default().client_config();
        assert!(config.access_token.is_none());
        assert!(config.worker_count.is_none());
    }
}
