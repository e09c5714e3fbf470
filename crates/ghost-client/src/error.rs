//! Client error types

use ghost_crypto::CryptoError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Message shown to a user when the PIN did not unlock the key
pub const INVALID_PIN_MESSAGE: &str = "Invalid PIN, try again";

/// Message shown to a user for any other transfer failure
pub const TRANSFER_FAILED_MESSAGE: &str = "Upload or download failed, please try again";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx from a presigned object URL
    #[error("object storage returned {status} for {url}")]
    Network { status: u16, url: String },

    /// Non-2xx from the backend API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The backend or storage broke the transfer contract
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// Encryption or decryption error
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The transfer was cancelled by the caller
    #[error("transfer cancelled")]
    Cancelled,

    /// No unlocked file key in this session
    #[error("file key is locked; unlock with the PIN first")]
    Locked,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A blocking crypto task panicked or was aborted
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// Build an API error from a response body, preferring a JSON `message` field
    pub fn from_api_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                }
            });
        Self::Api { status, message }
    }

    /// Whether a retry of the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Network { status, .. } | Self::Api { status, .. } => {
                *status >= 500 || *status == 429
            }
            _ => false,
        }
    }

    /// Whether this is a wrong-PIN or tampered-ciphertext failure
    pub fn is_decryption_failure(&self) -> bool {
        matches!(
            self,
            Self::Crypto(CryptoError::DecryptionFailed | CryptoError::InvalidPin)
        )
    }

    /// Text suitable for showing to an end user
    pub fn user_message(&self) -> &'static str {
        if self.is_decryption_failure() {
            INVALID_PIN_MESSAGE
        } else {
            TRANSFER_FAILED_MESSAGE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_api_error_prefers_json_message() {
        let err = ClientError::from_api_body(403, r#"{"message":"token expired","code":7}"#);
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "token expired");
            }
            _ => panic!("Expected Api error"),
        }
    }

    #[test]
    fn test_api_error_falls_back_to_body() {
        let err = ClientError::from_api_body(502, "bad gateway");
        assert!(matches!(err, ClientError::Api { ref message, .. } if message == "bad gateway"));

        let err = ClientError::from_api_body(500, "");
        assert!(matches!(err, ClientError::Api { ref message, .. } if message == "HTTP 500"));
    }

    #[rstest]
    #[case(500, true)]
    #[case(503, true)]
    #[case(429, true)]
    #[case(400, false)]
    #[case(403, false)]
    #[case(404, false)]
    fn test_status_retryability(#[case] status: u16, #[case] retryable: bool) {
        let network = ClientError::Network { status, url: "http://s3/part".into() };
        let api = ClientError::Api { status, message: String::new() };
        assert_eq!(network.is_retryable(), retryable);
        assert_eq!(api.is_retryable(), retryable);
    }

    #[test]
    fn test_crypto_and_protocol_errors_are_not_retried() {
        assert!(!ClientError::Crypto(CryptoError::DecryptionFailed).is_retryable());
        assert!(!ClientError::Protocol("missing ETag".into()).is_retryable());
        assert!(!ClientError::Cancelled.is_retryable());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            ClientError::Crypto(CryptoError::DecryptionFailed).user_message(),
            INVALID_PIN_MESSAGE
        );
        assert_eq!(ClientError::Crypto(CryptoError::InvalidPin).user_message(), INVALID_PIN_MESSAGE);
        assert_eq!(
            ClientError::Crypto(CryptoError::ChunkTooSmall { len: 3, min: 28 }).user_message(),
            TRANSFER_FAILED_MESSAGE
        );
        assert_eq!(ClientError::Cancelled.user_message(), TRANSFER_FAILED_MESSAGE);
    }
}
