//! Backend API seam
//!
//! The backend issues presigned URLs and stores the wrapped key; it never
//! sees plaintext or the unwrapped key.

use crate::{ClientError, Config, Result, types::*};
use async_trait::async_trait;
use ghost_crypto::WrappedKey;
use reqwest::{Client, Method, Response, header};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

/// Operations the transfer pipelines need from the backend
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Presigned URL for a single-object upload
    async fn get_upload_url(&self, object_key: &str) -> Result<UploadUrlResponse>;

    /// Presigned URL for downloading an object
    async fn get_download_url(&self, object_key: &str) -> Result<DownloadUrlResponse>;

    /// Start a multipart upload with one URL per part
    async fn get_upload_multipart_url(
        &self,
        object_key: &str,
        total_chunks: u32,
    ) -> Result<UploadSession>;

    /// Finish a multipart upload. `parts` must be sorted by part number.
    async fn complete_upload_multipart(
        &self,
        object_name: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    /// Store a new wrapped key on the user record
    async fn update_wrapped_key(&self, wrapped: &WrappedKey) -> Result<UserRecord>;

    /// Fetch the current user record
    async fn get_user(&self) -> Result<UserRecord>;
}

/// Build the shared reqwest client from config
pub fn http_client(config: &Config) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        config
            .user_agent
            .parse()
            .map_err(|_| ClientError::Config(format!("invalid user agent: {}", config.user_agent)))?,
    );

    Client::builder()
        .timeout(config.timeout)
        .default_headers(headers)
        .build()
        .map_err(ClientError::Http)
}

/// JSON-over-HTTP backend
pub struct HttpDriveApi {
    config: Config,
    http: Client,
}

impl HttpDriveApi {
    /// Create a new API client with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let http = http_client(&config)?;
        Ok(Self { config, http })
    }

    /// Create from an existing reqwest client
    pub fn with_http(config: Config, http: Client) -> Self {
        Self { config, http }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.config.base_url(), path);
        let mut req = self.http.request(method.clone(), &url);

        if let Some(token) = &self.config.access_token {
            req = req.bearer_auth(token);
        }

        if let Some(body) = body {
            req = req.json(&body);
        }

        debug!("Sending {} request to {}", method, url);
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::from_api_body(status.as_u16(), &text));
        }

        Ok(response)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let response = self.request(method, path, body).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl DriveApi for HttpDriveApi {
    #[instrument(skip(self))]
    async fn get_upload_url(&self, object_key: &str) -> Result<UploadUrlResponse> {
        self.request_json(Method::POST, "/files/upload-url", Some(json!({ "objectKey": object_key })))
            .await
    }

    #[instrument(skip(self))]
    async fn get_download_url(&self, object_key: &str) -> Result<DownloadUrlResponse> {
        self.request_json(Method::POST, "/files/download-url", Some(json!({ "objectKey": object_key })))
            .await
    }

    #[instrument(skip(self))]
    async fn get_upload_multipart_url(
        &self,
        object_key: &str,
        total_chunks: u32,
    ) -> Result<UploadSession> {
        self.request_json(
            Method::POST,
            "/files/multipart/upload-url",
            Some(json!({ "objectKey": object_key, "totalChunks": total_chunks })),
        )
        .await
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    async fn complete_upload_multipart(
        &self,
        object_name: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        self.request(
            Method::POST,
            "/files/multipart/complete",
            Some(json!({
                "objectName": object_name,
                "uploadId": upload_id,
                "parts": parts,
            })),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, wrapped))]
    async fn update_wrapped_key(&self, wrapped: &WrappedKey) -> Result<UserRecord> {
        self.request_json(
            Method::PUT,
            "/user/encrypted-key",
            Some(json!({ "aesKeyEncrypted": wrapped.as_str() })),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_user(&self) -> Result<UserRecord> {
        self.request_json(Method::GET, "/user/me", None).await
    }
}
