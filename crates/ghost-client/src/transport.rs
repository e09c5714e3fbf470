//! Presigned-URL object transport

use crate::{ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, header};
use std::ops::Range;
use tracing::debug;

/// Raw object I/O against presigned URLs
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// `PUT` raw bytes, returning the ETag if storage sent one
    async fn put(&self, url: &str, body: Bytes) -> Result<Option<String>>;

    /// `GET` the whole object
    async fn get(&self, url: &str) -> Result<Bytes>;

    /// `GET` the half-open byte range `range`
    async fn get_range(&self, url: &str, range: Range<u64>) -> Result<Bytes>;
}

/// `Range` header value for a half-open range
pub fn range_header(range: &Range<u64>) -> String {
    format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
}

/// Strip the quotes S3 puts around ETags
pub fn normalize_etag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

/// reqwest-backed transport. Presigned URLs carry their own auth, so no
/// bearer token is attached.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Create a transport on top of an existing client
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    fn check(response: Response, url: &str) -> Result<Response> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Network {
                status: status.as_u16(),
                url: redact_query(url),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectTransport for HttpTransport {
    async fn put(&self, url: &str, body: Bytes) -> Result<Option<String>> {
        debug!(bytes = body.len(), "PUT object");
        let response = self
            .http
            .put(url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        let response = Self::check(response, url)?;

        Ok(response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(normalize_etag)
            .filter(|etag| !etag.is_empty()))
    }

    async fn get(&self, url: &str) -> Result<Bytes> {
        debug!("GET object");
        let response = self.http.get(url).send().await?;
        Ok(Self::check(response, url)?.bytes().await?)
    }

    async fn get_range(&self, url: &str, range: Range<u64>) -> Result<Bytes> {
        let value = range_header(&range);
        debug!(range = %value, "GET object range");
        let response = self.http.get(url).header(header::RANGE, value).send().await?;
        Ok(Self::check(response, url)?.bytes().await?)
    }
}

// Presigned query strings carry credentials
fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?<redacted>", base),
        None => url.to_string(),
    }
}
