//! In-memory backend for testing and demos
//!
//! Implements both [`DriveApi`] and [`ObjectTransport`] with S3-like
//! multipart semantics, plus a handful of switches for injecting the faults
//! the pipelines must survive or reject.

use crate::{
    ClientError, Result,
    api::DriveApi,
    transport::ObjectTransport,
    types::*,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use ghost_crypto::WrappedKey;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;

const OBJECT_PREFIX: &str = "memory://objects/";
const UPLOAD_PREFIX: &str = "memory://uploads/";

/// Faults to inject into subsequent calls
#[derive(Clone, Debug, Default)]
pub struct Faults {
    /// Fail this many upcoming `PUT`s with `put_failure_status`
    pub failing_puts: u32,
    /// Status used for injected `PUT` failures
    pub put_failure_status: u16,
    /// Fail this many upcoming ranged `GET`s with 503
    pub failing_range_gets: u32,
    /// Hand out part URLs in reverse order
    pub reverse_part_urls: bool,
    /// Leave this part number out of the upload plan
    pub drop_part_url: Option<u32>,
    /// Answer part `PUT`s without an ETag
    pub omit_etags: bool,
    /// Answer ranged `GET`s with the whole object
    pub ignore_range: bool,
}

#[derive(Default)]
struct PendingUpload {
    object_name: String,
    total_parts: u32,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Default)]
struct State {
    objects: HashMap<String, Bytes>,
    uploads: HashMap<String, PendingUpload>,
    user: UserRecord,
    next_upload: u64,
    faults: Faults,
    put_calls: u32,
    range_gets: u32,
    completed_uploads: u32,
    last_completed_parts: Vec<CompletedPart>,
}

/// An in-memory object store and backend API
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    /// Create a new empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active faults
    pub fn set_faults(&self, faults: Faults) {
        self.state.lock().faults = faults;
    }

    /// Fail the next `count` `PUT`s with `status`
    pub fn fail_next_puts(&self, count: u32, status: u16) {
        let mut state = self.state.lock();
        state.faults.failing_puts = count;
        state.faults.put_failure_status = status;
    }

    /// Stored object bytes
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().objects.get(key).cloned()
    }

    /// Store raw object bytes directly
    pub fn insert_object(&self, key: &str, data: Bytes) {
        self.state.lock().objects.insert(key.to_string(), data);
    }

    /// Flip one bit of a stored object. Returns false if the object or bit
    /// does not exist.
    pub fn flip_bit(&self, key: &str, bit: u64) -> bool {
        let mut state = self.state.lock();
        let Some(data) = state.objects.get_mut(key) else {
            return false;
        };
        let byte = (bit / 8) as usize;
        if byte >= data.len() {
            return false;
        }
        let mut copy = BytesMut::from(&data[..]);
        copy[byte] ^= 1 << (bit % 8);
        *data = copy.freeze();
        true
    }

    /// Number of `PUT` requests seen, failed ones included
    pub fn put_calls(&self) -> u32 {
        self.state.lock().put_calls
    }

    /// Number of ranged `GET` requests seen
    pub fn range_gets(&self) -> u32 {
        self.state.lock().range_gets
    }

    /// Number of multipart uploads completed
    pub fn completed_uploads(&self) -> u32 {
        self.state.lock().completed_uploads
    }

    /// Number of multipart uploads started and not completed
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    /// Parts list of the most recent completion
    pub fn last_completed_parts(&self) -> Vec<CompletedPart> {
        self.state.lock().last_completed_parts.clone()
    }

    /// The stored user record
    pub fn user(&self) -> UserRecord {
        self.state.lock().user.clone()
    }
}

fn etag_of(data: &[u8]) -> String {
    hex::encode(&Sha256::digest(data)[..16])
}

fn not_found(what: &str) -> ClientError {
    ClientError::Network { status: 404, url: what.to_string() }
}

#[async_trait]
impl DriveApi for MemoryBackend {
    async fn get_upload_url(&self, object_key: &str) -> Result<UploadUrlResponse> {
        Ok(UploadUrlResponse {
            upload_url: format!("{}{}", OBJECT_PREFIX, object_key),
        })
    }

    async fn get_download_url(&self, object_key: &str) -> Result<DownloadUrlResponse> {
        if !self.state.lock().objects.contains_key(object_key) {
            return Err(ClientError::Api {
                status: 404,
                message: format!("no such object: {}", object_key),
            });
        }
        Ok(DownloadUrlResponse {
            download_url: format!("{}{}", OBJECT_PREFIX, object_key),
        })
    }

    async fn get_upload_multipart_url(
        &self,
        object_key: &str,
        total_chunks: u32,
    ) -> Result<UploadSession> {
        let mut state = self.state.lock();
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);

        let mut part_urls: Vec<PartUrl> = (1..=total_chunks)
            .filter(|n| state.faults.drop_part_url != Some(*n))
            .map(|part_number| PartUrl {
                part_number,
                url: format!("{}{}/parts/{}", UPLOAD_PREFIX, upload_id, part_number),
            })
            .collect();
        if state.faults.reverse_part_urls {
            part_urls.reverse();
        }

        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                object_name: object_key.to_string(),
                total_parts: total_chunks,
                parts: BTreeMap::new(),
            },
        );

        Ok(UploadSession {
            upload_id,
            object_name: object_key.to_string(),
            part_urls,
        })
    }

    async fn complete_upload_multipart(
        &self,
        object_name: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let mut state = self.state.lock();
        let bad_request = |message: String| ClientError::Api { status: 400, message };

        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| bad_request(format!("unknown upload {}", upload_id)))?;
        if upload.object_name != object_name {
            return Err(bad_request(format!("upload {} is not for {}", upload_id, object_name)));
        }
        if parts.len() as u32 != upload.total_parts {
            return Err(bad_request(format!(
                "expected {} parts, got {}",
                upload.total_parts,
                parts.len()
            )));
        }

        let mut object = BytesMut::new();
        for (i, part) in parts.iter().enumerate() {
            if part.part_number != i as u32 + 1 {
                return Err(bad_request("parts must be ascending and contiguous".to_string()));
            }
            match upload.parts.get(&part.part_number) {
                Some((etag, data)) if *etag == part.etag => object.extend_from_slice(data),
                _ => {
                    return Err(bad_request(format!("part {} does not match", part.part_number)));
                }
            }
        }

        state.uploads.remove(upload_id);
        state.objects.insert(object_name.to_string(), object.freeze());
        state.completed_uploads += 1;
        state.last_completed_parts = parts.to_vec();
        Ok(())
    }

    async fn update_wrapped_key(&self, wrapped: &WrappedKey) -> Result<UserRecord> {
        let mut state = self.state.lock();
        state.user.encrypted_key = Some(wrapped.clone());
        Ok(state.user.clone())
    }

    async fn get_user(&self) -> Result<UserRecord> {
        Ok(self.state.lock().user.clone())
    }
}

#[async_trait]
impl ObjectTransport for MemoryBackend {
    async fn put(&self, url: &str, body: Bytes) -> Result<Option<String>> {
        let mut state = self.state.lock();
        state.put_calls += 1;

        if state.faults.failing_puts > 0 {
            state.faults.failing_puts -= 1;
            return Err(ClientError::Network {
                status: state.faults.put_failure_status,
                url: url.to_string(),
            });
        }

        let etag = etag_of(&body);

        if let Some(key) = url.strip_prefix(OBJECT_PREFIX) {
            state.objects.insert(key.to_string(), body);
            return Ok(Some(etag));
        }

        let (upload_id, part) = url
            .strip_prefix(UPLOAD_PREFIX)
            .and_then(|rest| rest.split_once("/parts/"))
            .ok_or_else(|| not_found(url))?;
        let part_number: u32 = part.parse().map_err(|_| not_found(url))?;
        let omit = state.faults.omit_etags;

        let upload = state.uploads.get_mut(upload_id).ok_or_else(|| not_found(url))?;
        if part_number == 0 || part_number > upload.total_parts {
            return Err(not_found(url));
        }
        upload.parts.insert(part_number, (etag.clone(), body));

        Ok(if omit { None } else { Some(etag) })
    }

    async fn get(&self, url: &str) -> Result<Bytes> {
        let state = self.state.lock();
        url.strip_prefix(OBJECT_PREFIX)
            .and_then(|key| state.objects.get(key))
            .cloned()
            .ok_or_else(|| not_found(url))
    }

    async fn get_range(&self, url: &str, range: Range<u64>) -> Result<Bytes> {
        let mut state = self.state.lock();
        state.range_gets += 1;

        if state.faults.failing_range_gets > 0 {
            state.faults.failing_range_gets -= 1;
            return Err(ClientError::Network { status: 503, url: url.to_string() });
        }

        let data = url
            .strip_prefix(OBJECT_PREFIX)
            .and_then(|key| state.objects.get(key))
            .cloned()
            .ok_or_else(|| not_found(url))?;

        if state.faults.ignore_range {
            return Ok(data);
        }

        if range.start > range.end || range.start >= data.len() as u64 {
            return Err(ClientError::Network { status: 416, url: url.to_string() });
        }
        // Like S3, a range past the end is truncated
        let end = range.end.min(data.len() as u64);
        Ok(data.slice(range.start as usize..end as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_multipart_round_trip() {
        let backend = MemoryBackend::new();
        let session = backend.get_upload_multipart_url("big.bin", 2).await.unwrap();
        assert_eq!(session.part_urls.len(), 2);
        assert_eq!(backend.pending_uploads(), 1);

        let e1 = backend.put(session.url_for(1).unwrap(), Bytes::from_static(b"abc")).await.unwrap();
        let e2 = backend.put(session.url_for(2).unwrap(), Bytes::from_static(b"de")).await.unwrap();
        let parts = vec![
            CompletedPart { part_number: 1, etag: e1.unwrap() },
            CompletedPart { part_number: 2, etag: e2.unwrap() },
        ];
        backend
            .complete_upload_multipart(&session.object_name, &session.upload_id, &parts)
            .await
            .unwrap();

        assert_eq!(backend.object("big.bin").unwrap(), Bytes::from_static(b"abcde"));
        assert_eq!(backend.completed_uploads(), 1);
        assert_eq!(backend.pending_uploads(), 0);

        let url = backend.get_download_url("big.bin").await.unwrap().download_url;
        assert_eq!(backend.get_range(&url, 1..4).await.unwrap(), Bytes::from_static(b"bcd"));
    }

    #[tokio::test]
    async fn test_completion_rejects_unsorted_parts() {
        let backend = MemoryBackend::new();
        let session = backend.get_upload_multipart_url("x", 2).await.unwrap();
        let e1 = backend.put(session.url_for(1).unwrap(), Bytes::from_static(b"a")).await.unwrap();
        let e2 = backend.put(session.url_for(2).unwrap(), Bytes::from_static(b"b")).await.unwrap();

        let parts = vec![
            CompletedPart { part_number: 2, etag: e2.unwrap() },
            CompletedPart { part_number: 1, etag: e1.unwrap() },
        ];
        let err = backend
            .complete_upload_multipart("x", &session.upload_id, &parts)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 400, .. }));
        assert_eq!(backend.completed_uploads(), 0);
    }

    #[tokio::test]
    async fn test_injected_put_failures() {
        let backend = MemoryBackend::new();
        backend.fail_next_puts(1, 503);
        let url = backend.get_upload_url("k").await.unwrap().upload_url;

        assert!(matches!(
            backend.put(&url, Bytes::from_static(b"v")).await,
            Err(ClientError::Network { status: 503, .. })
        ));
        assert!(backend.put(&url, Bytes::from_static(b"v")).await.is_ok());
        assert_eq!(backend.put_calls(), 2);
    }

    #[tokio::test]
    async fn test_flip_bit() {
        let backend = MemoryBackend::new();
        backend.insert_object("k", Bytes::from_static(&[0u8; 4]));
        assert!(backend.flip_bit("k", 9));
        assert_eq!(backend.object("k").unwrap()[..], [0, 2, 0, 0]);
        assert!(!backend.flip_bit("k", 32));
        assert!(!backend.flip_bit("missing", 0));
    }

    #[tokio::test]
    async fn test_wrapped_key_is_stored_on_user() {
        let backend = MemoryBackend::new();
        assert!(backend.get_user().await.unwrap().encrypted_key.is_none());

        let record = backend.update_wrapped_key(&WrappedKey::new("AAAA")).await.unwrap();
        assert_eq!(record.encrypted_key, Some(WrappedKey::new("AAAA")));
        assert_eq!(backend.user().encrypted_key, Some(WrappedKey::new("AAAA")));
    }
}
