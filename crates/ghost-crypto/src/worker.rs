//! Crypto worker pool
//!
//! A fixed set of OS threads, each performing one AEAD transform per request.
//! Workers share nothing with the orchestrator: a request carries the bytes
//! and a copy of the key, the reply comes back over a oneshot channel, and a
//! worker keeps no state between requests.
//!
//! ```text
//!               round-robin
//!  orchestrator ──────────────┬──► worker 0 ──┐
//!      ▲                      ├──► worker 1 ──┤ oneshot replies
//!      │                      └──► worker N ──┤
//!      └──────────────────────────────────────┘
//! ```
//!
//! The pool is created per transfer and torn down when it is shut down or
//! dropped: job channels are closed and every thread is joined. Joining
//! blocks until in-flight transforms finish. On a multi-thread tokio runtime
//! the joins run under [`tokio::task::block_in_place`] so the other tasks on
//! that runtime keep moving. A current-thread runtime has no spare thread to
//! hand work to, so there the joins block it directly for at most one
//! transform per worker.

use crate::{CryptoError, Result, keys::FileEncryptionKey, symmetric::Aead};
use bytes::Bytes;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Upper bound on the number of workers
pub const MAX_WORKERS: usize = 8;

/// The transform a worker should apply
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CryptoOp {
    /// Seal plaintext into `IV ‖ ciphertext ‖ tag`
    Encrypt,
    /// Open `IV ‖ ciphertext ‖ tag` back into plaintext
    Decrypt,
}

/// A single transform request
#[derive(Clone, Debug)]
pub struct WorkerRequest {
    /// Which transform to apply
    pub op: CryptoOp,
    /// Input bytes
    pub bytes: Bytes,
    /// Key, passed by value
    pub key: FileEncryptionKey,
    /// Index of the chunk this request belongs to
    pub chunk_index: u32,
}

impl WorkerRequest {
    /// Build an encrypt request
    pub fn encrypt(chunk_index: u32, bytes: Bytes, key: FileEncryptionKey) -> Self {
        Self { op: CryptoOp::Encrypt, bytes, key, chunk_index }
    }

    /// Build a decrypt request
    pub fn decrypt(chunk_index: u32, bytes: Bytes, key: FileEncryptionKey) -> Self {
        Self { op: CryptoOp::Decrypt, bytes, key, chunk_index }
    }
}

/// A worker's reply
#[derive(Debug)]
pub struct WorkerResponse {
    /// Index of the chunk the request belonged to
    pub chunk_index: u32,
    /// Output bytes or the failure
    pub result: Result<Bytes>,
}

impl WorkerResponse {
    /// Whether the transform succeeded
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    /// Unwrap into the result bytes
    pub fn into_result(self) -> Result<Bytes> {
        self.result
    }
}

/// Apply one transform. This is all a worker does.
pub fn process(request: WorkerRequest) -> WorkerResponse {
    let WorkerRequest { op, bytes, key, chunk_index } = request;
    let result = Aead::new(&key).and_then(|aead| match op {
        CryptoOp::Encrypt => aead.seal(&bytes),
        CryptoOp::Decrypt => aead.open(&bytes),
    });
    WorkerResponse {
        chunk_index,
        result: result.map(Bytes::from),
    }
}

struct Job {
    request: WorkerRequest,
    reply: oneshot::Sender<WorkerResponse>,
}

struct WorkerHandle {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

/// A reply that has not arrived yet
#[must_use = "a pending result does nothing unless awaited"]
pub struct PendingResult {
    chunk_index: u32,
    reply: oneshot::Receiver<WorkerResponse>,
}

impl PendingResult {
    /// Index of the chunk this reply belongs to
    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    /// Wait for the worker's reply
    pub async fn wait(self) -> WorkerResponse {
        let chunk_index = self.chunk_index;
        self.reply.await.unwrap_or_else(|_| WorkerResponse {
            chunk_index,
            result: Err(CryptoError::WorkerUnavailable { chunk_index }),
        })
    }
}

/// Fixed-size pool of crypto worker threads
pub struct CryptoWorkerPool {
    workers: Vec<WorkerHandle>,
    next: usize,
}

impl CryptoWorkerPool {
    /// Create a pool with `min(available parallelism, 8)` workers
    pub fn with_default_size() -> Result<Self> {
        Self::new(default_worker_count())
    }

    /// Create a pool with `size` workers (at least one, at most [`MAX_WORKERS`])
    pub fn new(size: usize) -> Result<Self> {
        let size = size.clamp(1, MAX_WORKERS);
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            let (tx, rx) = mpsc::channel::<Job>();
            let thread = thread::Builder::new()
                .name(format!("ghost-crypto-{}", id))
                .spawn(move || worker_loop(id, rx))
                .map_err(|e| CryptoError::WorkerSpawn(e.to_string()))?;
            workers.push(WorkerHandle {
                jobs: Some(tx),
                thread: Some(thread),
            });
        }

        debug!(workers = size, "crypto worker pool started");
        Ok(Self { workers, next: 0 })
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Hand a request to the next worker in round-robin order
    pub fn dispatch(&mut self, request: WorkerRequest) -> PendingResult {
        let chunk_index = request.chunk_index;
        let (reply_tx, reply_rx) = oneshot::channel();

        let worker = &self.workers[self.next];
        self.next = (self.next + 1) % self.workers.len();

        if let Some(jobs) = &worker.jobs {
            trace!(chunk_index, "dispatching to worker");
            // A send error drops `reply_tx`, which `wait` reports as unavailable
            let _ = jobs.send(Job { request, reply: reply_tx });
        }

        PendingResult { chunk_index, reply: reply_rx }
    }

    /// Dispatch a request and wait for its reply
    pub async fn submit(&mut self, request: WorkerRequest) -> WorkerResponse {
        self.dispatch(request).wait().await
    }

    /// Close all job channels and join every worker
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        for worker in &mut self.workers {
            worker.jobs.take();
        }
        let threads: Vec<JoinHandle<()>> = self
            .workers
            .iter_mut()
            .filter_map(|w| w.thread.take())
            .collect();
        if threads.is_empty() {
            return;
        }

        let on_multi_thread_runtime = Handle::try_current()
            .map(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        if on_multi_thread_runtime {
            tokio::task::block_in_place(|| join_all(threads));
        } else {
            join_all(threads);
        }
    }
}

fn join_all(threads: Vec<JoinHandle<()>>) {
    for thread in threads {
        if thread.join().is_err() {
            warn!("crypto worker panicked");
        }
    }
}

impl Drop for CryptoWorkerPool {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn worker_loop(id: usize, jobs: mpsc::Receiver<Job>) {
    while let Ok(Job { request, reply }) = jobs.recv() {
        let response = process(request);
        if reply.send(response).is_err() {
            trace!(worker = id, "reply receiver dropped");
        }
    }
    trace!(worker = id, "crypto worker exiting");
}

/// `min(available parallelism, 8)`
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::BLOB_OVERHEAD;

    #[test]
    fn test_default_size_is_bounded() {
        let n = default_worker_count();
        assert!((1..=MAX_WORKERS).contains(&n));
    }

    #[test]
    fn test_size_is_clamped() {
        assert_eq!(CryptoWorkerPool::new(0).unwrap().size(), 1);
        assert_eq!(CryptoWorkerPool::new(64).unwrap().size(), MAX_WORKERS);
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        let mut pool = CryptoWorkerPool::new(2).unwrap();
        let key = FileEncryptionKey::generate();
        let plaintext = Bytes::from_static(b"chunk payload");

        let sealed = pool
            .submit(WorkerRequest::encrypt(7, plaintext.clone(), key.clone()))
            .await;
        assert!(sealed.success());
        assert_eq!(sealed.chunk_index, 7);
        let sealed = sealed.into_result().unwrap();
        assert_eq!(sealed.len(), plaintext.len() + BLOB_OVERHEAD);

        let opened = pool.submit(WorkerRequest::decrypt(7, sealed, key)).await;
        assert_eq!(opened.into_result().unwrap(), plaintext);

        pool.shutdown();
    }

    #[tokio::test]
    async fn test_short_input_is_chunk_too_small() {
        let mut pool = CryptoWorkerPool::new(1).unwrap();
        let response = pool
            .submit(WorkerRequest::decrypt(3, Bytes::from_static(&[0u8; 20]), FileEncryptionKey::generate()))
            .await;

        assert!(!response.success());
        assert_eq!(response.chunk_index, 3);
        assert_eq!(
            response.into_result().unwrap_err(),
            CryptoError::ChunkTooSmall { len: 20, min: BLOB_OVERHEAD }
        );
    }

    #[tokio::test]
    async fn test_wrong_key_fails() {
        let mut pool = CryptoWorkerPool::new(1).unwrap();
        let sealed = pool
            .submit(WorkerRequest::encrypt(0, Bytes::from_static(b"x"), FileEncryptionKey::generate()))
            .await
            .into_result()
            .unwrap();

        let response = pool
            .submit(WorkerRequest::decrypt(0, sealed, FileEncryptionKey::generate()))
            .await;
        assert_eq!(response.into_result().unwrap_err(), CryptoError::DecryptionFailed);
    }

    #[tokio::test]
    async fn test_replies_can_be_awaited_out_of_order() {
        let mut pool = CryptoWorkerPool::new(3).unwrap();
        let key = FileEncryptionKey::generate();

        let pending: Vec<PendingResult> = (0..3u32)
            .map(|i| pool.dispatch(WorkerRequest::encrypt(i, Bytes::from(vec![i as u8; 16]), key.clone())))
            .collect();

        for p in pending.into_iter().rev() {
            let expected = p.chunk_index();
            let response = p.wait().await;
            assert_eq!(response.chunk_index, expected);
            assert!(response.success());
        }
    }

    #[tokio::test]
    async fn test_each_encryption_uses_fresh_iv() {
        let mut pool = CryptoWorkerPool::new(4).unwrap();
        let key = FileEncryptionKey::generate();
        let mut ivs = std::collections::HashSet::new();

        for i in 0..32u32 {
            let sealed = pool
                .submit(WorkerRequest::encrypt(i, Bytes::from_static(b"same"), key.clone()))
                .await
                .into_result()
                .unwrap();
            assert!(ivs.insert(sealed[..12].to_vec()));
        }
    }

    #[test]
    fn test_drop_joins_workers() {
        let pool = CryptoWorkerPool::new(4).unwrap();
        drop(pool);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_with_work_in_flight_on_multi_thread_runtime() {
        let mut pool = CryptoWorkerPool::new(2).unwrap();
        let key = FileEncryptionKey::generate();
        let pending: Vec<PendingResult> = (0..4u32)
            .map(|i| pool.dispatch(WorkerRequest::encrypt(i, Bytes::from(vec![0u8; 1 << 20]), key.clone())))
            .collect();

        // Another task keeps running while the pool joins its threads
        let ticker = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            7u32
        });
        drop(pool);

        for p in pending {
            assert!(p.wait().await.success());
        }
        assert_eq!(ticker.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_shutdown_on_current_thread_runtime() {
        let mut pool = CryptoWorkerPool::new(2).unwrap();
        let pending = pool.dispatch(WorkerRequest::encrypt(0, Bytes::from_static(b"x"), FileEncryptionKey::generate()));
        pool.shutdown();
        assert!(pending.wait().await.success());
    }
}
