//! Plaintext sources for uploads

use crate::{ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Random-access plaintext, read one chunk at a time
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Total size in bytes
    fn len(&self) -> u64;

    /// Whether the source is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly the bytes in `range`
    async fn read_range(&self, range: Range<u64>) -> Result<Bytes>;
}

#[async_trait]
impl ChunkSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Bytes> {
        if range.start > range.end || range.end > ChunkSource::len(self) {
            return Err(ClientError::Protocol(format!(
                "read {}..{} outside source of {} bytes",
                range.start,
                range.end,
                Bytes::len(self)
            )));
        }
        Ok(self.slice(range.start as usize..range.end as usize))
    }
}

/// A file on disk, reopened per read so no handle is shared across chunks
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Stat the file and remember its size
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(ClientError::Config(format!("{} is not a file", path.display())));
        }
        Ok(Self { path, len: metadata.len() })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Bytes> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;

        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
