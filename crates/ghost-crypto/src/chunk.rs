//! Chunk planning for multipart transfers
//!
//! A file larger than the multipart threshold is split into fixed-size
//! plaintext chunks. Each chunk is sealed independently, so its ciphertext is
//! exactly [`CHUNK_OVERHEAD`] bytes longer than its plaintext. The stored
//! object is the concatenation of the sealed chunks:
//!
//! ```text
//! plaintext   [    chunk 0    ][    chunk 1    ][ chunk 2 ]
//! ciphertext  [IV|  chunk 0  |T][IV|  chunk 1  |T][IV|c2|T]
//! ```
//!
//! Ranged downloads therefore need the *original* file size to recompute
//! where each sealed chunk starts.

use crate::symmetric::BLOB_OVERHEAD;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Plaintext size of a full chunk: 25 MiB
pub const CHUNK_SIZE: u64 = 25 * 1024 * 1024;

/// Files at or above this size use multipart upload: 25 MiB
pub const MULTIPART_THRESHOLD: u64 = 25 * 1024 * 1024;

/// Per-chunk ciphertext overhead (IV + tag)
pub const CHUNK_OVERHEAD: u64 = BLOB_OVERHEAD as u64;

/// Largest plan [`plan`] produces; chunk indexes are `u32`
pub const MAX_CHUNKS: u64 = u32::MAX as u64;

/// One planned chunk of a file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk index (0-based)
    pub index: u32,
    /// Byte range in the plaintext file
    pub plaintext_range: Range<u64>,
}

impl Chunk {
    /// Plaintext length of this chunk
    pub fn plaintext_size(&self) -> u64 {
        self.plaintext_range.end - self.plaintext_range.start
    }

    /// Sealed length of this chunk
    pub fn ciphertext_size(&self) -> u64 {
        self.plaintext_size() + CHUNK_OVERHEAD
    }

    /// 1-based multipart part number
    pub fn part_number(&self) -> u32 {
        self.index + 1
    }
}

/// Split a file of `file_size` bytes into chunks of `chunk_size`.
///
/// An empty file yields an empty plan. A `chunk_size` of zero is treated as
/// one byte so the function is total. At most [`MAX_CHUNKS`] chunks are
/// planned; callers check [`chunk_count`] first when that bound matters.
pub fn plan(file_size: u64, chunk_size: u64) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let count = chunk_count(file_size, chunk_size).min(MAX_CHUNKS);

    (0..count)
        .map(|i| {
            // i < count, so start < file_size
            let start = i * chunk_size;
            let end = start.saturating_add(chunk_size).min(file_size);
            Chunk {
                index: i as u32,
                plaintext_range: start..end,
            }
        })
        .collect()
}

/// Number of chunks for a file: `ceil(file_size / chunk_size)`
pub fn chunk_count(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size.max(1))
}

/// Total size of the stored object for a chunked file
pub fn encrypted_size(file_size: u64, chunk_size: u64) -> u64 {
    file_size + CHUNK_OVERHEAD * chunk_count(file_size, chunk_size)
}

/// Byte range of chunk `index` inside the concatenated ciphertext.
///
/// Returns `None` if `index` is outside the plan.
pub fn encrypted_offset_of(chunks: &[Chunk], index: u32) -> Option<Range<u64>> {
    let index = index as usize;
    let chunk = chunks.get(index)?;
    let start: u64 = chunks[..index].iter().map(Chunk::ciphertext_size).sum();
    Some(start..start + chunk.ciphertext_size())
}

/// Whether a file of this size goes through the multipart path
pub fn uses_multipart(file_size: u64, threshold: u64) -> bool {
    file_size >= threshold
}
