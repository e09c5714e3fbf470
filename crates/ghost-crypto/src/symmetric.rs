//! AES-256-GCM blob encryption
//!
//! Every ciphertext this crate produces (wrapped keys, small files and
//! multipart chunks) has the same self-contained layout:
//!
//! ```text
//! ┌──────────┬─────────────────────┬──────────┐
//! │ IV (12)  │ ciphertext (n)      │ tag (16) │
//! └──────────┴─────────────────────┴──────────┘
//! ```
//!
//! The IV is drawn fresh from the OS RNG for every call to [`Aead::seal`].

use crate::{CryptoError, Result, keys::{FileEncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE}};
use aes_gcm::{
    Aes256Gcm, KeyInit,
    aead::AeadInPlace,
};
use rand::rngs::OsRng;

/// Bytes added to every sealed blob (IV + tag)
pub const BLOB_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// A nonce for AEAD encryption
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

/// AES-256-GCM sealing/opening of `IV ‖ ciphertext ‖ tag` blobs
pub struct Aead {
    cipher: Aes256Gcm,
}

impl Aead {
    /// Create an AEAD instance for a file-encryption key
    pub fn new(key: &FileEncryptionKey) -> Result<Self> {
        Self::from_raw(key.as_bytes())
    }

    /// Create an AEAD instance from raw key bytes
    pub(crate) fn from_raw(key: &[u8; KEY_SIZE]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` under a fresh random IV
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.seal_with_nonce(&Nonce::generate(), plaintext)
    }

    /// Encrypt with an explicit nonce. Callers must never reuse a nonce
    /// under the same key.
    pub fn seal_with_nonce(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut blob = Vec::with_capacity(plaintext.len() + BLOB_OVERHEAD);
        blob.extend_from_slice(nonce.as_bytes());
        blob.extend_from_slice(plaintext);

        let tag = self
            .cipher
            .encrypt_in_place_detached(
                aes_gcm::Nonce::from_slice(nonce.as_bytes()),
                b"",
                &mut blob[NONCE_SIZE..],
            )
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        blob.extend_from_slice(&tag);
        Ok(blob)
    }

    /// Decrypt a sealed blob.
    ///
    /// Fails with `ChunkTooSmall` when the blob cannot hold an IV and a tag,
    /// and with `DecryptionFailed` on any tag mismatch.
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < BLOB_OVERHEAD {
            return Err(CryptoError::ChunkTooSmall {
                len: blob.len(),
                min: BLOB_OVERHEAD,
            });
        }

        let (nonce, rest) = blob.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);

        let mut plaintext = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(
                aes_gcm::Nonce::from_slice(nonce),
                b"",
                &mut plaintext,
                aes_gcm::Tag::from_slice(tag),
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        Ok(plaintext)
    }
}

/// Encrypt data into a sealed blob (convenience function)
pub fn encrypt(key: &FileEncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    Aead::new(key)?.seal(plaintext)
}

/// Decrypt a sealed blob (convenience function)
pub fn decrypt(key: &FileEncryptionKey, blob: &[u8]) -> Result<Vec<u8>> {
    Aead::new(key)?.open(blob)
}

/// Size of the sealed blob for a plaintext of `len` bytes
pub fn sealed_len(len: u64) -> u64 {
    len + BLOB_OVERHEAD as u64
}
