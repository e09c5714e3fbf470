//! File-encryption key management
//!
//! Each user owns a single random 256-bit file-encryption key. It exists in
//! plaintext only in process memory after a successful PIN unlock; the only
//! persisted form is the [`WrappedKey`], the key sealed under a PIN-derived
//! wrapping key and base64-encoded.

use crate::{CryptoError, Result, pin::Pin, symmetric::Aead};
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96 bits for AES-GCM)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// The per-user file-encryption key
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct FileEncryptionKey {
    key: [u8; KEY_SIZE],
}

impl FileEncryptionKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut key);
        Self { key }
    }

    /// Create a key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "file key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key)
    }

    /// Decode from base64
    pub fn from_base64(s: &str) -> Result<Self> {
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Seal this key under a PIN.
    ///
    /// The PIN is validated before any cryptographic work.
    pub fn wrap(&self, pin: &str) -> Result<WrappedKey> {
        let pin = Pin::parse(pin)?;
        let mut wrapping_key = pin.wrapping_key();
        let sealed = Aead::from_raw(&wrapping_key).and_then(|aead| aead.seal(&self.key));
        wrapping_key.zeroize();

        Ok(WrappedKey(base64::engine::general_purpose::STANDARD.encode(sealed?)))
    }
}

impl std::fmt::Debug for FileEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileEncryptionKey(<redacted>)")
    }
}

/// A file-encryption key sealed under a PIN: `base64(IV ‖ ciphertext ‖ tag)`.
///
/// Opaque to the server, which stores and returns it verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey(String);

impl WrappedKey {
    /// Wrap an existing base64 string (no validation; corruption is detected
    /// on unwrap)
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The base64 form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the file-encryption key.
    ///
    /// A wrong PIN and a corrupted blob are indistinguishable: both fail with
    /// `DecryptionFailed`. A malformed PIN fails with `InvalidPin`.
    pub fn unwrap(&self, pin: &str) -> Result<FileEncryptionKey> {
        let pin = Pin::parse(pin)?;
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(self.0.trim())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let mut wrapping_key = pin.wrapping_key();
        let opened = Aead::from_raw(&wrapping_key).and_then(|aead| aead.open(&sealed));
        wrapping_key.zeroize();

        let mut raw = match opened {
            Ok(raw) => raw,
            Err(CryptoError::ChunkTooSmall { .. }) => return Err(CryptoError::DecryptionFailed),
            Err(e) => return Err(e),
        };
        let key = FileEncryptionKey::from_bytes(&raw);
        raw.zeroize();
        key
    }

    /// Check whether `pin` unlocks this wrapped key
    pub fn is_pin_valid(&self, pin: &str) -> bool {
        self.unwrap(pin).is_ok()
    }
}

impl std::fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WrappedKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}
