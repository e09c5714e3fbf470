//! Six-digit PIN handling
//!
//! The PIN is only ever used as input to the wrapping-key derivation and is
//! never stored. Validation happens before any cryptographic work.

use crate::{CryptoError, Result, keys::KEY_SIZE};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of digits in a PIN
pub const PIN_LENGTH: usize = 6;

/// A validated six-digit PIN
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Pin {
    digits: [u8; PIN_LENGTH],
}

impl Pin {
    /// Parse a PIN, rejecting anything that is not exactly six ASCII digits
    pub fn parse(pin: &str) -> Result<Self> {
        let bytes = pin.as_bytes();
        if bytes.len() != PIN_LENGTH || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(CryptoError::InvalidPin);
        }
        let mut digits = [0u8; PIN_LENGTH];
        digits.copy_from_slice(bytes);
        Ok(Self { digits })
    }

    /// Derive the key-wrapping key from this PIN.
    ///
    /// SHA-256 over the ASCII digits. This is a single fast hash, not a
    /// password KDF; the wrapped-key format on the server depends on it.
    pub(crate) fn wrapping_key(&self) -> [u8; KEY_SIZE] {
        let digest = Sha256::digest(self.digits);
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        key
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pin(******)")
    }
}

impl std::str::FromStr for Pin {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
