//! In-memory key session
//!
//! Holds the unlocked file key between PIN entry and logout. The key is
//! never written anywhere; locking drops it, which zeroizes it.

use crate::{ClientError, Result};
use ghost_crypto::{FileEncryptionKey, WrappedKey};
use parking_lot::RwLock;
use tracing::{debug, info};

/// The unlocked file key, if any
#[derive(Default)]
pub struct KeySession {
    key: RwLock<Option<FileEncryptionKey>>,
}

impl KeySession {
    /// Create a locked session
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh file key, wrap it under `pin` and unlock with it.
    ///
    /// The returned wrapped key must be stored on the user record; until it
    /// is, files encrypted with the new key cannot be recovered after a lock.
    pub fn create_pin(&self, pin: &str) -> Result<WrappedKey> {
        let key = FileEncryptionKey::generate();
        let wrapped = key.wrap(pin)?;
        *self.key.write() = Some(key);
        info!("new file key created");
        Ok(wrapped)
    }

    /// Unwrap `wrapped` with `pin` and keep the key
    pub fn unlock(&self, wrapped: &WrappedKey, pin: &str) -> Result<()> {
        let key = wrapped.unwrap(pin)?;
        *self.key.write() = Some(key);
        debug!("file key unlocked");
        Ok(())
    }

    /// Whether `pin` unlocks `wrapped`, without changing the session
    pub fn is_pin_valid(&self, wrapped: &WrappedKey, pin: &str) -> bool {
        wrapped.is_pin_valid(pin)
    }

    /// Whether a key is held
    pub fn is_unlocked(&self) -> bool {
        self.key.read().is_some()
    }

    /// A copy of the unlocked key
    pub fn key(&self) -> Result<FileEncryptionKey> {
        self.key.read().clone().ok_or(ClientError::Locked)
    }

    /// Drop the key
    pub fn lock(&self) {
        if self.key.write().take().is_some() {
            debug!("file key locked");
        }
    }
}

impl std::fmt::Debug for KeySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySession")
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_crypto::CryptoError;

    #[test]
    fn test_starts_locked() {
        let session = KeySession::new();
        assert!(!session.is_unlocked());
        assert!(matches!(session.key(), Err(ClientError::Locked)));
    }

    #[test]
    fn test_create_pin_then_unlock_elsewhere() {
        let session = KeySession::new();
        let wrapped = session.create_pin("123456").unwrap();
        let original = session.key().unwrap();

        let other = KeySession::new();
        other.unlock(&wrapped, "123456").unwrap();
        assert_eq!(other.key().unwrap(), original);
    }

    #[test]
    fn test_wrong_pin_keeps_session_locked() {
        let wrapped = FileEncryptionKey::generate().wrap("123456").unwrap();
        let session = KeySession::new();

        let err = session.unlock(&wrapped, "000000").unwrap_err();
        assert!(matches!(err, ClientError::Crypto(CryptoError::DecryptionFailed)));
        assert!(!session.is_unlocked());

        assert!(matches!(
            session.unlock(&wrapped, "12a456"),
            Err(ClientError::Crypto(CryptoError::InvalidPin))
        ));
    }

    #[test]
    fn test_pin_check_does_not_unlock() {
        let wrapped = FileEncryptionKey::generate().wrap("654321").unwrap();
        let session = KeySession::new();
        assert!(session.is_pin_valid(&wrapped, "654321"));
        assert!(!session.is_pin_valid(&wrapped, "123456"));
        assert!(!session.is_unlocked());
    }

    #[test]
    fn test_lock_clears_key() {
        let session = KeySession::new();
        session.create_pin("111111").unwrap();
        assert!(session.is_unlocked());
        session.lock();
        assert!(!session.is_unlocked());
        session.lock();
    }

    #[test]
    fn test_malformed_pin_does_not_create_key() {
        let session = KeySession::new();
        assert!(session.create_pin("12345").is_err());
        assert!(!session.is_unlocked());
    }
}
