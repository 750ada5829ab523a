//! At-rest protection of record payloads.
//!
//! [`AtRestCipher`] is built once from the operator key and is the only place
//! that decides whether a payload is stored encrypted. Each stored row carries
//! its own flag, so a deployment can move from plaintext to encrypted without
//! rewriting old rows.

use std::sync::Arc;

use crate::crypto::{self, EncryptionKey};
use crate::error::CipherError;

/// Encrypts payloads before storage and decrypts them after.
#[derive(Debug, Clone, Default)]
pub struct AtRestCipher {
    key: Option<Arc<EncryptionKey>>,
}

impl AtRestCipher {
    /// Build from the operator key string. An empty string means no key.
    #[must_use]
    pub fn new(passphrase: &str) -> Self {
        if passphrase.is_empty() {
            return Self::plaintext();
        }
        Self {
            key: Some(Arc::new(EncryptionKey::from_passphrase(passphrase))),
        }
    }

    /// A cipher that stores payloads as-is.
    #[must_use]
    pub fn plaintext() -> Self {
        Self { key: None }
    }

    #[must_use]
    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }

    /// Prepare a payload for storage. Returns the stored bytes and the flag
    /// to persist beside them.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Encrypt`] if encryption fails.
    pub fn protect(&self, data: &[u8]) -> Result<(Vec<u8>, bool), CipherError> {
        match &self.key {
            Some(key) => Ok((crypto::encrypt(key, data)?, true)),
            None => Ok((data.to_vec(), false)),
        }
    }

    /// Recover a stored payload.
    ///
    /// Encrypted rows are tried in the current format first, then in the
    /// legacy fixed-nonce format.
    ///
    /// # Errors
    ///
    /// - [`CipherError::MissingKey`] if `encrypted` is set and no key is configured.
    /// - [`CipherError::Decrypt`] if no format authenticates.
    pub fn reveal(&self, stored: &[u8], encrypted: bool) -> Result<Vec<u8>, CipherError> {
        if !encrypted {
            return Ok(stored.to_vec());
        }
        let key = self.key.as_deref().ok_or(CipherError::MissingKey)?;

        crypto::decrypt(key, stored).or_else(|current| {
            crypto::decrypt_legacy(key, stored).map_err(|legacy| CipherError::Decrypt {
                reason: format!("{current}; legacy format: {legacy}"),
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Key, Nonce};

    use super::*;

    #[test]
    fn without_key_data_passes_through() {
        let cipher = AtRestCipher::new("");
        assert!(!cipher.is_keyed());
        let (stored, flag) = cipher.protect(b"plain").unwrap();
        assert_eq!(stored, b"plain");
        assert!(!flag);
        assert_eq!(cipher.reveal(&stored, flag).unwrap(), b"plain");
    }

    #[test]
    fn with_key_data_is_encrypted() {
        let cipher = AtRestCipher::new("operator key");
        let (stored, flag) = cipher.protect(b"secret").unwrap();
        assert!(flag);
        assert_ne!(stored, b"secret");
        assert_eq!(cipher.reveal(&stored, true).unwrap(), b"secret");
    }

    #[test]
    fn keyed_cipher_reads_unencrypted_rows() {
        let cipher = AtRestCipher::new("operator key");
        assert_eq!(cipher.reveal(b"old plain row", false).unwrap(), b"old plain row");
    }

    #[test]
    fn encrypted_row_without_key_fails() {
        let (stored, _) = AtRestCipher::new("k").protect(b"secret").unwrap();
        let result = AtRestCipher::plaintext().reveal(&stored, true);
        assert!(matches!(result, Err(CipherError::MissingKey)));
    }

    #[test]
    fn wrong_key_fails_in_both_formats() {
        let (stored, _) = AtRestCipher::new("right").protect(b"secret").unwrap();
        let result = AtRestCipher::new("wrong").reveal(&stored, true);
        assert!(matches!(result, Err(CipherError::Decrypt { .. })));
    }

    #[test]
    fn legacy_fixed_nonce_rows_are_readable() {
        let key = EncryptionKey::from_passphrase("legacy key");
        let nonce = &key.as_bytes()[20..];
        let sealed = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
            .encrypt(Nonce::from_slice(nonce), b"written long ago".as_slice())
            .unwrap();

        let cipher = AtRestCipher::new("legacy key");
        assert_eq!(cipher.reveal(&sealed, true).unwrap(), b"written long ago");
    }

    #[test]
    fn tampered_row_yields_no_plaintext() {
        let cipher = AtRestCipher::new("k");
        let (mut stored, _) = cipher.protect(b"secret").unwrap();
        let last = stored.len() - 1;
        stored[last] ^= 0x01;
        assert!(cipher.reveal(&stored, true).is_err());
    }
}
