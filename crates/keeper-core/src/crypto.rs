//! Cryptographic primitives for Keeper.
//!
//! AES-256-GCM authenticated encryption under a key derived from an operator
//! passphrase, plus the SHA-256 digest used to index bearer tokens.
//!
//! # Formats
//!
//! - Current: `nonce (12 bytes) || ciphertext || tag (16 bytes)` with a fresh
//!   96-bit nonce from `OsRng` per encryption.
//! - Legacy (read only): `ciphertext || tag` sealed under a fixed nonce taken
//!   from the last 12 bytes of the key.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CipherError;

/// Nonce length for AES-256-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
const TAG_LEN: usize = 16;

/// A 256-bit encryption key that is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a key as the SHA-256 digest of a passphrase.
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut digest = Sha256::digest(passphrase.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        digest.as_mut_slice().zeroize();
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn legacy_nonce(&self) -> &[u8] {
        &self.0[32 - NONCE_LEN..]
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt plaintext with a fresh random nonce.
///
/// # Errors
///
/// Returns [`CipherError::Encrypt`] if the AEAD operation fails.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|e| CipherError::Encrypt {
            reason: e.to_string(),
        })?;

    let mut combined = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypt the current nonce-prefixed format.
///
/// # Errors
///
/// Returns [`CipherError::Decrypt`] if the input is too short or
/// authentication fails.
pub fn decrypt(key: &EncryptionKey, combined: &[u8]) -> Result<Vec<u8>, CipherError> {
    if combined.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::Decrypt {
            reason: format!(
                "ciphertext too short: expected at least {} bytes, got {}",
                NONCE_LEN + TAG_LEN,
                combined.len()
            ),
        });
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CipherError::Decrypt {
            reason: e.to_string(),
        })
}

/// Decrypt the legacy fixed-nonce format.
///
/// # Errors
///
/// Returns [`CipherError::Decrypt`] if the input is too short or
/// authentication fails.
pub fn decrypt_legacy(key: &EncryptionKey, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
    if sealed.len() < TAG_LEN {
        return Err(CipherError::Decrypt {
            reason: format!("legacy ciphertext too short: {} bytes", sealed.len()),
        });
    }

    key.cipher()
        .decrypt(Nonce::from_slice(key.legacy_nonce()), sealed)
        .map_err(|e| CipherError::Decrypt {
            reason: e.to_string(),
        })
}

/// SHA-256 hex digest of a bearer token, used as its lookup key.
#[must_use]
pub fn hash_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}
