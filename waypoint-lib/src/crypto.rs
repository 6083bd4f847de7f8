//! Authenticated envelope encryption
//!
//! AES-128-GCM with a fresh random 96-bit nonce per encryption. The
//! ciphertext carries the 16-byte GCM authentication tag; decryption fails
//! closed when the tag does not verify.

use crate::error::{Result, WaypointError};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes128Gcm, Nonce};

/// Required key length in bytes (AES-128)
pub const KEY_LENGTH: usize = 16;

/// GCM nonce length in bytes
pub const NONCE_LENGTH: usize = 12;

/// AES-GCM cipher bound to a single symmetric key.
///
/// Immutable once constructed; cloning shares the key schedule. Every
/// encryption draws its own nonce, so instances are safe to share across
/// request tasks.
#[derive(Clone)]
pub struct AesGcm {
    cipher: Aes128Gcm,
}

impl AesGcm {
    /// Create a cipher from a raw 16-byte key.
    ///
    /// Any other key length is a construction error.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(WaypointError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: key.len(),
            });
        }
        let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| {
            WaypointError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: key.len(),
            }
        })?;
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext`, returning the ciphertext (with appended GCM tag)
    /// and the random nonce used for this message.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| anyhow::anyhow!("AES-GCM encryption failed"))?;
        Ok((ciphertext, nonce.to_vec()))
    }

    /// Decrypt `ciphertext` under `nonce`.
    ///
    /// Fails with `AuthenticationFailed` when the tag does not verify or the
    /// nonce has the wrong length.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_LENGTH {
            return Err(WaypointError::AuthenticationFailed);
        }
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| WaypointError::AuthenticationFailed)
    }
}

impl std::fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcm").finish_non_exhaustive()
    }
}
