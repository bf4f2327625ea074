//! Credential encryption at rest
//!
//! The API key is stored in the preferences document as a sealed value:
//!
//! ```text
//! enc:v1:<base64(nonce || ciphertext)>
//! ```
//!
//! AES-256-GCM with a random 96-bit nonce per seal. The authentication tag
//! is part of the ciphertext, so a wrong key or a tampered value fails to
//! open instead of producing garbage.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{Error, Result};

/// Prefix marking a sealed value
pub const SEALED_PREFIX: &str = "enc:v1:";

/// Length of the symmetric key in bytes
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Result of opening a stored credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsealed {
    /// The stored value was sealed and decrypted successfully
    Decrypted(String),
    /// The stored value carries no seal marker; it is plaintext from an
    /// older document and should be sealed on the next write
    LegacyPlaintext(String),
}

impl Unsealed {
    /// The plaintext secret regardless of how it was stored
    pub fn into_secret(self) -> String {
        match self {
            Unsealed::Decrypted(s) | Unsealed::LegacyPlaintext(s) => s,
        }
    }
}

/// AES-256-GCM cipher for credentials
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &"<REDACTED>")
            .finish()
    }
}

impl CredentialCipher {
    /// Create a cipher from a raw 32-byte key
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(Error::crypto(format!(
                "Encryption key must be exactly {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::crypto(format!("Failed to create cipher: {}", e)))?;

        Ok(Self { cipher })
    }

    /// Generate a fresh random key
    pub fn generate_key() -> Vec<u8> {
        Aes256Gcm::generate_key(OsRng).to_vec()
    }

    /// Whether `value` carries the seal marker
    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(SEALED_PREFIX)
    }

    /// Encrypt `plaintext` into its sealed textual form
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::crypto(format!("Encryption failed: {}", e)))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", SEALED_PREFIX, BASE64.encode(payload)))
    }

    /// Decrypt a sealed value
    ///
    /// # Errors
    ///
    /// `Error::Crypto` if the value is not sealed, is malformed, or fails
    /// authentication (wrong key or tampered data).
    pub fn unseal(&self, sealed: &str) -> Result<String> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| Error::crypto("Value is not sealed"))?;

        let payload = BASE64
            .decode(encoded)
            .map_err(|e| Error::crypto(format!("Sealed value is not valid base64: {}", e)))?;

        if payload.len() <= NONCE_LEN {
            return Err(Error::crypto("Sealed value is truncated"));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                Error::crypto("Decryption failed: the key file does not match the stored value or the value was modified")
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::crypto("Decrypted value is not valid UTF-8"))
    }

    /// Open a stored credential that may predate encryption
    pub fn open(&self, stored: &str) -> Result<Unsealed> {
        if Self::is_sealed(stored) {
            self.unseal(stored).map(Unsealed::Decrypted)
        } else {
            Ok(Unsealed::LegacyPlaintext(stored.to_string()))
        }
    }
}
