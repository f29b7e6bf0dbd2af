//! Symmetric encryption for configuration values flagged `is_encrypted`.
//!
//! Values are sealed with ChaCha20-Poly1305 under a key derived from the
//! `SECRET_KEY` setting. The stored form is URL-safe base64 of
//! `nonce || ciphertext`.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("could not encrypt data")]
    Encrypt,
    #[error("could not decrypt data")]
    Decrypt,
    #[error("ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("decrypted data is not valid UTF-8")]
    Utf8,
}

#[derive(Clone)]
pub struct SecretBox {
    cipher: ChaCha20Poly1305,
}

impl fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let cipher = ChaCha20Poly1305::new(Key::from_slice(digest.as_slice()));
        Self { cipher }
    }

    /// Seals `plaintext`. An empty input stays empty so unset secrets remain
    /// distinguishable from set ones.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE.encode(out))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        if stored.is_empty() {
            return Ok(String::new());
        }
        let raw = URL_SAFE.decode(stored)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plain).map_err(|_| CryptoError::Utf8)
    }
}
