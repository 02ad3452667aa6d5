//! Symmetric encryption for credential storage.
//!
//! Secrets are encrypted with AES-256-GCM under a process-wide master key.
//! The persisted form is `base64(nonce || ciphertext)` with a random
//! 12-byte nonce per encryption, so encrypting the same plaintext twice
//! yields different ciphertexts.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Required master key length in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Errors from encryption and decryption operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid master key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptFailed,

    #[error("Decryption failed")]
    DecryptFailed,

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),
}

/// Authenticated cipher for secret fields, keyed once at startup.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl SecretCipher {
    /// Creates a cipher from a raw 32-byte master key.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != MASTER_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                MASTER_KEY_LEN,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let digest = sha256_hex(key);

        Ok(Self {
            cipher,
            fingerprint: digest[..8].to_string(),
        })
    }

    /// Creates a cipher from an encoded master key (hex or base64).
    ///
    /// Accepts a 64-character hex string or a base64 string decoding to
    /// exactly 32 bytes.
    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim();

        if trimmed.len() == MASTER_KEY_LEN * 2 {
            if let Ok(bytes) = hex::decode(trimmed) {
                return Self::new(&bytes);
            }
        }

        let bytes = BASE64
            .decode(trimmed)
            .map_err(|e| CryptoError::InvalidKey(format!("not hex or base64: {}", e)))?;
        Self::new(&bytes)
    }

    /// First 8 hex chars of the key's SHA-256, safe to log.
    pub fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Encrypts a plaintext secret, returning `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypts a value previously produced by [`SecretCipher::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;

        if combined.len() <= NONCE_LEN {
            return Err(CryptoError::MalformedCiphertext(format!(
                "too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))
    }
}

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_ref());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> SecretCipher {
        SecretCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = test_cipher();
        let ciphertext = cipher.encrypt("sk_live_1234567890abcdef").unwrap();

        assert_ne!(ciphertext, "sk_live_1234567890abcdef");
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), "sk_live_1234567890abcdef");
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same-secret").unwrap();
        let b = cipher.encrypt("same-secret").unwrap();

        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), cipher.decrypt(&b).unwrap());
    }

    #[test]
    fn test_empty_plaintext_round_trip() {
        let cipher = test_cipher();
        let ciphertext = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), "");
    }

    #[test]
    fn test_unicode_round_trip() {
        let cipher = test_cipher();
        let ciphertext = cipher.encrypt("密钥🔑").unwrap();
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), "密钥🔑");
    }

    #[test]
    fn test_wrong_key_fails_decryption() {
        let a = SecretCipher::new(&[1u8; 32]).unwrap();
        let b = SecretCipher::new(&[2u8; 32]).unwrap();

        let ciphertext = a.encrypt("secret").unwrap();
        assert!(matches!(b.decrypt(&ciphertext), Err(CryptoError::DecryptFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = test_cipher();
        let ciphertext = cipher.encrypt("secret").unwrap();

        let mut bytes = BASE64.decode(&ciphertext).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = BASE64.encode(bytes);

        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(matches!(
            SecretCipher::new(&[0u8; 16]),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_from_encoded_hex() {
        let hex_key = "aa".repeat(32);
        let cipher = SecretCipher::from_encoded(&hex_key).unwrap();
        let ciphertext = cipher.encrypt("x").unwrap();
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), "x");
    }

    #[test]
    fn test_from_encoded_base64() {
        let b64_key = BASE64.encode([9u8; 32]);
        let cipher = SecretCipher::from_encoded(&b64_key).unwrap();
        assert_eq!(cipher.key_fingerprint().len(), 8);
    }

    #[test]
    fn test_from_encoded_rejects_garbage() {
        assert!(SecretCipher::from_encoded("not-a-key").is_err());
    }

    #[test]
    fn test_malformed_ciphertext() {
        let cipher = test_cipher();
        assert!(cipher.decrypt("!!!not base64!!!").is_err());
        // Valid base64 but shorter than a nonce.
        assert!(cipher.decrypt(&BASE64.encode([0u8; 4])).is_err());
    }

    #[test]
    fn test_fingerprint_is_key_digest_prefix() {
        let key = [7u8; 32];
        let cipher = SecretCipher::new(&key).unwrap();
        assert_eq!(cipher.key_fingerprint(), &sha256_hex(key)[..8]);
    }

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex("test");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }
}
