//! Record Sealing
//!
//! Symmetric authenticated encryption for stealth metadata, payment amounts,
//! memos and private key material.
//!
//! ```text
//! Flow:
//! 1. Record key   = BLAKE3-derive-key("shade sealed-record v1", master_key)
//! 2. Nonce        = 12 random bytes
//! 3. Ciphertext   = ChaCha20-Poly1305(record_key, nonce, plaintext)
//! 4. Output       = nonce || ciphertext || tag
//! ```
//!
//! A cipher built without a master key fails every operation with
//! `EncryptionKeyMissing`; there is no plaintext fallback.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;

use crate::errors::{PrivacyError, Result};

const RECORD_KEY_CONTEXT: &str = "shade sealed-record v1";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Symmetric encryption collaborator
pub trait SymmetricCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// ChaCha20-Poly1305 sealing keyed from a configured master key
#[derive(Clone)]
pub struct ChaChaCipher {
    key: Option<[u8; 32]>,
}

impl ChaChaCipher {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self {
            key: Some(blake3::derive_key(RECORD_KEY_CONTEXT, &master_key)),
        }
    }

    /// A cipher with no key; every operation fails closed
    pub fn unconfigured() -> Self {
        Self { key: None }
    }

    /// Build from an optional hex-encoded 32-byte master key
    pub fn from_hex(master_key: Option<&str>) -> Result<Self> {
        let Some(hex_key) = master_key else {
            return Ok(Self::unconfigured());
        };
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| PrivacyError::InvalidKeyMaterial(format!("encryption key: {}", e)))?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            PrivacyError::InvalidKeyMaterial("encryption key must be 32 bytes".into())
        })?;
        Ok(Self::new(key))
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305> {
        let key = self.key.as_ref().ok_or(PrivacyError::EncryptionKeyMissing)?;
        ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| PrivacyError::InvalidKeyMaterial("encryption key length".into()))
    }
}

impl std::fmt::Debug for ChaChaCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaCipher")
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl SymmetricCipher for ChaChaCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| PrivacyError::Serialization("encryption failure".into()))?;

        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(PrivacyError::DecryptionFailed);
        }

        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| PrivacyError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = ChaChaCipher::new([42u8; 32]);
        let sealed = cipher.encrypt(b"stealth meta").unwrap();

        assert_eq!(sealed.len(), NONCE_LEN + 12 + TAG_LEN);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"stealth meta");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let cipher = ChaChaCipher::new([42u8; 32]);
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = ChaChaCipher::new([1u8; 32]).encrypt(b"secret").unwrap();
        let result = ChaChaCipher::new([2u8; 32]).decrypt(&sealed);
        assert_eq!(result.unwrap_err(), PrivacyError::DecryptionFailed);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = ChaChaCipher::new([1u8; 32]);
        let mut sealed = cipher.encrypt(b"secret").unwrap();
        sealed[NONCE_LEN] ^= 0x01;
        assert!(cipher.decrypt(&sealed).is_err());
        assert!(cipher.decrypt(&sealed[..10]).is_err());
    }

    #[test]
    fn test_unconfigured_fails_closed() {
        let cipher = ChaChaCipher::unconfigured();
        assert_eq!(
            cipher.encrypt(b"x").unwrap_err(),
            PrivacyError::EncryptionKeyMissing
        );
        assert_eq!(
            cipher.decrypt(&[0u8; 64]).unwrap_err(),
            PrivacyError::EncryptionKeyMissing
        );
    }

    #[test]
    fn test_from_hex() {
        assert!(!ChaChaCipher::from_hex(None).unwrap().is_configured());
        assert!(ChaChaCipher::from_hex(Some(&"11".repeat(32))).unwrap().is_configured());
        assert!(ChaChaCipher::from_hex(Some("1122")).is_err());
        assert!(ChaChaCipher::from_hex(Some("not hex")).is_err());
    }
}
