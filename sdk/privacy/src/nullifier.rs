//! Nullifiers
//!
//! Implements nullifier derivation for double-spend prevention.
//!
//! ```text
//! Nullifier     = SHA-256("shade/nullifier/v1" || spending_key || commitment)
//! NullifierHash = SHA-256(Nullifier)
//! ```
//!
//! Only the hash is published. Once it is recorded, any payment carrying it
//! is rejected.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::commitment::Commitment;
use crate::errors::{PrivacyError, Result};

const NULLIFIER_DOMAIN: &[u8] = b"shade/nullifier/v1";

/// Default minimum length of a spending-key-equivalent secret
pub const MIN_SPENDING_KEY_LEN: usize = 32;

/// A nullifier (32 bytes), kept private by the spender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The published form
    pub fn hash(&self) -> NullifierHash {
        NullifierHash(Sha256::digest(self.0).into())
    }
}

/// Published double-spend tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierHash(#[serde(with = "hex::serde")] pub [u8; 32]);

impl NullifierHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for NullifierHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Nullifier derivation key (spending-key-equivalent secret)
///
/// Knowledge of this key is required to derive valid nullifiers.
#[derive(Clone)]
pub struct NullifierKey {
    key: Vec<u8>,
}

impl NullifierKey {
    /// Create from raw bytes, enforcing a minimum secret length
    pub fn new(key: &[u8], min_len: usize) -> Result<Self> {
        if key.len() < min_len {
            return Err(PrivacyError::InvalidKeyMaterial(format!(
                "spending key must be at least {} bytes, got {}",
                min_len,
                key.len()
            )));
        }
        if key.iter().all(|&b| b == 0) {
            return Err(PrivacyError::InvalidKeyMaterial("spending key is all zero".into()));
        }
        Ok(Self { key: key.to_vec() })
    }

    /// Create with the default minimum length
    pub fn from_bytes(key: &[u8]) -> Result<Self> {
        Self::new(key, MIN_SPENDING_KEY_LEN)
    }

    /// Derive the nullifier for a commitment
    pub fn derive_nullifier(&self, commitment: &Commitment) -> Nullifier {
        let mut hasher = Sha256::new();
        hasher.update(NULLIFIER_DOMAIN);
        hasher.update((self.key.len() as u32).to_le_bytes());
        hasher.update(&self.key);
        hasher.update(commitment.as_bytes());
        Nullifier(hasher.finalize().into())
    }
}

impl std::fmt::Debug for NullifierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NullifierKey(<redacted>)")
    }
}
