//! Amount Commitments
//!
//! Hash-based commitments to payment amounts.
//!
//! ```text
//! Commitment = SHA-256("shade/commit/v1" || value_le || blinding || G || H)
//! ```
//!
//! G and H are fixed public generators (hash-derived constants). The same
//! `(value, blinding)` always gives the same commitment; changing either
//! changes it with overwhelming probability.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{PrivacyError, Result};

const COMMIT_DOMAIN: &[u8] = b"shade/commit/v1";

/// A 32-byte commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Commitment {
    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| PrivacyError::StructuralProofInvalid(format!("commitment: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Commitment scheme with fixed public generators
pub struct CommitmentScheme {
    g: [u8; 32],
    h: [u8; 32],
}

impl CommitmentScheme {
    pub fn new() -> Self {
        Self {
            g: generator(b"G"),
            h: generator(b"H"),
        }
    }

    /// Commit to `value` (smallest units) under `blinding`
    pub fn commit(&self, value: u64, blinding: &[u8; 32]) -> Commitment {
        let mut hasher = Sha256::new();
        hasher.update(COMMIT_DOMAIN);
        hasher.update(value.to_le_bytes());
        hasher.update(blinding);
        hasher.update(self.g);
        hasher.update(self.h);
        Commitment(hasher.finalize().into())
    }

    /// Check an opening against a commitment
    pub fn open(&self, commitment: &Commitment, value: u64, blinding: &[u8; 32]) -> bool {
        &self.commit(value, blinding) == commitment
    }

    /// Generate random blinding factor
    pub fn random_blinding<R: RngCore>(rng: &mut R) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        bytes
    }
}

impl Default for CommitmentScheme {
    fn default() -> Self {
        Self::new()
    }
}

fn generator(label: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"shade/generator/");
    hasher.update(label);
    hasher.finalize().into()
}
