//! Private Payments
//!
//! A private payment hides its amount behind a commitment and carries a
//! published nullifier hash that makes it spendable at most once.
//!
//! ```text
//! amount (SOL) ──► lamports ──┐
//!                  blinding ──┴──► Commitment ──┬──► range proof
//!                                                ├──► ownership proof (recipient, time)
//!                  sender key ──────────────────┴──► Nullifier ──► NullifierHash
//!
//! (lamports, blinding) and memo are sealed with the record cipher.
//! ```
//!
//! Proofs here are produced by the configured [`ProofBackend`]; with the
//! default structural backend, verification is a well-formedness check only.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::commitment::{Commitment, CommitmentScheme};
use crate::encryption::SymmetricCipher;
use crate::errors::{PrivacyError, Result};
use crate::nullifier::{MIN_SPENDING_KEY_LEN, NullifierHash, NullifierKey};
use crate::proof::{MAX_RANGE_BITS, ProofBackend, ProofType, Statement, StructuralProof};
use crate::stealth::validate_shielded_address;

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert a SOL-denominated amount to lamports
///
/// Rejects non-finite and non-positive amounts, amounts that round below
/// one lamport, and amounts that do not fit in 64 bits.
pub fn sol_to_lamports(amount: f64) -> Result<u64> {
    if !amount.is_finite() {
        return Err(PrivacyError::InvalidAmount(format!("{} is not finite", amount)));
    }
    if amount <= 0.0 {
        return Err(PrivacyError::InvalidAmount(format!("{} is not positive", amount)));
    }
    let lamports = (amount * LAMPORTS_PER_SOL as f64).round();
    if lamports < 1.0 {
        return Err(PrivacyError::InvalidAmount(format!(
            "{} is below one lamport",
            amount
        )));
    }
    // u64::MAX as f64 rounds up to 2^64
    if lamports >= u64::MAX as f64 {
        return Err(PrivacyError::InvalidAmount(format!(
            "{} exceeds the representable range",
            amount
        )));
    }
    Ok(lamports as u64)
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Spent,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Spent => "spent",
        };
        f.write_str(s)
    }
}

/// A shielded payment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivatePayment {
    pub id: String,
    pub commitment: Commitment,
    pub nullifier_hash: NullifierHash,
    /// Sealed `(lamports, blinding)`
    #[serde(with = "hex::serde")]
    pub encrypted_amount: Vec<u8>,
    pub encrypted_memo: Option<String>,
    pub sender_proof: StructuralProof,
    pub recipient_proof: StructuralProof,
    /// Recipient shielded address
    pub recipient: String,
    /// Hex commitment-tree root at confirmation
    pub merkle_root: Option<String>,
    pub merkle_index: Option<u64>,
    pub status: PaymentStatus,
    pub created_at: u64,
}

/// Opening of a payment's commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountOpening {
    pub lamports: u64,
    #[serde(with = "hex::serde")]
    pub blinding: [u8; 32],
}

/// Builds private payments from a commitment scheme, a proof backend and
/// a record cipher
#[derive(Clone)]
pub struct PaymentFactory {
    scheme: Arc<CommitmentScheme>,
    backend: Arc<dyn ProofBackend>,
    cipher: Arc<dyn SymmetricCipher>,
    min_key_len: usize,
}

impl PaymentFactory {
    pub fn new(backend: Arc<dyn ProofBackend>, cipher: Arc<dyn SymmetricCipher>) -> Self {
        Self {
            scheme: Arc::new(CommitmentScheme::new()),
            backend,
            cipher,
            min_key_len: MIN_SPENDING_KEY_LEN,
        }
    }

    pub fn with_min_key_len(mut self, min_key_len: usize) -> Self {
        self.min_key_len = min_key_len;
        self
    }

    pub fn backend(&self) -> &dyn ProofBackend {
        self.backend.as_ref()
    }

    pub fn cipher(&self) -> &dyn SymmetricCipher {
        self.cipher.as_ref()
    }

    pub fn scheme(&self) -> &CommitmentScheme {
        &self.scheme
    }

    /// Wrap raw spending-key bytes, enforcing the configured minimum length
    pub fn spending_key(&self, key: &[u8]) -> Result<NullifierKey> {
        NullifierKey::new(key, self.min_key_len)
    }

    /// Create a payment with a fresh random blinding factor
    pub fn create_private_payment(
        &self,
        sender_key: &[u8],
        recipient: &str,
        amount: f64,
        memo: Option<&str>,
        now: u64,
    ) -> Result<PrivatePayment> {
        let blinding = CommitmentScheme::random_blinding(&mut rand::thread_rng());
        self.create_private_payment_with_blinding(
            sender_key, recipient, amount, memo, &blinding, now,
        )
    }

    /// Create a payment with a caller-chosen blinding factor
    ///
    /// The same `(sender_key, amount, blinding)` yields the same commitment
    /// and nullifier hash.
    pub fn create_private_payment_with_blinding(
        &self,
        sender_key: &[u8],
        recipient: &str,
        amount: f64,
        memo: Option<&str>,
        blinding: &[u8; 32],
        now: u64,
    ) -> Result<PrivatePayment> {
        validate_shielded_address(recipient)?;
        let lamports = sol_to_lamports(amount)?;
        let key = self.spending_key(sender_key)?;

        let commitment = self.scheme.commit(lamports, blinding);
        let nullifier_hash = key.derive_nullifier(&commitment).hash();

        let sender_proof = self.backend.prove(&Statement::Range {
            commitment,
            bit_width: MAX_RANGE_BITS,
        })?;
        let recipient_proof = self.backend.prove(&Statement::Ownership {
            commitment,
            recipient: recipient.to_string(),
            timestamp: now,
        })?;

        let opening = AmountOpening {
            lamports,
            blinding: *blinding,
        };
        let opening_json =
            serde_json::to_vec(&opening).map_err(|e| PrivacyError::Serialization(e.to_string()))?;
        let encrypted_amount = self.cipher.encrypt(&opening_json)?;
        let encrypted_memo = memo
            .map(|m| self.cipher.encrypt(m.as_bytes()).map(hex::encode))
            .transpose()?;

        Ok(PrivatePayment {
            id: new_payment_id(),
            commitment,
            nullifier_hash,
            encrypted_amount,
            encrypted_memo,
            sender_proof,
            recipient_proof,
            recipient: recipient.to_string(),
            merkle_root: None,
            merkle_index: None,
            status: PaymentStatus::Pending,
            created_at: now,
        })
    }

    /// Decrypt and check the commitment opening of a payment
    pub fn open_amount(&self, payment: &PrivatePayment) -> Result<AmountOpening> {
        let plaintext = self.cipher.decrypt(&payment.encrypted_amount)?;
        let opening: AmountOpening = serde_json::from_slice(&plaintext)
            .map_err(|e| PrivacyError::Serialization(e.to_string()))?;
        if !self
            .scheme
            .open(&payment.commitment, opening.lamports, &opening.blinding)
        {
            return Err(PrivacyError::StructuralProofInvalid(
                "sealed amount does not open the commitment".into(),
            ));
        }
        Ok(opening)
    }

    /// Decrypt a payment's memo, if it has one
    pub fn open_memo(&self, payment: &PrivatePayment) -> Result<Option<String>> {
        let Some(sealed) = &payment.encrypted_memo else {
            return Ok(None);
        };
        let bytes = hex::decode(sealed).map_err(|_| PrivacyError::DecryptionFailed)?;
        let plaintext = self.cipher.decrypt(&bytes)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|_| PrivacyError::DecryptionFailed)
    }
}

fn new_payment_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("pay_{}", hex::encode(bytes))
}

/// Structural check of a payment's proofs and fields
///
/// Checks proof type and protocol tags, field-element counts and lengths,
/// and recomputes the recipient binding. This is not a soundness check.
pub fn verify_private_payment(payment: &PrivatePayment, backend: &dyn ProofBackend) -> Result<()> {
    if payment.sender_proof.proof_type != ProofType::Range {
        return Err(PrivacyError::StructuralProofInvalid(
            "sender proof must be a range proof".into(),
        ));
    }
    if payment.recipient_proof.proof_type != ProofType::Ownership {
        return Err(PrivacyError::StructuralProofInvalid(
            "recipient proof must be an ownership proof".into(),
        ));
    }
    validate_shielded_address(&payment.recipient)
        .map_err(|e| PrivacyError::StructuralProofInvalid(format!("recipient: {}", e)))?;
    if payment.encrypted_amount.is_empty() {
        return Err(PrivacyError::StructuralProofInvalid(
            "missing sealed amount".into(),
        ));
    }

    backend.verify(
        &payment.sender_proof,
        &Statement::Range {
            commitment: payment.commitment,
            bit_width: MAX_RANGE_BITS,
        },
    )?;
    backend.verify(
        &payment.recipient_proof,
        &Statement::Ownership {
            commitment: payment.commitment,
            recipient: payment.recipient.clone(),
            timestamp: payment.created_at,
        },
    )?;
    Ok(())
}
