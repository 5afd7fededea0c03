//! Error taxonomy for the privacy layer.
//!
//! Every public operation returns one of these variants so the caller can
//! tell exactly which invariant was violated. Nothing here is retried:
//! double spends and malformed proofs are permanent rejections.
use thiserror::Error;

use crate::bundle::BundleIssue;

/// Errors raised by key agreement, payments and bundling
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrivacyError {
    /// Malformed, zero or out-of-range key bytes
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Shielded address failed the format check
    #[error("invalid shielded address: {0}")]
    InvalidAddress(String),

    /// Amount is not a positive, representable value
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Nullifier has already been consumed
    #[error("double spend: nullifier {0} already recorded")]
    DoubleSpend(String),

    /// Shape, type tag or length mismatch in a proof object
    #[error("structural proof invalid: {0}")]
    StructuralProofInvalid(String),

    #[error("bundle too large: {got} transactions, limit is {max}")]
    BundleTooLarge { got: usize, max: usize },

    #[error("bundle must contain at least one transaction")]
    EmptyBundle,

    /// No symmetric key configured; sealing fails closed
    #[error("encryption key missing: sealing is unavailable until a key is configured")]
    EncryptionKeyMissing,

    #[error("decryption failed (bad key or tampered ciphertext)")]
    DecryptionFailed,

    #[error("payment not found: {0}")]
    PaymentNotFound(String),

    /// Payment exists but is not in a spendable state
    #[error("payment {id} cannot be spent while {status}")]
    PaymentNotSpendable { id: String, status: String },

    #[error("bundle not found: {0}")]
    BundleNotFound(String),

    /// Bundle verification collected one or more issues
    #[error("bundle verification failed: {}", format_issues(.0))]
    BundleVerificationFailed(Vec<BundleIssue>),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Persistence collaborator failure
    #[error("storage error: {0}")]
    Storage(String),
}

fn format_issues(issues: &[BundleIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for privacy operations
pub type Result<T> = std::result::Result<T, PrivacyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PrivacyError::BundleTooLarge { got: 101, max: 100 };
        assert_eq!(
            err.to_string(),
            "bundle too large: 101 transactions, limit is 100"
        );

        let err = PrivacyError::DoubleSpend("abcd".into());
        assert_eq!(
            err.to_string(),
            "double spend: nullifier abcd already recorded"
        );
    }

    #[test]
    fn test_verification_failure_lists_every_issue() {
        let err = PrivacyError::BundleVerificationFailed(vec![
            BundleIssue::MerkleRootMismatch,
            BundleIssue::NonPositiveAmount { index: 2 },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("merkle root mismatch"));
        assert!(msg.contains("transaction 2"));
    }
}
