//! Transaction Bundles
//!
//! Packs 1..=100 trading records into one unit with a Merkle root over
//! their canonical serializations and an aggregated validity proof.
//!
//! ```text
//! Bundle Lifecycle:
//!
//!   Pending ──verify──► Verified ──hand-off──► Submitted
//!      │                   │                      │
//!      │                   └──────settle─────┐    │ settle
//!      │                                     ▼    ▼
//!      └───────────► Failed            Confirmed
//!   (any non-terminal state may fail)
//! ```
//!
//! Verification never stops at the first defect: every issue found is
//! returned so the caller sees the full picture.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::{PrivacyError, Result};
use crate::merkle::{BundleTree, CombineMode, MerkleProof, verify_inclusion};
use crate::proof::{PROOF_CURVE, ProofBackend, Statement, StructuralProof};

/// Protocol ceiling on transactions per bundle
pub const MAX_BUNDLE_TRANSACTIONS: usize = 100;
/// Protocol tag of an aggregated bundle proof
pub const AGGREGATE_PROTOCOL: &str = "groth16-aggregate";

const VALIDITY_DOMAIN: &[u8] = b"shade/tx-validity/v1";
const AGGREGATE_DOMAIN: &[u8] = b"shade/aggregate/v1";

/// One trading record carried in a bundle
///
/// Field order is the canonical serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleTransaction {
    pub id: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub token: Option<String>,
    pub timestamp: Option<u64>,
}

impl BundleTransaction {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            amount,
            token: None,
            timestamp: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Canonical leaf string of a record
pub fn serialize_transaction(tx: &BundleTransaction) -> Result<String> {
    serde_json::to_string(tx).map_err(|e| PrivacyError::Serialization(e.to_string()))
}

/// Per-transaction validity hash over `(id, from, to, amount)`
pub fn validity_hash(tx: &BundleTransaction) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(VALIDITY_DOMAIN);
    for field in [&tx.id, &tx.from, &tx.to] {
        hasher.update((field.len() as u32).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update(tx.amount.to_le_bytes());
    hasher.finalize().into()
}

/// Commitment over all validity hashes, in bundle order
pub fn aggregate_commitment(validity_hashes: &[[u8; 32]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(AGGREGATE_DOMAIN);
    hasher.update((validity_hashes.len() as u32).to_le_bytes());
    for hash in validity_hashes {
        hasher.update(hash);
    }
    hasher.finalize().into()
}

/// Aggregated validity proof for a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedProof {
    pub protocol: String,
    pub curve: String,
    pub tx_count: usize,
    /// Hex validity hash per transaction
    pub validity_hashes: Vec<String>,
    #[serde(with = "hex::serde")]
    pub aggregate_commitment: [u8; 32],
    pub proof: StructuralProof,
}

/// Bundle lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    Pending,
    Verified,
    Submitted,
    Confirmed,
    Failed,
}

impl BundleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BundleStatus::Confirmed | BundleStatus::Failed)
    }

    /// Whether a move to `next` is a legal forward step
    pub fn can_transition_to(&self, next: BundleStatus) -> bool {
        use BundleStatus::*;
        match (self, next) {
            (Pending, Verified) => true,
            (Verified, Submitted) | (Verified, Confirmed) => true,
            (Submitted, Confirmed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BundleStatus::Pending => "pending",
            BundleStatus::Verified => "verified",
            BundleStatus::Submitted => "submitted",
            BundleStatus::Confirmed => "confirmed",
            BundleStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Gas cost model for bundled vs individual submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasModel {
    pub per_tx_gas: u64,
    pub verification_overhead_gas: u64,
    pub marginal_gas: u64,
}

impl Default for GasModel {
    fn default() -> Self {
        Self {
            per_tx_gas: 21_000,
            verification_overhead_gas: 50_000,
            marginal_gas: 2_500,
        }
    }
}

impl GasModel {
    pub fn estimate(&self, tx_count: usize) -> GasEstimate {
        let n = tx_count as u64;
        let individual = n.saturating_mul(self.per_tx_gas);
        let bundled = self
            .verification_overhead_gas
            .saturating_add(n.saturating_mul(self.marginal_gas));
        GasEstimate {
            individual,
            bundled,
            saved: individual.saturating_sub(bundled),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasEstimate {
    pub individual: u64,
    pub bundled: u64,
    pub saved: u64,
}

impl GasEstimate {
    /// individual / bundled
    pub fn compression_ratio(&self) -> f64 {
        if self.bundled == 0 {
            return 0.0;
        }
        self.individual as f64 / self.bundled as f64
    }
}

/// A bundle of trading records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundledTransaction {
    pub bundle_id: String,
    pub transactions: Vec<BundleTransaction>,
    #[serde(with = "hex::serde")]
    pub merkle_root: [u8; 32],
    pub aggregated_proof: AggregatedProof,
    pub gas_estimate: GasEstimate,
    pub compression_ratio: f64,
    pub status: BundleStatus,
    pub combine_mode: CombineMode,
    pub tree: BundleTree,
    pub created_at: u64,
}

impl BundledTransaction {
    pub fn merkle_root_hex(&self) -> String {
        hex::encode(self.merkle_root)
    }

    /// Move to `next`, rejecting reversals and moves out of terminal states
    pub fn transition(&mut self, next: BundleStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PrivacyError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Build a bundle from 1..=`max_transactions` records
///
/// Size limits are checked before anything is hashed. `max_transactions`
/// is capped at [`MAX_BUNDLE_TRANSACTIONS`].
pub fn create_transaction_bundle(
    transactions: Vec<BundleTransaction>,
    max_transactions: usize,
    gas: &GasModel,
    mode: CombineMode,
    backend: &dyn ProofBackend,
    now: u64,
) -> Result<BundledTransaction> {
    let max = max_transactions.clamp(1, MAX_BUNDLE_TRANSACTIONS);
    if transactions.is_empty() {
        return Err(PrivacyError::EmptyBundle);
    }
    if transactions.len() > max {
        return Err(PrivacyError::BundleTooLarge {
            got: transactions.len(),
            max,
        });
    }

    let leaves = transactions
        .iter()
        .map(serialize_transaction)
        .collect::<Result<Vec<_>>>()?;
    let tree = BundleTree::build(&leaves, mode).ok_or(PrivacyError::EmptyBundle)?;

    let hashes: Vec<[u8; 32]> = transactions.iter().map(validity_hash).collect();
    let aggregate = aggregate_commitment(&hashes);
    let proof = backend.prove(&Statement::Aggregate {
        aggregate,
        tx_count: transactions.len(),
    })?;

    let gas_estimate = gas.estimate(transactions.len());

    Ok(BundledTransaction {
        bundle_id: new_bundle_id(),
        merkle_root: tree.root(),
        aggregated_proof: AggregatedProof {
            protocol: AGGREGATE_PROTOCOL.into(),
            curve: PROOF_CURVE.into(),
            tx_count: transactions.len(),
            validity_hashes: hashes.iter().map(hex::encode).collect(),
            aggregate_commitment: aggregate,
            proof,
        },
        compression_ratio: gas_estimate.compression_ratio(),
        gas_estimate,
        status: BundleStatus::Pending,
        combine_mode: mode,
        tree,
        transactions,
        created_at: now,
    })
}

fn new_bundle_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("bundle_{}", hex::encode(bytes))
}

/// One defect found while verifying a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BundleIssue {
    EmptyBundle,
    TooManyTransactions { got: usize, max: usize },
    ProtocolTag { found: String },
    CurveTag { found: String },
    TxCountMismatch { proof: usize, actual: usize },
    ValidityHashMismatch { index: usize },
    AggregateMismatch,
    ProofRejected { reason: String },
    MerkleRootMismatch,
    MissingField { index: usize, field: String },
    NonPositiveAmount { index: usize },
    Unserializable { index: usize },
}

impl fmt::Display for BundleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleIssue::EmptyBundle => write!(f, "bundle has no transactions"),
            BundleIssue::TooManyTransactions { got, max } => {
                write!(f, "bundle has {} transactions, limit is {}", got, max)
            }
            BundleIssue::ProtocolTag { found } => {
                write!(f, "aggregated proof protocol '{}' is not '{}'", found, AGGREGATE_PROTOCOL)
            }
            BundleIssue::CurveTag { found } => {
                write!(f, "aggregated proof curve '{}' is not '{}'", found, PROOF_CURVE)
            }
            BundleIssue::TxCountMismatch { proof, actual } => write!(
                f,
                "proof covers {} transactions, bundle holds {}",
                proof, actual
            ),
            BundleIssue::ValidityHashMismatch { index } => {
                write!(f, "validity hash mismatch for transaction {}", index)
            }
            BundleIssue::AggregateMismatch => write!(f, "aggregate commitment mismatch"),
            BundleIssue::ProofRejected { reason } => {
                write!(f, "aggregated proof rejected: {}", reason)
            }
            BundleIssue::MerkleRootMismatch => write!(f, "merkle root mismatch"),
            BundleIssue::MissingField { index, field } => {
                write!(f, "transaction {} has empty '{}'", index, field)
            }
            BundleIssue::NonPositiveAmount { index } => {
                write!(f, "transaction {} amount must be positive and finite", index)
            }
            BundleIssue::Unserializable { index } => {
                write!(f, "transaction {} cannot be serialized", index)
            }
        }
    }
}

/// Outcome of [`verify_bundle`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleVerification {
    pub valid: bool,
    pub errors: Vec<BundleIssue>,
}

impl BundleVerification {
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(PrivacyError::BundleVerificationFailed(self.errors))
        }
    }
}

/// Check a bundle's proof, root and records, collecting every issue
pub fn verify_bundle(
    bundle: &BundledTransaction,
    backend: &dyn ProofBackend,
) -> BundleVerification {
    let mut errors = Vec::new();
    let txs = &bundle.transactions;
    let agg = &bundle.aggregated_proof;

    if txs.is_empty() {
        errors.push(BundleIssue::EmptyBundle);
    } else if txs.len() > MAX_BUNDLE_TRANSACTIONS {
        errors.push(BundleIssue::TooManyTransactions {
            got: txs.len(),
            max: MAX_BUNDLE_TRANSACTIONS,
        });
    }

    // Proof tags and counts
    if agg.protocol != AGGREGATE_PROTOCOL {
        errors.push(BundleIssue::ProtocolTag {
            found: agg.protocol.clone(),
        });
    }
    if agg.curve != PROOF_CURVE {
        errors.push(BundleIssue::CurveTag {
            found: agg.curve.clone(),
        });
    }
    if agg.tx_count != txs.len() || agg.validity_hashes.len() != txs.len() {
        errors.push(BundleIssue::TxCountMismatch {
            proof: agg.tx_count,
            actual: txs.len(),
        });
    }

    // Validity hashes and aggregate
    let hashes: Vec<[u8; 32]> = txs.iter().map(validity_hash).collect();
    for (index, (expected, claimed)) in hashes.iter().zip(agg.validity_hashes.iter()).enumerate() {
        if &hex::encode(expected) != claimed {
            errors.push(BundleIssue::ValidityHashMismatch { index });
        }
    }
    let aggregate = aggregate_commitment(&hashes);
    if aggregate != agg.aggregate_commitment {
        errors.push(BundleIssue::AggregateMismatch);
    }
    let statement = Statement::Aggregate {
        aggregate: agg.aggregate_commitment,
        tx_count: agg.tx_count,
    };
    if let Err(e) = backend.verify(&agg.proof, &statement) {
        errors.push(BundleIssue::ProofRejected {
            reason: e.to_string(),
        });
    }

    // Root recomputation
    let mut leaves = Vec::with_capacity(txs.len());
    for (index, tx) in txs.iter().enumerate() {
        match serialize_transaction(tx) {
            Ok(leaf) => leaves.push(leaf),
            Err(_) => errors.push(BundleIssue::Unserializable { index }),
        }
    }
    if leaves.len() == txs.len() {
        let root = BundleTree::build(&leaves, bundle.combine_mode).map(|t| t.root());
        if root != Some(bundle.merkle_root) || bundle.tree.root() != bundle.merkle_root {
            errors.push(BundleIssue::MerkleRootMismatch);
        }
    }

    // Per-record checks
    for (index, tx) in txs.iter().enumerate() {
        for (field, value) in [("id", &tx.id), ("from", &tx.from), ("to", &tx.to)] {
            if value.trim().is_empty() {
                errors.push(BundleIssue::MissingField {
                    index,
                    field: field.into(),
                });
            }
        }
        if !tx.amount.is_finite() || tx.amount <= 0.0 {
            errors.push(BundleIssue::NonPositiveAmount { index });
        }
    }

    BundleVerification {
        valid: errors.is_empty(),
        errors,
    }
}

/// Inclusion proof for the record at `index`
pub fn get_transaction_proof(bundle: &BundledTransaction, index: usize) -> Option<MerkleProof> {
    bundle.tree.proof(index)
}

/// Check a serialized record against an inclusion proof
pub fn verify_transaction_inclusion(
    serialized: &str,
    proof: &MerkleProof,
    mode: CombineMode,
) -> bool {
    verify_inclusion(serialized, proof, mode)
}
