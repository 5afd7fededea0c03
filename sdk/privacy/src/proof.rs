//! Proof Backends
//!
//! Proof objects shaped like a Groth16 proof (`pi_a`, `pi_b`, `pi_c`,
//! public signals, protocol/curve tags). The default `StructuralBackend`
//! derives every field element by hashing the public statement, so its
//! proofs are checked for shape and hash consistency only.
//!
//! **`StructuralBackend` is not sound.** Anyone who knows the public
//! statement can produce a proof that verifies. A real proving system can be
//! plugged in behind `ProofBackend` without touching callers; check
//! `ProofBackend::is_sound` before relying on a proof for anything but
//! integrity of well-formed records.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::commitment::Commitment;
use crate::errors::{PrivacyError, Result};

/// Protocol tag carried by structural proofs
pub const PROOF_PROTOCOL: &str = "shade-structural-v1";
/// Curve tag carried by structural proofs
pub const PROOF_CURVE: &str = "bn128";
/// Hex length of a serialized field element
pub const FIELD_ELEMENT_HEX_LEN: usize = 64;
/// Widest amount a range proof may assert
pub const MAX_RANGE_BITS: u32 = 64;

const PROOF_DOMAIN: &[u8] = b"shade/proof/v1";

/// What a proof claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofType {
    /// Committed amount is non-negative and fits in `bit_width` bits
    Range,
    /// Commitment is bound to a recipient at a timestamp
    Ownership,
    /// Aggregate validity of a bundle's transactions
    Aggregate,
}

/// Groth16-shaped proof object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralProof {
    pub protocol: String,
    pub curve: String,
    pub proof_type: ProofType,
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    pub public_signals: Vec<String>,
}

/// Public statement a proof is produced for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Range {
        commitment: Commitment,
        bit_width: u32,
    },
    Ownership {
        commitment: Commitment,
        recipient: String,
        timestamp: u64,
    },
    Aggregate {
        aggregate: [u8; 32],
        tx_count: usize,
    },
}

impl Statement {
    pub fn proof_type(&self) -> ProofType {
        match self {
            Statement::Range { .. } => ProofType::Range,
            Statement::Ownership { .. } => ProofType::Ownership,
            Statement::Aggregate { .. } => ProofType::Aggregate,
        }
    }

    /// Public signals as they appear in the proof object
    pub fn public_signals(&self) -> Vec<String> {
        match self {
            Statement::Range {
                commitment,
                bit_width,
            } => vec![commitment.to_hex(), bit_width.to_string()],
            Statement::Ownership {
                commitment,
                recipient,
                timestamp,
            } => vec![
                commitment.to_hex(),
                hex::encode(ownership_binding(commitment, recipient, *timestamp)),
                timestamp.to_string(),
            ],
            Statement::Aggregate {
                aggregate,
                tx_count,
            } => vec![hex::encode(aggregate), tx_count.to_string()],
        }
    }

    fn transcript(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(self.proof_type() as u8);
        for signal in self.public_signals() {
            bytes.extend_from_slice(&(signal.len() as u32).to_le_bytes());
            bytes.extend_from_slice(signal.as_bytes());
        }
        bytes
    }
}

/// Binds a commitment to its recipient and creation time
pub fn ownership_binding(commitment: &Commitment, recipient: &str, timestamp: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"shade/ownership/v1");
    hasher.update(commitment.as_bytes());
    hasher.update(recipient.as_bytes());
    hasher.update(timestamp.to_le_bytes());
    hasher.finalize().into()
}

/// Capability interface for producing and checking proofs
pub trait ProofBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether verification gives a cryptographic soundness guarantee
    fn is_sound(&self) -> bool;

    fn prove(&self, statement: &Statement) -> Result<StructuralProof>;

    /// `Ok(())` when the proof is acceptable for `statement`, otherwise
    /// `StructuralProofInvalid` naming the first defect found.
    fn verify(&self, proof: &StructuralProof, statement: &Statement) -> Result<()>;
}

/// Default, non-sound backend: shape and hash-consistency checks only
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralBackend;

impl StructuralBackend {
    fn element(transcript: &[u8], label: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(PROOF_DOMAIN);
        hasher.update(label);
        hasher.update(transcript);
        hex::encode(hasher.finalize())
    }

    fn one() -> String {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        hex::encode(bytes)
    }

    fn zero() -> String {
        hex::encode([0u8; 32])
    }
}

impl ProofBackend for StructuralBackend {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn is_sound(&self) -> bool {
        false
    }

    fn prove(&self, statement: &Statement) -> Result<StructuralProof> {
        if let Statement::Range { bit_width, .. } = statement {
            if *bit_width == 0 || *bit_width > MAX_RANGE_BITS {
                return Err(PrivacyError::StructuralProofInvalid(format!(
                    "unsupported range width {}",
                    bit_width
                )));
            }
        }

        let t = statement.transcript();
        Ok(StructuralProof {
            protocol: PROOF_PROTOCOL.into(),
            curve: PROOF_CURVE.into(),
            proof_type: statement.proof_type(),
            pi_a: vec![Self::element(&t, b"a0"), Self::element(&t, b"a1"), Self::one()],
            pi_b: vec![
                vec![Self::element(&t, b"b00"), Self::element(&t, b"b01")],
                vec![Self::element(&t, b"b10"), Self::element(&t, b"b11")],
                vec![Self::one(), Self::zero()],
            ],
            pi_c: vec![Self::element(&t, b"c0"), Self::element(&t, b"c1"), Self::one()],
            public_signals: statement.public_signals(),
        })
    }

    fn verify(&self, proof: &StructuralProof, statement: &Statement) -> Result<()> {
        check_shape(proof)?;

        if proof.proof_type != statement.proof_type() {
            return Err(invalid(format!(
                "expected {:?} proof, got {:?}",
                statement.proof_type(),
                proof.proof_type
            )));
        }
        if proof.public_signals != statement.public_signals() {
            return Err(invalid("public signals do not match statement"));
        }

        let expected = self.prove(statement)?;
        if proof.pi_a != expected.pi_a || proof.pi_b != expected.pi_b || proof.pi_c != expected.pi_c
        {
            return Err(invalid("proof elements inconsistent with statement"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> PrivacyError {
    PrivacyError::StructuralProofInvalid(reason.into())
}

/// Tag and shape checks shared by every backend producing this proof format
pub fn check_shape(proof: &StructuralProof) -> Result<()> {
    if proof.protocol != PROOF_PROTOCOL {
        return Err(invalid(format!("unknown protocol tag '{}'", proof.protocol)));
    }
    if proof.curve != PROOF_CURVE {
        return Err(invalid(format!("unknown curve tag '{}'", proof.curve)));
    }
    if proof.pi_a.len() != 3 || proof.pi_c.len() != 3 {
        return Err(invalid("pi_a and pi_c must have 3 elements"));
    }
    if proof.pi_b.len() != 3 || proof.pi_b.iter().any(|row| row.len() != 2) {
        return Err(invalid("pi_b must be a 3x2 matrix"));
    }

    let elements = proof
        .pi_a
        .iter()
        .chain(proof.pi_b.iter().flatten())
        .chain(proof.pi_c.iter());
    for element in elements {
        if element.len() != FIELD_ELEMENT_HEX_LEN || !element.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(invalid("field element has wrong length or encoding"));
        }
    }
    if proof.public_signals.is_empty() {
        return Err(invalid("missing public signals"));
    }
    Ok(())
}
