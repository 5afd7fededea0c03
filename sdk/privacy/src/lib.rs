//! Shade Privacy SDK
//!
//! Stealth addresses, hidden-amount payments and bundle commitments for the
//! Shade trading dashboard.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Private Payment                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │ Stealth Addr │  │  Commitment  │  │   Nullifier Hash      │ │
//! │  │ (recipient)  │  │  (amount)    │  │   (spend once)        │ │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘ │
//! │         ▲                 │                     │               │
//! │   ECDH(e, V) + S          ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           ProofBackend (range + ownership)               │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//!
//!  Trading records ──► BundleTree (SHA-256) ──► root + aggregated proof
//! ```
//!
//! Everything in this crate is synchronous and free of shared state. The
//! nullifier set, stores and settlement timing live in `shade-core`.

pub mod bundle;
pub mod commitment;
pub mod ecdh;
pub mod encryption;
pub mod errors;
pub mod field;
pub mod keys;
pub mod merkle;
pub mod nullifier;
pub mod payment;
pub mod proof;
pub mod stealth;

pub use bundle::{
    AggregatedProof, BundleIssue, BundleStatus, BundleTransaction, BundleVerification,
    BundledTransaction, GasEstimate, GasModel, MAX_BUNDLE_TRANSACTIONS, create_transaction_bundle,
    get_transaction_proof, serialize_transaction, verify_bundle, verify_transaction_inclusion,
};
pub use commitment::{Commitment, CommitmentScheme};
pub use ecdh::{SharedSecret, derive_shared_secret};
pub use encryption::{ChaChaCipher, SymmetricCipher};
pub use errors::{PrivacyError, Result};
pub use keys::{
    EphemeralKeyPair, KeyPair, SealedKeyMaterial, ShieldedAccount, StealthKeyPair, StealthMetaKeys,
};
pub use merkle::{BundleTree, CombineMode, CommitmentTree, MerkleHasher, MerkleProof, RootHistory};
pub use nullifier::{Nullifier, NullifierHash, NullifierKey};
pub use payment::{
    AmountOpening, LAMPORTS_PER_SOL, PaymentFactory, PaymentStatus, PrivatePayment,
    sol_to_lamports, verify_private_payment,
};
pub use proof::{ProofBackend, ProofType, Statement, StructuralBackend, StructuralProof};
pub use stealth::{
    ShieldedAddress, StealthAddress, derive_stealth_address, recover_stealth_keypair,
    validate_shielded_address,
};
