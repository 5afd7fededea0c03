//! Payment Ledger
//!
//! Owns the payment pool, the global nullifier set and the commitment tree
//! of confirmed payments.
//!
//! ```text
//! Payment Lifecycle:
//!
//!   create ──► Pending ──submit──► Confirmed ──spend──► Spent
//!                          │                    │
//!                          │                    └──► new payment (submitted)
//!                          ▼
//!       verify → check tree capacity → insert_if_absent(nullifier_hash) → append leaf
//! ```
//!
//! A nullifier hash enters the set at most once and is never removed; the
//! insert is the single point that decides which of two racing submissions
//! wins.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use shade_privacy::merkle::{CommitmentTree, RootHistory};
use shade_privacy::{
    MerkleProof, PaymentFactory, PaymentStatus, PrivacyError, PrivatePayment, Result,
    verify_private_payment,
};

use crate::scheduler::Clock;
use crate::storage::{NullifierStore, Repository};

/// Payment pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub spent: usize,
    pub nullifiers: usize,
}

struct CommitmentState {
    tree: CommitmentTree,
    history: RootHistory,
}

/// Creates, confirms and spends private payments
pub struct PaymentLedger {
    factory: PaymentFactory,
    payments: Arc<dyn Repository<PrivatePayment>>,
    nullifiers: Arc<dyn NullifierStore>,
    commitments: Mutex<CommitmentState>,
    clock: Arc<dyn Clock>,
}

impl PaymentLedger {
    pub fn new(
        factory: PaymentFactory,
        payments: Arc<dyn Repository<PrivatePayment>>,
        nullifiers: Arc<dyn NullifierStore>,
        clock: Arc<dyn Clock>,
        root_history: usize,
    ) -> Self {
        let tree = CommitmentTree::new();
        let mut history = RootHistory::new(root_history);
        history.push(tree.root());

        Self {
            factory,
            payments,
            nullifiers,
            commitments: Mutex::new(CommitmentState { tree, history }),
            clock,
        }
    }

    /// Replace the commitment tree with an empty one of the given depth
    pub fn with_commitment_depth(mut self, depth: usize) -> Self {
        if let Ok(state) = self.commitments.get_mut() {
            state.tree = CommitmentTree::with_depth(depth);
            state.history = RootHistory::new(state.history.max_size());
            state.history.push(state.tree.root());
        }
        self
    }

    pub fn factory(&self) -> &PaymentFactory {
        &self.factory
    }

    fn commitments(&self) -> Result<MutexGuard<'_, CommitmentState>> {
        self.commitments
            .lock()
            .map_err(|_| PrivacyError::Storage("commitment tree lock poisoned".into()))
    }

    /// Create a payment and store it as `Pending`
    pub fn create_payment(
        &self,
        sender_key: &[u8],
        recipient: &str,
        amount: f64,
        memo: Option<&str>,
    ) -> Result<PrivatePayment> {
        let payment = self.factory.create_private_payment(
            sender_key,
            recipient,
            amount,
            memo,
            self.clock.now_ms(),
        )?;
        self.payments.save(payment.clone())?;
        debug!("Created payment {} (commitment {})", payment.id, payment.commitment.to_hex());
        Ok(payment)
    }

    /// Verify, consume the nullifier hash and confirm a payment
    ///
    /// A collision on the nullifier hash is `DoubleSpend` and leaves the
    /// payment as it was. A full commitment tree is refused before the
    /// nullifier hash is consumed.
    pub fn submit_payment(&self, payment: PrivatePayment) -> Result<PrivatePayment> {
        if let Err(e) = verify_private_payment(&payment, self.factory.backend()) {
            warn!("Rejected payment {}: {}", payment.id, e);
            return Err(e);
        }

        let mut state = self.commitments()?;
        Self::ensure_capacity(&state)?;
        self.confirm(&mut state, payment)
    }

    fn ensure_capacity(state: &CommitmentState) -> Result<()> {
        if state.tree.is_full() {
            warn!("Commitment tree is full ({} leaves)", state.tree.capacity());
            return Err(PrivacyError::Storage("commitment tree is full".into()));
        }
        Ok(())
    }

    /// Consume the nullifier hash and append the commitment.
    ///
    /// Callers hold the commitment lock and have checked capacity, so once
    /// the nullifier hash is in the set the leaf append cannot fail.
    fn confirm(
        &self,
        state: &mut CommitmentState,
        mut payment: PrivatePayment,
    ) -> Result<PrivatePayment> {
        if !self.nullifiers.insert_if_absent(&payment.nullifier_hash)? {
            warn!(
                "Double spend attempt: payment {} reuses nullifier {}",
                payment.id, payment.nullifier_hash
            );
            return Err(PrivacyError::DoubleSpend(payment.nullifier_hash.to_hex()));
        }

        let index = state
            .tree
            .insert(payment.commitment.as_bytes())
            .ok_or_else(|| PrivacyError::Storage("commitment tree is full".into()))?;
        let root = state.tree.root();
        state.history.push(root);

        payment.status = PaymentStatus::Confirmed;
        payment.merkle_root = Some(hex::encode(root));
        payment.merkle_index = Some(index);
        self.payments.save(payment.clone())?;

        info!("Payment {} confirmed at leaf {}", payment.id, index);
        Ok(payment)
    }

    /// Spend a confirmed payment into a new payment to `new_recipient`
    ///
    /// The spend nullifier is derived from `spending_key` and the original
    /// commitment, so the key that created the payment cannot spend it.
    pub fn spend_payment(
        &self,
        payment_id: &str,
        spending_key: &[u8],
        new_recipient: &str,
        amount: f64,
    ) -> Result<PrivatePayment> {
        let original = self
            .payments
            .get(payment_id)?
            .ok_or_else(|| PrivacyError::PaymentNotFound(payment_id.to_string()))?;

        match original.status {
            PaymentStatus::Spent => {
                return Err(PrivacyError::DoubleSpend(original.nullifier_hash.to_hex()));
            }
            PaymentStatus::Pending => {
                return Err(PrivacyError::PaymentNotSpendable {
                    id: original.id,
                    status: original.status.to_string(),
                });
            }
            PaymentStatus::Confirmed => {}
        }

        let key = self.factory.spending_key(spending_key)?;
        let spend_hash = key.derive_nullifier(&original.commitment).hash();

        // Build the output first so a bad recipient or amount consumes nothing
        let output = self.factory.create_private_payment(
            spending_key,
            new_recipient,
            amount,
            None,
            self.clock.now_ms(),
        )?;
        verify_private_payment(&output, self.factory.backend())?;

        let mut state = self.commitments()?;
        Self::ensure_capacity(&state)?;

        if !self.nullifiers.insert_if_absent(&spend_hash)? {
            warn!("Double spend attempt on payment {}", payment_id);
            return Err(PrivacyError::DoubleSpend(spend_hash.to_hex()));
        }

        self.payments.update(payment_id, &mut |p: &mut PrivatePayment| {
            if p.status != PaymentStatus::Confirmed {
                return Err(PrivacyError::DoubleSpend(p.nullifier_hash.to_hex()));
            }
            p.status = PaymentStatus::Spent;
            Ok(())
        })?;
        info!("Payment {} spent", payment_id);

        self.payments.save(output.clone())?;
        self.confirm(&mut state, output)
    }

    pub fn get_payment(&self, payment_id: &str) -> Result<Option<PrivatePayment>> {
        self.payments.get(payment_id)
    }

    pub fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<PrivatePayment>> {
        self.payments
            .list(&|p: &PrivatePayment| status.is_none_or(|s| p.status == s))
    }

    pub fn is_nullifier_spent(&self, hash: &shade_privacy::NullifierHash) -> Result<bool> {
        self.nullifiers.contains(hash)
    }

    /// Current commitment-tree root
    pub fn commitment_root(&self) -> Result<[u8; 32]> {
        Ok(self.commitments()?.tree.root())
    }

    /// Whether `root` is among the recent commitment-tree roots
    pub fn is_known_root(&self, root: &[u8; 32]) -> Result<bool> {
        Ok(self.commitments()?.history.is_valid(root))
    }

    /// Inclusion proof of a confirmed payment against the current root
    pub fn payment_proof(&self, payment_id: &str) -> Result<Option<MerkleProof>> {
        let payment = self
            .payments
            .get(payment_id)?
            .ok_or_else(|| PrivacyError::PaymentNotFound(payment_id.to_string()))?;
        let Some(index) = payment.merkle_index else {
            return Ok(None);
        };
        Ok(self.commitments()?.tree.proof(index))
    }

    /// Check that a confirmed payment's commitment is in the tree
    pub fn verify_payment_inclusion(&self, payment_id: &str) -> Result<bool> {
        let payment = self
            .payments
            .get(payment_id)?
            .ok_or_else(|| PrivacyError::PaymentNotFound(payment_id.to_string()))?;
        let Some(index) = payment.merkle_index else {
            return Ok(false);
        };

        let state = self.commitments()?;
        let Some(proof) = state.tree.proof(index) else {
            return Ok(false);
        };
        let leaf = state.tree.leaf_hash(payment.commitment.as_bytes());
        Ok(proof.verify_leaf_hash(&leaf, shade_privacy::CombineMode::Positional)
            && state.history.is_valid(&proof.root))
    }

    pub fn stats(&self) -> Result<PaymentStats> {
        let all = self.payments.list(&|_: &PrivatePayment| true)?;
        let count = |status| all.iter().filter(|p| p.status == status).count();
        Ok(PaymentStats {
            total: all.len(),
            pending: count(PaymentStatus::Pending),
            confirmed: count(PaymentStatus::Confirmed),
            spent: count(PaymentStatus::Spent),
            nullifiers: self.nullifiers.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use crate::storage::{MemoryNullifierStore, MemoryRepository};
    use shade_privacy::{ChaChaCipher, StructuralBackend};

    const SENDER: [u8; 32] = [7u8; 32];
    const RECEIVER: [u8; 32] = [9u8; 32];

    fn recipient() -> String {
        format!("zs1{}", "0a".repeat(32))
    }

    fn ledger() -> PaymentLedger {
        let factory = PaymentFactory::new(
            Arc::new(StructuralBackend),
            Arc::new(ChaChaCipher::new([1u8; 32])),
        );
        PaymentLedger::new(
            factory,
            Arc::new(MemoryRepository::new()),
            Arc::new(MemoryNullifierStore::new()),
            Arc::new(ManualClock::new(1_000)),
            10,
        )
    }

    #[test]
    fn test_create_is_pending() {
        let ledger = ledger();
        let p = ledger.create_payment(&SENDER, &recipient(), 2.5, None).unwrap();
        assert_eq!(p.status, PaymentStatus::Pending);
        assert_eq!(p.created_at, 1_000);
        assert_eq!(ledger.get_payment(&p.id).unwrap(), Some(p));
    }

    #[test]
    fn test_submit_confirms_and_records_leaf() {
        let ledger = ledger();
        let p = ledger.create_payment(&SENDER, &recipient(), 2.5, None).unwrap();
        let confirmed = ledger.submit_payment(p).unwrap();

        assert_eq!(confirmed.status, PaymentStatus::Confirmed);
        assert_eq!(confirmed.merkle_index, Some(0));
        assert_eq!(
            confirmed.merkle_root.as_deref(),
            Some(hex::encode(ledger.commitment_root().unwrap()).as_str())
        );
        assert!(ledger.verify_payment_inclusion(&confirmed.id).unwrap());
        assert!(ledger.is_nullifier_spent(&confirmed.nullifier_hash).unwrap());
    }

    #[test]
    fn test_resubmission_is_double_spend() {
        let ledger = ledger();
        let p = ledger.create_payment(&SENDER, &recipient(), 1.0, None).unwrap();
        let confirmed = ledger.submit_payment(p.clone()).unwrap();
        let before = ledger.stats().unwrap().nullifiers;

        assert!(matches!(
            ledger.submit_payment(p),
            Err(PrivacyError::DoubleSpend(_))
        ));
        assert_eq!(ledger.stats().unwrap().nullifiers, before);
        assert_eq!(
            ledger.get_payment(&confirmed.id).unwrap().unwrap().status,
            PaymentStatus::Confirmed
        );
    }

    #[test]
    fn test_full_tree_keeps_nullifier_unspent() {
        let ledger = ledger().with_commitment_depth(1);
        for _ in 0..2 {
            let p = ledger.create_payment(&SENDER, &recipient(), 1.0, None).unwrap();
            ledger.submit_payment(p).unwrap();
        }
        let root = ledger.commitment_root().unwrap();
        let before = ledger.stats().unwrap().nullifiers;

        let p = ledger.create_payment(&SENDER, &recipient(), 1.0, None).unwrap();
        assert!(matches!(
            ledger.submit_payment(p.clone()),
            Err(PrivacyError::Storage(_))
        ));
        assert_eq!(ledger.stats().unwrap().nullifiers, before);
        assert!(!ledger.is_nullifier_spent(&p.nullifier_hash).unwrap());
        assert_eq!(ledger.commitment_root().unwrap(), root);
        assert_eq!(
            ledger.get_payment(&p.id).unwrap().unwrap().status,
            PaymentStatus::Pending
        );

        // a retry fails the same way instead of reporting a double spend
        assert!(matches!(
            ledger.submit_payment(p),
            Err(PrivacyError::Storage(_))
        ));
    }

    #[test]
    fn test_spend_on_full_tree_consumes_nothing() {
        let ledger = ledger().with_commitment_depth(1);
        let first = ledger.create_payment(&SENDER, &recipient(), 2.0, None).unwrap();
        let first = ledger.submit_payment(first).unwrap();
        let second = ledger.create_payment(&SENDER, &recipient(), 1.0, None).unwrap();
        ledger.submit_payment(second).unwrap();
        let before = ledger.stats().unwrap().nullifiers;

        assert!(matches!(
            ledger.spend_payment(&first.id, &RECEIVER, &recipient(), 1.0),
            Err(PrivacyError::Storage(_))
        ));
        assert_eq!(ledger.stats().unwrap().nullifiers, before);
        assert_eq!(
            ledger.get_payment(&first.id).unwrap().unwrap().status,
            PaymentStatus::Confirmed
        );
    }

    #[test]
    fn test_spend_flow() {
        let ledger = ledger();
        let p = ledger.create_payment(&SENDER, &recipient(), 3.0, None).unwrap();

        assert!(matches!(
            ledger.spend_payment(&p.id, &RECEIVER, &recipient(), 1.0),
            Err(PrivacyError::PaymentNotSpendable { .. })
        ));

        let p = ledger.submit_payment(p).unwrap();
        let output = ledger
            .spend_payment(&p.id, &RECEIVER, &recipient(), 1.0)
            .unwrap();
        assert_eq!(output.status, PaymentStatus::Confirmed);
        assert_eq!(
            ledger.get_payment(&p.id).unwrap().unwrap().status,
            PaymentStatus::Spent
        );

        assert!(matches!(
            ledger.spend_payment(&p.id, &RECEIVER, &recipient(), 1.0),
            Err(PrivacyError::DoubleSpend(_))
        ));

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.spent, 1);
        assert_eq!(stats.confirmed, 1);
        // original, spend, output
        assert_eq!(stats.nullifiers, 3);
    }

    #[test]
    fn test_creator_key_cannot_spend() {
        let ledger = ledger();
        let p = ledger.create_payment(&SENDER, &recipient(), 3.0, None).unwrap();
        let p = ledger.submit_payment(p).unwrap();

        assert!(matches!(
            ledger.spend_payment(&p.id, &SENDER, &recipient(), 1.0),
            Err(PrivacyError::DoubleSpend(_))
        ));
        assert_eq!(
            ledger.get_payment(&p.id).unwrap().unwrap().status,
            PaymentStatus::Confirmed
        );
    }

    #[test]
    fn test_spend_unknown_payment() {
        assert!(matches!(
            ledger().spend_payment("pay_missing", &RECEIVER, &recipient(), 1.0),
            Err(PrivacyError::PaymentNotFound(_))
        ));
    }

    #[test]
    fn test_root_history_tracks_confirmations() {
        let ledger = ledger();
        let empty_root = ledger.commitment_root().unwrap();
        for _ in 0..3 {
            let p = ledger.create_payment(&SENDER, &recipient(), 1.0, None).unwrap();
            ledger.submit_payment(p).unwrap();
        }
        assert!(ledger.is_known_root(&empty_root).unwrap());
        assert!(ledger.is_known_root(&ledger.commitment_root().unwrap()).unwrap());
        assert!(!ledger.is_known_root(&[0xffu8; 32]).unwrap());
        assert_eq!(ledger.list_payments(Some(PaymentStatus::Confirmed)).unwrap().len(), 3);
    }
}
