//! Bundle Service
//!
//! Stores bundles, runs verification on submit and drives verified bundles
//! to `Confirmed` through the settlement scheduler.
//!
//! ```text
//! ┌──────────┐  create   ┌─────────┐  submit   ┌──────────┐  due   ┌───────────┐
//! │  records │─────────▶│ Pending │─────────▶│ Verified │──────▶│ Confirmed │
//! └──────────┘           └─────────┘    │      └──────────┘       └───────────┘
//!                                       │           │ mark_submitted     ▲
//!                                       │           ▼                    │
//!                                       │      ┌───────────┐    due      │
//!                                       │      │ Submitted │─────────────┘
//!                                       ▼      └───────────┘
//!                                  ┌────────┐
//!                                  │ Failed │
//!                                  └────────┘
//! ```

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use shade_privacy::{
    BundleStatus, BundleTransaction, BundleVerification, BundledTransaction, CombineMode, GasModel,
    MerkleProof, PrivacyError, ProofBackend, Result, create_transaction_bundle,
    get_transaction_proof, verify_bundle, verify_transaction_inclusion,
};

use crate::scheduler::{Clock, SettlementScheduler};
use crate::storage::Repository;

/// Bundle engine settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleSettings {
    pub max_transactions: usize,
    pub settlement_delay_ms: u64,
    pub combine_mode: CombineMode,
    pub gas: GasModel,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            max_transactions: shade_privacy::MAX_BUNDLE_TRANSACTIONS,
            settlement_delay_ms: 3_000,
            combine_mode: CombineMode::Positional,
            gas: GasModel::default(),
        }
    }
}

/// Bundle pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleStats {
    pub total: usize,
    pub pending: usize,
    pub verified: usize,
    pub submitted: usize,
    pub confirmed: usize,
    pub failed: usize,
    /// Records across all bundles
    pub transactions: usize,
    pub average_compression_ratio: f64,
    pub gas_saved: u64,
}

pub struct BundleService {
    bundles: Arc<dyn Repository<BundledTransaction>>,
    backend: Arc<dyn ProofBackend>,
    scheduler: SettlementScheduler,
    clock: Arc<dyn Clock>,
    settings: BundleSettings,
}

impl BundleService {
    pub fn new(
        bundles: Arc<dyn Repository<BundledTransaction>>,
        backend: Arc<dyn ProofBackend>,
        clock: Arc<dyn Clock>,
        settings: BundleSettings,
    ) -> Self {
        Self {
            bundles,
            backend,
            scheduler: SettlementScheduler::new(),
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &BundleSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &SettlementScheduler {
        &self.scheduler
    }

    fn load(&self, bundle_id: &str) -> Result<BundledTransaction> {
        self.bundles
            .get(bundle_id)?
            .ok_or_else(|| PrivacyError::BundleNotFound(bundle_id.to_string()))
    }

    fn transition(&self, bundle_id: &str, next: BundleStatus) -> Result<BundledTransaction> {
        self.bundles
            .update(bundle_id, &mut |b: &mut BundledTransaction| b.transition(next))?
            .ok_or_else(|| PrivacyError::BundleNotFound(bundle_id.to_string()))
    }

    /// Build and store a `Pending` bundle
    pub fn create_bundle(
        &self,
        transactions: Vec<BundleTransaction>,
    ) -> Result<BundledTransaction> {
        let bundle = create_transaction_bundle(
            transactions,
            self.settings.max_transactions,
            &self.settings.gas,
            self.settings.combine_mode,
            self.backend.as_ref(),
            self.clock.now_ms(),
        )?;
        self.bundles.save(bundle.clone())?;
        info!(
            "Created bundle {} with {} transactions (root {}, ratio {:.2})",
            bundle.bundle_id,
            bundle.transactions.len(),
            bundle.merkle_root_hex(),
            bundle.compression_ratio
        );
        Ok(bundle)
    }

    pub fn get_bundle(&self, bundle_id: &str) -> Result<Option<BundledTransaction>> {
        self.bundles.get(bundle_id)
    }

    /// Run every bundle check without changing its status
    pub fn verify(&self, bundle_id: &str) -> Result<BundleVerification> {
        let bundle = self.load(bundle_id)?;
        Ok(verify_bundle(&bundle, self.backend.as_ref()))
    }

    /// Verify a bundle and schedule its settlement
    ///
    /// On failure the bundle moves to `Failed` and every issue found is
    /// returned. On success it moves to `Verified` and settles after the
    /// configured delay; this call never waits for that.
    pub fn submit_bundle(&self, bundle_id: &str) -> Result<BundledTransaction> {
        let bundle = self.load(bundle_id)?;
        let verification = verify_bundle(&bundle, self.backend.as_ref());

        if !verification.valid {
            warn!(
                "Bundle {} failed verification with {} issue(s)",
                bundle_id,
                verification.errors.len()
            );
            self.transition(bundle_id, BundleStatus::Failed)?;
            return Err(PrivacyError::BundleVerificationFailed(verification.errors));
        }

        let verified = self.transition(bundle_id, BundleStatus::Verified)?;
        let due_at = self.clock.now_ms().saturating_add(self.settings.settlement_delay_ms);
        self.scheduler.schedule(bundle_id, due_at);
        info!("Bundle {} verified, settles at {}", bundle_id, due_at);
        Ok(verified)
    }

    /// Record hand-off to the external ledger (`Verified` -> `Submitted`)
    pub fn mark_submitted(&self, bundle_id: &str) -> Result<BundledTransaction> {
        let bundle = self.transition(bundle_id, BundleStatus::Submitted)?;
        info!("Bundle {} submitted", bundle_id);
        Ok(bundle)
    }

    /// Move a bundle to `Failed` and drop any pending settlement
    pub fn fail_bundle(&self, bundle_id: &str) -> Result<BundledTransaction> {
        let bundle = self.transition(bundle_id, BundleStatus::Failed)?;
        self.scheduler.cancel(bundle_id);
        warn!("Bundle {} marked failed", bundle_id);
        Ok(bundle)
    }

    /// Drop a pending settlement; the bundle keeps its current status
    pub fn cancel_settlement(&self, bundle_id: &str) -> bool {
        let cancelled = self.scheduler.cancel(bundle_id);
        if cancelled {
            info!("Settlement of bundle {} cancelled", bundle_id);
        }
        cancelled
    }

    /// Confirm every bundle whose settlement is due; returns their ids
    pub fn settle_due(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut confirmed = Vec::new();

        for bundle_id in self.scheduler.take_due(now) {
            match self.transition(&bundle_id, BundleStatus::Confirmed) {
                Ok(_) => {
                    info!("Bundle {} confirmed", bundle_id);
                    confirmed.push(bundle_id);
                }
                Err(e) => warn!("Could not settle bundle {}: {}", bundle_id, e),
            }
        }
        confirmed
    }

    pub fn transaction_proof(&self, bundle_id: &str, index: usize) -> Result<Option<MerkleProof>> {
        let bundle = self.load(bundle_id)?;
        Ok(get_transaction_proof(&bundle, index))
    }

    /// Check a serialized record against a proof and the bundle's root
    pub fn verify_inclusion(
        &self,
        bundle_id: &str,
        serialized: &str,
        proof: &MerkleProof,
    ) -> Result<bool> {
        let bundle = self.load(bundle_id)?;
        Ok(proof.root == bundle.merkle_root
            && verify_transaction_inclusion(serialized, proof, bundle.combine_mode))
    }

    pub fn stats(&self) -> Result<BundleStats> {
        let all = self.bundles.list(&|_: &BundledTransaction| true)?;
        let count = |status| all.iter().filter(|b| b.status == status).count();

        let average_compression_ratio = if all.is_empty() {
            0.0
        } else {
            all.iter().map(|b| b.compression_ratio).sum::<f64>() / all.len() as f64
        };

        Ok(BundleStats {
            total: all.len(),
            pending: count(BundleStatus::Pending),
            verified: count(BundleStatus::Verified),
            submitted: count(BundleStatus::Submitted),
            confirmed: count(BundleStatus::Confirmed),
            failed: count(BundleStatus::Failed),
            transactions: all.iter().map(|b| b.transactions.len()).sum(),
            average_compression_ratio,
            gas_saved: all.iter().map(|b| b.gas_estimate.saved).sum(),
        })
    }
}

/// Shortest poll period the settlement driver will use
pub const MIN_SETTLEMENT_POLL: Duration = Duration::from_millis(1);

/// Poll `settle_due` on an interval until the task is aborted
///
/// Periods below `MIN_SETTLEMENT_POLL` (including zero) are raised to it.
pub fn spawn_settlement_driver(
    service: Arc<BundleService>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    let poll_interval = poll_interval.max(MIN_SETTLEMENT_POLL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            let settled = service.settle_due();
            if !settled.is_empty() {
                info!("Settlement driver confirmed {} bundle(s)", settled.len());
            }
        }
    })
}
