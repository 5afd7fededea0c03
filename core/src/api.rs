//! Caller-facing privacy API
//!
//! One entry point wiring config, the record cipher, the proof backend,
//! the account and address registries, the payment ledger and the bundle
//! service together. Private key halves only cross this boundary sealed.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use shade_config::{CombineModeToml, ShadeConfig};
use shade_privacy::keys::{key_fingerprint, parse_public_key};
use shade_privacy::{
    BundleTransaction, BundleVerification, BundledTransaction, ChaChaCipher, CombineMode,
    EphemeralKeyPair, GasModel, KeyPair, MerkleProof, PaymentFactory, PrivatePayment,
    ProofBackend, Result, SealedKeyMaterial, ShieldedAccount, ShieldedAddress, StealthAddress,
    StealthKeyPair, StealthMetaKeys, StructuralBackend, SymmetricCipher, derive_stealth_address,
    recover_stealth_keypair,
};

use crate::bundles::{BundleService, BundleSettings, BundleStats};
use crate::payments::{PaymentLedger, PaymentStats};
use crate::scheduler::{Clock, SystemClock};
use crate::storage::{MemoryNullifierStore, MemoryRepository, Repository};

/// A freshly generated account: public keys, sealed private keys and a
/// first receiving address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAccount {
    pub account_id: String,
    pub keys: StealthMetaKeys,
    pub sealed: SealedKeyMaterial,
    pub stealth: StealthAddress,
    pub address: ShieldedAddress,
}

/// A one-time address derived for someone else's published keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub stealth: StealthAddress,
    pub address: ShieldedAddress,
}

pub struct PrivacyApi {
    cipher: Arc<dyn SymmetricCipher>,
    backend: Arc<dyn ProofBackend>,
    clock: Arc<dyn Clock>,
    accounts: Arc<dyn Repository<ShieldedAccount>>,
    addresses: Arc<dyn Repository<ShieldedAddress>>,
    payments: PaymentLedger,
    bundles: Arc<BundleService>,
}

fn combine_mode(mode: CombineModeToml) -> CombineMode {
    match mode {
        CombineModeToml::Positional => CombineMode::Positional,
        CombineModeToml::Sorted => CombineMode::Sorted,
    }
}

impl PrivacyApi {
    /// Build with in-memory stores, the structural backend and wall-clock time
    pub fn from_config(config: &ShadeConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &ShadeConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let cipher = Arc::new(ChaChaCipher::from_hex(config.privacy.encryption_key.as_deref())?);
        if !cipher.is_configured() {
            warn!("No encryption key configured; sealing operations will fail");
        }
        Ok(Self::with_parts(config, cipher, Arc::new(StructuralBackend), clock))
    }

    /// Build from explicit collaborators
    pub fn with_parts(
        config: &ShadeConfig,
        cipher: Arc<dyn SymmetricCipher>,
        backend: Arc<dyn ProofBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if !backend.is_sound() {
            warn!(
                "Proof backend '{}' is not sound: proofs are checked for structure only",
                backend.name()
            );
        }

        let factory = PaymentFactory::new(backend.clone(), cipher.clone())
            .with_min_key_len(config.privacy.min_spending_key_len);
        let payments = PaymentLedger::new(
            factory,
            Arc::new(MemoryRepository::new()),
            Arc::new(MemoryNullifierStore::new()),
            clock.clone(),
            config.privacy.root_history,
        );

        let settings = BundleSettings {
            max_transactions: config.bundle.effective_max_transactions(),
            settlement_delay_ms: config.bundle.settlement_delay_ms,
            combine_mode: combine_mode(config.bundle.combine_mode),
            gas: GasModel {
                per_tx_gas: config.bundle.per_tx_gas,
                verification_overhead_gas: config.bundle.verification_overhead_gas,
                marginal_gas: config.bundle.marginal_gas,
            },
        };
        let bundles = Arc::new(BundleService::new(
            Arc::new(MemoryRepository::new()),
            backend.clone(),
            clock.clone(),
            settings,
        ));

        Self {
            cipher,
            backend,
            clock,
            accounts: Arc::new(MemoryRepository::new()),
            addresses: Arc::new(MemoryRepository::new()),
            payments,
            bundles,
        }
    }

    pub fn payments(&self) -> &PaymentLedger {
        &self.payments
    }

    pub fn bundles(&self) -> Arc<BundleService> {
        self.bundles.clone()
    }

    pub fn backend(&self) -> &dyn ProofBackend {
        self.backend.as_ref()
    }

    // ========================================================================
    // Keys and addresses
    // ========================================================================

    /// Generate viewing/spending keys and a first receiving address
    ///
    /// The account and its address are registered before returning.
    pub fn generate_account(&self) -> Result<GeneratedAccount> {
        let keys = StealthKeyPair::generate();
        let account = ShieldedAccount::new(keys.seal(self.cipher.as_ref())?, self.clock.now_ms());
        let derived = self.derive_address(keys.viewing_public(), keys.spending_public())?;
        self.accounts.save(account.clone())?;
        debug!(
            "Generated account {} with address {}",
            account.account_id, derived.address.public_address
        );

        Ok(GeneratedAccount {
            account_id: account.account_id,
            keys: account.keys,
            sealed: account.sealed,
            stealth: derived.stealth,
            address: derived.address,
        })
    }

    /// Derive and register a one-time address for published keys with a
    /// fresh ephemeral key
    pub fn derive_address(
        &self,
        viewing_public: &[u8],
        spending_public: &[u8],
    ) -> Result<DerivedAddress> {
        let viewing = parse_public_key(viewing_public)?;
        let spending = parse_public_key(spending_public)?;
        let ephemeral = EphemeralKeyPair::generate();

        let stealth =
            derive_stealth_address(&viewing, &spending, &ephemeral, self.cipher.as_ref())?;
        let address =
            ShieldedAddress::from_stealth(&stealth, &viewing, &spending, self.clock.now_ms());
        self.addresses.save(address.clone())?;
        Ok(DerivedAddress { stealth, address })
    }

    /// Recover the one-time key pair behind an address from sealed keys
    pub fn recover_keypair(
        &self,
        sealed: &SealedKeyMaterial,
        ephemeral_public: &[u8],
    ) -> Result<KeyPair> {
        let keys = sealed.open(self.cipher.as_ref())?;
        recover_stealth_keypair(
            keys.viewing().secret_bytes(),
            keys.spending().secret_bytes(),
            ephemeral_public,
        )
    }

    pub fn get_account(&self, account_id: &str) -> Result<Option<ShieldedAccount>> {
        self.accounts.get(account_id)
    }

    /// Look up a registered address by its `zs1` string
    pub fn get_address(&self, public_address: &str) -> Result<Option<ShieldedAddress>> {
        self.addresses.get(public_address)
    }

    /// Every address registered for a viewing public key, oldest first
    pub fn addresses_for(&self, viewing_public: &[u8]) -> Result<Vec<ShieldedAddress>> {
        let reference = key_fingerprint(&parse_public_key(viewing_public)?);
        let mut found = self
            .addresses
            .list(&|a: &ShieldedAddress| a.viewing_key_ref == reference)?;
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    // ========================================================================
    // Payments
    // ========================================================================

    pub fn create_payment(
        &self,
        sender_key: &[u8],
        recipient: &str,
        amount: f64,
        memo: Option<&str>,
    ) -> Result<PrivatePayment> {
        self.payments.create_payment(sender_key, recipient, amount, memo)
    }

    pub fn submit_payment(&self, payment: PrivatePayment) -> Result<PrivatePayment> {
        self.payments.submit_payment(payment)
    }

    pub fn spend_payment(
        &self,
        payment_id: &str,
        spending_key: &[u8],
        new_recipient: &str,
        amount: f64,
    ) -> Result<PrivatePayment> {
        self.payments
            .spend_payment(payment_id, spending_key, new_recipient, amount)
    }

    pub fn verify_payment_inclusion(&self, payment_id: &str) -> Result<bool> {
        self.payments.verify_payment_inclusion(payment_id)
    }

    pub fn payment_stats(&self) -> Result<PaymentStats> {
        self.payments.stats()
    }

    // ========================================================================
    // Bundles
    // ========================================================================

    pub fn create_bundle(
        &self,
        transactions: Vec<BundleTransaction>,
    ) -> Result<BundledTransaction> {
        self.bundles.create_bundle(transactions)
    }

    pub fn verify_bundle(&self, bundle_id: &str) -> Result<BundleVerification> {
        self.bundles.verify(bundle_id)
    }

    pub fn submit_bundle(&self, bundle_id: &str) -> Result<BundledTransaction> {
        self.bundles.submit_bundle(bundle_id)
    }

    pub fn mark_bundle_submitted(&self, bundle_id: &str) -> Result<BundledTransaction> {
        self.bundles.mark_submitted(bundle_id)
    }

    pub fn cancel_settlement(&self, bundle_id: &str) -> bool {
        self.bundles.cancel_settlement(bundle_id)
    }

    pub fn settle_due(&self) -> Vec<String> {
        self.bundles.settle_due()
    }

    pub fn transaction_proof(&self, bundle_id: &str, index: usize) -> Result<Option<MerkleProof>> {
        self.bundles.transaction_proof(bundle_id, index)
    }

    pub fn verify_transaction_inclusion(
        &self,
        bundle_id: &str,
        serialized: &str,
        proof: &MerkleProof,
    ) -> Result<bool> {
        self.bundles.verify_inclusion(bundle_id, serialized, proof)
    }

    pub fn bundle_stats(&self) -> Result<BundleStats> {
        self.bundles.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use shade_privacy::PrivacyError;

    fn config() -> ShadeConfig {
        let mut config = ShadeConfig::default();
        config.privacy.encryption_key = Some(hex::encode([3u8; 32]));
        config
    }

    fn api() -> PrivacyApi {
        PrivacyApi::with_clock(&config(), Arc::new(ManualClock::new(0))).unwrap()
    }

    #[test]
    fn test_account_roundtrip() {
        let api = api();
        let account = api.generate_account().unwrap();

        let recovered = api
            .recover_keypair(&account.sealed, &account.stealth.ephemeral_public)
            .unwrap();
        assert_eq!(recovered.public_bytes(), &account.stealth.address);
        assert_eq!(account.address.public_address, account.stealth.shielded());
    }

    #[test]
    fn test_fails_closed_without_key() {
        let api =
            PrivacyApi::with_clock(&ShadeConfig::default(), Arc::new(ManualClock::new(0))).unwrap();
        assert_eq!(
            api.generate_account().unwrap_err(),
            PrivacyError::EncryptionKeyMissing
        );
    }

    #[test]
    fn test_generated_account_is_registered() {
        let api = api();
        let account = api.generate_account().unwrap();

        let stored = api.get_account(&account.account_id).unwrap().unwrap();
        assert_eq!(stored.keys, account.keys);
        assert_eq!(stored.sealed, account.sealed);
        assert_eq!(
            api.get_address(&account.address.public_address).unwrap(),
            Some(account.address)
        );
        assert!(api.get_account("missing").unwrap().is_none());
    }

    #[test]
    fn test_rejects_malformed_public_keys() {
        let api = api();
        assert!(matches!(
            api.derive_address(&[1u8; 31], &[2u8; 32]),
            Err(PrivacyError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_config_limits_bundles() {
        let mut config = config();
        config.bundle.max_transactions = 2;
        let api = PrivacyApi::with_clock(&config, Arc::new(ManualClock::new(0))).unwrap();
        let txs = (0..3)
            .map(|i| BundleTransaction::new(format!("t{}", i), "a", "b", 1.0))
            .collect();
        assert_eq!(
            api.create_bundle(txs).unwrap_err(),
            PrivacyError::BundleTooLarge { got: 3, max: 2 }
        );
    }

    #[test]
    fn test_sorted_mode_from_config() {
        let mut config = config();
        config.bundle.combine_mode = CombineModeToml::Sorted;
        let api = PrivacyApi::with_clock(&config, Arc::new(ManualClock::new(0))).unwrap();
        let bundle = api
            .create_bundle(vec![BundleTransaction::new("t", "a", "b", 1.0)])
            .unwrap();
        assert_eq!(bundle.combine_mode, CombineMode::Sorted);
    }
}
