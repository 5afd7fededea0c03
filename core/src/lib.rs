//! Shade Core
//!
//! Stateful services on top of `shade-privacy`: the payment ledger with its
//! nullifier set and commitment tree, the bundle service with settlement
//! scheduling, the storage seams they depend on, and the caller-facing API.

pub mod api;
pub mod bundles;
pub mod payments;
pub mod scheduler;
pub mod storage;

pub use api::{DerivedAddress, GeneratedAccount, PrivacyApi};
pub use bundles::{BundleService, BundleSettings, BundleStats, spawn_settlement_driver};
pub use payments::{PaymentLedger, PaymentStats};
pub use scheduler::{Clock, ManualClock, SettlementScheduler, SystemClock};
