//! Persistence seams
//!
//! The ledger and bundle service only talk to these traits, so any store
//! that can give per-record atomic updates and an atomic
//! check-and-insert for nullifiers can back them.

pub mod memory;

pub use memory::{MemoryNullifierStore, MemoryRepository};

use shade_privacy::{
    BundledTransaction, NullifierHash, PrivatePayment, Result, ShieldedAccount, ShieldedAddress,
};

/// A stored record addressed by a string id
pub trait Record: Clone + Send + Sync + 'static {
    fn record_id(&self) -> &str;
}

impl Record for ShieldedAccount {
    fn record_id(&self) -> &str {
        &self.account_id
    }
}

impl Record for ShieldedAddress {
    fn record_id(&self) -> &str {
        &self.public_address
    }
}

impl Record for PrivatePayment {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Record for BundledTransaction {
    fn record_id(&self) -> &str {
        &self.bundle_id
    }
}

/// Decoupling record storage from the services
pub trait Repository<T: Record>: Send + Sync {
    /// Insert or replace a record
    fn save(&self, record: T) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<T>>;

    fn list(&self, filter: &dyn Fn(&T) -> bool) -> Result<Vec<T>>;

    /// Apply `f` to a record while holding its lock.
    ///
    /// Returns `Ok(None)` when the record does not exist. If `f` fails the
    /// stored record is left untouched.
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut T) -> Result<()>) -> Result<Option<T>>;

    fn len(&self) -> Result<usize>;
}

/// Append-only set of published nullifier hashes
pub trait NullifierStore: Send + Sync {
    /// Atomically insert; `false` if the hash was already present
    fn insert_if_absent(&self, hash: &NullifierHash) -> Result<bool>;

    fn contains(&self, hash: &NullifierHash) -> Result<bool>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
