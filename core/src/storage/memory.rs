use dashmap::{DashMap, DashSet};
use shade_privacy::{NullifierHash, Result};

use crate::storage::{NullifierStore, Record, Repository};

/// In-memory repository backed by a concurrent map
pub struct MemoryRepository<T: Record> {
    records: DashMap<String, T>,
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Repository<T> for MemoryRepository<T> {
    fn save(&self, record: T) -> Result<()> {
        self.records.insert(record.record_id().to_string(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    fn list(&self, filter: &dyn Fn(&T) -> bool) -> Result<Vec<T>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut T) -> Result<()>) -> Result<Option<T>> {
        let Some(mut entry) = self.records.get_mut(id) else {
            return Ok(None);
        };
        // Work on a copy so a failed update leaves the record as it was
        let mut draft = entry.value().clone();
        f(&mut draft)?;
        *entry.value_mut() = draft.clone();
        Ok(Some(draft))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}

/// In-memory nullifier set
#[derive(Default)]
pub struct MemoryNullifierStore {
    spent: DashSet<NullifierHash>,
}

impl MemoryNullifierStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NullifierStore for MemoryNullifierStore {
    fn insert_if_absent(&self, hash: &NullifierHash) -> Result<bool> {
        Ok(self.spent.insert(*hash))
    }

    fn contains(&self, hash: &NullifierHash) -> Result<bool> {
        Ok(self.spent.contains(hash))
    }

    fn len(&self) -> usize {
        self.spent.len()
    }
}
