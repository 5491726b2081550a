use parking_lot::RwLock;
use std::collections::HashMap;
use txsched_common::rwset::{construct_key, TxRwSet};

use super::{SnapshotAdapter, StateStore};
use crate::core::error::SnapshotError;

/// Committed key/value state held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

pub type MemorySnapshot = SnapshotAdapter<MemoryStore>;

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, contract_name: &str, key: &[u8], value: impl Into<Vec<u8>>) -> Self {
        self.put(contract_name, key, value);
        self
    }

    pub fn put(&self, contract_name: &str, key: &[u8], value: impl Into<Vec<u8>>) {
        self.values
            .write()
            .insert(construct_key(contract_name, key), value.into());
    }

    /// Persist the writes of a block, in order
    pub fn commit<'a>(&self, rwsets: impl IntoIterator<Item = &'a TxRwSet>) {
        let mut values = self.values.write();
        for rwset in rwsets {
            for write in &rwset.tx_writes {
                if write.is_deletion() {
                    values.remove(&write.full_key());
                } else {
                    values.insert(write.full_key(), write.value.clone());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, SnapshotError> {
        Ok(self
            .values
            .read()
            .get(&construct_key(contract_name, key))
            .cloned())
    }
}
