use indexmap::IndexMap;
use log::warn;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use txsched_common::{block::BlockVersion, transaction::Transaction};

use super::{accounts::AccountResolver, snapshot::Snapshot};

/// Per-payer queues: only one tx of a payer is in flight at a time.
///
/// A queue stays registered while its payer has a tx in flight, so the
/// number of queues is the number of active senders.
#[derive(Debug, Default)]
pub struct SenderGroup {
    queues: IndexMap<String, VecDeque<Arc<Transaction>>>,
    tx_to_address: HashMap<String, String>,
}

impl SenderGroup {
    pub fn build(
        txs: &[Arc<Transaction>],
        snapshot: &dyn Snapshot,
        resolver: &AccountResolver,
        block_version: BlockVersion,
    ) -> Self {
        let mut group = Self::default();

        for tx in txs {
            let address = match resolver.payer_of(tx, snapshot, block_version) {
                Ok(payer) => payer.address,
                Err(e) => {
                    // a queue of its own keeps the tx independent from every payer
                    warn!("[SENDER_GROUP] cannot resolve payer of tx {}: {}", tx.id(), e);
                    format!("unresolved:{}", tx.id())
                }
            };

            group.tx_to_address.insert(tx.id().to_string(), address.clone());
            group.queues.entry(address).or_default().push_back(Arc::clone(tx));
        }

        group
    }

    pub fn address_of(&self, tx_id: &str) -> Option<&str> {
        self.tx_to_address.get(tx_id).map(String::as_str)
    }

    /// Payer address of every tx of the group
    pub fn tx_addresses(&self) -> HashMap<String, String> {
        self.tx_to_address.clone()
    }

    /// Number of payers with a tx pending or in flight
    pub fn active_senders(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Take the first tx of every payer
    pub fn heads(&mut self) -> Vec<Arc<Transaction>> {
        self.queues
            .values_mut()
            .filter_map(|queue| queue.pop_front())
            .collect()
    }

    /// The in-flight tx of `address` finished: take its next tx, or
    /// unregister the payer when none is left
    pub fn next_of(&mut self, address: &str) -> Option<Arc<Transaction>> {
        let next = self.queues.get_mut(address)?.pop_front();
        if next.is_none() {
            self.queues.shift_remove(address);
        }
        next
    }

    /// Drop every pending tx, returning how many were dropped
    pub fn drain(&mut self) -> usize {
        let pending = self.queues.values().map(VecDeque::len).sum();
        self.queues.clear();
        pending
    }
}
