use log::trace;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use txsched_common::{
    dag::{build_dag, Dag},
    rwset::{construct_key, TxRwSet},
    transaction::{ExecOrderType, Transaction, TxResult, TxStatusCode},
};

use super::{Snapshot, StateStore};
use crate::core::{context::SimContext, error::SnapshotError};

#[derive(Default)]
struct AppliedLog {
    sealed: bool,
    tx_table: Vec<Arc<Transaction>>,
    rwset_table: Vec<TxRwSet>,
    special_txs: Vec<Arc<Transaction>>,
    results: HashMap<String, TxResult>,
    exec_orders: HashMap<String, ExecOrderType>,
    // full key -> (position of the writer in the tx table, value)
    write_table: HashMap<Vec<u8>, (usize, Vec<u8>)>,
}

impl AppliedLog {
    fn has_conflict(&self, ctx: &SimContext) -> bool {
        ctx.read_keys().any(|key| {
            self.write_table
                .get(key)
                .map_or(false, |(seq, _)| *seq >= ctx.tx_exec_seq())
        })
    }

    fn commit(&mut self, ctx: &SimContext, exec_order: ExecOrderType, run_ok: bool) {
        let seq = self.tx_table.len();
        let tx = Arc::clone(ctx.tx());
        let rwset = ctx.rwset();

        for write in &rwset.tx_writes {
            self.write_table
                .insert(write.full_key(), (seq, write.value.clone()));
        }

        let mut result = ctx.result().cloned().unwrap_or_else(|| {
            TxResult::failure(TxStatusCode::InternalError, "tx finished without a result", 0)
        });
        if !run_ok {
            result.contract_result.contract_event.clear();
        }

        self.results.insert(tx.id().to_string(), result);
        self.exec_orders.insert(tx.id().to_string(), exec_order);
        self.rwset_table.push(rwset);
        self.tx_table.push(tx);
    }
}

/// Snapshot of a block in progress over a committed `StateStore`
pub struct SnapshotAdapter<S: StateStore> {
    block_height: u64,
    store: Arc<S>,
    log: Mutex<AppliedLog>,
}

impl<S: StateStore> SnapshotAdapter<S> {
    pub fn new(block_height: u64, store: Arc<S>) -> Self {
        Self {
            block_height,
            store,
            log: Mutex::new(AppliedLog::default()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: StateStore> Snapshot for SnapshotAdapter<S> {
    fn block_height(&self) -> u64 {
        self.block_height
    }

    fn get_key(&self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, SnapshotError> {
        let applied = {
            let log = self.log.lock();
            log.write_table
                .get(&construct_key(contract_name, key))
                .map(|(_, value)| value.clone())
        };

        match applied {
            Some(value) if value.is_empty() => Ok(None),
            Some(value) => Ok(Some(value)),
            None => self.store.get(contract_name, key),
        }
    }

    fn apply(
        &self,
        ctx: &SimContext,
        exec_order: ExecOrderType,
        run_ok: bool,
        is_verify: bool,
    ) -> (bool, usize) {
        let mut log = self.log.lock();

        if !is_verify {
            if log.sealed {
                return (false, log.tx_table.len());
            }

            if exec_order == ExecOrderType::Iterator {
                trace!("[SNAPSHOT] parking iterator tx {}", ctx.tx_id());
                log.special_txs.push(Arc::clone(ctx.tx()));
                return (true, log.tx_table.len());
            }

            if log.has_conflict(ctx) {
                trace!(
                    "[SNAPSHOT] tx {} started at {} conflicts, table size {}",
                    ctx.tx_id(),
                    ctx.tx_exec_seq(),
                    log.tx_table.len()
                );
                return (false, log.tx_table.len());
            }
        }

        log.commit(ctx, exec_order, run_ok);
        (true, log.tx_table.len())
    }

    fn seal(&self) {
        self.log.lock().sealed = true;
    }

    fn is_sealed(&self) -> bool {
        self.log.lock().sealed
    }

    fn size(&self) -> usize {
        self.log.lock().tx_table.len()
    }

    fn tx_table(&self) -> Vec<Arc<Transaction>> {
        self.log.lock().tx_table.clone()
    }

    fn rwset_table(&self) -> Vec<TxRwSet> {
        self.log.lock().rwset_table.clone()
    }

    fn special_tx_table(&self) -> Vec<Arc<Transaction>> {
        self.log.lock().special_txs.clone()
    }

    fn result_map(&self) -> HashMap<String, TxResult> {
        self.log.lock().results.clone()
    }

    fn exec_order_map(&self) -> HashMap<String, ExecOrderType> {
        self.log.lock().exec_orders.clone()
    }

    fn build_dag(&self, enable_sql_support: bool, rwsets: Option<&[TxRwSet]>) -> Dag {
        match rwsets {
            Some(rwsets) => build_dag(rwsets, enable_sql_support),
            None => {
                let rwsets = self.rwset_table();
                build_dag(&rwsets, enable_sql_support)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{snapshot::MemoryStore, test_utils::invoke_tx};
    use txsched_common::transaction::ContractResult;

    fn snapshot() -> Arc<SnapshotAdapter<MemoryStore>> {
        let store = MemoryStore::new().with_value("c", b"k1", b"v0".to_vec());
        Arc::new(SnapshotAdapter::new(1, Arc::new(store)))
    }

    fn finished(mut ctx: SimContext) -> SimContext {
        ctx.set_result(TxResult::success(ContractResult::success(Vec::new(), 0)));
        ctx
    }

    #[test]
    fn test_read_overwritten_after_start_conflicts() {
        let snapshot = snapshot();
        let dyn_snapshot: Arc<dyn Snapshot> = snapshot.clone();

        let mut reader = SimContext::new(invoke_tx("t0", "c", "m"), dyn_snapshot.clone(), 0);
        assert_eq!(reader.get("c", b"k1").unwrap(), Some(b"v0".to_vec()));

        let mut writer = SimContext::new(invoke_tx("t1", "c", "m"), dyn_snapshot.clone(), 0);
        writer.put("c", b"k1", b"v1".to_vec());
        assert_eq!(
            snapshot.apply(&finished(writer), ExecOrderType::Normal, true, false),
            (true, 1)
        );

        let reader = finished(reader);
        assert_eq!(snapshot.apply(&reader, ExecOrderType::Normal, true, false), (false, 1));
        // Verify mode commits regardless
        assert_eq!(snapshot.apply(&reader, ExecOrderType::Normal, true, true), (true, 2));
        assert_eq!(snapshot.get_key("c", b"k1").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn test_iterator_is_parked() {
        let snapshot = snapshot();
        let dyn_snapshot: Arc<dyn Snapshot> = snapshot.clone();

        let ctx = finished(SimContext::new(invoke_tx("t0", "c", "m"), dyn_snapshot, 0));
        assert_eq!(snapshot.apply(&ctx, ExecOrderType::Iterator, true, false), (true, 0));
        assert_eq!(snapshot.special_tx_table().len(), 1);
        assert!(snapshot.tx_table().is_empty());
    }

    #[test]
    fn test_sealed_rejects_non_verify() {
        let snapshot = snapshot();
        let dyn_snapshot: Arc<dyn Snapshot> = snapshot.clone();
        snapshot.seal();

        let ctx = finished(SimContext::new(invoke_tx("t0", "c", "m"), dyn_snapshot, 0));
        assert_eq!(snapshot.apply(&ctx, ExecOrderType::Normal, true, false), (false, 0));
        assert_eq!(snapshot.apply(&ctx, ExecOrderType::ChargeGas, true, true), (true, 1));
        assert_eq!(
            snapshot.exec_order_map().get("t0"),
            Some(&ExecOrderType::ChargeGas)
        );
    }

    #[test]
    fn test_deleted_key_reads_none() {
        let snapshot = snapshot();
        let dyn_snapshot: Arc<dyn Snapshot> = snapshot.clone();

        let mut ctx = SimContext::new(invoke_tx("t0", "c", "m"), dyn_snapshot, 0);
        ctx.del("c", b"k1");
        snapshot.apply(&finished(ctx), ExecOrderType::Normal, true, false);
        assert_eq!(snapshot.get_key("c", b"k1").unwrap(), None);
    }
}
