use indexmap::IndexMap;
use std::sync::Arc;
use txsched_common::{
    block::BlockVersion,
    config::CALL_CONTRACT_DEPTH,
    rwset::{construct_field_key, construct_key, TxRead, TxRwSet, TxWrite},
    transaction::{
        ContractEvent, ContractResult, ExecOrderType, KeyValuePair, Transaction, TxResult,
        TxStatusCode, TxType,
    },
};

use super::{error::SnapshotError, provider::VmRuntime, snapshot::Snapshot};

/// Writes and events present at a point of the execution
pub struct WriteCheckpoint {
    writes: IndexMap<Vec<u8>, TxWrite>,
    events_len: usize,
}

/// Workspace of one execution attempt of a transaction.
///
/// Reads go through the local caches before hitting the snapshot and are
/// recorded with the value observed. Writes stay local until the context
/// is applied to the snapshot.
pub struct SimContext {
    tx: Arc<Transaction>,
    block_version: BlockVersion,
    snapshot: Arc<dyn Snapshot>,
    // snapshot size when the attempt started
    tx_exec_seq: usize,
    read_cache: IndexMap<Vec<u8>, TxRead>,
    write_cache: IndexMap<Vec<u8>, TxWrite>,
    result: Option<TxResult>,
    events: Vec<ContractEvent>,
    gas_used: u64,
    exec_order: ExecOrderType,
    depth: usize,
}

impl SimContext {
    pub fn new(tx: Arc<Transaction>, snapshot: Arc<dyn Snapshot>, block_version: BlockVersion) -> Self {
        let tx_exec_seq = snapshot.size();
        Self {
            tx,
            block_version,
            snapshot,
            tx_exec_seq,
            read_cache: IndexMap::new(),
            write_cache: IndexMap::new(),
            result: None,
            events: Vec::new(),
            gas_used: 0,
            exec_order: ExecOrderType::Normal,
            depth: 0,
        }
    }

    pub fn tx(&self) -> &Arc<Transaction> {
        &self.tx
    }

    pub fn tx_id(&self) -> &str {
        self.tx.id()
    }

    pub fn block_version(&self) -> BlockVersion {
        self.block_version
    }

    pub fn block_height(&self) -> u64 {
        self.snapshot.block_height()
    }

    pub fn tx_exec_seq(&self) -> usize {
        self.tx_exec_seq
    }

    pub fn get(&mut self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, SnapshotError> {
        let full_key = construct_key(contract_name, key);

        if let Some(write) = self.write_cache.get(&full_key) {
            return Ok((!write.is_deletion()).then(|| write.value.clone()));
        }
        if let Some(read) = self.read_cache.get(&full_key) {
            return Ok((!read.value.is_empty()).then(|| read.value.clone()));
        }

        let value = self.snapshot.get_key(contract_name, key)?;
        self.read_cache.insert(
            full_key,
            TxRead {
                contract_name: contract_name.to_string(),
                key: key.to_vec(),
                value: value.clone().unwrap_or_default(),
            },
        );
        Ok(value)
    }

    pub fn get_field(
        &mut self,
        contract_name: &str,
        key: &[u8],
        field: &[u8],
    ) -> Result<Option<Vec<u8>>, SnapshotError> {
        self.get(contract_name, &construct_field_key(key, field))
    }

    pub fn put(&mut self, contract_name: &str, key: &[u8], value: Vec<u8>) {
        self.write_cache.insert(
            construct_key(contract_name, key),
            TxWrite {
                contract_name: contract_name.to_string(),
                key: key.to_vec(),
                value,
            },
        );
    }

    pub fn put_field(&mut self, contract_name: &str, key: &[u8], field: &[u8], value: Vec<u8>) {
        self.put(contract_name, &construct_field_key(key, field), value)
    }

    pub fn del(&mut self, contract_name: &str, key: &[u8]) {
        self.put(contract_name, key, Vec::new())
    }

    /// Keys read from the snapshot, in `contract#key` layout
    pub fn read_keys(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.read_cache.keys()
    }

    /// Read/write set sorted by key
    pub fn rwset(&self) -> TxRwSet {
        let mut reads: Vec<(&Vec<u8>, &TxRead)> = self.read_cache.iter().collect();
        reads.sort_by(|a, b| a.0.cmp(b.0));
        let mut writes: Vec<(&Vec<u8>, &TxWrite)> = self.write_cache.iter().collect();
        writes.sort_by(|a, b| a.0.cmp(b.0));

        TxRwSet {
            tx_id: self.tx.id().to_string(),
            tx_reads: reads.into_iter().map(|(_, read)| read.clone()).collect(),
            tx_writes: writes.into_iter().map(|(_, write)| write.clone()).collect(),
        }
    }

    pub fn checkpoint(&self) -> WriteCheckpoint {
        WriteCheckpoint {
            writes: self.write_cache.clone(),
            events_len: self.events.len(),
        }
    }

    /// Drop every write and event issued after `checkpoint`.
    /// Reads are kept: they still constrain where the tx may be placed.
    pub fn rollback(&mut self, checkpoint: WriteCheckpoint) {
        self.write_cache = checkpoint.writes;
        self.events.truncate(checkpoint.events_len);
    }

    pub fn emit_event(&mut self, topic: impl Into<String>, event_data: Vec<String>) {
        self.events.push(ContractEvent {
            topic: topic.into(),
            tx_id: self.tx.id().to_string(),
            contract_name: self.tx.contract_name().to_string(),
            contract_version: String::new(),
            event_data,
        });
    }

    pub fn take_events(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn set_gas_used(&mut self, gas_used: u64) {
        self.gas_used = gas_used;
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Invoke another contract from inside a running one
    pub fn call_contract(
        &mut self,
        vm: &dyn VmRuntime,
        contract_name: &str,
        method: &str,
        parameters: &[KeyValuePair],
    ) -> (ContractResult, ExecOrderType, TxStatusCode) {
        if self.depth >= CALL_CONTRACT_DEPTH {
            return (
                ContractResult::failure(
                    format!("cross contract call depth exceeds {}", CALL_CONTRACT_DEPTH),
                    self.gas_used,
                ),
                ExecOrderType::Normal,
                TxStatusCode::ContractFail,
            );
        }

        let gas_used = self.gas_used;
        self.depth += 1;
        let outcome = vm.run(
            contract_name,
            method,
            None,
            parameters,
            self,
            gas_used,
            TxType::InvokeContract,
        );
        self.depth -= 1;
        outcome
    }

    pub fn exec_order(&self) -> ExecOrderType {
        self.exec_order
    }

    pub fn set_exec_order(&mut self, exec_order: ExecOrderType) {
        self.exec_order = exec_order;
    }

    pub fn result(&self) -> Option<&TxResult> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: TxResult) {
        self.result = Some(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        snapshot::{MemorySnapshot, MemoryStore},
        test_utils::invoke_tx,
    };

    fn context() -> SimContext {
        let store = MemoryStore::new()
            .with_value("c", b"b", b"1".to_vec())
            .with_value("c", b"a", b"2".to_vec());
        let snapshot: Arc<dyn Snapshot> = Arc::new(MemorySnapshot::new(1, Arc::new(store)));
        SimContext::new(invoke_tx("t0", "c", "m"), snapshot, 0)
    }

    #[test]
    fn test_rwset_is_sorted_and_reads_once() {
        let mut ctx = context();
        ctx.get("c", b"b").unwrap();
        ctx.get("c", b"a").unwrap();
        ctx.get("c", b"b").unwrap();
        ctx.put("c", b"z", b"1".to_vec());
        ctx.put("c", b"y", b"1".to_vec());

        let rwset = ctx.rwset();
        let reads: Vec<&[u8]> = rwset.tx_reads.iter().map(|r| r.key.as_slice()).collect();
        let writes: Vec<&[u8]> = rwset.tx_writes.iter().map(|w| w.key.as_slice()).collect();
        assert_eq!(reads, vec![b"a".as_slice(), b"b".as_slice()]);
        assert_eq!(writes, vec![b"y".as_slice(), b"z".as_slice()]);
    }

    #[test]
    fn test_own_writes_are_visible_without_reads() {
        let mut ctx = context();
        ctx.put("c", b"k", b"v".to_vec());
        assert_eq!(ctx.get("c", b"k").unwrap(), Some(b"v".to_vec()));
        ctx.del("c", b"k");
        assert_eq!(ctx.get("c", b"k").unwrap(), None);
        assert!(ctx.rwset().tx_reads.is_empty());
    }

    #[test]
    fn test_rollback_keeps_earlier_writes() {
        let mut ctx = context();
        ctx.put("c", b"gas", b"10".to_vec());
        let checkpoint = ctx.checkpoint();
        ctx.put("c", b"gas", b"20".to_vec());
        ctx.put("c", b"other", b"1".to_vec());
        ctx.emit_event("topic", vec![]);
        ctx.rollback(checkpoint);

        let rwset = ctx.rwset();
        assert_eq!(rwset.tx_writes.len(), 1);
        assert_eq!(rwset.tx_writes[0].value, b"10".to_vec());
        assert!(ctx.take_events().is_empty());
    }

    struct RecursiveVm;

    impl VmRuntime for RecursiveVm {
        fn run(
            &self,
            _contract_name: &str,
            _method: &str,
            _byte_code: Option<&[u8]>,
            _parameters: &[KeyValuePair],
            ctx: &mut SimContext,
            _gas_used: u64,
            _tx_type: TxType,
        ) -> (ContractResult, ExecOrderType, TxStatusCode) {
            ctx.call_contract(self, "c", "m", &[])
        }
    }

    #[test]
    fn test_call_depth_is_bounded() {
        let mut ctx = context();
        let (result, _, code) = ctx.call_contract(&RecursiveVm, "c", "m", &[]);
        assert_eq!(code, TxStatusCode::ContractFail);
        assert!(result.message.contains("depth"));
        assert_eq!(ctx.depth(), 0);
    }
}
