mod adapter;
mod memory;

pub use adapter::SnapshotAdapter;
pub use memory::{MemorySnapshot, MemoryStore};

use std::{collections::HashMap, sync::Arc};
use txsched_common::{
    dag::Dag,
    rwset::TxRwSet,
    transaction::{ExecOrderType, Transaction, TxResult},
};

use super::{context::SimContext, error::SnapshotError};

/// Committed state of the chain as of the parent block
pub trait StateStore: Send + Sync {
    fn get(&self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, SnapshotError>;
}

/// Versioned view of the committed state plus the log of sim contexts
/// applied while building or verifying a block.
///
/// `apply` is linearizable: every accepted context gets the next position
/// in the tx table, which is the execution order of the block.
pub trait Snapshot: Send + Sync {
    fn block_height(&self) -> u64;

    /// Latest value of a key: the last applied write if any, else the
    /// committed value. Deleted keys read as `None`.
    fn get_key(&self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, SnapshotError>;

    /// Try to commit `ctx` into the tx table.
    ///
    /// Returns whether the context was accepted and the table size after
    /// the call. With `is_verify` the context is committed unconditionally.
    /// Otherwise sealed snapshots reject everything, iterator contexts are
    /// parked in the special table, and contexts whose reads were
    /// overwritten since they started are rejected. Results of contexts
    /// that did not run successfully never carry events.
    fn apply(
        &self,
        ctx: &SimContext,
        exec_order: ExecOrderType,
        run_ok: bool,
        is_verify: bool,
    ) -> (bool, usize);

    /// Forbid further non-verify applies
    fn seal(&self);

    fn is_sealed(&self) -> bool;

    /// Number of applied contexts
    fn size(&self) -> usize;

    fn tx_table(&self) -> Vec<Arc<Transaction>>;

    fn rwset_table(&self) -> Vec<TxRwSet>;

    /// Iterator txs parked during parallel execution, in arrival order
    fn special_tx_table(&self) -> Vec<Arc<Transaction>>;

    fn result_map(&self) -> HashMap<String, TxResult>;

    fn exec_order_map(&self) -> HashMap<String, ExecOrderType>;

    /// DAG of the applied contexts, or of `rwsets` when given
    fn build_dag(&self, enable_sql_support: bool, rwsets: Option<&[TxRwSet]>) -> Dag;
}
