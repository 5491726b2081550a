use indexmap::IndexMap;
use log::{debug, error, info, warn};
use metrics::{counter, gauge, histogram};
use std::{
    collections::HashMap,
    sync::{atomic::AtomicUsize, atomic::Ordering, Arc},
    time::Instant,
};
use tokio::sync::{mpsc, Mutex};
use txsched_common::{
    block::{Block, BlockFeatures},
    chain_config::{ChainConfig, ConsensusType},
    crypto::SigningIdentity,
    dag::Dag,
    rwset::TxRwSet,
    transaction::{ContractEvent, Transaction, TxResult},
};

use super::{
    accounts::{AccountResolver, ResolverCache},
    bit_window::ConflictBitWindow,
    charge_gas::{charge_totals, create_charge_gas_tx, parse_charge_gas_tx},
    dag_verifier::{append_serial_tail, classify_exec_orders, compare_dag, rebuild_dag},
    dispatcher::{DispatchPolicy, Dispatcher, WorkItem, CANCEL_SIGNAL},
    error::SchedulerError,
    executor::{ApplyStatus, TxExecutor},
    provider::{AccessControl, ChainConf, LedgerCache, VmRuntime},
    sender_collection::SenderCollection,
    sender_group::SenderGroup,
    snapshot::Snapshot,
    worker_pool::WorkerPool,
};
use crate::config::SchedulerConfig;

/// Read/write sets and events of a proposed block, keyed by tx id in
/// block order
#[derive(Debug, Default)]
pub struct ScheduleOutput {
    pub rwsets: IndexMap<String, TxRwSet>,
    pub events: IndexMap<String, Vec<ContractEvent>>,
}

/// Read/write sets and results of a verified block, in block order
#[derive(Debug, Default)]
pub struct VerifyOutput {
    pub rwsets: IndexMap<String, TxRwSet>,
    pub results: IndexMap<String, TxResult>,
}

/// Parallel transaction scheduler of a chain.
///
/// `schedule` executes a batch speculatively and produces the block body
/// and its DAG; `simulate_with_dag` re-executes a received block following
/// its DAG and checks the DAG against the observed dependencies. Calls are
/// serialized.
pub struct TxScheduler {
    vm: Arc<dyn VmRuntime>,
    chain_conf: Arc<dyn ChainConf>,
    access_control: Arc<dyn AccessControl>,
    ledger: Arc<dyn LedgerCache>,
    signer: Arc<dyn SigningIdentity>,
    config: SchedulerConfig,
    resolver_cache: Arc<ResolverCache>,
    lock: Mutex<()>,
}

impl TxScheduler {
    pub fn new(
        vm: Arc<dyn VmRuntime>,
        chain_conf: Arc<dyn ChainConf>,
        access_control: Arc<dyn AccessControl>,
        ledger: Arc<dyn LedgerCache>,
        signer: Arc<dyn SigningIdentity>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            vm,
            chain_conf,
            access_control,
            ledger,
            signer,
            config,
            resolver_cache: AccountResolver::new_cache(),
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn resolver(&self, chain_config: &ChainConfig) -> AccountResolver {
        AccountResolver::with_cache(
            Arc::clone(&self.access_control),
            chain_config.addr_type,
            chain_config.hash_type,
            Arc::clone(&self.resolver_cache),
        )
    }

    fn check_height(&self, block: &Block, chain_config: &ChainConfig) -> Result<(), SchedulerError> {
        if chain_config.consensus_type != ConsensusType::Tbft {
            return Ok(());
        }

        let ledger_height = self.ledger.current_height();
        if block.height() <= ledger_height {
            return Err(SchedulerError::StaleBlockHeight {
                block_height: block.height(),
                ledger_height,
            });
        }
        Ok(())
    }

    fn log_rwsets(&self, rwsets: &IndexMap<String, TxRwSet>) {
        if self.config.enable_rwset_log && log::log_enabled!(log::Level::Debug) {
            for (tx_id, rwset) in rwsets {
                debug!("[RWSET] tx {}: {:?}", tx_id, rwset);
            }
        }
    }

    /// Execute `txs` for the block being proposed.
    ///
    /// On return `block.txs` holds the executed txs in execution order,
    /// followed by the charge-gas tx when optimize-charge-gas is on, and
    /// `block.dag` their dependency graph. Txs that could not be applied
    /// before the deadline are left out.
    pub async fn schedule(
        &self,
        block: &mut Block,
        txs: Vec<Arc<Transaction>>,
        snapshot: Arc<dyn Snapshot>,
    ) -> Result<ScheduleOutput, SchedulerError> {
        let _guard = self.lock.lock().await;
        let start = Instant::now();
        let chain_config = self.chain_conf.chain_config();
        self.check_height(block, &chain_config)?;

        if txs.is_empty() {
            block.txs.clear();
            block.dag = Dag::default();
            return Ok(ScheduleOutput::default());
        }

        let block_version = block.version();
        let optimize = chain_config.optimize_charge_gas_enabled();
        let resolver = self.resolver(&chain_config);

        if log::log_enabled!(log::Level::Info) {
            info!(
                "[SCHEDULE] block {} with {} txs, optimize charge gas {}, sender group {}",
                block.height(),
                txs.len(),
                optimize,
                chain_config.scheduler.enable_sender_group
            );
        }

        let mut collection = None;
        let mut rejected = Vec::new();
        let mut group_addresses = None;
        let (policy, parallel_count) = if optimize {
            let built = Arc::new(SenderCollection::build(
                &txs,
                snapshot.as_ref(),
                &resolver,
                &chain_config,
                block_version,
            ));
            // Rejected txs skip the parallel phase and close the serial one
            let (refused, admitted): (Vec<WorkItem>, Vec<WorkItem>) = built
                .dispatch_items(&chain_config)
                .into_iter()
                .partition(|item| item.is_reject());
            rejected = refused.iter().map(|item| Arc::clone(item.tx())).collect();
            collection = Some(built);

            let admitted: Vec<Arc<Transaction>> = admitted.iter().map(|item| Arc::clone(item.tx())).collect();
            let count = admitted.len();
            (DispatchPolicy::Batch(admitted), count)
        } else if chain_config.scheduler.enable_sender_group {
            let group = SenderGroup::build(&txs, snapshot.as_ref(), &resolver, block_version);
            group_addresses = Some(group.tx_addresses());
            (DispatchPolicy::SenderGroup(group), txs.len())
        } else {
            let count = txs.len();
            (DispatchPolicy::Batch(txs.clone()), count)
        };

        let executor = Arc::new(TxExecutor::new(
            Arc::clone(&self.vm),
            chain_config.clone(),
            block_version,
            Arc::clone(&snapshot),
            resolver.clone(),
            collection.clone(),
        ));
        let mut pool = WorkerPool::new(Arc::clone(&executor), self.config.max_pool_size(), false);

        let mut bit_window = (chain_config.scheduler.enable_conflicts_bit_window
            && txs.len() >= self.config.min_batch_for_adjust())
        .then(|| {
            ConflictBitWindow::new(
                self.config.adjust_window_size,
                self.config.conflict_threshold_percent,
                self.config.max_pool_size(),
            )
        });

        let (work_tx, mut work_rx) = mpsc::channel(self.config.max_pool_size() * 2);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let active_senders = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(work_tx, Arc::clone(&active_senders)).spawn(policy, done_rx);

        let timeout = self.config.schedule_timeout();
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        let mut finalized = 0;
        let mut conflicts = 0u64;
        let mut queue_open = true;
        let mut timed_out = false;

        while finalized < parallel_count {
            if !queue_open && pool.is_idle() {
                break;
            }
            tokio::select! {
                item = work_rx.recv(), if queue_open => match item {
                    Some(item) => {
                        if group_addresses.is_some() && bit_window.is_none() {
                            let active = active_senders.load(Ordering::SeqCst);
                            if let Some(size) = sender_group_pool_size(active, self.config.max_pool_size()) {
                                pool.set_capacity(size);
                            }
                        }
                        pool.submit(item);
                    }
                    None => queue_open = false,
                },
                Some(outcome) = pool.next_outcome(), if pool.in_flight() > 0 => {
                    let conflict = outcome.status == ApplyStatus::Conflict;
                    if conflict {
                        conflicts += 1;
                        pool.submit(WorkItem::Execute(Arc::clone(&outcome.tx)));
                    } else {
                        finalized += 1;
                        if let Some(address) = group_addresses.as_ref().and_then(|map| map.get(outcome.tx.id())) {
                            let _ = done_tx.send(address.clone());
                        }
                    }

                    if let Some(window) = bit_window.as_mut() {
                        if group_addresses.is_some() {
                            window.set_max_pool_size(active_senders.load(Ordering::SeqCst));
                        }
                        if let Some(size) = window.enqueue(conflict, pool.capacity()) {
                            pool.set_capacity(size);
                            if self.config.enable_metrics {
                                gauge!("txsched_pool_size").set(size as f64);
                            }
                        }
                    }
                },
                _ = &mut sleep => {
                    timed_out = true;
                    break;
                }
            }
        }

        let _ = done_tx.send(CANCEL_SIGNAL.to_string());
        drop(work_rx);
        snapshot.seal();
        if timed_out {
            warn!(
                "[SCHEDULE] block {} timed out after {:?}, {} of {} txs finalized",
                block.height(),
                timeout,
                finalized,
                parallel_count
            );
            pool.cancel().await;
        }
        if let Err(e) = dispatcher.await {
            warn!("[SCHEDULE] dispatcher task failed: {}", e);
        }

        let mut dag = snapshot.build_dag(chain_config.contract.enable_sql_support, None);

        let parked = snapshot.special_tx_table();
        let serial = match &collection {
            Some(collection) => {
                let mut pending = collection.special_txs().to_vec();
                pending.extend(rejected);
                serial_tail(collection, snapshot.tx_table(), parked, pending, &chain_config)
            }
            None => parked.into_iter().map(WorkItem::Execute).collect(),
        };
        for item in &serial {
            let outcome = executor.run(item, true);
            if outcome.status != ApplyStatus::Applied {
                return Err(SchedulerError::InvariantViolation(format!(
                    "serial tx {} was not applied",
                    item.tx().id()
                )));
            }
        }
        append_serial_tail(&mut dag, serial.len());

        if let Some(collection) = collection.as_ref().filter(|_| snapshot.size() > 0) {
            let totals = charge_totals(
                &snapshot.tx_table(),
                &snapshot.result_map(),
                collection,
                &resolver,
                snapshot.as_ref(),
                &chain_config,
                block_version,
            );
            let charge_tx = Arc::new(create_charge_gas_tx(
                &totals,
                &block.header,
                self.signer.as_ref(),
                chain_config.hash_type,
            )?);

            let executed = executor.execute_tx(&charge_tx);
            if !executed.run_ok {
                let message = executed
                    .ctx
                    .result()
                    .map(|result| result.message.clone())
                    .unwrap_or_default();
                error!("[SCHEDULE] charge gas tx {} failed: {}", charge_tx.id(), message);
                return Err(SchedulerError::InvariantViolation(format!(
                    "charge gas tx failed: {}",
                    message
                )));
            }
            executor.apply(executed, true);
            dag.push_after_all();
        }

        let tx_table = snapshot.tx_table();
        let results = snapshot.result_map();
        let rwsets: IndexMap<String, TxRwSet> = snapshot
            .rwset_table()
            .into_iter()
            .map(|rwset| (rwset.tx_id.clone(), rwset))
            .collect();
        let events = tx_table
            .iter()
            .filter_map(|tx| {
                let events = &results.get(tx.id())?.contract_result.contract_event;
                (!events.is_empty()).then(|| (tx.id().to_string(), events.clone()))
            })
            .collect();

        self.log_rwsets(&rwsets);
        if log::log_enabled!(log::Level::Info) {
            info!(
                "[SCHEDULE] block {} scheduled {} txs ({} serial) with {} conflicts in {:?}",
                block.height(),
                tx_table.len(),
                serial.len(),
                conflicts,
                start.elapsed()
            );
        }
        if self.config.enable_metrics {
            histogram!("txsched_schedule_duration_ms").record(start.elapsed().as_millis() as f64);
            counter!("txsched_tx_conflicts").increment(conflicts);
            counter!("txsched_tx_applied").increment(tx_table.len() as u64);
        }

        block.txs = tx_table;
        block.dag = dag;

        Ok(ScheduleOutput { rwsets, events })
    }

    /// Re-execute a received block following its DAG and check that the DAG
    /// and the charge-gas tx match what the execution produced
    pub async fn simulate_with_dag(
        &self,
        block: &Block,
        snapshot: Arc<dyn Snapshot>,
    ) -> Result<VerifyOutput, SchedulerError> {
        let _guard = self.lock.lock().await;
        let start = Instant::now();
        let chain_config = self.chain_conf.chain_config();
        let block_version = block.version();
        let features = BlockFeatures::for_version(block_version);
        let tx_count = block.txs.len();

        block.dag.validate_for(tx_count)?;
        if tx_count == 0 {
            return Ok(VerifyOutput::default());
        }

        let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(tx_count);
        for (index, tx) in block.txs.iter().enumerate() {
            if index_of.insert(tx.id(), index).is_some() {
                return Err(SchedulerError::DagMismatch(format!("duplicate tx {}", tx.id())));
            }
        }

        let optimize = chain_config.optimize_charge_gas_enabled();
        let resolver = self.resolver(&chain_config);
        let collection = optimize.then(|| {
            let txs: Vec<Arc<Transaction>> = block
                .txs
                .iter()
                .filter(|tx| !tx.is_charge_gas_tx())
                .cloned()
                .collect();
            Arc::new(SenderCollection::build(
                &txs,
                snapshot.as_ref(),
                &resolver,
                &chain_config,
                block_version,
            ))
        });

        let executor = Arc::new(TxExecutor::new(
            Arc::clone(&self.vm),
            chain_config.clone(),
            block_version,
            Arc::clone(&snapshot),
            resolver.clone(),
            collection.clone(),
        ));
        let mut pool = WorkerPool::new(executor, self.config.max_pool_size(), true);

        // Replays the admission of the proposer, which ran these txs
        // without the VM
        let rejected = collection
            .as_ref()
            .map(|collection| collection.rejections(&chain_config))
            .unwrap_or_default();
        let work_for = |tx: &Arc<Transaction>| {
            rejected
                .get(tx.id())
                .cloned()
                .unwrap_or_else(|| WorkItem::Execute(Arc::clone(tx)))
        };

        let mut remaining: Vec<usize> = block.dag.vertexes.iter().map(|v| v.neighbors.len()).collect();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); tx_count];
        for (index, vertex) in block.dag.vertexes.iter().enumerate() {
            for &neighbor in &vertex.neighbors {
                successors[neighbor as usize].push(index);
            }
        }

        for (index, tx) in block.txs.iter().enumerate() {
            if remaining[index] == 0 {
                pool.submit(work_for(tx));
            }
        }

        let timeout = self.config.schedule_with_dag_timeout();
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        let mut finalized = 0;
        while finalized < tx_count {
            tokio::select! {
                Some(outcome) = pool.next_outcome(), if pool.in_flight() > 0 => {
                    finalized += 1;
                    let Some(&index) = index_of.get(outcome.tx.id()) else {
                        continue;
                    };
                    for &next in &successors[index] {
                        remaining[next] -= 1;
                        if remaining[next] == 0 {
                            pool.submit(work_for(&block.txs[next]));
                        }
                    }
                },
                _ = &mut sleep => {
                    snapshot.seal();
                    pool.shutdown();
                    warn!(
                        "[VERIFY] block {} timed out after {:?}, {} of {} txs executed",
                        block.height(),
                        timeout,
                        finalized,
                        tx_count
                    );
                    return Err(SchedulerError::Timeout(timeout));
                }
            }
        }
        snapshot.seal();

        let rwset_by_id: HashMap<String, TxRwSet> = snapshot
            .rwset_table()
            .into_iter()
            .map(|rwset| (rwset.tx_id.clone(), rwset))
            .collect();
        let result_by_id = snapshot.result_map();

        if features.gas_limit_guard {
            let counts = classify_exec_orders(
                &block.txs,
                &snapshot.exec_order_map(),
                |tx_id| rejected.contains_key(tx_id) || collection.as_ref().map_or(false, |c| c.is_special(tx_id)),
                optimize,
            )?;
            let expected = rebuild_dag(
                &block.txs,
                &rwset_by_id,
                counts,
                chain_config.contract.enable_sql_support,
            )?;
            compare_dag(&expected, &block.dag)?;

            if let (Some(collection), Some(charge_tx)) = (&collection, block.txs.last()) {
                let received = parse_charge_gas_tx(charge_tx).map_err(SchedulerError::ChargeGasMismatch)?;
                let recomputed = charge_totals(
                    &block.txs[..tx_count - 1],
                    &result_by_id,
                    collection,
                    &resolver,
                    snapshot.as_ref(),
                    &chain_config,
                    block_version,
                );
                if recomputed != received {
                    return Err(SchedulerError::ChargeGasMismatch(format!(
                        "block charges {:?}, execution used {:?}",
                        received, recomputed
                    )));
                }
            }
        }

        let mut output = VerifyOutput::default();
        for tx in &block.txs {
            if let Some(rwset) = rwset_by_id.get(tx.id()) {
                output.rwsets.insert(tx.id().to_string(), rwset.clone());
            }
            if let Some(result) = result_by_id.get(tx.id()) {
                output.results.insert(tx.id().to_string(), result.clone());
            }
        }

        self.log_rwsets(&output.rwsets);
        if log::log_enabled!(log::Level::Info) {
            info!(
                "[VERIFY] block {} verified {} txs in {:?}",
                block.height(),
                tx_count,
                start.elapsed()
            );
        }
        if self.config.enable_metrics {
            histogram!("txsched_verify_duration_ms").record(start.elapsed().as_millis() as f64);
            counter!("txsched_tx_applied").increment(tx_count as u64);
        }

        Ok(output)
    }
}

/// Worker count under the sender group policy: one per payer with txs
/// left, `None` once the dispatcher has released everything
fn sender_group_pool_size(active_senders: usize, max_pool_size: usize) -> Option<usize> {
    (active_senders > 0).then(|| active_senders.min(max_pool_size.max(1)))
}

/// Work of the serial phase: parked iterator txs, then `pending`, the txs
/// the sender collection diverted or rejected.
///
/// A verifier partitions the block again, so the tail must be exactly the
/// txs it finds diverted or rejected among `applied`, `parked` and the
/// tail itself. A pending tx that fits once the unfinished txs are gone
/// is left out of the block, like them.
fn serial_tail(
    collection: &SenderCollection,
    applied: Vec<Arc<Transaction>>,
    parked: Vec<Arc<Transaction>>,
    mut pending: Vec<Arc<Transaction>>,
    config: &ChainConfig,
) -> Vec<WorkItem> {
    loop {
        let order: Vec<Arc<Transaction>> = applied.iter().chain(&parked).chain(&pending).cloned().collect();
        let rebuilt = collection.repartition(&order, config);
        let mut rejected = rebuilt.rejections(config);

        let before = pending.len();
        pending.retain(|tx| {
            let serial = rebuilt.is_special(tx.id()) || rejected.contains_key(tx.id());
            if !serial {
                warn!("[SCHEDULE] tx {} fits after the parallel phase, leaving it out", tx.id());
            }
            serial
        });

        if pending.len() == before {
            return parked
                .into_iter()
                .chain(pending)
                .map(|tx| rejected.remove(tx.id()).unwrap_or(WorkItem::Execute(tx)))
                .collect();
        }
    }
}
