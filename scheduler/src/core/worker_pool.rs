use log::{error, trace};
use std::{
    collections::VecDeque,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use tokio::task::JoinSet;
use txsched_common::transaction::TxStatusCode;

use super::{
    dispatcher::WorkItem,
    executor::{TxExecutor, WorkOutcome},
};

/// Blocking workers running `TxExecutor::run`, at most `capacity` at a time.
///
/// Work beyond the capacity waits in a local queue; the capacity can be
/// changed while running and takes effect as workers finish.
pub struct WorkerPool {
    executor: Arc<TxExecutor>,
    is_verify: bool,
    capacity: usize,
    pending: VecDeque<WorkItem>,
    running: JoinSet<WorkOutcome>,
}

impl WorkerPool {
    pub fn new(executor: Arc<TxExecutor>, capacity: usize, is_verify: bool) -> Self {
        Self {
            executor,
            is_verify,
            capacity: capacity.max(1),
            pending: VecDeque::new(),
            running: JoinSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.fill();
    }

    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.pending.is_empty()
    }

    pub fn submit(&mut self, item: WorkItem) {
        self.pending.push_back(item);
        self.fill();
    }

    fn fill(&mut self) {
        while self.running.len() < self.capacity {
            let Some(item) = self.pending.pop_front() else {
                break;
            };
            self.spawn(item);
        }
    }

    fn spawn(&mut self, item: WorkItem) {
        let executor = Arc::clone(&self.executor);
        let is_verify = self.is_verify;

        if log::log_enabled!(log::Level::Trace) {
            trace!("[WORKER] spawning tx {}", item.tx().id());
        }

        self.running.spawn_blocking(move || {
            match catch_unwind(AssertUnwindSafe(|| executor.run(&item, is_verify))) {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("[WORKER] execution of tx {} panicked", item.tx().id());
                    let failed = executor.reject_tx(item.tx(), TxStatusCode::InternalError, "tx execution panicked");
                    executor.apply(failed, is_verify)
                }
            }
        });
    }

    /// Wait for the next finished worker. Returns `None` once nothing is
    /// running.
    pub async fn next_outcome(&mut self) -> Option<WorkOutcome> {
        loop {
            match self.running.join_next().await? {
                Ok(outcome) => {
                    self.fill();
                    return Some(outcome);
                }
                Err(e) => {
                    error!("[WORKER] worker task failed: {}", e);
                    self.fill();
                }
            }
        }
    }

    /// Forget pending work and let running workers finish in the background
    pub fn shutdown(&mut self) {
        self.pending.clear();
        self.running.detach_all();
    }

    /// Forget pending work and wait for running workers.
    ///
    /// Workers that already started cannot be stopped; once this returns
    /// their attempts are applied or refunded.
    pub async fn cancel(&mut self) {
        self.pending.clear();
        self.running.abort_all();
        while let Some(joined) = self.running.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    error!("[WORKER] worker task failed: {}", e);
                }
            }
        }
    }
}
