use log::{debug, trace};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{sync::mpsc, task::JoinHandle};
use txsched_common::transaction::{Transaction, TxStatusCode};

use super::sender_group::SenderGroup;

/// Signal asking the dispatcher to drop every pending tx
pub const CANCEL_SIGNAL: &str = "";

/// Unit of work handed to the worker pool
#[derive(Debug, Clone)]
pub enum WorkItem {
    Execute(Arc<Transaction>),
    /// Commit a failed result without running the tx
    Reject(Arc<Transaction>, TxStatusCode, String),
}

impl WorkItem {
    pub fn tx(&self) -> &Arc<Transaction> {
        match self {
            WorkItem::Execute(tx) | WorkItem::Reject(tx, _, _) => tx,
        }
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, WorkItem::Reject(..))
    }
}

pub enum DispatchPolicy {
    /// Every tx of the batch, in order
    Batch(Vec<Arc<Transaction>>),
    /// One tx per payer at a time, released by done signals
    SenderGroup(SenderGroup),
}

/// Feeds the work queue of the worker pool
pub struct Dispatcher {
    work_tx: mpsc::Sender<WorkItem>,
    active_senders: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(work_tx: mpsc::Sender<WorkItem>, active_senders: Arc<AtomicUsize>) -> Self {
        Self {
            work_tx,
            active_senders,
        }
    }

    /// Run `policy` on its own task.
    ///
    /// `done_rx` carries the payer address of every finalized tx under the
    /// sender group policy; `CANCEL_SIGNAL` stops the dispatch.
    pub fn spawn(self, policy: DispatchPolicy, done_rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(policy, done_rx).await })
    }

    async fn run(self, policy: DispatchPolicy, done_rx: mpsc::UnboundedReceiver<String>) {
        match policy {
            DispatchPolicy::Batch(txs) => {
                self.send_all(txs.into_iter().map(WorkItem::Execute)).await;
            }
            DispatchPolicy::SenderGroup(group) => self.run_sender_group(group, done_rx).await,
        }
    }

    async fn send_all(&self, items: impl IntoIterator<Item = WorkItem>) {
        for item in items {
            if self.work_tx.send(item).await.is_err() {
                debug!("[DISPATCH] work queue closed, stopping");
                return;
            }
        }
    }

    async fn run_sender_group(&self, mut group: SenderGroup, mut done_rx: mpsc::UnboundedReceiver<String>) {
        self.active_senders.store(group.active_senders(), Ordering::SeqCst);

        for tx in group.heads() {
            if self.work_tx.send(WorkItem::Execute(tx)).await.is_err() {
                return;
            }
        }

        while !group.is_empty() {
            let Some(address) = done_rx.recv().await else {
                break;
            };

            if address == CANCEL_SIGNAL {
                let dropped = group.drain();
                debug!("[DISPATCH] cancelled, {} txs left undispatched", dropped);
                break;
            }

            if let Some(next) = group.next_of(&address) {
                trace!("[DISPATCH] releasing tx {} of {}", next.id(), address);
                if self.work_tx.send(WorkItem::Execute(next)).await.is_err() {
                    break;
                }
            }
            self.active_senders.store(group.active_senders(), Ordering::SeqCst);
        }

        self.active_senders.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        accounts::AccountResolver,
        provider::PublicKeyAccessControl,
        snapshot::{MemorySnapshot, MemoryStore},
        test_utils::tx_from,
    };
    use txsched_common::{
        block::BLOCK_VERSION_2340,
        crypto::{AddrType, HashType},
    };

    #[tokio::test]
    async fn test_batch_in_order() {
        let (work_tx, mut work_rx) = mpsc::channel(1);
        let (_done_tx, done_rx) = mpsc::unbounded_channel();
        let txs = vec![
            tx_from("t0", 1, "c", "m", Vec::new(), None),
            tx_from("t1", 1, "c", "m", Vec::new(), None),
        ];

        let handle = Dispatcher::new(work_tx, Arc::new(AtomicUsize::new(0)))
            .spawn(DispatchPolicy::Batch(txs), done_rx);

        let mut ids = Vec::new();
        while let Some(item) = work_rx.recv().await {
            ids.push(item.tx().id().to_string());
        }
        handle.await.unwrap();
        assert_eq!(ids, vec!["t0", "t1"]);
    }

    #[tokio::test]
    async fn test_sender_group_handshake() {
        let snapshot = MemorySnapshot::new(1, Arc::new(MemoryStore::new()));
        let resolver = AccountResolver::new(Arc::new(PublicKeyAccessControl), AddrType::ChainMaker, HashType::Sha256);
        let txs = vec![
            tx_from("a0", 1, "c", "m", Vec::new(), None),
            tx_from("a1", 1, "c", "m", Vec::new(), None),
            tx_from("b0", 2, "c", "m", Vec::new(), None),
        ];
        let group = SenderGroup::build(&txs, &snapshot, &resolver, BLOCK_VERSION_2340);
        let a = group.address_of("a0").unwrap().to_string();

        let (work_tx, mut work_rx) = mpsc::channel(8);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicUsize::new(0));
        let handle = Dispatcher::new(work_tx, Arc::clone(&active))
            .spawn(DispatchPolicy::SenderGroup(group), done_rx);

        assert_eq!(work_rx.recv().await.unwrap().tx().id(), "a0");
        assert_eq!(work_rx.recv().await.unwrap().tx().id(), "b0");
        assert!(work_rx.try_recv().is_err());

        done_tx.send(a.clone()).unwrap();
        assert_eq!(work_rx.recv().await.unwrap().tx().id(), "a1");

        done_tx.send(CANCEL_SIGNAL.to_string()).unwrap();
        handle.await.unwrap();
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }
}
