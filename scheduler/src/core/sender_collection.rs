use indexmap::IndexMap;
use log::{debug, warn};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use txsched_common::{
    block::{BlockFeatures, BlockVersion},
    chain_config::ChainConfig,
    crypto::PublicKey,
    transaction::{Transaction, TxResult, TxStatusCode},
};

use super::{
    accounts::{load_account, AccountResolver, AccountState, AccountStatus, Payer},
    dispatcher::WorkItem,
    error::GasError,
    gas::{effective_gas_limit, need_charge_gas},
    snapshot::Snapshot,
};

/// Gas bookkeeping of one paying account
#[derive(Debug, Clone)]
pub struct TxCollection {
    pub public_key: Option<PublicKey>,
    pub account_balance: u64,
    pub total_gas_used: u64,
    pub txs: Vec<Arc<Transaction>>,
    pub account_status: AccountStatus,
}

/// Transactions of a batch grouped by paying account.
///
/// From 2.3.4 on the batch is partitioned while building: a tx whose gas
/// limit no longer fits in the balance of its payer, given the limits of
/// the payer's earlier txs, is moved to the special table and executed
/// serially after the parallel phase.
pub struct SenderCollection {
    block_version: BlockVersion,
    by_address: IndexMap<String, Mutex<TxCollection>>,
    tx_to_address: HashMap<String, String>,
    // payer resolution failures, by tx id
    unresolved: HashMap<String, String>,
    parallel_txs: Vec<Arc<Transaction>>,
    special_txs: Vec<Arc<Transaction>>,
    special_ids: HashSet<String>,
}

impl SenderCollection {
    pub fn build(
        txs: &[Arc<Transaction>],
        snapshot: &dyn Snapshot,
        resolver: &AccountResolver,
        config: &ChainConfig,
        block_version: BlockVersion,
    ) -> Self {
        Self::assemble(
            txs,
            config,
            block_version,
            |tx| {
                resolver.payer_of(tx, snapshot, block_version).map_err(|e| {
                    warn!("[SENDER_COLLECTION] cannot resolve payer of tx {}: {}", tx.id(), e);
                    format!("failed to resolve payer: {}", e)
                })
            },
            |address| load_account(snapshot, address, block_version),
        )
    }

    /// Partition `txs`, taken from this batch, again.
    ///
    /// Payers and balances come from this collection instead of the
    /// snapshot, so the result does not see writes applied since `build`.
    /// Gas totals start from zero.
    pub fn repartition(&self, txs: &[Arc<Transaction>], config: &ChainConfig) -> Self {
        Self::assemble(
            txs,
            config,
            self.block_version,
            |tx| match self.address_of(tx.id()) {
                Some(address) => Ok(Payer {
                    address: address.to_string(),
                    public_key: self
                        .by_address
                        .get(address)
                        .and_then(|collection| collection.lock().public_key.clone()),
                }),
                None => Err(self
                    .unresolved
                    .get(tx.id())
                    .cloned()
                    .unwrap_or_else(|| "unknown payer".to_string())),
            },
            |address| match self.by_address.get(address) {
                Some(collection) => {
                    let collection = collection.lock();
                    AccountState {
                        balance: collection.account_balance,
                        status: collection.account_status.clone(),
                    }
                }
                None => AccountState {
                    balance: 0,
                    status: AccountStatus::Normal,
                },
            },
        )
    }

    fn assemble(
        txs: &[Arc<Transaction>],
        config: &ChainConfig,
        block_version: BlockVersion,
        mut payer_of: impl FnMut(&Transaction) -> Result<Payer, String>,
        mut account_of: impl FnMut(&str) -> AccountState,
    ) -> Self {
        let partition = BlockFeatures::for_version(block_version).optimized_gas_accounting;
        let mut collection = Self {
            block_version,
            by_address: IndexMap::new(),
            tx_to_address: HashMap::with_capacity(txs.len()),
            unresolved: HashMap::new(),
            parallel_txs: Vec::with_capacity(txs.len()),
            special_txs: Vec::new(),
            special_ids: HashSet::new(),
        };
        // running sum of the gas limits accepted for parallel execution
        let mut reserved: HashMap<String, u64> = HashMap::new();

        for tx in txs {
            let payer = match payer_of(tx.as_ref()) {
                Ok(payer) => payer,
                Err(message) => {
                    collection.unresolved.insert(tx.id().to_string(), message);
                    collection.parallel_txs.push(Arc::clone(tx));
                    continue;
                }
            };

            collection
                .tx_to_address
                .insert(tx.id().to_string(), payer.address.clone());

            let entry = collection
                .by_address
                .entry(payer.address.clone())
                .or_insert_with(|| {
                    let account = account_of(&payer.address);
                    Mutex::new(TxCollection {
                        public_key: payer.public_key.clone(),
                        account_balance: account.balance,
                        total_gas_used: 0,
                        txs: Vec::new(),
                        account_status: account.status,
                    })
                });
            let account = entry.get_mut();

            let diverted = partition
                && need_charge_gas(tx, block_version, config)
                && account.account_status.is_normal()
                && {
                    let limit = tx.payload.gas_limit().unwrap_or(0);
                    let used = reserved.entry(payer.address.clone()).or_insert(0);
                    let tentative = used.saturating_add(limit);
                    if tentative > account.account_balance {
                        true
                    } else {
                        *used = tentative;
                        false
                    }
                };

            account.txs.push(Arc::clone(tx));
            if diverted {
                debug!(
                    "[SENDER_COLLECTION] tx {} exceeds the balance of {}, executing it serially",
                    tx.id(),
                    payer.address
                );
                collection.special_ids.insert(tx.id().to_string());
                collection.special_txs.push(Arc::clone(tx));
            } else {
                collection.parallel_txs.push(Arc::clone(tx));
            }
        }

        collection
    }

    pub fn block_version(&self) -> BlockVersion {
        self.block_version
    }

    pub fn address_of(&self, tx_id: &str) -> Option<&str> {
        self.tx_to_address.get(tx_id).map(String::as_str)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &String> {
        self.by_address.keys()
    }

    pub fn collection(&self, address: &str) -> Option<TxCollection> {
        self.by_address.get(address).map(|c| c.lock().clone())
    }

    /// Number of txs run by the parallel phase
    pub fn parallel_txs_num(&self) -> usize {
        self.parallel_txs.len()
    }

    /// Txs executed serially after the parallel phase
    pub fn special_txs(&self) -> &[Arc<Transaction>] {
        &self.special_txs
    }

    pub fn is_special(&self, tx_id: &str) -> bool {
        self.special_ids.contains(tx_id)
    }

    /// Admission of the txs outside the special table, in batch order.
    ///
    /// Txs whose payer is unknown are rejected. Before 2.3.4 the balance
    /// admission happens here: a tx whose limit no longer fits in the
    /// payer balance is rejected instead of executed. Rejected txs are
    /// committed after the parallel phase.
    pub fn dispatch_items(&self, config: &ChainConfig) -> Vec<WorkItem> {
        let legacy = !BlockFeatures::for_version(self.block_version).optimized_gas_accounting;
        let mut admitted: HashMap<&str, u64> = HashMap::new();

        self.parallel_txs
            .iter()
            .map(|tx| {
                let Some(address) = self.address_of(tx.id()) else {
                    let message = self
                        .unresolved
                        .get(tx.id())
                        .cloned()
                        .unwrap_or_else(|| "unknown payer".to_string());
                    return WorkItem::Reject(Arc::clone(tx), TxStatusCode::InternalError, message);
                };

                if !legacy || !need_charge_gas(tx, self.block_version, config) {
                    return WorkItem::Execute(Arc::clone(tx));
                }

                let (balance, status) = match self.by_address.get(address) {
                    Some(collection) => {
                        let collection = collection.lock();
                        (collection.account_balance, collection.account_status.clone())
                    }
                    None => (0, AccountStatus::Normal),
                };
                if let AccountStatus::Abnormal { code, message } = status {
                    return WorkItem::Reject(Arc::clone(tx), code, message);
                }

                let limit = effective_gas_limit(tx, self.block_version, config).unwrap_or(0);
                let used = admitted.entry(address).or_insert(0);
                let tentative = used.saturating_add(limit);
                if tentative > balance {
                    WorkItem::Reject(
                        Arc::clone(tx),
                        TxStatusCode::GasBalanceNotEnoughFailed,
                        format!("balance {} of {} cannot cover gas limit {}", balance, address, limit),
                    )
                } else {
                    *used = tentative;
                    WorkItem::Execute(Arc::clone(tx))
                }
            })
            .collect()
    }

    /// The rejections among `dispatch_items`, by tx id
    pub fn rejections(&self, config: &ChainConfig) -> HashMap<String, WorkItem> {
        self.dispatch_items(config)
            .into_iter()
            .filter(|item| item.is_reject())
            .map(|item| (item.tx().id().to_string(), item))
            .collect()
    }

    fn with_account<T>(
        &self,
        tx_id: &str,
        f: impl FnOnce(&mut TxCollection) -> Result<T, GasError>,
    ) -> Result<T, GasError> {
        let collection = self
            .address_of(tx_id)
            .and_then(|address| self.by_address.get(address))
            .ok_or_else(|| GasError::UnknownTx(tx_id.to_string()))?;
        let mut collection = collection.lock();
        f(&mut collection)
    }

    /// Check that the payer of `tx_id` can still cover `gas_limit`
    pub fn check_balance(&self, tx_id: &str, gas_limit: u64) -> Result<(), GasError> {
        self.with_account(tx_id, |account| {
            if let AccountStatus::Abnormal { code, message } = &account.account_status {
                return Err(GasError::Account {
                    code: *code,
                    message: message.clone(),
                });
            }

            let required = account.total_gas_used.saturating_add(gas_limit);
            if required > account.account_balance {
                return Err(GasError::BalanceNotEnough {
                    balance: account.account_balance,
                    required,
                });
            }
            Ok(())
        })
    }

    /// Add the gas used by `tx_id` to its payer total.
    ///
    /// Gas above the limit is capped to the limit and gas above the
    /// remaining balance to the balance; both report an error carrying the
    /// amount actually charged.
    pub fn charge_gas(&self, tx_id: &str, gas_used: u64, gas_limit: u64) -> Result<u64, GasError> {
        self.with_account(tx_id, |account| {
            let limit_exceeded = gas_used > gas_limit;
            let remaining = account.account_balance.saturating_sub(account.total_gas_used);
            let capped = gas_used.min(gas_limit);
            let exhausted = capped > remaining;
            let charged = capped.min(remaining);

            account.total_gas_used = account.total_gas_used.saturating_add(charged);

            if exhausted {
                Err(GasError::BalanceExhausted { charged })
            } else if limit_exceeded {
                Err(GasError::GasLimitExceeded {
                    gas_used,
                    gas_limit,
                    charged,
                })
            } else {
                Ok(charged)
            }
        })
    }

    /// Give back gas charged by an attempt that did not make it into the block
    pub fn refund(&self, tx_id: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        let _ = self.with_account(tx_id, |account| {
            account.total_gas_used = account.total_gas_used.saturating_sub(amount);
            Ok(())
        });
    }

    /// Per-address gas of the txs present in `results`
    pub fn totals_from_results(&self, results: &HashMap<String, TxResult>) -> IndexMap<String, u64> {
        let mut totals = IndexMap::new();
        for (address, collection) in &self.by_address {
            let total = collection
                .lock()
                .txs
                .iter()
                .filter_map(|tx| results.get(tx.id()))
                .fold(0u64, |sum, result| sum.saturating_add(result.gas_used()));
            if total > 0 {
                totals.insert(address.clone(), total);
            }
        }
        totals
    }
}
