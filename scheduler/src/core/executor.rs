use log::{debug, trace, warn};
use std::sync::Arc;
use txsched_common::{
    block::{BlockFeatures, BlockVersion},
    chain_config::ChainConfig,
    config::{
        ACCOUNT_MANAGER, CONTRACT_MANAGE, METHOD_CHARGE_GAS, METHOD_REFUND_GAS_VM,
        PARAM_ADDRESS, PARAM_CONTRACT_BYTECODE, PARAM_GAS, PARAM_GAS_REFUND,
    },
    transaction::{
        ExecOrderType, KeyValuePair, Transaction, TxResult, TxStatusCode, TxType,
        CONTRACT_RESULT_FAIL,
    },
};

use super::{
    accounts::AccountResolver,
    context::SimContext,
    dispatcher::WorkItem,
    gas::{base_gas, effective_gas_limit, need_charge_gas},
    provider::VmRuntime,
    sender_collection::SenderCollection,
    snapshot::Snapshot,
};

/// One execution attempt, not yet applied
pub struct ExecutedTx {
    pub ctx: SimContext,
    pub exec_order: ExecOrderType,
    pub run_ok: bool,
    /// Gas added to the payer total in the sender collection
    pub charged: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Applied,
    /// Iterator tx parked for the serial phase
    Deferred,
    /// Reads went stale, the tx must run again
    Conflict,
    /// Snapshot sealed before the tx could be applied
    Sealed,
}

impl ApplyStatus {
    /// Whether the tx needs no further attempt in the parallel phase
    pub fn is_final(&self) -> bool {
        !matches!(self, ApplyStatus::Conflict)
    }
}

#[derive(Debug, Clone)]
pub struct WorkOutcome {
    pub tx: Arc<Transaction>,
    pub status: ApplyStatus,
    pub applied_count: usize,
}

/// Runs transactions through the VM and applies them to the snapshot
pub struct TxExecutor {
    vm: Arc<dyn VmRuntime>,
    config: ChainConfig,
    block_version: BlockVersion,
    snapshot: Arc<dyn Snapshot>,
    resolver: AccountResolver,
    sender_collection: Option<Arc<SenderCollection>>,
}

impl TxExecutor {
    pub fn new(
        vm: Arc<dyn VmRuntime>,
        config: ChainConfig,
        block_version: BlockVersion,
        snapshot: Arc<dyn Snapshot>,
        resolver: AccountResolver,
        sender_collection: Option<Arc<SenderCollection>>,
    ) -> Self {
        Self {
            vm,
            config,
            block_version,
            snapshot,
            resolver,
            sender_collection,
        }
    }

    pub fn snapshot(&self) -> &Arc<dyn Snapshot> {
        &self.snapshot
    }

    pub fn sender_collection(&self) -> Option<&Arc<SenderCollection>> {
        self.sender_collection.as_ref()
    }

    // Collection used for per-tx accounting, from 2.3.4 on
    fn accounting_collection(&self) -> Option<&SenderCollection> {
        let features = BlockFeatures::for_version(self.block_version);
        if features.optimized_gas_accounting && self.config.optimize_charge_gas_enabled() {
            self.sender_collection.as_deref()
        } else {
            None
        }
    }

    fn finish(
        &self,
        mut ctx: SimContext,
        mut result: TxResult,
        exec_order: ExecOrderType,
        run_ok: bool,
        charged: u64,
    ) -> ExecutedTx {
        result.rw_set_hash = serde_json::to_vec(&ctx.rwset())
            .map(|bytes| self.config.hash_type.hash(&bytes).to_vec())
            .unwrap_or_default();
        ctx.set_exec_order(exec_order);
        ctx.set_result(result);

        ExecutedTx {
            ctx,
            exec_order,
            run_ok,
            charged,
        }
    }

    fn fail(&self, ctx: SimContext, code: TxStatusCode, message: impl Into<String>) -> ExecutedTx {
        let message = message.into();
        if log::log_enabled!(log::Level::Debug) {
            debug!("[EXECUTOR] tx {} failed before running: {} {}", ctx.tx_id(), code, message);
        }
        let gas_used = ctx.gas_used();
        self.finish(ctx, TxResult::failure(code, message, gas_used), ExecOrderType::Normal, false, 0)
    }

    /// Failed attempt of `tx` that never reaches the VM
    pub fn reject_tx(&self, tx: &Arc<Transaction>, code: TxStatusCode, message: impl Into<String>) -> ExecutedTx {
        let ctx = SimContext::new(Arc::clone(tx), Arc::clone(&self.snapshot), self.block_version);
        self.fail(ctx, code, message)
    }

    fn call_account_manager(
        &self,
        ctx: &mut SimContext,
        method: &str,
        parameters: &[KeyValuePair],
    ) -> Result<(), String> {
        let gas_used = ctx.gas_used();
        let (result, _, code) = self.vm.run(
            ACCOUNT_MANAGER,
            method,
            None,
            parameters,
            ctx,
            gas_used,
            TxType::InvokeContract,
        );
        if code.is_success() && result.is_success() {
            Ok(())
        } else {
            Err(result.message)
        }
    }

    /// Execute `tx` against a fresh context bound to the current snapshot
    pub fn execute_tx(&self, tx: &Arc<Transaction>) -> ExecutedTx {
        let features = BlockFeatures::for_version(self.block_version);
        let mut ctx = SimContext::new(Arc::clone(tx), Arc::clone(&self.snapshot), self.block_version);

        let need_charge = need_charge_gas(tx, self.block_version, &self.config);
        let gas_limit = effective_gas_limit(tx, self.block_version, &self.config);
        let collection = self.accounting_collection().filter(|_| need_charge);

        if let Some(collection) = collection {
            if let Err(e) = collection.check_balance(tx.id(), gas_limit.unwrap_or(0)) {
                return self.fail(ctx, e.status_code(), e.to_string());
            }
        }

        if need_charge && features.gas_limit_guard && gas_limit.is_none() {
            return self.fail(ctx, TxStatusCode::GasLimitNotSet, "gas limit is not set");
        }

        ctx.set_gas_used(base_gas(tx, &self.config));

        // Without optimize-charge-gas the payer is charged the full limit
        // up front and refunded after the run
        let mut per_tx_payer = None;
        if need_charge && !self.config.optimize_charge_gas_enabled() {
            if let Some(limit) = gas_limit {
                let payer = match self.resolver.payer_of(tx, self.snapshot.as_ref(), self.block_version) {
                    Ok(payer) => payer.address,
                    Err(e) => {
                        warn!("[EXECUTOR] cannot resolve payer of tx {}: {}", tx.id(), e);
                        return self.fail(ctx, TxStatusCode::InternalError, format!("failed to resolve payer: {}", e));
                    }
                };
                let parameters = [
                    KeyValuePair::new(PARAM_ADDRESS, payer.as_bytes()),
                    KeyValuePair::new(PARAM_GAS, limit.to_string()),
                ];
                if let Err(message) = self.call_account_manager(&mut ctx, METHOD_CHARGE_GAS, &parameters) {
                    return self.fail(ctx, TxStatusCode::GasBalanceNotEnoughFailed, message);
                }
                per_tx_payer = Some((payer, limit));
            }
        }

        let byte_code = if tx.contract_name() == CONTRACT_MANAGE {
            tx.payload.parameter(PARAM_CONTRACT_BYTECODE)
        } else {
            None
        };

        let checkpoint = ctx.checkpoint();
        let gas_used = ctx.gas_used();
        let (mut contract_result, vm_exec_order, code) = self.vm.run(
            tx.contract_name(),
            tx.method(),
            byte_code,
            &tx.payload.parameters,
            &mut ctx,
            gas_used,
            tx.tx_type(),
        );

        let mut failure = if !code.is_success() {
            Some((code, contract_result.message.clone()))
        } else if !contract_result.is_success() {
            Some((TxStatusCode::ContractFail, contract_result.message.clone()))
        } else {
            None
        };

        let mut charged = 0;
        if let Some(collection) = collection {
            match collection.charge_gas(tx.id(), contract_result.gas_used, gas_limit.unwrap_or(0)) {
                Ok(amount) => charged = amount,
                Err(e) => {
                    charged = e.charged();
                    contract_result.gas_used = charged;
                    failure.get_or_insert((e.status_code(), e.to_string()));
                }
            }
        }

        if let Some((_, limit)) = &per_tx_payer {
            if features.gas_limit_guard && contract_result.gas_used > *limit {
                contract_result.gas_used = *limit;
                failure.get_or_insert((
                    TxStatusCode::ContractFail,
                    format!("gas used exceeds gas limit {}", limit),
                ));
            }
        }

        if failure.is_some() {
            ctx.rollback(checkpoint);
        }

        if let Some((payer, limit)) = per_tx_payer {
            let refund = limit.saturating_sub(contract_result.gas_used);
            if features.gas_limit_guard && refund > 0 {
                let parameters = [
                    KeyValuePair::new(PARAM_ADDRESS, payer.as_bytes()),
                    KeyValuePair::new(PARAM_GAS_REFUND, refund.to_string()),
                ];
                if let Err(message) = self.call_account_manager(&mut ctx, METHOD_REFUND_GAS_VM, &parameters) {
                    warn!("[EXECUTOR] refund of {} gas to {} failed: {}", refund, payer, message);
                    failure.get_or_insert((TxStatusCode::InternalError, format!("refund failed: {}", message)));
                }
            }
        }

        contract_result.contract_event.extend(ctx.take_events());

        let exec_order = if tx.is_charge_gas_tx() {
            ExecOrderType::ChargeGas
        } else {
            vm_exec_order
        };

        let run_ok = failure.is_none();
        let result = match failure {
            None => TxResult::success(contract_result),
            Some((code, message)) => {
                contract_result.code = CONTRACT_RESULT_FAIL;
                if contract_result.message.is_empty() {
                    contract_result.message = message.clone();
                }
                TxResult {
                    code,
                    contract_result,
                    rw_set_hash: Vec::new(),
                    message,
                }
            }
        };

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "[EXECUTOR] tx {} ran at seq {}: {} gas {} order {}",
                tx.id(),
                ctx.tx_exec_seq(),
                result.code,
                result.gas_used(),
                exec_order
            );
        }

        self.finish(ctx, result, exec_order, run_ok, charged)
    }

    /// Apply an attempt, giving back its gas reservation when it does not
    /// make it into the tx table
    pub fn apply(&self, executed: ExecutedTx, is_verify: bool) -> WorkOutcome {
        let ExecutedTx {
            ctx,
            exec_order,
            run_ok,
            charged,
        } = executed;

        let (applied, applied_count) = self.snapshot.apply(&ctx, exec_order, run_ok, is_verify);
        let status = if !applied {
            if self.snapshot.is_sealed() {
                ApplyStatus::Sealed
            } else {
                ApplyStatus::Conflict
            }
        } else if !is_verify && exec_order == ExecOrderType::Iterator {
            ApplyStatus::Deferred
        } else {
            ApplyStatus::Applied
        };

        if status != ApplyStatus::Applied && charged > 0 {
            if let Some(collection) = &self.sender_collection {
                collection.refund(ctx.tx_id(), charged);
            }
        }

        WorkOutcome {
            tx: Arc::clone(ctx.tx()),
            status,
            applied_count,
        }
    }

    /// Execute or reject `item`, then apply it
    pub fn run(&self, item: &WorkItem, is_verify: bool) -> WorkOutcome {
        let executed = match item {
            WorkItem::Execute(tx) => self.execute_tx(tx),
            WorkItem::Reject(tx, code, message) => self.reject_tx(tx, *code, message.clone()),
        };
        self.apply(executed, is_verify)
    }
}
