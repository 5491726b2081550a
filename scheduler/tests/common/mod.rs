// Shared fixtures of the scheduler integration tests

#![allow(dead_code)]

use std::{
    sync::{atomic::AtomicU64, Arc},
    time::Duration,
};
use txsched::{
    config::SchedulerConfig,
    core::{
        accounts::AccountResolver,
        context::SimContext,
        provider::{PublicKeyAccessControl, VmRuntime},
        snapshot::{MemorySnapshot, MemoryStore, Snapshot},
    },
    TxScheduler,
};
use txsched_common::{
    block::{Block, BlockHeader, BlockVersion},
    chain_config::ChainConfig,
    config::{account_balance_key, account_frozen_key, ACCOUNT_FROZEN, ACCOUNT_MANAGER, METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT},
    crypto::Ed25519Identity,
    transaction::{
        ContractResult, EndorsementEntry, ExecOrderType, KeyValuePair, Limit, Member, MemberType, Payload,
        Transaction, TxStatusCode, TxType,
    },
};

pub const CONTRACT: &str = "c";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Contract runtime used by the integration tests.
///
/// * `put`: writes every parameter as `key = value`
/// * `read_write`: reads the key named by `read`, writes `write = value`
/// * `iterate`: like `put`, but asks for serial placement
/// * `slow`: sleeps for `ms` milliseconds, then behaves like `put`
///
/// Every call uses its whole gas limit. The account manager debits the
/// batch charge-gas amounts from the balances it holds.
pub struct TestVm;

impl TestVm {
    fn charge_accounts(parameters: &[KeyValuePair], ctx: &mut SimContext) -> (ContractResult, ExecOrderType, TxStatusCode) {
        for kv in parameters {
            let key = account_balance_key(&kv.key);
            let balance: u64 = match ctx.get(ACCOUNT_MANAGER, &key) {
                Ok(Some(raw)) => String::from_utf8_lossy(&raw).parse().unwrap_or(0),
                _ => 0,
            };
            let amount: u64 = String::from_utf8_lossy(&kv.value).parse().unwrap_or(0);
            let Some(balance) = balance.checked_sub(amount) else {
                return (
                    ContractResult::failure(format!("balance of {} not enough", kv.key), 0),
                    ExecOrderType::ChargeGas,
                    TxStatusCode::Success,
                );
            };
            ctx.put(ACCOUNT_MANAGER, &key, balance.to_string().into_bytes());
        }
        (ContractResult::success(Vec::new(), 0), ExecOrderType::ChargeGas, TxStatusCode::Success)
    }
}

impl VmRuntime for TestVm {
    fn run(
        &self,
        contract_name: &str,
        method: &str,
        _byte_code: Option<&[u8]>,
        parameters: &[KeyValuePair],
        ctx: &mut SimContext,
        _gas_used: u64,
        _tx_type: TxType,
    ) -> (ContractResult, ExecOrderType, TxStatusCode) {
        if contract_name == ACCOUNT_MANAGER && method == METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT {
            return Self::charge_accounts(parameters, ctx);
        }

        let gas_used = ctx.tx().payload.gas_limit().unwrap_or(0);
        let param = |name: &str| parameters.iter().find(|kv| kv.key == name).map(|kv| kv.value.clone());

        let order = match method {
            "read_write" => {
                let read = param("read").unwrap_or_default();
                let seen = match ctx.get(contract_name, &read) {
                    Ok(value) => value.unwrap_or_default(),
                    Err(e) => return (ContractResult::failure(e.to_string(), gas_used), ExecOrderType::Normal, TxStatusCode::Success),
                };
                let mut value = seen;
                value.extend_from_slice(ctx.tx_id().as_bytes());
                ctx.put(contract_name, &param("write").unwrap_or_default(), value);
                ExecOrderType::Normal
            }
            "put" | "iterate" | "slow" => {
                if method == "slow" {
                    let ms: u64 = param("ms")
                        .and_then(|raw| String::from_utf8(raw).ok())
                        .and_then(|raw| raw.parse().ok())
                        .unwrap_or(0);
                    std::thread::sleep(Duration::from_millis(ms));
                }
                for kv in parameters.iter().filter(|kv| kv.key != "ms") {
                    ctx.put(contract_name, kv.key.as_bytes(), kv.value.clone());
                }
                let tx_id = ctx.tx_id().to_string();
                ctx.emit_event(method, vec![tx_id]);
                if method == "iterate" {
                    ExecOrderType::Iterator
                } else {
                    ExecOrderType::Normal
                }
            }
            _ => {
                return (
                    ContractResult::failure(format!("unknown method {}", method), gas_used),
                    ExecOrderType::Normal,
                    TxStatusCode::Success,
                )
            }
        };

        (ContractResult::success(Vec::new(), gas_used), order, TxStatusCode::Success)
    }
}

pub fn member(seed: u8) -> Member {
    Member {
        org_id: "org1".to_string(),
        member_type: MemberType::PublicKey,
        member_info: vec![seed; 32],
    }
}

pub fn tx(tx_id: &str, sender: u8, method: &str, parameters: &[(&str, &str)], gas_limit: Option<u64>) -> Arc<Transaction> {
    Arc::new(Transaction {
        payload: Payload {
            chain_id: "chain1".to_string(),
            tx_type: TxType::InvokeContract,
            tx_id: tx_id.to_string(),
            timestamp: 0,
            contract_name: CONTRACT.to_string(),
            method: method.to_string(),
            parameters: parameters.iter().map(|(k, v)| KeyValuePair::new(*k, v.as_bytes())).collect(),
            limit: gas_limit.map(|gas_limit| Limit { gas_limit }),
        },
        sender: EndorsementEntry {
            signer: member(sender),
            signature: Vec::new(),
        },
        endorsers: Vec::new(),
        payer: None,
    })
}

/// `tx` signed by a certificate member, whose payer cannot be resolved
/// without certificate support
pub fn cert_signed_tx(tx_id: &str, method: &str, parameters: &[(&str, &str)], gas_limit: Option<u64>) -> Arc<Transaction> {
    let mut tx = (*tx(tx_id, 1, method, parameters, gas_limit)).clone();
    tx.sender.signer.member_type = MemberType::Cert;
    Arc::new(tx)
}

pub fn put_tx(tx_id: &str, key: &str, value: &str) -> Arc<Transaction> {
    tx(tx_id, 1, "put", &[(key, value)], None)
}

pub fn block(height: u64, version: BlockVersion) -> Block {
    Block::new(BlockHeader {
        chain_id: "chain1".to_string(),
        block_height: height,
        block_version: version,
        block_timestamp: 1_700_000_000,
        proposer: None,
    })
}

pub fn gas_chain_config() -> ChainConfig {
    let mut config = ChainConfig::default();
    config.gas.enable_gas = true;
    config.scheduler.enable_optimize_charge_gas = true;
    config
}

/// Account address of `member(seed)` on the default chain config
pub fn address_of(seed: u8) -> String {
    let config = ChainConfig::default();
    let resolver = AccountResolver::new(Arc::new(PublicKeyAccessControl), config.addr_type, config.hash_type);
    let empty = MemorySnapshot::new(0, Arc::new(MemoryStore::new()));
    resolver
        .resolve_member(&member(seed), &empty)
        .expect("public key members always resolve")
        .address
}

/// Committed state shared by a proposer and its verifiers
#[derive(Default, Clone)]
pub struct Genesis {
    balances: Vec<(String, u64)>,
    frozen: Vec<String>,
}

impl Genesis {
    pub fn with_balance(mut self, address: String, balance: u64) -> Self {
        self.balances.push((address, balance));
        self
    }

    pub fn with_frozen(mut self, address: String) -> Self {
        self.frozen.push(address);
        self
    }

    /// Fresh snapshot on top of this state
    pub fn snapshot(&self, height: u64) -> Arc<dyn Snapshot> {
        let store = MemoryStore::new();
        for (address, balance) in &self.balances {
            store.put(ACCOUNT_MANAGER, &account_balance_key(address), balance.to_string());
        }
        for address in &self.frozen {
            store.put(ACCOUNT_MANAGER, &account_frozen_key(address), ACCOUNT_FROZEN);
        }
        Arc::new(MemorySnapshot::new(height, Arc::new(store)))
    }
}

pub fn scheduler(chain_config: ChainConfig, config: SchedulerConfig) -> TxScheduler {
    scheduler_at_height(chain_config, config, 0)
}

pub fn scheduler_at_height(chain_config: ChainConfig, config: SchedulerConfig, ledger_height: u64) -> TxScheduler {
    let signer = Ed25519Identity::from_secret("org1", &[7u8; 32]).expect("32 byte secret");
    TxScheduler::new(
        Arc::new(TestVm),
        Arc::new(chain_config),
        Arc::new(PublicKeyAccessControl),
        Arc::new(AtomicU64::new(ledger_height)),
        Arc::new(signer),
        config,
    )
}

pub fn small_pool_config() -> SchedulerConfig {
    SchedulerConfig {
        pool_capacity: 4,
        ..SchedulerConfig::default()
    }
}
