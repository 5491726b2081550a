use std::time::Duration;

// Wall-clock budget for a proposer schedule
pub const SCHEDULE_TIMEOUT: Duration = Duration::from_secs(10);
// Wall-clock budget for re-executing a block following its DAG
pub const SCHEDULE_WITH_DAG_TIMEOUT: Duration = Duration::from_secs(20);

// Maximum nesting of cross-contract calls
pub const CALL_CONTRACT_DEPTH: usize = 5;

// Key layout separator: contract#key[#field]
pub const KEY_SEPARATOR: u8 = b'#';

// ===== SYSTEM CONTRACTS =====
pub const ACCOUNT_MANAGER: &str = "ACCOUNT_MANAGER";
pub const CONTRACT_MANAGE: &str = "CONTRACT_MANAGE";
pub const MULTI_SIGN: &str = "MULTI_SIGN";
pub const CERT_MANAGE: &str = "CERT_MANAGE";
pub const CHAIN_CONFIG: &str = "CHAIN_CONFIG";
pub const CHAIN_QUERY: &str = "CHAIN_QUERY";
pub const GOVERNANCE: &str = "GOVERNANCE";

// Contracts served natively by the node rather than by user bytecode
pub const SYSTEM_CONTRACTS: &[&str] = &[
    ACCOUNT_MANAGER,
    CONTRACT_MANAGE,
    MULTI_SIGN,
    CERT_MANAGE,
    CHAIN_CONFIG,
    CHAIN_QUERY,
    GOVERNANCE,
];

pub fn is_system_contract(contract_name: &str) -> bool {
    SYSTEM_CONTRACTS.contains(&contract_name)
}

// ACCOUNT_MANAGER methods
pub const METHOD_CHARGE_GAS: &str = "CHARGE_GAS";
pub const METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT: &str = "CHARGE_GAS_FOR_MULTI_ACCOUNT";
pub const METHOD_REFUND_GAS_VM: &str = "REFUND_GAS_VM";

// CONTRACT_MANAGE methods
pub const METHOD_INIT_CONTRACT: &str = "INIT_CONTRACT";
pub const METHOD_UPGRADE_CONTRACT: &str = "UPGRADE_CONTRACT";

// MULTI_SIGN methods
pub const METHOD_MULTI_SIGN_TRIG: &str = "TRIG";

// ACCOUNT_MANAGER parameter names
pub const PARAM_ADDRESS: &str = "address_key";
pub const PARAM_GAS: &str = "batch_recharge";
pub const PARAM_GAS_REFUND: &str = "gas_refund";

// CONTRACT_MANAGE parameter carrying the contract bytecode
pub const PARAM_CONTRACT_BYTECODE: &str = "CONTRACT_BYTECODE";

// ===== ACCOUNT_MANAGER STORAGE LAYOUT =====
// Balance of an address, stored as a decimal string
pub const ACCOUNT_PREFIX: &str = "__account_prefix__";
// Frozen flag of an address, "0" or "1"
pub const FROZEN_PREFIX: &str = "__frozen_account__";
// Payer address configured for a contract
pub const CONTRACT_PAYER_PREFIX: &str = "__contract_payer__";

pub const ACCOUNT_FROZEN: &str = "1";

// Address prefix used by the ZXL address type
pub const ZXL_ADDRESS_PREFIX: &str = "ZX";

// Returns the ACCOUNT_MANAGER key holding the balance of an address
pub fn account_balance_key(address: &str) -> Vec<u8> {
    format!("{}{}", ACCOUNT_PREFIX, address).into_bytes()
}

// Returns the ACCOUNT_MANAGER key holding the frozen flag of an address
pub fn account_frozen_key(address: &str) -> Vec<u8> {
    format!("{}{}", FROZEN_PREFIX, address).into_bytes()
}

// Returns the ACCOUNT_MANAGER key holding the payer of a contract
pub fn contract_payer_key(contract_name: &str) -> Vec<u8> {
    format!("{}{}", CONTRACT_PAYER_PREFIX, contract_name).into_bytes()
}
