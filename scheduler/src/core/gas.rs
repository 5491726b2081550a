use txsched_common::{
    block::{BlockFeatures, BlockVersion},
    chain_config::ChainConfig,
    config::{
        is_system_contract, CONTRACT_MANAGE, METHOD_INIT_CONTRACT, METHOD_MULTI_SIGN_TRIG,
        METHOD_UPGRADE_CONTRACT, MULTI_SIGN,
    },
    transaction::{Transaction, TxType},
};

fn is_install(tx: &Transaction) -> bool {
    tx.contract_name() == CONTRACT_MANAGE
        && (tx.method() == METHOD_INIT_CONTRACT || tx.method() == METHOD_UPGRADE_CONTRACT)
}

/// Whether gas is metered for `tx`.
///
/// User contracts always pay. System contracts do not, except contract
/// installation and multi-sign triggers from 2.3.0 on.
pub fn need_charge_gas(tx: &Transaction, block_version: BlockVersion, config: &ChainConfig) -> bool {
    if !config.gas_enabled() || tx.is_charge_gas_tx() || tx.tx_type() != TxType::InvokeContract {
        return false;
    }

    if !is_system_contract(tx.contract_name()) {
        return true;
    }

    BlockFeatures::for_version(block_version).gas_limit_guard
        && (is_install(tx) || (tx.contract_name() == MULTI_SIGN && tx.method() == METHOD_MULTI_SIGN_TRIG))
}

/// Gas limit used for accounting: the tx limit, or the chain default on
/// chains older than 2.3.0
pub fn effective_gas_limit(tx: &Transaction, block_version: BlockVersion, config: &ChainConfig) -> Option<u64> {
    match tx.payload.gas_limit() {
        Some(limit) => Some(limit),
        None if !BlockFeatures::for_version(block_version).gas_limit_guard && config.gas.default_gas > 0 => {
            Some(config.gas.default_gas)
        }
        None => None,
    }
}

/// Gas consumed before the contract starts running
pub fn base_gas(tx: &Transaction, config: &ChainConfig) -> u64 {
    if config.gas_enabled() && is_install(tx) {
        config.gas.install_base_gas
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::{invoke_tx, tx_from};
    use txsched_common::{
        block::BLOCK_VERSION_2300,
        config::{ACCOUNT_MANAGER, METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT},
    };

    fn config() -> ChainConfig {
        let mut config = ChainConfig::default();
        config.gas.enable_gas = true;
        config.gas.default_gas = 7;
        config.gas.install_base_gas = 100;
        config
    }

    #[test]
    fn test_need_charge_gas() {
        let config = config();
        assert!(need_charge_gas(&invoke_tx("t", "user", "m"), BLOCK_VERSION_2300, &config));
        assert!(!need_charge_gas(&invoke_tx("t", ACCOUNT_MANAGER, "m"), BLOCK_VERSION_2300, &config));
        assert!(!need_charge_gas(
            &invoke_tx("t", ACCOUNT_MANAGER, METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT),
            BLOCK_VERSION_2300,
            &config
        ));

        let install = invoke_tx("t", CONTRACT_MANAGE, METHOD_INIT_CONTRACT);
        assert!(need_charge_gas(&install, BLOCK_VERSION_2300, &config));
        assert!(!need_charge_gas(&install, 220, &config));
        assert!(need_charge_gas(&invoke_tx("t", MULTI_SIGN, METHOD_MULTI_SIGN_TRIG), BLOCK_VERSION_2300, &config));

        assert!(!need_charge_gas(&invoke_tx("t", "user", "m"), BLOCK_VERSION_2300, &ChainConfig::default()));
    }

    #[test]
    fn test_effective_gas_limit_and_base_gas() {
        let config = config();
        let unset = invoke_tx("t", "user", "m");
        assert_eq!(effective_gas_limit(&unset, 220, &config), Some(7));
        assert_eq!(effective_gas_limit(&unset, BLOCK_VERSION_2300, &config), None);

        let set = tx_from("t", 1, "user", "m", Vec::new(), Some(50));
        assert_eq!(effective_gas_limit(&set, BLOCK_VERSION_2300, &config), Some(50));

        assert_eq!(base_gas(&invoke_tx("t", CONTRACT_MANAGE, METHOD_UPGRADE_CONTRACT), &config), 100);
        assert_eq!(base_gas(&set, &config), 0);
    }
}
