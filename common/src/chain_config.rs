use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    block::BlockVersion,
    crypto::{AddrType, HashType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConsensusType {
    #[default]
    Solo,
    Tbft,
    Raft,
    Maxbft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasAccountConfig {
    pub enable_gas: bool,
    /// Gas charged for a tx that does not set its own limit
    pub default_gas: u64,
    pub default_gas_price: f32,
    /// Base gas for installing or upgrading a contract
    pub install_base_gas: u64,
}

impl Default for GasAccountConfig {
    fn default() -> Self {
        Self {
            enable_gas: false,
            default_gas: 0,
            default_gas_price: 0.0,
            install_base_gas: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    pub enable_sql_support: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerFlags {
    pub enable_optimize_charge_gas: bool,
    pub enable_sender_group: bool,
    pub enable_conflicts_bit_window: bool,
}

/// On-chain configuration as seen by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: String,
    pub block_version: BlockVersion,
    pub consensus_type: ConsensusType,
    pub hash_type: HashType,
    pub addr_type: AddrType,
    pub gas: GasAccountConfig,
    pub contract: ContractConfig,
    pub scheduler: SchedulerFlags,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: "chain1".to_string(),
            block_version: 0,
            consensus_type: ConsensusType::default(),
            hash_type: HashType::default(),
            addr_type: AddrType::default(),
            gas: GasAccountConfig::default(),
            contract: ContractConfig::default(),
            scheduler: SchedulerFlags::default(),
        }
    }
}

impl ChainConfig {
    pub fn gas_enabled(&self) -> bool {
        self.gas.enable_gas
    }

    pub fn optimize_charge_gas_enabled(&self) -> bool {
        self.gas.enable_gas && self.scheduler.enable_optimize_charge_gas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial() {
        let config: ChainConfig = serde_json::from_str(
            r#"{"consensus_type":"TBFT","gas":{"enable_gas":true},"scheduler":{"enable_sender_group":true}}"#,
        )
        .unwrap();
        assert_eq!(config.consensus_type, ConsensusType::Tbft);
        assert!(config.gas_enabled());
        assert!(!config.optimize_charge_gas_enabled());
        assert!(config.scheduler.enable_sender_group);
        assert_eq!(config.chain_id, "chain1");
    }
}
