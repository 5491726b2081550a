mod result;

pub use result::*;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::{ACCOUNT_MANAGER, METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT};

/// Kind of identity material carried by a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum MemberType {
    #[strum(serialize = "CERT")]
    Cert,
    #[strum(serialize = "CERT_HASH")]
    CertHash,
    #[strum(serialize = "PUBLIC_KEY")]
    PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub org_id: String,
    pub member_type: MemberType,
    pub member_info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementEntry {
    pub signer: Member,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: Vec<u8>,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum TxType {
    #[strum(serialize = "INVOKE_CONTRACT")]
    InvokeContract,
    #[strum(serialize = "QUERY_CONTRACT")]
    QueryContract,
    #[strum(serialize = "SUBSCRIBE")]
    Subscribe,
    #[strum(serialize = "ARCHIVE")]
    Archive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub chain_id: String,
    pub tx_type: TxType,
    pub tx_id: String,
    pub timestamp: i64,
    pub contract_name: String,
    pub method: String,
    pub parameters: Vec<KeyValuePair>,
    pub limit: Option<Limit>,
}

impl Payload {
    pub fn gas_limit(&self) -> Option<u64> {
        self.limit.map(|limit| limit.gas_limit)
    }

    pub fn parameter(&self, key: &str) -> Option<&[u8]> {
        self.parameters
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_slice())
    }
}

/// Immutable transaction as found in a block or a proposal batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub payload: Payload,
    pub sender: EndorsementEntry,
    pub endorsers: Vec<EndorsementEntry>,
    pub payer: Option<EndorsementEntry>,
}

impl Transaction {
    pub fn id(&self) -> &str {
        &self.payload.tx_id
    }

    pub fn contract_name(&self) -> &str {
        &self.payload.contract_name
    }

    pub fn method(&self) -> &str {
        &self.payload.method
    }

    pub fn tx_type(&self) -> TxType {
        self.payload.tx_type
    }

    /// Whether this is the synthesized batch charge-gas transaction
    pub fn is_charge_gas_tx(&self) -> bool {
        self.payload.contract_name == ACCOUNT_MANAGER
            && self.payload.method == METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT
    }
}

/// Placement class of a transaction, observed at execution time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
pub enum ExecOrderType {
    #[default]
    #[strum(serialize = "NORMAL")]
    Normal,
    /// Must run serially after every normal transaction
    #[strum(serialize = "ITERATOR")]
    Iterator,
    /// Terminal batch charge-gas transaction
    #[strum(serialize = "CHARGE_GAS")]
    ChargeGas,
}
