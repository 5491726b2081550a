// Collaborators consumed by the scheduler.
//
// The VM, the chain configuration, member resolution and the ledger are
// owned by the node; the scheduler only sees them through these traits.

use std::sync::atomic::{AtomicU64, Ordering};
use txsched_common::{
    chain_config::ChainConfig,
    crypto::PublicKey,
    transaction::{
        ContractResult, ExecOrderType, KeyValuePair, Member, MemberType, TxStatusCode, TxType,
    },
};

use super::{context::SimContext, error::AccessControlError};

/// Contract runtime executing a single invocation against a `SimContext`
pub trait VmRuntime: Send + Sync {
    /// Run `method` of `contract_name`.
    ///
    /// `gas_used` is the gas already consumed by the tx before the call.
    /// The returned `ExecOrderType` tells the scheduler whether the tx
    /// must be placed serially after the parallel ones.
    fn run(
        &self,
        contract_name: &str,
        method: &str,
        byte_code: Option<&[u8]>,
        parameters: &[KeyValuePair],
        ctx: &mut SimContext,
        gas_used: u64,
        tx_type: TxType,
    ) -> (ContractResult, ExecOrderType, TxStatusCode);
}

pub trait ChainConf: Send + Sync {
    fn chain_config(&self) -> ChainConfig;
}

impl ChainConf for ChainConfig {
    fn chain_config(&self) -> ChainConfig {
        self.clone()
    }
}

impl ChainConf for parking_lot::RwLock<ChainConfig> {
    fn chain_config(&self) -> ChainConfig {
        self.read().clone()
    }
}

/// Resolves members carrying certificates to their public key
pub trait AccessControl: Send + Sync {
    fn resolve_public_key(&self, member: &Member) -> Result<PublicKey, AccessControlError>;
}

/// Access control for chains whose members are raw public keys
#[derive(Debug, Default, Clone, Copy)]
pub struct PublicKeyAccessControl;

impl AccessControl for PublicKeyAccessControl {
    fn resolve_public_key(&self, member: &Member) -> Result<PublicKey, AccessControlError> {
        match member.member_type {
            MemberType::PublicKey if !member.member_info.is_empty() => {
                Ok(PublicKey::new(member.member_info.clone()))
            }
            MemberType::PublicKey => Err(AccessControlError::InvalidMember(
                "empty public key".to_string(),
            )),
            other => Err(AccessControlError::InvalidMember(format!(
                "member type {} requires certificate support",
                other
            ))),
        }
    }
}

pub trait LedgerCache: Send + Sync {
    /// Height of the last committed block
    fn current_height(&self) -> u64;
}

impl LedgerCache for AtomicU64 {
    fn current_height(&self) -> u64 {
        self.load(Ordering::SeqCst)
    }
}
