use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use txsched_common::{
    block::{BlockFeatures, BlockVersion},
    config::{
        account_balance_key, account_frozen_key, contract_payer_key, ACCOUNT_FROZEN,
        ACCOUNT_MANAGER, CERT_MANAGE,
    },
    crypto::{public_key_to_address, AddrType, HashType, PublicKey},
    transaction::{Member, MemberType, Transaction, TxStatusCode},
};

use super::{error::AccessControlError, provider::AccessControl, snapshot::Snapshot};

/// Account paying the gas of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payer {
    pub address: String,
    /// Unknown when the payer comes from the contract configuration
    pub public_key: Option<PublicKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountStatus {
    Normal,
    /// Txs paid by this account fail with `code` without running
    Abnormal { code: TxStatusCode, message: String },
}

impl AccountStatus {
    pub fn is_normal(&self) -> bool {
        matches!(self, AccountStatus::Normal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub balance: u64,
    pub status: AccountStatus,
}

pub type ResolverCache = DashMap<(AddrType, HashType, Member), Payer>;

/// Resolves members and transactions to account addresses
#[derive(Clone)]
pub struct AccountResolver {
    access_control: Arc<dyn AccessControl>,
    addr_type: AddrType,
    hash_type: HashType,
    cache: Arc<ResolverCache>,
}

impl AccountResolver {
    pub fn new(access_control: Arc<dyn AccessControl>, addr_type: AddrType, hash_type: HashType) -> Self {
        Self::with_cache(access_control, addr_type, hash_type, Arc::new(DashMap::new()))
    }

    /// Resolver sharing `cache` with other resolvers
    pub fn with_cache(
        access_control: Arc<dyn AccessControl>,
        addr_type: AddrType,
        hash_type: HashType,
        cache: Arc<ResolverCache>,
    ) -> Self {
        Self {
            access_control,
            addr_type,
            hash_type,
            cache,
        }
    }

    pub fn new_cache() -> Arc<ResolverCache> {
        Arc::new(DashMap::new())
    }

    pub fn resolve_member(&self, member: &Member, snapshot: &dyn Snapshot) -> Result<Payer, AccessControlError> {
        let cache_key = (self.addr_type, self.hash_type, member.clone());
        if let Some(payer) = self.cache.get(&cache_key) {
            return Ok(payer.clone());
        }

        let public_key = match member.member_type {
            MemberType::PublicKey => PublicKey::new(member.member_info.clone()),
            MemberType::Cert => self.access_control.resolve_public_key(member)?,
            MemberType::CertHash => {
                let cert_hash = hex::encode(&member.member_info);
                let cert = snapshot
                    .get_key(CERT_MANAGE, cert_hash.as_bytes())?
                    .ok_or_else(|| AccessControlError::CertNotFound(cert_hash.clone()))?;
                self.access_control.resolve_public_key(&Member {
                    org_id: member.org_id.clone(),
                    member_type: MemberType::Cert,
                    member_info: cert,
                })?
            }
        };

        let address = public_key_to_address(&public_key, self.addr_type, self.hash_type)?;
        let payer = Payer {
            address,
            public_key: Some(public_key),
        };
        self.cache.insert(cache_key, payer.clone());
        Ok(payer)
    }

    /// Resolve who pays for `tx`: the explicit payer, then the payer
    /// configured for the contract, then the sender. Chains older than
    /// 2.3.1 always charge the sender.
    pub fn payer_of(
        &self,
        tx: &Transaction,
        snapshot: &dyn Snapshot,
        block_version: BlockVersion,
    ) -> Result<Payer, AccessControlError> {
        if BlockFeatures::for_version(block_version).payer_resolution {
            if let Some(payer) = &tx.payer {
                return self.resolve_member(&payer.signer, snapshot);
            }

            if let Some(address) =
                snapshot.get_key(ACCOUNT_MANAGER, &contract_payer_key(tx.contract_name()))?
            {
                if !address.is_empty() {
                    return Ok(Payer {
                        address: String::from_utf8_lossy(&address).into_owned(),
                        public_key: None,
                    });
                }
            }
        }

        self.resolve_member(&tx.sender.signer, snapshot)
    }
}

/// Read the balance and frozen flag of `address`
pub fn load_account(snapshot: &dyn Snapshot, address: &str, block_version: BlockVersion) -> AccountState {
    let abnormal = |code: TxStatusCode, message: String| {
        debug!("[ACCOUNTS] account {} is unusable: {}", address, message);
        AccountState {
            balance: 0,
            status: AccountStatus::Abnormal { code, message },
        }
    };

    let balance = match snapshot.get_key(ACCOUNT_MANAGER, &account_balance_key(address)) {
        Ok(None) => 0,
        Ok(Some(raw)) => match std::str::from_utf8(&raw).ok().and_then(|s| s.parse::<u64>().ok()) {
            Some(balance) => balance,
            None => {
                return abnormal(
                    TxStatusCode::ParseAccountBalanceFailed,
                    format!("invalid balance {:?} of account {}", String::from_utf8_lossy(&raw), address),
                )
            }
        },
        Err(e) => {
            return abnormal(
                TxStatusCode::GetAccountBalanceFailed,
                format!("failed to read balance of account {}: {}", address, e),
            )
        }
    };

    match snapshot.get_key(ACCOUNT_MANAGER, &account_frozen_key(address)) {
        Ok(Some(flag)) if flag == ACCOUNT_FROZEN.as_bytes() => {
            if BlockFeatures::for_version(block_version).typed_frozen_status {
                abnormal(TxStatusCode::AccountStatusFrozen, format!("account {} is frozen", address))
            } else {
                abnormal(TxStatusCode::ContractFail, "account is frozen".to_string())
            }
        }
        Ok(_) => AccountState {
            balance,
            status: AccountStatus::Normal,
        },
        Err(e) => abnormal(
            TxStatusCode::GetAccountStatusFailed,
            format!("failed to read status of account {}: {}", address, e),
        ),
    }
}
