use indexmap::IndexMap;
use log::{debug, warn};
use std::{collections::HashMap, sync::Arc};
use txsched_common::{
    block::{BlockFeatures, BlockHeader, BlockVersion},
    chain_config::ChainConfig,
    config::{ACCOUNT_MANAGER, METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT},
    crypto::{HashType, SigningIdentity},
    transaction::{EndorsementEntry, KeyValuePair, Limit, Payload, Transaction, TxResult, TxType},
};

use super::{
    accounts::AccountResolver, error::SchedulerError, gas::need_charge_gas,
    sender_collection::SenderCollection, snapshot::Snapshot,
};

/// Gas to charge per payer address, in order of first appearance.
///
/// From 2.3.4 on the totals are the gas used by the txs of `tx_table`;
/// older chains sum the results of the sender collection.
pub fn charge_totals(
    tx_table: &[Arc<Transaction>],
    results: &HashMap<String, TxResult>,
    collection: &SenderCollection,
    resolver: &AccountResolver,
    snapshot: &dyn Snapshot,
    config: &ChainConfig,
    block_version: BlockVersion,
) -> IndexMap<String, u64> {
    if !BlockFeatures::for_version(block_version).optimized_gas_accounting {
        return collection.totals_from_results(results);
    }

    let mut totals: IndexMap<String, u64> = IndexMap::new();
    for tx in tx_table {
        if !need_charge_gas(tx, block_version, config) {
            continue;
        }
        let Some(result) = results.get(tx.id()) else {
            continue;
        };
        if result.gas_used() == 0 {
            continue;
        }

        let address = match collection.address_of(tx.id()) {
            Some(address) => address.to_string(),
            None => match resolver.payer_of(tx, snapshot, block_version) {
                Ok(payer) => payer.address,
                Err(e) => {
                    warn!("[CHARGE_GAS] cannot resolve payer of tx {}: {}", tx.id(), e);
                    continue;
                }
            },
        };

        let total = totals.entry(address).or_insert(0);
        *total = total.saturating_add(result.gas_used());
    }

    totals
}

/// Build and sign the batch charge-gas transaction of a block
pub fn create_charge_gas_tx(
    totals: &IndexMap<String, u64>,
    header: &BlockHeader,
    signer: &dyn SigningIdentity,
    hash_type: HashType,
) -> Result<Transaction, SchedulerError> {
    let tx_id = hex::encode(rand::random::<[u8; 32]>());
    let parameters = totals
        .iter()
        .map(|(address, total)| KeyValuePair::new(address.clone(), total.to_string()))
        .collect();

    let payload = Payload {
        chain_id: header.chain_id.clone(),
        tx_type: TxType::InvokeContract,
        tx_id,
        timestamp: header.block_timestamp,
        contract_name: ACCOUNT_MANAGER.to_string(),
        method: METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT.to_string(),
        parameters,
        limit: Some(Limit { gas_limit: 0 }),
    };

    let signature = signer.sign(&serde_json::to_vec(&payload)?, hash_type)?;
    let sender = EndorsementEntry {
        signer: signer.member(),
        signature,
    };

    debug!(
        "[CHARGE_GAS] charging {} accounts in tx {}",
        totals.len(),
        payload.tx_id
    );

    Ok(Transaction {
        payload,
        endorsers: vec![sender.clone()],
        sender,
        payer: None,
    })
}

/// Per-address amounts carried by a charge-gas transaction
pub fn parse_charge_gas_tx(tx: &Transaction) -> Result<IndexMap<String, u64>, String> {
    tx.payload
        .parameters
        .iter()
        .map(|kv| {
            std::str::from_utf8(&kv.value)
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .map(|amount| (kv.key.clone(), amount))
                .ok_or_else(|| format!("invalid amount for {}", kv.key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use txsched_common::{
        crypto::Ed25519Identity,
        transaction::{Member, MemberType},
    };

    #[test]
    fn test_create_and_parse() {
        let mut totals = IndexMap::new();
        totals.insert("addr1".to_string(), 203u64);
        totals.insert("addr2".to_string(), 7u64);
        let header = BlockHeader {
            chain_id: "chain1".to_string(),
            block_height: 3,
            block_version: 2030400,
            block_timestamp: 1_700_000_000,
            proposer: None,
        };
        let signer = Ed25519Identity::from_secret("org1", &[7u8; 32]).unwrap();

        let tx = create_charge_gas_tx(&totals, &header, &signer, HashType::Sha256).unwrap();
        assert!(tx.is_charge_gas_tx());
        assert_eq!(tx.payload.gas_limit(), Some(0));
        assert_eq!(tx.endorsers, vec![tx.sender.clone()]);
        assert_eq!(tx.payload.parameter("addr1"), Some(b"203".as_slice()));
        assert_eq!(parse_charge_gas_tx(&tx).unwrap(), totals);
        assert_eq!(tx.id().len(), 64);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let mut tx = Transaction {
            payload: Payload {
                chain_id: String::new(),
                tx_type: TxType::InvokeContract,
                tx_id: "t".to_string(),
                timestamp: 0,
                contract_name: ACCOUNT_MANAGER.to_string(),
                method: METHOD_CHARGE_GAS_FOR_MULTI_ACCOUNT.to_string(),
                parameters: vec![KeyValuePair::new("a", "x1")],
                limit: None,
            },
            sender: EndorsementEntry {
                signer: Member {
                    org_id: String::new(),
                    member_type: MemberType::PublicKey,
                    member_info: Vec::new(),
                },
                signature: Vec::new(),
            },
            endorsers: Vec::new(),
            payer: None,
        };
        assert!(parse_charge_gas_tx(&tx).is_err());
        tx.payload.parameters = vec![KeyValuePair::new("a", "12")];
        assert_eq!(parse_charge_gas_tx(&tx).unwrap().get("a"), Some(&12));
    }
}
