// Builders shared by the unit tests of this crate

use std::sync::Arc;
use txsched_common::transaction::{
    EndorsementEntry, KeyValuePair, Limit, Member, MemberType, Payload, Transaction, TxType,
};

pub fn member(seed: u8) -> Member {
    Member {
        org_id: "org1".to_string(),
        member_type: MemberType::PublicKey,
        member_info: vec![seed; 32],
    }
}

pub fn tx_from(
    tx_id: &str,
    sender: u8,
    contract_name: &str,
    method: &str,
    parameters: Vec<KeyValuePair>,
    gas_limit: Option<u64>,
) -> Arc<Transaction> {
    Arc::new(Transaction {
        payload: Payload {
            chain_id: "chain1".to_string(),
            tx_type: TxType::InvokeContract,
            tx_id: tx_id.to_string(),
            timestamp: 0,
            contract_name: contract_name.to_string(),
            method: method.to_string(),
            parameters,
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

pub fn invoke_tx(tx_id: &str, contract_name: &str, method: &str) -> Arc<Transaction> {
    tx_from(tx_id, 1, contract_name, method, Vec::new(), None)
}
