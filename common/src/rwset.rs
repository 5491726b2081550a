use serde::{Deserialize, Serialize};

use crate::config::KEY_SEPARATOR;

/// Build the state key of `key` inside `contract`: `contract#key`
pub fn construct_key(contract_name: &str, key: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(contract_name.len() + 1 + key.len());
    full.extend_from_slice(contract_name.as_bytes());
    full.push(KEY_SEPARATOR);
    full.extend_from_slice(key);
    full
}

/// Build a contract-level key addressing a field: `key#field`
pub fn construct_field_key(key: &[u8], field: &[u8]) -> Vec<u8> {
    if field.is_empty() {
        return key.to_vec();
    }

    let mut full = Vec::with_capacity(key.len() + 1 + field.len());
    full.extend_from_slice(key);
    full.push(KEY_SEPARATOR);
    full.extend_from_slice(field);
    full
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRead {
    pub contract_name: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl TxRead {
    pub fn full_key(&self) -> Vec<u8> {
        construct_key(&self.contract_name, &self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxWrite {
    pub contract_name: String,
    pub key: Vec<u8>,
    /// Empty value deletes the key
    pub value: Vec<u8>,
}

impl TxWrite {
    pub fn full_key(&self) -> Vec<u8> {
        construct_key(&self.contract_name, &self.key)
    }

    pub fn is_deletion(&self) -> bool {
        self.value.is_empty()
    }
}

/// Ordered reads and writes of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxRwSet {
    pub tx_id: String,
    pub tx_reads: Vec<TxRead>,
    pub tx_writes: Vec<TxWrite>,
}

impl TxRwSet {
    pub fn new(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            tx_reads: Vec::new(),
            tx_writes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(construct_key("c", b"k1"), b"c#k1".to_vec());
        assert_eq!(construct_field_key(b"k1", b"f"), b"k1#f".to_vec());
        assert_eq!(construct_field_key(b"k1", b""), b"k1".to_vec());
    }
}
