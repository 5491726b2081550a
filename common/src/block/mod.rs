mod version;

pub use version::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    dag::Dag,
    transaction::{Member, Transaction},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub block_height: u64,
    pub block_version: BlockVersion,
    pub block_timestamp: i64,
    pub proposer: Option<Member>,
}

/// Block under construction (propose) or under verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub dag: Dag,
    pub txs: Vec<Arc<Transaction>>,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            dag: Dag::default(),
            txs: Vec::new(),
        }
    }

    pub fn height(&self) -> u64 {
        self.header.block_height
    }

    pub fn version(&self) -> BlockVersion {
        self.header.block_version
    }
}
