use thiserror::Error;

/// Malformed DAG input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("DAG has {vertices} vertices but block has {txs} transactions")]
    VertexCountMismatch { vertices: usize, txs: usize },

    #[error("vertex {vertex} has non-increasing neighbors {neighbors:?}")]
    NonIncreasingNeighbors { vertex: usize, neighbors: Vec<u32> },

    #[error("vertex {vertex} references neighbor {neighbor} which is not a predecessor")]
    NeighborOutOfRange { vertex: usize, neighbor: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty public key")]
    EmptyPublicKey,

    #[error("unsupported member type {0}")]
    UnsupportedMemberType(String),
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}
