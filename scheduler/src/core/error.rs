use thiserror::Error;
use txsched_common::{
    error::{AddressError, DagError, SignerError},
    transaction::TxStatusCode,
};

/// Failure reading the state projected by a snapshot
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("failed to read {contract}#{key}: {reason}")]
    Read {
        contract: String,
        key: String,
        reason: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessControlError {
    #[error("no certificate found for hash {0}")]
    CertNotFound(String),

    #[error("failed to parse member: {0}")]
    InvalidMember(String),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Per-sender gas bookkeeping failures, mapped to tx status codes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GasError {
    #[error("tx {0} has no payer in the sender collection")]
    UnknownTx(String),

    #[error("{message}")]
    Account { code: TxStatusCode, message: String },

    #[error("balance {balance} cannot cover {required} gas")]
    BalanceNotEnough { balance: u64, required: u64 },

    #[error("gas used {gas_used} exceeds gas limit {gas_limit}")]
    GasLimitExceeded {
        gas_used: u64,
        gas_limit: u64,
        charged: u64,
    },

    #[error("balance exhausted, charged the remaining {charged}")]
    BalanceExhausted { charged: u64 },
}

impl GasError {
    /// Status code reported on the tx result
    pub fn status_code(&self) -> TxStatusCode {
        match self {
            GasError::UnknownTx(_) => TxStatusCode::InternalError,
            GasError::Account { code, .. } => *code,
            GasError::BalanceNotEnough { .. } | GasError::BalanceExhausted { .. } => {
                TxStatusCode::GasBalanceNotEnoughFailed
            }
            GasError::GasLimitExceeded { .. } => TxStatusCode::ContractFail,
        }
    }

    /// Gas charged despite the failure
    pub fn charged(&self) -> u64 {
        match self {
            GasError::GasLimitExceeded { charged, .. } | GasError::BalanceExhausted { charged } => {
                *charged
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("block height {block_height} is not above ledger height {ledger_height}")]
    StaleBlockHeight { block_height: u64, ledger_height: u64 },

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed DAG: {0}")]
    DagShape(#[from] DagError),

    #[error("DAG mismatch: {0}")]
    DagMismatch(String),

    #[error("charge gas mismatch: {0}")]
    ChargeGasMismatch(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
