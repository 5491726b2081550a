use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status codes carried by transaction results
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[repr(u16)]
pub enum TxStatusCode {
    #[default]
    #[strum(serialize = "SUCCESS")]
    Success = 0,
    #[strum(serialize = "TIMEOUT")]
    Timeout = 1,
    #[strum(serialize = "INVALID_PARAMETER")]
    InvalidParameter = 2,
    #[strum(serialize = "CONTRACT_FAIL")]
    ContractFail = 4,
    #[strum(serialize = "INTERNAL_ERROR")]
    InternalError = 5,
    #[strum(serialize = "GAS_BALANCE_NOT_ENOUGH_FAILED")]
    GasBalanceNotEnoughFailed = 44,
    #[strum(serialize = "GAS_LIMIT_NOT_SET")]
    GasLimitNotSet = 45,
    #[strum(serialize = "GET_ACCOUNT_BALANCE_FAILED")]
    GetAccountBalanceFailed = 46,
    #[strum(serialize = "PARSE_ACCOUNT_BALANCE_FAILED")]
    ParseAccountBalanceFailed = 47,
    #[strum(serialize = "GET_ACCOUNT_STATUS_FAILED")]
    GetAccountStatusFailed = 48,
    #[strum(serialize = "ACCOUNT_STATUS_FROZEN")]
    AccountStatusFrozen = 49,
}

impl TxStatusCode {
    pub fn is_success(&self) -> bool {
        matches!(self, TxStatusCode::Success)
    }
}

pub const CONTRACT_RESULT_SUCCESS: u32 = 0;
pub const CONTRACT_RESULT_FAIL: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub topic: String,
    pub tx_id: String,
    pub contract_name: String,
    pub contract_version: String,
    pub event_data: Vec<String>,
}

/// Outcome of a contract invocation as reported by the VM
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractResult {
    pub code: u32,
    pub result: Vec<u8>,
    pub message: String,
    pub gas_used: u64,
    pub contract_event: Vec<ContractEvent>,
}

impl ContractResult {
    pub fn success(result: Vec<u8>, gas_used: u64) -> Self {
        Self {
            code: CONTRACT_RESULT_SUCCESS,
            result,
            message: String::new(),
            gas_used,
            contract_event: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>, gas_used: u64) -> Self {
        Self {
            code: CONTRACT_RESULT_FAIL,
            result: Vec::new(),
            message: message.into(),
            gas_used,
            contract_event: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CONTRACT_RESULT_SUCCESS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxResult {
    pub code: TxStatusCode,
    pub contract_result: ContractResult,
    pub rw_set_hash: Vec<u8>,
    pub message: String,
}

impl TxResult {
    pub fn success(contract_result: ContractResult) -> Self {
        Self {
            code: TxStatusCode::Success,
            contract_result,
            rw_set_hash: Vec::new(),
            message: String::new(),
        }
    }

    /// Failed result whose contract result mirrors the status message
    pub fn failure(code: TxStatusCode, message: impl Into<String>, gas_used: u64) -> Self {
        let message = message.into();
        Self {
            code,
            contract_result: ContractResult::failure(message.clone(), gas_used),
            rw_set_hash: Vec::new(),
            message,
        }
    }

    pub fn gas_used(&self) -> u64 {
        self.contract_result.gas_used
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_code_names() {
        assert_eq!(
            TxStatusCode::GasBalanceNotEnoughFailed.to_string(),
            "GAS_BALANCE_NOT_ENOUGH_FAILED"
        );
        assert_eq!(
            TxStatusCode::from_str("ACCOUNT_STATUS_FROZEN").unwrap(),
            TxStatusCode::AccountStatusFrozen
        );
    }

    #[test]
    fn test_failure_result() {
        let result = TxResult::failure(TxStatusCode::GasLimitNotSet, "gas limit is not set", 0);
        assert!(!result.is_success());
        assert!(!result.contract_result.is_success());
        assert_eq!(result.contract_result.message, "gas limit is not set");
    }
}
