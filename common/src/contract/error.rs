//! Contract Error Codes
//!
//! Runtime failures use the 0x01xx range. Contracts pick their own range
//! for `Revert` codes (token 0x02xx, savings 0x03xx).

use thiserror::Error;

use crate::crypto::Hash;

pub const EXIT_SUCCESS: u64 = 0;

// ===== Runtime Errors (0x0100 - 0x01FF) =====

pub const RUNTIME_ERROR_UNKNOWN_ENTRY: u64 = 0x0100;
pub const RUNTIME_ERROR_INVALID_INPUT: u64 = 0x0101;
pub const RUNTIME_ERROR_CONTRACT_NOT_FOUND: u64 = 0x0102;
pub const RUNTIME_ERROR_INSUFFICIENT_BALANCE: u64 = 0x0103;
pub const RUNTIME_ERROR_OVERFLOW: u64 = 0x0104;
pub const RUNTIME_ERROR_OUT_OF_GAS: u64 = 0x0105;
pub const RUNTIME_ERROR_CALL_DEPTH: u64 = 0x0106;
pub const RUNTIME_ERROR_EVENT_TOO_LARGE: u64 = 0x0107;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// Contract-defined failure, carries the revert reason
    #[error("{reason}")]
    Revert { code: u64, reason: String },
    #[error("unknown entry point {0}")]
    UnknownEntry(u16),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("contract {0} not found")]
    ContractNotFound(Hash),
    #[error("insufficient native balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },
    #[error("arithmetic overflow")]
    Overflow,
    #[error("out of gas: limit {limit}, required {required}")]
    OutOfGas { limit: u64, required: u64 },
    #[error("max call depth {0} exceeded")]
    CallDepthExceeded(usize),
    #[error("event data too large: {size} bytes, max {max}")]
    EventTooLarge { size: usize, max: usize },
}

impl ContractError {
    pub fn revert(code: u64, reason: impl Into<String>) -> Self {
        Self::Revert {
            code,
            reason: reason.into(),
        }
    }

    /// Numeric exit code reported in transaction results
    pub fn exit_code(&self) -> u64 {
        match self {
            Self::Revert { code, .. } => *code,
            Self::UnknownEntry(_) => RUNTIME_ERROR_UNKNOWN_ENTRY,
            Self::InvalidInput(_) => RUNTIME_ERROR_INVALID_INPUT,
            Self::ContractNotFound(_) => RUNTIME_ERROR_CONTRACT_NOT_FOUND,
            Self::InsufficientBalance { .. } => RUNTIME_ERROR_INSUFFICIENT_BALANCE,
            Self::Overflow => RUNTIME_ERROR_OVERFLOW,
            Self::OutOfGas { .. } => RUNTIME_ERROR_OUT_OF_GAS,
            Self::CallDepthExceeded(_) => RUNTIME_ERROR_CALL_DEPTH,
            Self::EventTooLarge { .. } => RUNTIME_ERROR_EVENT_TOO_LARGE,
        }
    }

    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Revert { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Revert { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_display_is_reason() {
        let err = ContractError::revert(0x0300, "can't save zero value");
        assert_eq!(err.to_string(), "can't save zero value");
        assert_eq!(err.exit_code(), 0x0300);
        assert_eq!(err.revert_reason(), Some("can't save zero value"));
    }

    #[test]
    fn test_runtime_codes_are_distinct() {
        let errors = [
            ContractError::UnknownEntry(9),
            ContractError::InvalidInput(String::new()),
            ContractError::ContractNotFound(Hash::zero()),
            ContractError::InsufficientBalance {
                required: 1,
                available: 0,
            },
            ContractError::Overflow,
            ContractError::OutOfGas {
                limit: 1,
                required: 2,
            },
            ContractError::CallDepthExceeded(16),
            ContractError::EventTooLarge { size: 2, max: 1 },
        ];
        let mut codes: Vec<u64> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(errors.iter().all(|e| !e.is_revert()));
    }
}
