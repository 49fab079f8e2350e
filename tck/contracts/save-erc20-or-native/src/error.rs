use std::fmt;

use savings_common::contract::ContractError;
use thiserror::Error;

// ===== Savings Errors (0x0300 - 0x03FF) =====

pub const ERR_ZERO_AMOUNT: u64 = 0x0300;
pub const ERR_INSUFFICIENT_AUTHORIZATION: u64 = 0x0301;
pub const ERR_INSUFFICIENT_FUNDS: u64 = 0x0302;
pub const ERR_NO_FUNDS: u64 = 0x0303;
pub const ERR_INVALID_TOKEN: u64 = 0x0304;
pub const ERR_NON_PAYABLE: u64 = 0x0305;
pub const ERR_OVERFLOW: u64 = 0x0306;

pub const REASON_ZERO_DEPOSIT: &str = "can't save zero value";
pub const REASON_ZERO_WITHDRAW: &str = "can't withdraw zero value";
pub const REASON_INSUFFICIENT_FUNDS: &str = "insufficient funds";
pub const REASON_NO_FUNDS: &str = "you don't have any savings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavingsAction {
    Deposit,
    Withdraw,
}

impl fmt::Display for SavingsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => write!(f, "{}", REASON_ZERO_DEPOSIT),
            Self::Withdraw => write!(f, "{}", REASON_ZERO_WITHDRAW),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SavingsError {
    #[error("{action}")]
    ZeroAmount { action: SavingsAction },
    #[error("insufficient allowance: allowance {allowance}, requested {requested}")]
    InsufficientAuthorization { allowance: u64, requested: u64 },
    #[error("{}", REASON_INSUFFICIENT_FUNDS)]
    InsufficientFunds { balance: u64, requested: u64 },
    #[error("{}", REASON_NO_FUNDS)]
    NoFunds,
    #[error("token address cannot be zero")]
    InvalidToken,
    #[error("entry does not accept native value")]
    NonPayable,
    #[error("savings arithmetic overflow")]
    Overflow,
}

impl SavingsError {
    pub fn code(&self) -> u64 {
        match self {
            Self::ZeroAmount { .. } => ERR_ZERO_AMOUNT,
            Self::InsufficientAuthorization { .. } => ERR_INSUFFICIENT_AUTHORIZATION,
            Self::InsufficientFunds { .. } => ERR_INSUFFICIENT_FUNDS,
            Self::NoFunds => ERR_NO_FUNDS,
            Self::InvalidToken => ERR_INVALID_TOKEN,
            Self::NonPayable => ERR_NON_PAYABLE,
            Self::Overflow => ERR_OVERFLOW,
        }
    }
}

impl From<SavingsError> for ContractError {
    fn from(err: SavingsError) -> Self {
        ContractError::revert(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_reasons() {
        let cases = [
            (
                SavingsError::ZeroAmount {
                    action: SavingsAction::Deposit,
                },
                REASON_ZERO_DEPOSIT,
            ),
            (
                SavingsError::ZeroAmount {
                    action: SavingsAction::Withdraw,
                },
                REASON_ZERO_WITHDRAW,
            ),
            (
                SavingsError::InsufficientFunds {
                    balance: 1,
                    requested: 2,
                },
                REASON_INSUFFICIENT_FUNDS,
            ),
            (SavingsError::NoFunds, REASON_NO_FUNDS),
        ];

        for (err, reason) in cases {
            let code = err.code();
            let converted: ContractError = err.into();
            assert_eq!(converted.revert_reason(), Some(reason));
            assert_eq!(converted.exit_code(), code);
        }
    }
}
