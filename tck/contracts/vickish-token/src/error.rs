use savings_common::contract::ContractError;
use thiserror::Error;

// ===== Token Errors (0x0200 - 0x02FF) =====

pub const ERR_INSUFFICIENT_BALANCE: u64 = 0x0200;
pub const ERR_INSUFFICIENT_ALLOWANCE: u64 = 0x0201;
pub const ERR_INVALID_SENDER: u64 = 0x0202;
pub const ERR_INVALID_RECEIVER: u64 = 0x0203;
pub const ERR_INVALID_SPENDER: u64 = 0x0204;
pub const ERR_INVALID_METADATA: u64 = 0x0205;
pub const ERR_OVERFLOW: u64 = 0x0206;

/// Token failures, named after the OpenZeppelin custom errors they mirror
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("ERC20InsufficientBalance: balance {balance}, needed {needed}")]
    InsufficientBalance { balance: u64, needed: u64 },
    #[error("ERC20InsufficientAllowance: allowance {allowance}, needed {needed}")]
    InsufficientAllowance { allowance: u64, needed: u64 },
    #[error("ERC20InvalidSender: zero address")]
    InvalidSender,
    #[error("ERC20InvalidReceiver: zero address")]
    InvalidReceiver,
    #[error("ERC20InvalidSpender: zero address")]
    InvalidSpender,
    #[error("invalid token metadata: {0}")]
    InvalidMetadata(&'static str),
    #[error("token arithmetic overflow")]
    Overflow,
}

impl TokenError {
    pub fn code(&self) -> u64 {
        match self {
            Self::InsufficientBalance { .. } => ERR_INSUFFICIENT_BALANCE,
            Self::InsufficientAllowance { .. } => ERR_INSUFFICIENT_ALLOWANCE,
            Self::InvalidSender => ERR_INVALID_SENDER,
            Self::InvalidReceiver => ERR_INVALID_RECEIVER,
            Self::InvalidSpender => ERR_INVALID_SPENDER,
            Self::InvalidMetadata(_) => ERR_INVALID_METADATA,
            Self::Overflow => ERR_OVERFLOW,
        }
    }
}

impl From<TokenError> for ContractError {
    fn from(err: TokenError) -> Self {
        ContractError::revert(err.code(), err.to_string())
    }
}
