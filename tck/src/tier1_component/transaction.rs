//! Transactions accepted by the test ledger and the receipts they produce.

use std::fmt;
use std::sync::Arc;

use savings_common::contract::{Contract, ContractError, EntryId};
use savings_common::crypto::{hash, Hash};
use thiserror::Error;

/// What a transaction does
#[derive(Clone)]
pub enum TxPayload {
    /// Plain native transfer
    Transfer { recipient: Hash, amount: u64 },
    /// Deploy a contract; its constructor runs with the sender as caller
    Deploy {
        code: Arc<dyn Contract>,
        args: Vec<u8>,
        value: u64,
    },
    /// Invoke a contract entry point
    Invoke {
        contract: Hash,
        entry_id: EntryId,
        input: Vec<u8>,
        value: u64,
    },
}

impl TxPayload {
    /// Native value moved out of the sender's balance
    pub fn value(&self) -> u64 {
        match self {
            Self::Transfer { amount, .. } => *amount,
            Self::Deploy { value, .. } | Self::Invoke { value, .. } => *value,
        }
    }
}

impl fmt::Debug for TxPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer { recipient, amount } => f
                .debug_struct("Transfer")
                .field("recipient", recipient)
                .field("amount", amount)
                .finish(),
            Self::Deploy { code, args, value } => f
                .debug_struct("Deploy")
                .field("code", &code.name())
                .field("args", &hex::encode(args))
                .field("value", value)
                .finish(),
            Self::Invoke {
                contract,
                entry_id,
                input,
                value,
            } => f
                .debug_struct("Invoke")
                .field("contract", contract)
                .field("entry_id", entry_id)
                .field("input", &hex::encode(input))
                .field("value", value)
                .finish(),
        }
    }
}

/// Transaction for testing
#[derive(Debug, Clone)]
pub struct TestTransaction {
    /// Transaction hash
    pub hash: Hash,
    /// Sender account
    pub sender: Hash,
    /// Nonce, must be the sender's confirmed nonce + 1
    pub nonce: u64,
    /// Gas limit; the sender must hold `value + gas_limit * gas_price`
    pub gas_limit: u64,
    pub payload: TxPayload,
}

impl TestTransaction {
    pub fn new(sender: Hash, nonce: u64, gas_limit: u64, payload: TxPayload) -> Self {
        Self {
            hash: Self::compute_hash(&sender, nonce),
            sender,
            nonce,
            gas_limit,
            payload,
        }
    }

    /// blake3(sender || nonce): unique per sender and nonce
    pub fn compute_hash(sender: &Hash, nonce: u64) -> Hash {
        let mut data = Vec::with_capacity(40);
        data.extend_from_slice(sender.as_bytes());
        data.extend_from_slice(&nonce.to_le_bytes());
        hash(&data)
    }
}

/// Failure recorded in a receipt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Raised by contract code or by a host function it called
    #[error("contract {contract} failed: {error}")]
    Contract {
        /// Contract whose frame raised the error
        contract: Hash,
        /// Contract that called it, `None` for the entry frame
        caller: Option<Hash>,
        depth: u32,
        error: ContractError,
    },
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("contract not found: {0}")]
    ContractNotFound(Hash),
    #[error("contract already deployed at {0}")]
    AlreadyDeployed(Hash),
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl ExecutionError {
    /// Revert reason of the underlying contract error, if any
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Contract { error, .. } => error.revert_reason(),
            _ => None,
        }
    }

    pub fn contract_error(&self) -> Option<&ContractError> {
        match self {
            Self::Contract { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Event emitted by a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub contract: Hash,
    pub topic: String,
    pub data: Vec<u8>,
}

/// Trace of a contract-to-contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerCallRecord {
    pub caller: Hash,
    pub callee: Hash,
    pub entry_id: EntryId,
    pub input: Vec<u8>,
    pub value: u64,
    pub gas_used: u64,
    pub success: bool,
    /// 2 for a call made by the entry contract
    pub depth: u32,
    pub return_data: Vec<u8>,
    pub events: Vec<EmittedEvent>,
}

/// Outcome of one executed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: Hash,
    pub sender: Hash,
    /// Block that included the transaction, `None` for simulations
    pub block_hash: Option<Hash>,
    pub topoheight: u64,
    pub error: Option<ExecutionError>,
    pub gas_used: u64,
    pub gas_refunded: u64,
    /// Native fee charged to the sender
    pub fee: u64,
    /// Empty unless the transaction succeeded
    pub events: Vec<EmittedEvent>,
    pub logs: Vec<String>,
    pub inner_calls: Vec<InnerCallRecord>,
    pub return_data: Vec<u8>,
    pub contract_address: Option<Hash>,
    /// Sender nonce after the transaction
    pub new_nonce: u64,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
