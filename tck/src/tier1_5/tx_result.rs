//! Transaction result types for the ChainClient (Tier 1.5) testing layer.
//!
//! Provides structured error types, inner call tracing, simulation results,
//! and state diff tracking for deterministic transaction testing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use borsh::BorshDeserialize;
use savings_common::config::NATIVE_ASSET;
use savings_common::contract::{ContractError, EXIT_SUCCESS};
use savings_common::crypto::Hash;
use serde::{Deserialize, Serialize};

use crate::tier1_component::{
    AccountState, EmittedEvent, ExecutionError, InnerCallRecord, TransactionReceipt, WorldState,
};

/// Structured error type for transaction execution failures.
/// Enables precise pattern matching in test assertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum TransactionError {
    /// Referenced account does not exist in state
    AccountNotFound { address: Hash },
    /// Sender lacks sufficient balance for value + fee
    InsufficientBalance { have: u64, need: u64, asset: Hash },
    /// Transaction nonce does not match expected value
    InvalidNonce { expected: u64, provided: u64 },
    /// Contract execution exceeded gas limit
    OutOfGas { used: u64, limit: u64 },
    /// Contract execution returned an error
    ContractError {
        contract: Hash,
        exit_code: u64,
        message: String,
    },
    /// Target contract does not exist
    ContractNotFound { address: Hash },
    /// A contract already lives at the derived address
    AlreadyDeployed { address: Hash },
    /// A nested contract call failed
    InnerCallFailed {
        caller: Hash,
        callee: Hash,
        depth: u32,
        error: Box<TransactionError>,
    },
    /// Arithmetic overflow during execution
    ArithmeticOverflow { operation: String },
    /// Transaction structure is invalid
    MalformedTransaction { reason: String },
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountNotFound { address } => {
                write!(f, "account not found: {}", address)
            }
            Self::InsufficientBalance { have, need, asset } => {
                write!(
                    f,
                    "insufficient balance: have {}, need {}, asset {}",
                    have, need, asset
                )
            }
            Self::InvalidNonce { expected, provided } => {
                write!(f, "invalid nonce: expected {}, got {}", expected, provided)
            }
            Self::OutOfGas { used, limit } => {
                write!(f, "out of gas: used {}, limit {}", used, limit)
            }
            Self::ContractError {
                contract,
                exit_code,
                message,
            } => {
                write!(
                    f,
                    "contract {} error (code {:#06x}): {}",
                    contract, exit_code, message
                )
            }
            Self::ContractNotFound { address } => {
                write!(f, "contract not found: {}", address)
            }
            Self::AlreadyDeployed { address } => {
                write!(f, "contract already deployed at {}", address)
            }
            Self::InnerCallFailed {
                caller,
                callee,
                depth,
                error,
            } => {
                write!(
                    f,
                    "inner call failed: {} -> {} at depth {}: {}",
                    caller, callee, depth, error
                )
            }
            Self::ArithmeticOverflow { operation } => {
                write!(f, "arithmetic overflow in: {}", operation)
            }
            Self::MalformedTransaction { reason } => {
                write!(f, "malformed transaction: {}", reason)
            }
        }
    }
}

impl std::error::Error for TransactionError {}

impl TransactionError {
    /// Innermost error, unwrapping `InnerCallFailed` layers
    pub fn root_cause(&self) -> &TransactionError {
        match self {
            Self::InnerCallFailed { error, .. } => error.root_cause(),
            other => other,
        }
    }

    /// Message of the innermost contract error, if a contract raised it
    pub fn revert_reason(&self) -> Option<&str> {
        match self.root_cause() {
            Self::ContractError { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Exit code of the innermost contract error
    pub fn exit_code(&self) -> Option<u64> {
        match self.root_cause() {
            Self::ContractError { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    fn from_contract_error(contract: &Hash, error: &ContractError) -> Self {
        match error {
            ContractError::OutOfGas { limit, required } => Self::OutOfGas {
                used: *required,
                limit: *limit,
            },
            ContractError::InsufficientBalance {
                required,
                available,
            } => Self::InsufficientBalance {
                have: *available,
                need: *required,
                asset: NATIVE_ASSET,
            },
            ContractError::Overflow => Self::ArithmeticOverflow {
                operation: format!("contract {}", contract),
            },
            ContractError::ContractNotFound(address) => Self::ContractNotFound {
                address: address.clone(),
            },
            other => Self::ContractError {
                contract: contract.clone(),
                exit_code: other.exit_code(),
                message: other.to_string(),
            },
        }
    }
}

impl From<&ExecutionError> for TransactionError {
    fn from(error: &ExecutionError) -> Self {
        match error {
            ExecutionError::Contract {
                contract,
                caller,
                depth,
                error,
            } => {
                let inner = Self::from_contract_error(contract, error);
                match caller {
                    Some(caller) if *depth > 1 => Self::InnerCallFailed {
                        caller: caller.clone(),
                        callee: contract.clone(),
                        depth: *depth,
                        error: Box::new(inner),
                    },
                    _ => inner,
                }
            }
            ExecutionError::InsufficientFunds { have, need } => Self::InsufficientBalance {
                have: *have,
                need: *need,
                asset: NATIVE_ASSET,
            },
            ExecutionError::ContractNotFound(address) => Self::ContractNotFound {
                address: address.clone(),
            },
            ExecutionError::AlreadyDeployed(address) => Self::AlreadyDeployed {
                address: address.clone(),
            },
            ExecutionError::Overflow(operation) => Self::ArithmeticOverflow {
                operation: operation.to_string(),
            },
        }
    }
}

/// A traced inner (cross-contract) call during transaction execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerCall {
    /// Contract that initiated the call
    pub caller: Hash,
    /// Contract being called
    pub callee: Hash,
    /// Entry point identifier invoked on the callee
    pub entry_id: u16,
    /// Serialized call arguments
    pub data: Vec<u8>,
    /// Assets deposited with the call
    pub deposits: Vec<CallDeposit>,
    /// Gas consumed by this call, sub-calls included
    pub gas_used: u64,
    /// Whether the call completed successfully
    pub success: bool,
    /// Nesting depth (1 = entry contract, so inner calls start at 2)
    pub depth: u32,
    /// Return data from the call
    pub return_data: Vec<u8>,
    /// Events emitted during this call
    pub events: Vec<ContractEvent>,
}

impl From<InnerCallRecord> for InnerCall {
    fn from(record: InnerCallRecord) -> Self {
        let deposits = if record.value > 0 {
            vec![CallDeposit {
                asset: NATIVE_ASSET,
                amount: record.value,
            }]
        } else {
            vec![]
        };
        Self {
            caller: record.caller,
            callee: record.callee,
            entry_id: record.entry_id,
            data: record.input,
            deposits,
            gas_used: record.gas_used,
            success: record.success,
            depth: record.depth,
            return_data: record.return_data,
            events: record.events.into_iter().map(Into::into).collect(),
        }
    }
}

/// A deposit made as part of a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDeposit {
    /// Asset hash (native coin uses Hash::zero())
    pub asset: Hash,
    /// Amount deposited
    pub amount: u64,
}

/// An event emitted by a contract during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    /// Contract that emitted the event
    pub contract: Hash,
    /// Event topic/identifier
    pub topic: String,
    /// Borsh-encoded event data
    pub data: Vec<u8>,
}

impl ContractEvent {
    /// Decode the payload
    pub fn decode<T: BorshDeserialize>(&self) -> Result<T, std::io::Error> {
        borsh::from_slice(&self.data)
    }
}

impl From<EmittedEvent> for ContractEvent {
    fn from(event: EmittedEvent) -> Self {
        Self {
            contract: event.contract,
            topic: event.topic,
            data: event.data,
        }
    }
}

/// Result of processing a transaction through ChainClient.
#[derive(Debug, Clone)]
pub struct TxResult {
    /// Whether the transaction executed successfully
    pub success: bool,
    /// Transaction hash
    pub tx_hash: Hash,
    /// Block hash containing this transaction (if mined)
    pub block_hash: Option<Hash>,
    /// Topoheight at which the transaction was included
    pub topoheight: Option<u64>,
    /// Structured error (None if success)
    pub error: Option<TransactionError>,
    /// Gas consumed by execution
    pub gas_used: u64,
    /// Gas refunded after execution
    pub gas_refunded: u64,
    /// Native fee burned
    pub fee: u64,
    /// Exit code from contract execution (None for plain transfers)
    pub exit_code: Option<u64>,
    /// Events emitted during execution
    pub events: Vec<ContractEvent>,
    /// Log messages produced during execution
    pub log_messages: Vec<String>,
    /// Traced inner (cross-contract) calls
    pub inner_calls: Vec<InnerCall>,
    /// Return data from contract execution
    pub return_data: Vec<u8>,
    /// Address of the deployed contract, for deployments
    pub contract_address: Option<Hash>,
    /// Sender nonce after this transaction
    pub new_nonce: u64,
}

impl TxResult {
    /// Build from a ledger receipt. `is_contract` selects whether an exit
    /// code is reported.
    pub fn from_receipt(receipt: TransactionReceipt, is_contract: bool) -> Self {
        let exit_code = match (&receipt.error, is_contract) {
            (_, false) => None,
            (None, true) => Some(EXIT_SUCCESS),
            (Some(error), true) => error.contract_error().map(|e| e.exit_code()),
        };
        Self {
            success: receipt.error.is_none(),
            tx_hash: receipt.tx_hash,
            topoheight: receipt.block_hash.as_ref().map(|_| receipt.topoheight),
            block_hash: receipt.block_hash,
            error: receipt.error.as_ref().map(TransactionError::from),
            gas_used: receipt.gas_used,
            gas_refunded: receipt.gas_refunded,
            fee: receipt.fee,
            exit_code,
            events: receipt.events.into_iter().map(Into::into).collect(),
            log_messages: receipt.logs,
            inner_calls: receipt.inner_calls.into_iter().map(Into::into).collect(),
            return_data: receipt.return_data,
            contract_address: receipt.contract_address,
            new_nonce: receipt.new_nonce,
        }
    }

    /// Returns true if the transaction executed without error.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the error if the transaction failed.
    pub fn error(&self) -> Option<&TransactionError> {
        self.error.as_ref()
    }

    /// Revert reason of the innermost failing contract
    pub fn revert_reason(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.revert_reason())
    }

    /// Asserts the transaction succeeded, panics with error details if not.
    pub fn assert_success(&self) {
        assert!(
            self.success,
            "Expected transaction success, got error: {:?}",
            self.error
        );
    }

    /// Asserts the transaction failed with a specific error variant.
    pub fn assert_error(&self, expected: &TransactionError) {
        assert!(
            !self.success,
            "Expected transaction failure, but it succeeded"
        );
        assert_eq!(
            self.error.as_ref(),
            Some(expected),
            "Error mismatch: expected {:?}, got {:?}",
            expected,
            self.error
        );
    }

    /// Asserts the transaction failed with the given revert reason,
    /// wherever in the call tree the revert happened.
    pub fn assert_reverted_with(&self, reason: &str) {
        assert!(
            !self.success,
            "Expected revert with {:?}, but the transaction succeeded",
            reason
        );
        assert_eq!(
            self.revert_reason(),
            Some(reason),
            "Revert reason mismatch, full error: {:?}",
            self.error
        );
    }

    /// Asserts the transaction failed (any error).
    pub fn assert_failed(&self) {
        assert!(
            !self.success,
            "Expected transaction failure, but it succeeded"
        );
    }

    /// Decode the return data
    pub fn decode_return<T: BorshDeserialize>(&self) -> Result<T, std::io::Error> {
        borsh::from_slice(&self.return_data)
    }

    /// Returns events matching a specific topic.
    pub fn events_by_topic(&self, topic: &str) -> Vec<&ContractEvent> {
        self.events.iter().filter(|e| e.topic == topic).collect()
    }

    /// Returns inner calls to a specific contract.
    pub fn calls_to(&self, contract: &Hash) -> Vec<&InnerCall> {
        self.inner_calls
            .iter()
            .filter(|c| &c.callee == contract)
            .collect()
    }

    /// Returns the maximum call depth reached.
    pub fn max_call_depth(&self) -> u32 {
        self.inner_calls.iter().map(|c| c.depth).max().unwrap_or(0)
    }
}

/// Result of simulating a transaction without committing state.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Whether the simulation completed without error
    pub success: bool,
    /// Error if simulation failed
    pub error: Option<TransactionError>,
    /// Estimated gas that would be consumed
    pub gas_used: u64,
    /// Fee that would be burned
    pub fee: u64,
    /// Events that would be emitted
    pub events: Vec<ContractEvent>,
    /// Log messages that would be produced
    pub log_messages: Vec<String>,
    /// Inner calls that would occur
    pub inner_calls: Vec<InnerCall>,
    /// Return data from execution
    pub return_data: Vec<u8>,
    /// State changes that would occur
    pub state_diff: StateDiff,
}

impl SimulationResult {
    /// Returns true if the simulation completed without error.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Asserts the simulation would succeed.
    pub fn assert_success(&self) {
        assert!(
            self.success,
            "Expected simulation success, got error: {:?}",
            self.error
        );
    }

    /// Asserts the simulation would fail.
    pub fn assert_failed(&self) {
        assert!(
            !self.success,
            "Expected simulation failure, but it would succeed"
        );
    }
}

/// Diff of state changes from a transaction or simulation.
#[derive(Debug, Clone, Default)]
pub struct StateDiff {
    /// Per-account state changes; storage changes are listed under the
    /// contract that owns the slot
    pub changes: HashMap<Hash, Vec<StateChange>>,
}

impl StateDiff {
    /// Compute the changes that turn `before` into `after`
    pub fn between(before: &WorldState, after: &WorldState) -> Self {
        let mut diff = Self::default();
        let no_account = AccountState::default();
        let no_slots = BTreeMap::new();

        let addresses: BTreeSet<&Hash> = before
            .accounts
            .keys()
            .chain(after.accounts.keys())
            .chain(before.storage.keys())
            .chain(after.storage.keys())
            .collect();

        for address in addresses {
            let mut changes = Vec::new();

            let old = before.accounts.get(address).unwrap_or(&no_account);
            let new = after.accounts.get(address).unwrap_or(&no_account);
            if old.balance != new.balance {
                changes.push(StateChange::BalanceChange {
                    asset: NATIVE_ASSET,
                    before: old.balance,
                    after: new.balance,
                });
            }
            if old.nonce != new.nonce {
                changes.push(StateChange::NonceChange {
                    before: old.nonce,
                    after: new.nonce,
                });
            }

            let old_slots = before.storage.get(address).unwrap_or(&no_slots);
            let new_slots = after.storage.get(address).unwrap_or(&no_slots);
            for (key, value) in new_slots {
                let old_value = old_slots.get(key);
                if old_value != Some(value) {
                    changes.push(StateChange::StorageWrite {
                        key: key.clone(),
                        old_value: old_value.cloned(),
                        new_value: value.clone(),
                    });
                }
            }
            for (key, value) in old_slots {
                if !new_slots.contains_key(key) {
                    changes.push(StateChange::StorageDelete {
                        key: key.clone(),
                        old_value: value.clone(),
                    });
                }
            }

            if !changes.is_empty() {
                diff.changes.insert(address.clone(), changes);
            }
        }

        diff
    }

    /// Returns true if no state changes occurred.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns all changes for a specific account.
    pub fn changes_for(&self, account: &Hash) -> &[StateChange] {
        self.changes.get(account).map_or(&[], |v| v.as_slice())
    }

    /// Returns the number of accounts affected.
    pub fn affected_accounts(&self) -> usize {
        self.changes.len()
    }
}

/// Individual state change within a StateDiff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum StateChange {
    /// Balance changed
    BalanceChange {
        asset: Hash,
        before: u64,
        after: u64,
    },
    /// Nonce incremented
    NonceChange { before: u64, after: u64 },
    /// Contract storage key modified
    StorageWrite {
        key: Vec<u8>,
        old_value: Option<Vec<u8>>,
        new_value: Vec<u8>,
    },
    /// Contract storage key deleted
    StorageDelete { key: Vec<u8>, old_value: Vec<u8> },
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn sample_hash(byte: u8) -> Hash {
        Hash::new([byte; 32])
    }

    fn sample_result(error: Option<TransactionError>) -> TxResult {
        TxResult {
            success: error.is_none(),
            tx_hash: sample_hash(1),
            block_hash: Some(sample_hash(2)),
            topoheight: Some(100),
            error,
            gas_used: 5000,
            gas_refunded: 0,
            fee: 5000,
            exit_code: None,
            events: vec![],
            log_messages: vec![],
            inner_calls: vec![],
            return_data: vec![],
            contract_address: None,
            new_nonce: 1,
        }
    }

    #[test]
    fn test_tx_result_success() {
        let result = sample_result(None);
        assert!(result.is_success());
        result.assert_success();
    }

    #[test]
    fn test_tx_result_error_matching() {
        let error = TransactionError::InvalidNonce {
            expected: 5,
            provided: 3,
        };
        let result = sample_result(Some(error.clone()));
        result.assert_failed();
        result.assert_error(&error);
    }

    #[test]
    fn test_inner_call_failure_maps_to_nested_error() {
        let savings = sample_hash(10);
        let token = sample_hash(20);
        let exec = ExecutionError::Contract {
            contract: token.clone(),
            caller: Some(savings.clone()),
            depth: 2,
            error: ContractError::revert(0x0200, "ERC20InsufficientBalance: balance 0, needed 5"),
        };

        let err = TransactionError::from(&exec);
        match &err {
            TransactionError::InnerCallFailed {
                caller,
                callee,
                depth,
                ..
            } => {
                assert_eq!(caller, &savings);
                assert_eq!(callee, &token);
                assert_eq!(*depth, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            err.revert_reason(),
            Some("ERC20InsufficientBalance: balance 0, needed 5")
        );
        assert_eq!(err.exit_code(), Some(0x0200));
    }

    #[test]
    fn test_entry_failure_is_contract_error() {
        let savings = sample_hash(10);
        let exec = ExecutionError::Contract {
            contract: savings.clone(),
            caller: None,
            depth: 1,
            error: ContractError::revert(0x0300, "can't save zero value"),
        };
        let result = sample_result(Some(TransactionError::from(&exec)));
        result.assert_error(&TransactionError::ContractError {
            contract: savings,
            exit_code: 0x0300,
            message: "can't save zero value".to_string(),
        });
        result.assert_reverted_with("can't save zero value");
    }

    #[test]
    fn test_out_of_gas_mapping() {
        let exec = ExecutionError::Contract {
            contract: sample_hash(3),
            caller: None,
            depth: 1,
            error: ContractError::OutOfGas {
                limit: 100,
                required: 150,
            },
        };
        assert_eq!(
            TransactionError::from(&exec),
            TransactionError::OutOfGas {
                used: 150,
                limit: 100
            }
        );
    }

    #[test]
    fn test_event_filtering() {
        let mut result = sample_result(None);
        result.events = vec![
            ContractEvent {
                contract: sample_hash(10),
                topic: "Transfer".to_string(),
                data: vec![1, 2, 3],
            },
            ContractEvent {
                contract: sample_hash(10),
                topic: "Approval".to_string(),
                data: vec![4, 5, 6],
            },
            ContractEvent {
                contract: sample_hash(10),
                topic: "Transfer".to_string(),
                data: vec![7, 8, 9],
            },
        ];
        assert_eq!(result.events_by_topic("Transfer").len(), 2);
        assert_eq!(result.events_by_topic("Approval").len(), 1);
        assert_eq!(result.events_by_topic("Unknown").len(), 0);
    }

    #[test]
    fn test_state_diff_between() {
        let alice = sample_hash(1);
        let vault = sample_hash(9);
        let mut before = WorldState::default();
        before.credit(&alice, 1000).unwrap();
        before.storage_set(&vault, vec![1], vec![7]);
        before.storage_set(&vault, vec![2], vec![8]);

        let mut after = before.clone();
        after.transfer(&alice, &vault, 200).unwrap();
        after.storage_set(&vault, vec![1], vec![9]);
        after.storage_remove(&vault, &[2]);

        let diff = StateDiff::between(&before, &after);
        assert_eq!(diff.affected_accounts(), 2);
        assert_eq!(
            diff.changes_for(&alice),
            &[StateChange::BalanceChange {
                asset: NATIVE_ASSET,
                before: 1000,
                after: 800,
            }]
        );
        let vault_changes = diff.changes_for(&vault);
        assert_eq!(vault_changes.len(), 3);
        assert!(vault_changes.contains(&StateChange::StorageDelete {
            key: vec![2],
            old_value: vec![8],
        }));
        assert!(StateDiff::between(&before, &before).is_empty());
    }

    #[test]
    fn test_nested_transaction_error_display() {
        let outer_err = TransactionError::InnerCallFailed {
            caller: sample_hash(1),
            callee: sample_hash(2),
            depth: 2,
            error: Box::new(TransactionError::OutOfGas {
                used: 50000,
                limit: 40000,
            }),
        };
        let display = format!("{}", outer_err);
        assert!(display.contains("inner call failed"));
        assert!(display.contains("depth 2"));
        assert_eq!(outer_err.revert_reason(), None);
    }
}
