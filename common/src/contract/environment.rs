use crate::crypto::Hash;

use super::{ContractError, EntryId};

/// Host functions available to a running contract.
///
/// Every mutating call may fail with [`ContractError::OutOfGas`]; the host
/// charges the gas schedule from [`crate::config`] before applying the
/// operation. Nothing is visible outside the transaction until the
/// outermost call returns `Ok`.
pub trait ContractEnvironment {
    /// Account (or contract, for inner calls) that invoked this frame
    fn caller(&self) -> &Hash;

    /// Address of the executing contract
    fn self_address(&self) -> &Hash;

    /// Native value attached to this frame, already credited to the contract
    fn call_value(&self) -> u64;

    /// Topoheight of the block the transaction is executed in
    fn topoheight(&self) -> u64;

    fn storage_read(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, ContractError>;

    fn storage_write(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), ContractError>;

    fn storage_delete(&mut self, key: &[u8]) -> Result<(), ContractError>;

    /// Native balance of any account or contract
    fn native_balance_of(&mut self, account: &Hash) -> Result<u64, ContractError>;

    /// Move native coins from the executing contract to `to`
    fn transfer_native(&mut self, to: &Hash, amount: u64) -> Result<(), ContractError>;

    /// Call another contract inside the same transaction.
    ///
    /// The callee sees this contract as its caller. Any error aborts the
    /// callee's changes; callers usually propagate it with `?`.
    fn call_contract(
        &mut self,
        contract: &Hash,
        entry_id: EntryId,
        input: &[u8],
        value: u64,
    ) -> Result<Vec<u8>, ContractError>;

    fn emit_event(&mut self, topic: &str, data: Vec<u8>) -> Result<(), ContractError>;

    /// Debug message captured in the transaction result
    fn log(&mut self, message: &str);

    fn charge_gas(&mut self, amount: u64) -> Result<(), ContractError>;
}
