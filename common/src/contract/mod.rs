//! Runtime interface between contracts and the chain that hosts them.
//!
//! A contract is native Rust code implementing [`Contract`]. The host
//! (a test ledger, or any other executor) implements
//! [`ContractEnvironment`] and hands it to the contract for the duration
//! of one call. Arguments and return values are borsh-encoded.

mod abi;
mod environment;
mod error;
mod storage;

pub use abi::{decode_args, encode_return, EntryId};
pub use environment::ContractEnvironment;
pub use error::{ContractError, EXIT_SUCCESS};
pub use storage::{account_key, pair_key, read_u64, write_u64};

/// A deployable contract.
///
/// Implementations are stateless: every piece of state lives in the
/// storage exposed by the environment.
pub trait Contract: Send + Sync {
    /// Human readable contract name, also used to derive its address.
    fn name(&self) -> &'static str;

    /// Constructor, run once when the contract is deployed.
    fn deploy(&self, env: &mut dyn ContractEnvironment, args: &[u8]) -> Result<(), ContractError>;

    /// Dispatch an entry point.
    fn invoke(
        &self,
        env: &mut dyn ContractEnvironment,
        entry_id: EntryId,
        input: &[u8],
    ) -> Result<Vec<u8>, ContractError>;
}
