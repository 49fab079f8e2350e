//! Tier 1: Component testing
//!
//! In-process ledger with native accounts, a contract registry and a
//! transactional executor. No networking, no persistence.

mod blockchain;
mod builder;
mod executor;
mod state;
mod transaction;

pub use blockchain::{BlockchainCounters, SimulatedExecution, TestBlock, TestBlockchain};
pub use builder::{TestBlockchainBuilder, DEFAULT_BLOCK_TIME_MS};
pub use executor::{ContractExecutor, ExecutionOutput};
pub use state::{AccountState, DeployedContract, WorldState};
pub use transaction::{
    EmittedEvent, ExecutionError, InnerCallRecord, TestTransaction, TransactionReceipt, TxPayload,
};
