//! Tier 1.5: ChainClient direct blockchain access layer.
//!
//! High-level testing API on top of the Tier 1 [`TestBlockchain`]:
//! - `ChainClient`: transactions in, structured `TxResult` out
//! - `ContractTest`: builder-pattern contract testing harness
//!
//! # Architecture
//! ```text
//! ┌───────────────────────────────────────┐
//! │          ContractTest (Builder)        │
//! │  new() → add_contract() → start()     │
//! └─────────────────┬─────────────────────┘
//!                   │
//! ┌─────────────────▼─────────────────────┐
//! │            ChainClient                 │
//! │  process_transaction() → TxResult      │
//! │  call_contract(), query()              │
//! │  simulate_transaction()                │
//! │  force_set_balance() [test override]   │
//! └─────────────────┬─────────────────────┘
//!                   │
//! ┌─────────────────▼─────────────────────┐
//! │         TestBlockchain (Tier 1)        │
//! │  Accounts, contracts, O(1) counters    │
//! └───────────────────────────────────────┘
//! ```
//!
//! [`TestBlockchain`]: crate::tier1_component::TestBlockchain

pub mod chain_client;
pub mod chain_client_config;
pub mod contract_test;
pub mod tx_result;

// Re-export primary types for convenience
pub use chain_client::{ChainClient, ChainError, TransactionType, MAX_WARP_BLOCKS};
pub use chain_client_config::{
    AutoMineConfig, ChainClientConfig, FeeConfig, GenesisAccount, GenesisContract,
};
pub use contract_test::{ContractTest, ContractTestContext, DEFAULT_OWNER_BALANCE};
pub use tx_result::{
    CallDeposit, ContractEvent, InnerCall, SimulationResult, StateChange, StateDiff,
    TransactionError, TxResult,
};
