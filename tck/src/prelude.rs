//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust,ignore
//! use savings_tck::prelude::*;
//! ```

// Re-export orchestrator types
pub use crate::orchestrator::{Clock, PausedClock, SystemClock, TestRng};

// Re-export Tier 1 component testing
pub use crate::tier1_component::{TestBlockchain, TestBlockchainBuilder};

// Re-export Tier 1.5 contract testing
pub use crate::tier1_5::{
    ChainClient, ChainClientConfig, ContractEvent, ContractTest, ContractTestContext,
    GenesisAccount, TransactionError, TxResult,
};

pub use crate::fixtures::{SavingsFixture, SavingsFixtureConfig};

// Re-export common invariants
pub use crate::invariants::{
    check_all_on_chain, check_balance_conservation, check_nonce_monotonicity,
    check_savings_backing, check_token_supply,
};

pub use savings_common::crypto::Hash;

// Re-export commonly used external types
pub use anyhow::{anyhow, Context, Result};
pub use std::sync::Arc;
pub use tokio::time::Duration;
