//! # savings-tck: contract testing kit for the savings contracts
//!
//! In-process ledger and test harness that deploys `VickishToken` and
//! `SaveErc20OrNative` as native Rust contracts and drives them through
//! real transactions.
//!
//! ## Layers
//!
//! - **Tier 1** ([`tier1_component`]): `TestBlockchain`, the ledger itself.
//!   Native balances, contract storage, atomic execution, blocks.
//! - **Tier 1.5** ([`tier1_5`]): `ChainClient`, `ContractTest` and
//!   `TxResult` for writing contract tests without building transactions
//!   by hand.
//! - **Fixtures** ([`fixtures`]): `SavingsFixture`, both contracts deployed
//!   with two funded accounts.
//! - **Scenarios** ([`scenarios`]): whole flows described in YAML.
//! - **Invariants** ([`invariants`]): conservation and backing checks.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use savings_tck::prelude::*;
//!
//! #[tokio::test]
//! async fn test_deposit() {
//!     let mut fx = SavingsFixture::deploy().await.unwrap();
//!     let owner = fx.owner();
//!     fx.approve(&owner, 100).await.unwrap().assert_success();
//!     fx.token_deposit(&owner, 50).await.unwrap().assert_success();
//!     assert_eq!(fx.token_savings_of(&owner).await.unwrap(), 50);
//! }
//! ```
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Clock abstraction + seeded RNG
//! 2. **Atomic**: a failed transaction leaves nothing but its nonce and fee
//! 3. **Fast Feedback**: no sleeping, no I/O, blocks are produced on demand

#![warn(clippy::all)]

/// Core orchestration - provides Clock and the seeded TestRng
pub mod orchestrator;

/// Tier 1: Component-level testing (in-process ledger)
pub mod tier1_component;

/// Tier 1.5: ChainClient, ContractTest and transaction results
pub mod tier1_5;

/// Core invariant checkers (conservation, supply, savings backing)
pub mod invariants;

/// Deployed token + savings vault fixture
pub mod fixtures;

/// YAML scenario parser and runner
pub mod scenarios;

/// Convenient re-exports for common usage
pub mod prelude;

pub use orchestrator::{Clock, PausedClock, SystemClock, TestRng};
pub use tier1_component::{TestBlockchain, TestBlockchainBuilder};

/// Kit version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
