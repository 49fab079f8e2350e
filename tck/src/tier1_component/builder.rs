//! Builder for TestBlockchain
//!
//! Fluent API for configuring test blockchain instances.

use super::TestBlockchain;
use crate::orchestrator::{Clock, SystemClock};
use anyhow::Result;
use savings_common::config::{COIN_VALUE, DEFAULT_GAS_PRICE};
use savings_common::crypto::{hash, Hash};
use std::sync::Arc;

/// Milliseconds between consecutive block timestamps
pub const DEFAULT_BLOCK_TIME_MS: u64 = 3000;

/// Builder for TestBlockchain instances
///
/// # Example
///
/// ```rust,ignore
/// use savings_tck::tier1_component::TestBlockchainBuilder;
///
/// let blockchain = TestBlockchainBuilder::new()
///     .with_clock(clock)
///     .with_default_balance(1_000 * COIN_VALUE)
///     .with_funded_account_count(10)
///     .build()
///     .await?;
/// ```
pub struct TestBlockchainBuilder {
    clock: Option<Arc<dyn Clock>>,
    funded_accounts: Vec<(Hash, u64)>,
    default_balance: u64,
    seed: Option<u64>,
    gas_price: u64,
    block_time_ms: u64,
}

impl TestBlockchainBuilder {
    /// Create new builder with defaults
    pub fn new() -> Self {
        Self {
            clock: None,
            funded_accounts: Vec::new(),
            default_balance: 1_000 * COIN_VALUE,
            seed: None,
            gas_price: DEFAULT_GAS_PRICE,
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
        }
    }

    /// Set clock implementation
    ///
    /// If not set, uses `SystemClock` by default.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Create N funded accounts in genesis with default balance
    ///
    /// Accounts are generated with sequential IDs starting from 1, see
    /// [`TestBlockchainBuilder::generate_pubkey`].
    pub fn with_funded_account_count(mut self, count: usize) -> Self {
        self.funded_accounts.clear();

        for i in 1..=count {
            let pubkey = self.account_for(i as u8);
            self.funded_accounts.push((pubkey, self.default_balance));
        }

        self
    }

    /// Add a specific funded account in genesis
    pub fn with_funded_account(mut self, addr: Hash, balance: u64) -> Self {
        self.funded_accounts.push((addr, balance));
        self
    }

    /// Set default balance for funded accounts created by count
    ///
    /// Must be called before `with_funded_account_count` to take effect.
    pub fn with_default_balance(mut self, balance: u64) -> Self {
        self.default_balance = balance;
        self
    }

    /// Derive generated account addresses from a seed
    ///
    /// Without a seed, generated accounts use the fixed pattern of
    /// [`TestBlockchainBuilder::generate_pubkey`].
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Native units charged per gas unit
    pub fn with_gas_price(mut self, gas_price: u64) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn with_block_time_ms(mut self, block_time_ms: u64) -> Self {
        self.block_time_ms = block_time_ms;
        self
    }

    /// Build the TestBlockchain instance
    ///
    /// # Errors
    ///
    /// Returns an error if genesis balances overflow.
    pub async fn build(self) -> Result<TestBlockchain> {
        let clock = self.clock.clone().unwrap_or_else(|| Arc::new(SystemClock));

        // If no accounts specified, create 1 default account
        let funded_accounts = if self.funded_accounts.is_empty() {
            vec![(self.account_for(1), self.default_balance)]
        } else {
            self.funded_accounts
        };

        TestBlockchain::new(clock, funded_accounts, self.gas_price, self.block_time_ms)
    }

    fn account_for(&self, id: u8) -> Hash {
        match self.seed {
            Some(seed) => Self::generate_seeded_pubkey(seed, id),
            None => Self::generate_pubkey(id),
        }
    }

    /// Generate a test public key from an ID
    ///
    /// Creates deterministic public keys for testing purposes.
    pub fn generate_pubkey(id: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[0] = id;
        // Fill rest with pattern for easier debugging
        for (i, byte) in bytes.iter_mut().enumerate().skip(1) {
            *byte = (id.wrapping_mul(i as u8)).wrapping_add(i as u8);
        }
        Hash::new(bytes)
    }

    /// blake3(seed || id)
    pub fn generate_seeded_pubkey(seed: u64, id: u8) -> Hash {
        let mut data = Vec::with_capacity(9);
        data.extend_from_slice(&seed.to_le_bytes());
        data.push(id);
        hash(&data)
    }
}

impl Default for TestBlockchainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
