//! Configuration types for ChainClient.
//!
//! Defines how a ChainClient test environment is initialized, including
//! genesis accounts, pre-installed contracts, clock mode, fees, and
//! auto-mine behavior.

use std::sync::Arc;

use savings_common::config::{DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE};
use savings_common::contract::Contract;
use savings_common::crypto::Hash;

use crate::orchestrator::Clock;
use crate::tier1_component::DEFAULT_BLOCK_TIME_MS;

/// When blocks are produced.
#[derive(Debug, Clone, Default)]
pub enum AutoMineConfig {
    /// No auto-mining: blocks are only created explicitly
    Disabled,
    /// Mine a block whenever a transaction is submitted
    #[default]
    OnTransaction,
}

/// A pre-funded account for genesis state.
#[derive(Debug, Clone)]
pub struct GenesisAccount {
    /// Account address
    pub address: Hash,
    /// Initial native balance
    pub balance: u64,
    /// Initial nonce (usually 0)
    pub nonce: u64,
}

impl GenesisAccount {
    /// Create a genesis account with just an address and balance.
    pub fn new(address: Hash, balance: u64) -> Self {
        Self {
            address,
            balance,
            nonce: 0,
        }
    }

    /// Set the initial nonce.
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }
}

/// A contract installed at genesis.
///
/// The constructor runs with `deployer` as caller, then `storage` entries
/// are written on top of whatever the constructor stored.
#[derive(Clone)]
pub struct GenesisContract {
    /// Contract address
    pub address: Hash,
    pub code: Arc<dyn Contract>,
    /// Borsh-encoded constructor arguments
    pub args: Vec<u8>,
    /// Initial storage entries (key -> value)
    pub storage: Vec<(Vec<u8>, Vec<u8>)>,
    /// Caller of the constructor
    pub deployer: Hash,
}

impl GenesisContract {
    pub fn new(address: Hash, code: Arc<dyn Contract>, deployer: Hash) -> Self {
        Self {
            address,
            code,
            args: Vec::new(),
            storage: Vec::new(),
            deployer,
        }
    }

    pub fn with_args(mut self, args: Vec<u8>) -> Self {
        self.args = args;
        self
    }

    pub fn with_storage(mut self, key: Vec<u8>, value: Vec<u8>) -> Self {
        self.storage.push((key, value));
        self
    }
}

impl std::fmt::Debug for GenesisContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenesisContract")
            .field("address", &self.address)
            .field("code", &self.code.name())
            .field("args", &hex::encode(&self.args))
            .field("storage", &self.storage.len())
            .field("deployer", &self.deployer)
            .finish()
    }
}

/// Fee configuration for the test environment.
#[derive(Debug, Clone)]
pub struct FeeConfig {
    /// Gas price per unit
    pub gas_price: u64,
    /// Whether to enforce fees (can disable for simpler tests)
    pub enforce_fees: bool,
}

impl FeeConfig {
    /// Gas price actually charged
    pub fn effective_gas_price(&self) -> u64 {
        if self.enforce_fees {
            self.gas_price
        } else {
            0
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            gas_price: DEFAULT_GAS_PRICE,
            enforce_fees: true,
        }
    }
}

/// Configuration for initializing a ChainClient test environment.
///
/// # Example
/// ```ignore
/// let config = ChainClientConfig::default()
///     .with_account(GenesisAccount::new(alice_addr, 1_000_000))
///     .with_fees_disabled();
/// let client = ChainClient::start(config).await?;
/// ```
#[derive(Clone)]
pub struct ChainClientConfig {
    /// Pre-funded genesis accounts
    pub genesis_accounts: Vec<GenesisAccount>,
    /// Pre-installed contracts
    pub genesis_contracts: Vec<GenesisContract>,
    /// Clock for block timestamps (None = use SystemClock)
    pub clock: Option<Arc<dyn Clock>>,
    /// Auto-mine configuration
    pub auto_mine: AutoMineConfig,
    /// Gas limit used by the convenience call/deploy helpers
    pub max_gas_per_tx: u64,
    /// Fee model configuration
    pub fee_config: FeeConfig,
    /// Minimum spacing of block timestamps in milliseconds
    pub block_time_ms: u64,
}

impl Default for ChainClientConfig {
    fn default() -> Self {
        Self {
            genesis_accounts: Vec::new(),
            genesis_contracts: Vec::new(),
            clock: None,
            auto_mine: AutoMineConfig::default(),
            max_gas_per_tx: DEFAULT_GAS_LIMIT,
            fee_config: FeeConfig::default(),
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
        }
    }
}

impl ChainClientConfig {
    /// Create a minimal config with no accounts or contracts.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Add a genesis account.
    pub fn with_account(mut self, account: GenesisAccount) -> Self {
        self.genesis_accounts.push(account);
        self
    }

    /// Add multiple genesis accounts.
    pub fn with_accounts(mut self, accounts: Vec<GenesisAccount>) -> Self {
        self.genesis_accounts.extend(accounts);
        self
    }

    /// Add a genesis contract.
    pub fn with_contract(mut self, contract: GenesisContract) -> Self {
        self.genesis_contracts.push(contract);
        self
    }

    /// Set the clock for time control.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the auto-mine configuration.
    pub fn with_auto_mine(mut self, config: AutoMineConfig) -> Self {
        self.auto_mine = config;
        self
    }

    /// Set the gas limit for helper-built transactions.
    pub fn with_max_gas_per_tx(mut self, max: u64) -> Self {
        self.max_gas_per_tx = max;
        self
    }

    /// Set the fee configuration.
    pub fn with_fee_config(mut self, fee_config: FeeConfig) -> Self {
        self.fee_config = fee_config;
        self
    }

    /// Disable fee enforcement for simpler tests.
    pub fn with_fees_disabled(mut self) -> Self {
        self.fee_config.enforce_fees = false;
        self
    }

    /// Set the block time target in milliseconds.
    pub fn with_block_time_ms(mut self, ms: u64) -> Self {
        self.block_time_ms = ms;
        self
    }
}

impl std::fmt::Debug for ChainClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClientConfig")
            .field("genesis_accounts", &self.genesis_accounts.len())
            .field("genesis_contracts", &self.genesis_contracts)
            .field("auto_mine", &self.auto_mine)
            .field("max_gas_per_tx", &self.max_gas_per_tx)
            .field("fee_config", &self.fee_config)
            .field("block_time_ms", &self.block_time_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash(byte: u8) -> Hash {
        Hash::new([byte; 32])
    }

    #[test]
    fn test_default_config() {
        let config = ChainClientConfig::default();
        assert!(config.genesis_accounts.is_empty());
        assert!(config.genesis_contracts.is_empty());
        assert!(matches!(config.auto_mine, AutoMineConfig::OnTransaction));
        assert_eq!(config.max_gas_per_tx, DEFAULT_GAS_LIMIT);
        assert_eq!(config.fee_config.effective_gas_price(), DEFAULT_GAS_PRICE);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ChainClientConfig::default()
            .with_account(GenesisAccount::new(sample_hash(1), 1_000_000))
            .with_account(GenesisAccount::new(sample_hash(2), 500_000).with_nonce(3))
            .with_auto_mine(AutoMineConfig::Disabled)
            .with_fees_disabled()
            .with_max_gas_per_tx(200_000);

        assert_eq!(config.genesis_accounts.len(), 2);
        assert_eq!(config.genesis_accounts[0].balance, 1_000_000);
        assert_eq!(config.genesis_accounts[1].nonce, 3);
        assert!(matches!(config.auto_mine, AutoMineConfig::Disabled));
        assert_eq!(config.fee_config.effective_gas_price(), 0);
        assert_eq!(config.max_gas_per_tx, 200_000);
        assert!(format!("{:?}", config).contains("ChainClientConfig"));
    }
}
