//! ChainClient: Direct blockchain access for deterministic testing.
//!
//! ChainClient provides a high-level API over a [`TestBlockchain`]:
//! - Direct state queries (balance, nonce, contract storage)
//! - Transaction submission with structured results
//! - Contract deployment, calls and read-only queries
//! - Transaction simulation (dry-run) with state diffs
//! - State override for testing edge cases
//! - Block production on demand: mempool batches and topoheight warps

use std::collections::HashMap;
use std::sync::Arc;

use borsh::BorshDeserialize;
use savings_common::config::NATIVE_ASSET;
use savings_common::contract::{Contract, EntryId};
use savings_common::crypto::Hash;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::orchestrator::{Clock, SystemClock};
use crate::tier1_component::{
    TestBlock, TestBlockchain, TestBlockchainBuilder, TestTransaction, TxPayload,
};

use super::chain_client_config::{AutoMineConfig, ChainClientConfig};
use super::tx_result::{SimulationResult, StateDiff, TransactionError, TxResult};

/// Upper bound on blocks produced by one [`ChainClient::warp_blocks`] call.
pub const MAX_WARP_BLOCKS: u64 = 100_000;

/// Failures of the client itself, as opposed to a transaction failing.
///
/// A reverted deposit is a successful client call with a failed
/// [`TxResult`]; `ChainError` means the ledger could not be driven at all.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ChainError {
    #[error("target topoheight {target} is behind current {current}")]
    TargetBehindCurrent { target: u64, current: u64 },

    #[error("block creation failed: {0}")]
    BlockCreationFailed(String),

    #[error("state transition error: {0}")]
    StateTransition(String),

    #[error("warp of {requested} blocks exceeds maximum {max}")]
    ExceedsMaxWarp { requested: u64, max: u64 },
}

/// Transaction kinds accepted by [`ChainClient::build_transaction`].
#[derive(Clone)]
#[allow(missing_docs)]
pub enum TransactionType {
    /// Native transfer
    Transfer { to: Hash, amount: u64 },
    /// Deploy a new contract
    DeployContract {
        code: Arc<dyn Contract>,
        args: Vec<u8>,
        value: u64,
    },
    /// Call an existing contract, optionally attaching native value
    CallContract {
        contract: Hash,
        entry_id: EntryId,
        data: Vec<u8>,
        value: u64,
    },
}

impl TransactionType {
    fn into_payload(self) -> TxPayload {
        match self {
            Self::Transfer { to, amount } => TxPayload::Transfer {
                recipient: to,
                amount,
            },
            Self::DeployContract { code, args, value } => TxPayload::Deploy { code, args, value },
            Self::CallContract {
                contract,
                entry_id,
                data,
                value,
            } => TxPayload::Invoke {
                contract,
                entry_id,
                input: data,
                value,
            },
        }
    }
}

/// ChainClient provides direct blockchain access for testing.
///
/// # Example
/// ```ignore
/// let mut client = ChainClient::start(
///     ChainClientConfig::default().with_account(GenesisAccount::new(alice.clone(), 1_000_000_000)),
/// )
/// .await?;
///
/// let deployed = client.deploy_contract(&alice, Arc::new(VickishToken), args).await?;
/// let token = deployed.contract_address.unwrap();
/// let result = client.call_contract(&alice, &token, OP_TRANSFER, data, 0).await?;
/// assert!(result.success);
/// ```
pub struct ChainClient {
    /// Underlying blockchain instance
    blockchain: TestBlockchain,
    /// Clock for block timestamps
    clock: Arc<dyn Clock>,
    /// Auto-mine configuration
    auto_mine: AutoMineConfig,
    /// Configuration reference
    config: ChainClientConfig,
    /// Transaction results log (hash -> result)
    tx_log: Arc<RwLock<HashMap<Hash, TxResult>>>,
    /// Hashes waiting in the mempool, with whether they target a contract
    pending: Vec<(Hash, bool)>,
}

impl ChainClient {
    /// Create and start a new ChainClient with the given configuration.
    pub async fn start(config: ChainClientConfig) -> Result<Self, ChainError> {
        let clock: Arc<dyn Clock> = config
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock));

        let mut builder = TestBlockchainBuilder::new()
            .with_clock(clock.clone())
            .with_gas_price(config.fee_config.effective_gas_price())
            .with_block_time_ms(config.block_time_ms);

        for account in &config.genesis_accounts {
            builder = builder.with_funded_account(account.address.clone(), account.balance);
        }

        let blockchain = builder.build().await.map_err(|e| {
            ChainError::BlockCreationFailed(format!("Failed to build blockchain: {}", e))
        })?;

        for account in config.genesis_accounts.iter().filter(|a| a.nonce > 0) {
            blockchain
                .force_set_nonce(&account.address, account.nonce)
                .await
                .map_err(|e| ChainError::StateTransition(e.to_string()))?;
        }

        for contract in &config.genesis_contracts {
            blockchain
                .install_contract(
                    &contract.deployer,
                    &contract.address,
                    contract.code.clone(),
                    &contract.args,
                )
                .await
                .map_err(|e| ChainError::StateTransition(e.to_string()))?;
            for (key, value) in &contract.storage {
                blockchain
                    .force_set_storage(&contract.address, key.clone(), value.clone())
                    .await
                    .map_err(|e| ChainError::StateTransition(e.to_string()))?;
            }
        }

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "ChainClient started with {} accounts and {} contracts",
                config.genesis_accounts.len(),
                config.genesis_contracts.len()
            );
        }

        let auto_mine = config.auto_mine.clone();
        Ok(Self {
            blockchain,
            clock,
            auto_mine,
            config,
            tx_log: Arc::new(RwLock::new(HashMap::new())),
            pending: Vec::new(),
        })
    }

    // --- Transaction Operations ---

    /// Process a transaction and return the structured result.
    ///
    /// Rejected transactions (unknown sender, bad nonce, unaffordable) get a
    /// failed result and never reach the ledger. With `OnTransaction`
    /// auto-mine the transaction is mined immediately and the result is
    /// final; otherwise the result only reports acceptance into the mempool
    /// and [`ChainClient::mine_mempool`] yields the final results.
    pub async fn process_transaction(&mut self, tx: TestTransaction) -> Result<TxResult, ChainError> {
        let tx_hash = tx.hash.clone();
        let is_contract = !matches!(tx.payload, TxPayload::Transfer { .. });

        if let Some(error) = self.validate_transaction(&tx).await {
            let result = self.rejected(&tx, error).await;
            self.tx_log.write().await.insert(tx_hash, result.clone());
            return Ok(result);
        }

        self.blockchain
            .submit_transaction(tx.clone())
            .await
            .map_err(|e| ChainError::StateTransition(e.to_string()))?;
        self.pending.push((tx_hash.clone(), is_contract));

        match self.auto_mine {
            AutoMineConfig::OnTransaction => {
                let results = self.mine_mempool().await?;
                results
                    .into_iter()
                    .find(|r| r.tx_hash == tx_hash)
                    .ok_or_else(|| {
                        ChainError::BlockCreationFailed(format!(
                            "transaction {} missing from mined block",
                            tx_hash
                        ))
                    })
            }
            AutoMineConfig::Disabled => {
                let result = TxResult {
                    success: true,
                    tx_hash: tx_hash.clone(),
                    block_hash: None,
                    topoheight: None,
                    error: None,
                    gas_used: 0,
                    gas_refunded: 0,
                    fee: 0,
                    exit_code: None,
                    events: vec![],
                    log_messages: vec![],
                    inner_calls: vec![],
                    return_data: vec![],
                    contract_address: None,
                    new_nonce: tx.nonce,
                };
                self.tx_log.write().await.insert(tx_hash, result.clone());
                Ok(result)
            }
        }
    }

    /// Process multiple transactions in a single block.
    ///
    /// Invalid transactions are reported and skipped; the rest are mined
    /// together, in order.
    pub async fn process_batch(
        &mut self,
        txs: Vec<TestTransaction>,
    ) -> Result<Vec<TxResult>, ChainError> {
        let mut rejected = HashMap::new();
        for tx in &txs {
            match self.validate_transaction(tx).await {
                Some(error) => {
                    let result = self.rejected(tx, error).await;
                    rejected.insert(tx.hash.clone(), result);
                }
                None => {
                    let is_contract = !matches!(tx.payload, TxPayload::Transfer { .. });
                    self.blockchain
                        .submit_transaction(tx.clone())
                        .await
                        .map_err(|e| ChainError::StateTransition(e.to_string()))?;
                    self.pending.push((tx.hash.clone(), is_contract));
                }
            }
        }

        let mined = self.mine_mempool().await?;
        let mut mined: HashMap<Hash, TxResult> =
            mined.into_iter().map(|r| (r.tx_hash.clone(), r)).collect();

        let mut results = Vec::with_capacity(txs.len());
        for tx in &txs {
            if let Some(result) = rejected.remove(&tx.hash).or_else(|| mined.remove(&tx.hash)) {
                self.tx_log
                    .write()
                    .await
                    .insert(result.tx_hash.clone(), result.clone());
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Simulate a transaction without committing state changes.
    pub async fn simulate_transaction(&self, tx: &TestTransaction) -> SimulationResult {
        if let Some(error) = self.validate_transaction(tx).await {
            return SimulationResult {
                success: false,
                error: Some(error),
                gas_used: 0,
                fee: 0,
                events: vec![],
                log_messages: vec![],
                inner_calls: vec![],
                return_data: vec![],
                state_diff: StateDiff::default(),
            };
        }

        match self.blockchain.simulate_transaction(tx).await {
            Ok(sim) => {
                let state_diff = StateDiff::between(&sim.pre_state, &sim.post_state);
                let is_contract = !matches!(tx.payload, TxPayload::Transfer { .. });
                let result = TxResult::from_receipt(sim.receipt, is_contract);
                SimulationResult {
                    success: result.success,
                    error: result.error,
                    gas_used: result.gas_used,
                    fee: result.fee,
                    events: result.events,
                    log_messages: result.log_messages,
                    inner_calls: result.inner_calls,
                    return_data: result.return_data,
                    state_diff,
                }
            }
            Err(e) => SimulationResult {
                success: false,
                error: Some(TransactionError::MalformedTransaction {
                    reason: e.to_string(),
                }),
                gas_used: 0,
                fee: 0,
                events: vec![],
                log_messages: vec![],
                inner_calls: vec![],
                return_data: vec![],
                state_diff: StateDiff::default(),
            },
        }
    }

    // --- Contract Operations ---

    /// Deploy a contract from `deployer`, returning the mined result.
    ///
    /// On success `contract_address` holds the new address.
    pub async fn deploy_contract(
        &mut self,
        deployer: &Hash,
        code: Arc<dyn Contract>,
        args: Vec<u8>,
    ) -> Result<TxResult, ChainError> {
        let tx = self
            .build_transaction(
                deployer.clone(),
                TransactionType::DeployContract {
                    code,
                    args,
                    value: 0,
                },
            )
            .await?;
        self.process_transaction(tx).await
    }

    /// Call a deployed contract, attaching `value` native units.
    pub async fn call_contract(
        &mut self,
        caller: &Hash,
        contract: &Hash,
        entry_id: EntryId,
        data: Vec<u8>,
        value: u64,
    ) -> Result<TxResult, ChainError> {
        let tx = self
            .build_transaction(
                caller.clone(),
                TransactionType::CallContract {
                    contract: contract.clone(),
                    entry_id,
                    data,
                    value,
                },
            )
            .await?;
        self.process_transaction(tx).await
    }

    /// Read-only call; state changes are discarded and no fee is charged.
    pub async fn query(
        &self,
        caller: &Hash,
        contract: &Hash,
        entry_id: EntryId,
        data: &[u8],
    ) -> Result<Vec<u8>, TransactionError> {
        self.blockchain
            .query_contract(caller, contract, entry_id, data, self.config.max_gas_per_tx)
            .await
            .map_err(|e| TransactionError::from(&e))
    }

    /// Read-only call with borsh-decoded return data.
    pub async fn query_as<T: BorshDeserialize>(
        &self,
        contract: &Hash,
        entry_id: EntryId,
        data: &[u8],
    ) -> Result<T, TransactionError> {
        let bytes = self.query(&Hash::zero(), contract, entry_id, data).await?;
        T::try_from_slice(&bytes).map_err(|e| TransactionError::MalformedTransaction {
            reason: format!("borsh deserialization failed: {}", e),
        })
    }

    // --- State Queries ---

    /// Get the native balance of an account.
    pub async fn get_balance(&self, address: &Hash) -> Result<u64, TransactionError> {
        self.blockchain
            .get_balance(address)
            .await
            .map_err(|_| TransactionError::AccountNotFound {
                address: address.clone(),
            })
    }

    /// Get the nonce of an account.
    pub async fn get_nonce(&self, address: &Hash) -> Result<u64, TransactionError> {
        self.blockchain
            .get_nonce(address)
            .await
            .map_err(|_| TransactionError::AccountNotFound {
                address: address.clone(),
            })
    }

    /// Get contract storage value by key.
    pub async fn get_contract_storage(
        &self,
        contract: &Hash,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, TransactionError> {
        if !self.is_contract(contract).await {
            return Err(TransactionError::ContractNotFound {
                address: contract.clone(),
            });
        }
        self.blockchain
            .get_contract_storage(contract, key)
            .await
            .map_err(|e| TransactionError::MalformedTransaction {
                reason: e.to_string(),
            })
    }

    /// Get contract storage and deserialize with borsh.
    pub async fn get_contract_state_borsh<T: BorshDeserialize>(
        &self,
        contract: &Hash,
        key: &[u8],
    ) -> Result<Option<T>, TransactionError> {
        let data = self.get_contract_storage(contract, key).await?;
        match data {
            None => Ok(None),
            Some(bytes) => {
                let value = T::try_from_slice(&bytes).map_err(|e| {
                    TransactionError::MalformedTransaction {
                        reason: format!("borsh deserialization failed: {}", e),
                    }
                })?;
                Ok(Some(value))
            }
        }
    }

    pub async fn is_contract(&self, address: &Hash) -> bool {
        self.blockchain.is_contract(address).await.unwrap_or(false)
    }

    /// Get the transaction result for a previously processed transaction.
    pub async fn get_tx_result(&self, tx_hash: &Hash) -> Option<TxResult> {
        self.tx_log.read().await.get(tx_hash).cloned()
    }

    // --- State Override (Test-Only) ---

    /// Force-set the balance of an account (bypasses normal transaction flow).
    pub async fn force_set_balance(
        &mut self,
        address: &Hash,
        balance: u64,
    ) -> Result<(), ChainError> {
        self.blockchain
            .force_set_balance(address, balance)
            .await
            .map_err(|e| ChainError::StateTransition(e.to_string()))
    }

    /// Force-set the nonce of an account.
    pub async fn force_set_nonce(&mut self, address: &Hash, nonce: u64) -> Result<(), ChainError> {
        self.blockchain
            .force_set_nonce(address, nonce)
            .await
            .map_err(|e| ChainError::StateTransition(e.to_string()))
    }

    /// Force-set a contract storage entry.
    pub async fn force_set_contract_storage(
        &mut self,
        contract: &Hash,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<(), ChainError> {
        self.blockchain
            .force_set_storage(contract, key, value)
            .await
            .map_err(|e| ChainError::StateTransition(e.to_string()))
    }

    // --- Transaction Builder ---

    /// Build a transaction with the sender's next nonce and the configured
    /// gas limit.
    pub async fn build_transaction(
        &self,
        sender: Hash,
        tx_type: TransactionType,
    ) -> Result<TestTransaction, ChainError> {
        let nonce = self
            .blockchain
            .next_nonce(&sender)
            .await
            .map_err(|e| ChainError::StateTransition(e.to_string()))?;
        Ok(TestTransaction::new(
            sender,
            nonce,
            self.config.max_gas_per_tx,
            tx_type.into_payload(),
        ))
    }

    // --- Block Operations ---

    /// Mine a single block, returning its hash.
    pub async fn mine_block(&mut self) -> Result<Hash, ChainError> {
        let block = self.mine().await?;
        Ok(block.hash)
    }

    /// Mine N blocks, advancing the chain.
    pub async fn mine_blocks(&mut self, count: u64) -> Result<Vec<Hash>, ChainError> {
        let mut hashes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            hashes.push(self.mine_block().await?);
        }
        Ok(hashes)
    }

    /// Submit a transaction to the mempool without mining a block.
    pub async fn submit_to_mempool(&mut self, tx: TestTransaction) -> Result<(), ChainError> {
        if let Some(error) = self.validate_transaction(&tx).await {
            return Err(ChainError::StateTransition(format!(
                "Transaction validation failed: {}",
                error
            )));
        }
        let is_contract = !matches!(tx.payload, TxPayload::Transfer { .. });
        let tx_hash = tx.hash.clone();
        self.blockchain
            .submit_transaction(tx)
            .await
            .map_err(|e| ChainError::StateTransition(e.to_string()))?;
        self.pending.push((tx_hash, is_contract));
        Ok(())
    }

    /// Mine a block containing all pending mempool transactions and return
    /// their final results.
    pub async fn mine_mempool(&mut self) -> Result<Vec<TxResult>, ChainError> {
        let block = self.mine().await?;
        let pending: HashMap<Hash, bool> = self.pending.drain(..).collect();

        let mut results = Vec::with_capacity(block.receipts.len());
        let mut log = self.tx_log.write().await;
        for receipt in block.receipts {
            let is_contract = pending.get(&receipt.tx_hash).copied().unwrap_or(true);
            let result = TxResult::from_receipt(receipt, is_contract);
            log.insert(result.tx_hash.clone(), result.clone());
            results.push(result);
        }
        Ok(results)
    }

    /// Get the current topoheight of the chain.
    pub async fn topoheight(&self) -> u64 {
        self.blockchain.get_topoheight().await.unwrap_or(0)
    }

    // --- Accessors ---

    /// Get the underlying blockchain reference.
    pub fn blockchain(&self) -> &TestBlockchain {
        &self.blockchain
    }

    /// Get the clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ChainClientConfig {
        &self.config
    }

    // --- Private Helpers ---

    async fn mine(&mut self) -> Result<TestBlock, ChainError> {
        self.blockchain
            .mine_block()
            .await
            .map_err(|e| ChainError::BlockCreationFailed(e.to_string()))
    }

    async fn rejected(&self, tx: &TestTransaction, error: TransactionError) -> TxResult {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Transaction {} rejected: {}", tx.hash, error);
        }
        TxResult {
            success: false,
            tx_hash: tx.hash.clone(),
            block_hash: None,
            topoheight: None,
            error: Some(error),
            gas_used: 0,
            gas_refunded: 0,
            fee: 0,
            exit_code: None,
            events: vec![],
            log_messages: vec![],
            inner_calls: vec![],
            return_data: vec![],
            contract_address: None,
            new_nonce: self.get_nonce(&tx.sender).await.unwrap_or(0),
        }
    }

    /// Validate a transaction before execution.
    async fn validate_transaction(&self, tx: &TestTransaction) -> Option<TransactionError> {
        if !self.blockchain.account_exists(&tx.sender).await.unwrap_or(false) {
            return Some(TransactionError::AccountNotFound {
                address: tx.sender.clone(),
            });
        }

        let balance = self.blockchain.get_balance(&tx.sender).await.unwrap_or(0);
        let total_cost = match tx
            .gas_limit
            .checked_mul(self.blockchain.gas_price())
            .and_then(|fee| fee.checked_add(tx.payload.value()))
        {
            Some(cost) => cost,
            None => {
                return Some(TransactionError::ArithmeticOverflow {
                    operation: "value + max fee".to_string(),
                })
            }
        };
        if balance < total_cost {
            return Some(TransactionError::InsufficientBalance {
                have: balance,
                need: total_cost,
                asset: NATIVE_ASSET,
            });
        }

        let expected_nonce = match self.blockchain.next_nonce(&tx.sender).await {
            Ok(nonce) => nonce,
            Err(e) => {
                return Some(TransactionError::MalformedTransaction {
                    reason: e.to_string(),
                })
            }
        };
        if tx.nonce != expected_nonce {
            return Some(TransactionError::InvalidNonce {
                expected: expected_nonce,
                provided: tx.nonce,
            });
        }

        None
    }
}

// --- Chain Advancement ---
//
// Savings ledgers do not depend on time or height, so these only move
// topoheight forward. Anything queued in the mempool lands in the first
// block produced.
impl ChainClient {
    /// Produce `n` blocks and return the new topoheight.
    pub async fn warp_blocks(&mut self, n: u64) -> Result<u64, ChainError> {
        if n > MAX_WARP_BLOCKS {
            return Err(ChainError::ExceedsMaxWarp {
                requested: n,
                max: MAX_WARP_BLOCKS,
            });
        }

        for _ in 0..n {
            self.mine_mempool().await?;
        }

        if log::log_enabled!(log::Level::Trace) {
            log::trace!("Warped {} blocks to topoheight {}", n, self.current_topoheight());
        }
        Ok(self.current_topoheight())
    }

    /// Produce blocks until `target` is reached. Fails if already past it.
    pub async fn warp_to_topoheight(&mut self, target: u64) -> Result<(), ChainError> {
        let current = self.current_topoheight();
        if target < current {
            return Err(ChainError::TargetBehindCurrent { target, current });
        }
        self.warp_blocks(target - current).await?;
        Ok(())
    }

    /// Put `txs` into one block, in order, and return its hash.
    ///
    /// Each transaction is validated on submission. One that reverts during
    /// execution still lands in the block with a failed receipt, so a batch
    /// such as deposit / failing withdraw / deposit keeps both deposits.
    pub async fn create_block_with_txs(
        &mut self,
        txs: Vec<TestTransaction>,
    ) -> Result<Hash, ChainError> {
        for tx in txs {
            self.submit_to_mempool(tx)
                .await
                .map_err(|e| ChainError::BlockCreationFailed(e.to_string()))?;
        }
        self.mine_mempool().await?;
        self.blockchain
            .get_block_at_height(self.current_topoheight())
            .await
            .ok()
            .flatten()
            .map(|b| b.hash)
            .ok_or_else(|| ChainError::BlockCreationFailed("mined block not found".to_string()))
    }

    pub fn current_topoheight(&self) -> u64 {
        self.blockchain.height()
    }
}
