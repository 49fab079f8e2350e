//! TestBlockchain - In-process ledger for component testing
//!
//! Holds native balances, deployed contracts and their storage, and executes
//! transactions through [`ContractExecutor`]. Each transaction is atomic:
//! it either commits every change it made or none of them. The nonce bump
//! and the fee are the only effects a failed transaction leaves behind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use savings_common::config::{DEFAULT_GAS_LIMIT, GAS_BASE_TRANSACTION};
use savings_common::contract::{Contract, ContractError, EntryId};
use savings_common::crypto::{compute_contract_address, hash, Hash};
use tokio::time::Instant;

use super::executor::{ContractExecutor, ExecutionOutput};
use super::state::{AccountState, DeployedContract, WorldState};
use super::transaction::{ExecutionError, TestTransaction, TransactionReceipt, TxPayload};
use crate::orchestrator::Clock;

/// Blockchain-wide counters for O(1) invariant checking
///
/// Maintained incrementally so economic invariants can be verified without
/// scanning the whole state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockchainCounters {
    /// Total of all native balances, contracts included
    pub balances_total: u128,
    /// Total fees burned
    pub fees_burned: u64,
    /// Total supply (must equal balances_total + fees_burned)
    pub supply: u128,
    /// Transactions executed successfully
    pub txs_succeeded: u64,
    /// Transactions included but failed
    pub txs_failed: u64,
}

/// Block for testing
#[derive(Debug, Clone)]
pub struct TestBlock {
    /// Block hash
    pub hash: Hash,
    /// Block height
    pub height: u64,
    /// Topological height (equals height in a linear chain)
    pub topoheight: u64,
    /// Milliseconds since genesis
    pub timestamp_ms: u64,
    /// Parent block hash
    pub parent: Hash,
    /// Transactions in this block
    pub transactions: Vec<TestTransaction>,
    /// One receipt per transaction, same order
    pub receipts: Vec<TransactionReceipt>,
}

/// Result of a dry run
#[derive(Debug, Clone)]
pub struct SimulatedExecution {
    pub receipt: TransactionReceipt,
    pub pre_state: WorldState,
    /// Equal to `pre_state` apart from nonce and fee when the run failed
    pub post_state: WorldState,
}

/// In-process test blockchain instance
///
/// # Example
///
/// ```rust,ignore
/// let blockchain = TestBlockchainBuilder::new()
///     .with_funded_account(alice.clone(), 1_000 * COIN_VALUE)
///     .build()
///     .await?;
///
/// let tx = TestTransaction::new(alice, 1, 100_000, TxPayload::Transfer { recipient: bob, amount: 10 });
/// blockchain.submit_transaction(tx).await?;
/// let block = blockchain.mine_block().await?;
/// assert!(block.receipts[0].is_success());
/// ```
pub struct TestBlockchain {
    /// Injected clock for block timestamps
    clock: Arc<dyn Clock>,

    genesis_instant: Instant,

    /// Accounts and contract storage
    state: Arc<RwLock<WorldState>>,

    /// Contract registry
    contracts: Arc<RwLock<BTreeMap<Hash, DeployedContract>>>,

    /// Blockchain counters (maintained incrementally)
    counters: Arc<RwLock<BlockchainCounters>>,

    /// Current tip height
    tip_height: AtomicU64,

    /// Mempool (pending transactions)
    mempool: Arc<RwLock<Vec<TestTransaction>>>,

    /// Block history
    blocks: Arc<RwLock<Vec<TestBlock>>>,

    /// Receipts by transaction hash
    receipts: Arc<RwLock<BTreeMap<Hash, TransactionReceipt>>>,

    gas_price: u64,

    block_time_ms: u64,
}

impl TestBlockchain {
    /// Create a new TestBlockchain instance (internal constructor)
    ///
    /// Use `TestBlockchainBuilder` for more convenient configuration.
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        funded_accounts: Vec<(Hash, u64)>,
        gas_price: u64,
        block_time_ms: u64,
    ) -> Result<Self> {
        let mut state = WorldState::default();
        for (address, balance) in funded_accounts {
            state
                .credit(&address, balance)
                .with_context(|| format!("Genesis balance overflow for {}", address))?;
        }

        let total = state.total_balance();
        let counters = BlockchainCounters {
            balances_total: total,
            supply: total,
            ..Default::default()
        };

        let genesis = TestBlock {
            hash: Hash::zero(),
            height: 0,
            topoheight: 0,
            timestamp_ms: 0,
            parent: Hash::zero(),
            transactions: vec![],
            receipts: vec![],
        };

        let genesis_instant = clock.now();
        Ok(Self {
            clock,
            genesis_instant,
            state: Arc::new(RwLock::new(state)),
            contracts: Arc::new(RwLock::new(BTreeMap::new())),
            counters: Arc::new(RwLock::new(counters)),
            tip_height: AtomicU64::new(0),
            mempool: Arc::new(RwLock::new(Vec::new())),
            blocks: Arc::new(RwLock::new(vec![genesis])),
            receipts: Arc::new(RwLock::new(BTreeMap::new())),
            gas_price,
            block_time_ms,
        })
    }

    /// Submit a transaction to the mempool
    ///
    /// # Validation
    ///
    /// - Sender must exist and hold `value + gas_limit * gas_price`
    /// - Nonce must be exactly sender.nonce + 1 + pending_count
    /// - Gas limit must cover the base transaction cost
    pub async fn submit_transaction(&self, tx: TestTransaction) -> Result<Hash> {
        let mut mempool = self.mempool.write();
        let state = self.state.read();

        let sender_state = state
            .accounts
            .get(&tx.sender)
            .context("Sender account not found")?;

        if tx.gas_limit < GAS_BASE_TRANSACTION {
            anyhow::bail!(
                "Gas limit {} below base cost {}",
                tx.gas_limit,
                GAS_BASE_TRANSACTION
            );
        }

        let total_cost = self
            .max_fee(tx.gas_limit)
            .and_then(|fee| fee.checked_add(tx.payload.value()))
            .context("Value + fee overflow")?;

        if sender_state.balance < total_cost {
            anyhow::bail!(
                "Insufficient balance: need {}, have {}",
                total_cost,
                sender_state.balance
            );
        }

        let pending_count: u64 = mempool
            .iter()
            .filter(|t| t.sender == tx.sender)
            .count()
            .try_into()
            .context("Too many pending transactions for sender")?;

        let expected_nonce = sender_state
            .nonce
            .checked_add(1)
            .and_then(|n| n.checked_add(pending_count))
            .context("Nonce calculation overflow")?;

        if tx.nonce != expected_nonce {
            anyhow::bail!(
                "Invalid nonce: expected {}, got {}",
                expected_nonce,
                tx.nonce
            );
        }

        let tx_hash = tx.hash.clone();
        mempool.push(tx);

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Transaction {} added to mempool", tx_hash);
        }

        Ok(tx_hash)
    }

    /// Mine a new block with all mempool transactions
    ///
    /// Transactions execute in submission order. Each one yields a receipt,
    /// successful or not; a failing transaction never aborts the block.
    pub async fn mine_block(&self) -> Result<TestBlock> {
        let mut mempool = self.mempool.write();
        let mut state = self.state.write();
        let mut contracts = self.contracts.write();
        let mut counters = self.counters.write();
        let mut blocks = self.blocks.write();

        let transactions = std::mem::take(&mut *mempool);

        let current_height = self.tip_height.load(Ordering::SeqCst);
        let new_height = current_height
            .checked_add(1)
            .context("Block height overflow - chain too long")?;

        let mut receipts = Vec::with_capacity(transactions.len());
        for tx in &transactions {
            let receipt = self.apply_transaction(
                &mut state,
                &mut contracts,
                &mut counters,
                tx,
                new_height,
            )?;
            receipts.push(receipt);
        }

        let parent = blocks
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_else(Hash::zero);
        let prev_timestamp = blocks.last().map(|b| b.timestamp_ms).unwrap_or(0);
        let elapsed_ms = (self.clock.now() - self.genesis_instant).as_millis() as u64;
        let timestamp_ms = elapsed_ms.max(prev_timestamp.saturating_add(self.block_time_ms));

        let block_hash = Self::compute_block_hash(new_height, &parent, &transactions);
        for receipt in &mut receipts {
            receipt.block_hash = Some(block_hash.clone());
        }

        {
            let mut index = self.receipts.write();
            for receipt in &receipts {
                index.insert(receipt.tx_hash.clone(), receipt.clone());
            }
        }

        let block = TestBlock {
            hash: block_hash.clone(),
            height: new_height,
            topoheight: new_height,
            timestamp_ms,
            parent,
            transactions,
            receipts,
        };

        blocks.push(block.clone());
        self.tip_height.store(new_height, Ordering::SeqCst);

        if log::log_enabled!(log::Level::Info) {
            log::info!(
                "Mined block {} at height {} with {} transactions",
                block_hash,
                new_height,
                block.transactions.len()
            );
        }

        Ok(block)
    }

    /// Execute a transaction against a copy of the state, committing nothing
    pub async fn simulate_transaction(&self, tx: &TestTransaction) -> Result<SimulatedExecution> {
        let pre_state = self.state.read().clone();
        let mut post_state = pre_state.clone();
        let mut contracts = self.contracts.read().clone();
        let mut counters = self.counters.read().clone();
        let topoheight = self.tip_height.load(Ordering::SeqCst).saturating_add(1);

        let receipt =
            self.apply_transaction(&mut post_state, &mut contracts, &mut counters, tx, topoheight)?;

        Ok(SimulatedExecution {
            receipt,
            pre_state,
            post_state,
        })
    }

    /// Read-only contract call against the current state
    ///
    /// Runs with the default gas limit; any state change is discarded.
    pub async fn query_contract(
        &self,
        caller: &Hash,
        contract: &Hash,
        entry_id: EntryId,
        input: &[u8],
        gas_limit: u64,
    ) -> std::result::Result<Vec<u8>, ExecutionError> {
        let state = self.state.read().clone();
        let contracts = self.contracts.read();
        let topoheight = self.tip_height.load(Ordering::SeqCst);
        ContractExecutor::new(state, &contracts, topoheight, gas_limit)
            .execute_call(caller, contract, entry_id, input, 0)
            .result
    }

    fn max_fee(&self, gas_limit: u64) -> Option<u64> {
        gas_limit.checked_mul(self.gas_price)
    }

    fn apply_transaction(
        &self,
        state: &mut WorldState,
        contracts: &mut BTreeMap<Hash, DeployedContract>,
        counters: &mut BlockchainCounters,
        tx: &TestTransaction,
        topoheight: u64,
    ) -> Result<TransactionReceipt> {
        let mut receipt = TransactionReceipt {
            tx_hash: tx.hash.clone(),
            sender: tx.sender.clone(),
            block_hash: None,
            topoheight,
            error: None,
            gas_used: 0,
            gas_refunded: 0,
            fee: 0,
            events: vec![],
            logs: vec![],
            inner_calls: vec![],
            return_data: vec![],
            contract_address: None,
            new_nonce: 0,
        };

        let sender = state
            .accounts
            .get_mut(&tx.sender)
            .context("Sender account not found during execution")?;
        sender.nonce = sender.nonce.checked_add(1).context("Nonce overflow")?;
        receipt.new_nonce = sender.nonce;
        let sender_balance = sender.balance;

        // Re-checked here: earlier transactions in the block may have spent funds
        let need = self
            .max_fee(tx.gas_limit)
            .and_then(|fee| fee.checked_add(tx.payload.value()))
            .context("Value + fee overflow")?;
        if sender_balance < need {
            receipt.error = Some(ExecutionError::InsufficientFunds {
                have: sender_balance,
                need,
            });
            counters.txs_failed = counters.txs_failed.saturating_add(1);
            return Ok(receipt);
        }

        let output = match &tx.payload {
            TxPayload::Transfer { recipient, amount } => {
                let mut next = state.clone();
                let result = next
                    .transfer(&tx.sender, recipient, *amount)
                    .map(|_| Vec::new())
                    .map_err(|e| match e {
                        ContractError::InsufficientBalance {
                            required,
                            available,
                        } => ExecutionError::InsufficientFunds {
                            have: available,
                            need: required,
                        },
                        _ => ExecutionError::Overflow("transfer"),
                    });
                ExecutionOutput {
                    state: result.is_ok().then_some(next),
                    result,
                    gas_used: GAS_BASE_TRANSACTION,
                    gas_refunded: 0,
                    events: vec![],
                    logs: vec![],
                    inner_calls: vec![],
                }
            }
            TxPayload::Deploy { code, args, value } => {
                let address = compute_contract_address(&tx.sender, tx.nonce, code.name());
                if contracts.contains_key(&address) {
                    ExecutionOutput {
                        state: None,
                        result: Err(ExecutionError::AlreadyDeployed(address)),
                        gas_used: GAS_BASE_TRANSACTION,
                        gas_refunded: 0,
                        events: vec![],
                        logs: vec![],
                        inner_calls: vec![],
                    }
                } else {
                    let output = ContractExecutor::new(state.clone(), contracts, topoheight, tx.gas_limit)
                        .execute_deploy(&tx.sender, &address, code.clone(), args, *value);
                    if output.result.is_ok() {
                        contracts.insert(
                            address.clone(),
                            DeployedContract {
                                code: code.clone(),
                                deployer: tx.sender.clone(),
                                deployed_at: topoheight,
                            },
                        );
                        receipt.contract_address = Some(address.clone());
                        if log::log_enabled!(log::Level::Debug) {
                            log::debug!("Deployed {} at {}", code.name(), address);
                        }
                    }
                    output
                }
            }
            TxPayload::Invoke {
                contract,
                entry_id,
                input,
                value,
            } => ContractExecutor::new(state.clone(), contracts, topoheight, tx.gas_limit)
                .execute_call(&tx.sender, contract, *entry_id, input, *value),
        };

        if let Some(next) = output.state {
            *state = next;
        }

        let billable = output.gas_used.saturating_sub(output.gas_refunded);
        let fee = billable
            .checked_mul(self.gas_price)
            .context("Fee overflow")?;
        state
            .debit(&tx.sender, fee)
            .map_err(|e| anyhow::anyhow!("Sender cannot pay fee: {}", e))?;
        counters.balances_total = counters.balances_total.saturating_sub(fee as u128);
        counters.fees_burned = counters.fees_burned.saturating_add(fee);

        receipt.gas_used = output.gas_used;
        receipt.gas_refunded = output.gas_refunded;
        receipt.fee = fee;
        receipt.logs = output.logs;
        receipt.inner_calls = output.inner_calls;
        match output.result {
            Ok(data) => {
                receipt.return_data = data;
                receipt.events = output.events;
                counters.txs_succeeded = counters.txs_succeeded.saturating_add(1);
            }
            Err(e) => {
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("Transaction {} failed: {}", tx.hash, e);
                }
                receipt.error = Some(e);
                counters.txs_failed = counters.txs_failed.saturating_add(1);
            }
        }

        Ok(receipt)
    }

    /// Compute block hash from height, parent and transactions
    fn compute_block_hash(height: u64, parent: &Hash, transactions: &[TestTransaction]) -> Hash {
        let mut data = Vec::with_capacity(40 + transactions.len() * 32);
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(parent.as_bytes());
        for tx in transactions {
            data.extend_from_slice(tx.hash.as_bytes());
        }
        hash(&data)
    }

    /// Install a contract at a fixed address outside of any transaction
    ///
    /// The constructor runs with `deployer` as caller. No nonce is consumed
    /// and no fee is charged. Used for genesis contracts.
    pub async fn install_contract(
        &self,
        deployer: &Hash,
        address: &Hash,
        code: Arc<dyn Contract>,
        args: &[u8],
    ) -> Result<()> {
        let mut state = self.state.write();
        let mut contracts = self.contracts.write();
        if contracts.contains_key(address) {
            anyhow::bail!("Contract already deployed at {}", address);
        }

        let topoheight = self.tip_height.load(Ordering::SeqCst);
        let output = ContractExecutor::new(state.clone(), &contracts, topoheight, DEFAULT_GAS_LIMIT)
            .execute_deploy(deployer, address, code.clone(), args, 0);
        if let Err(e) = output.result {
            anyhow::bail!("Constructor of {} failed: {}", code.name(), e);
        }
        if let Some(next) = output.state {
            *state = next;
        }
        contracts.insert(
            address.clone(),
            DeployedContract {
                code,
                deployer: deployer.clone(),
                deployed_at: topoheight,
            },
        );
        Ok(())
    }

    /// Next nonce the sender must use, pending transactions included
    pub async fn next_nonce(&self, address: &Hash) -> Result<u64> {
        let pending: u64 = self
            .mempool
            .read()
            .iter()
            .filter(|t| &t.sender == address)
            .count()
            .try_into()
            .context("Too many pending transactions for sender")?;
        self.state
            .read()
            .nonce(address)
            .checked_add(1)
            .and_then(|n| n.checked_add(pending))
            .context("Nonce calculation overflow")
    }

    // --- Test-only state overrides ---

    /// Overwrite a native balance, keeping supply counters consistent
    pub async fn force_set_balance(&self, address: &Hash, balance: u64) -> Result<()> {
        let mut state = self.state.write();
        let mut counters = self.counters.write();

        let account = state.accounts.entry(address.clone()).or_default();
        let old = account.balance as u128;
        account.balance = balance;

        let new = balance as u128;
        counters.balances_total = counters.balances_total - old + new;
        counters.supply = counters.supply - old + new;
        Ok(())
    }

    pub async fn force_set_nonce(&self, address: &Hash, nonce: u64) -> Result<()> {
        let mut state = self.state.write();
        state.accounts.entry(address.clone()).or_default().nonce = nonce;
        Ok(())
    }

    pub async fn force_set_storage(
        &self,
        contract: &Hash,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<()> {
        if !self.contracts.read().contains_key(contract) {
            anyhow::bail!("Contract {} not deployed", contract);
        }
        self.state.write().storage_set(contract, key, value);
        Ok(())
    }

    // --- Queries ---

    /// Get block at specific height
    pub async fn get_block_at_height(&self, height: u64) -> Result<Option<TestBlock>> {
        let blocks = self.blocks.read();
        Ok(blocks.iter().find(|b| b.height == height).cloned())
    }

    /// Get block by hash
    pub async fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<TestBlock>> {
        let blocks = self.blocks.read();
        Ok(blocks.iter().find(|b| &b.hash == hash).cloned())
    }

    pub async fn get_receipt(&self, tx_hash: &Hash) -> Result<Option<TransactionReceipt>> {
        Ok(self.receipts.read().get(tx_hash).cloned())
    }

    /// Get native balance (zero for unknown accounts)
    pub async fn get_balance(&self, address: &Hash) -> Result<u64> {
        Ok(self.state.read().balance(address))
    }

    /// Get account nonce (confirmed transactions count)
    pub async fn get_nonce(&self, address: &Hash) -> Result<u64> {
        Ok(self.state.read().nonce(address))
    }

    pub async fn account_exists(&self, address: &Hash) -> Result<bool> {
        Ok(self.state.read().accounts.contains_key(address))
    }

    pub async fn get_contract_storage(&self, contract: &Hash, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.state.read().storage_get(contract, key).cloned())
    }

    /// All storage slots of a contract
    pub async fn contract_storage_kv(&self, contract: &Hash) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        Ok(self
            .state
            .read()
            .storage
            .get(contract)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn is_contract(&self, address: &Hash) -> Result<bool> {
        Ok(self.contracts.read().contains_key(address))
    }

    pub async fn deployed_contracts(&self) -> Result<BTreeMap<Hash, DeployedContract>> {
        Ok(self.contracts.read().clone())
    }

    /// Get current tip height
    pub async fn get_tip_height(&self) -> Result<u64> {
        Ok(self.tip_height.load(Ordering::SeqCst))
    }

    /// Current tip height without going through the async API
    pub fn height(&self) -> u64 {
        self.tip_height.load(Ordering::SeqCst)
    }

    /// Get current topoheight (same as height in a linear chain)
    pub async fn get_topoheight(&self) -> Result<u64> {
        self.get_tip_height().await
    }

    /// Deterministic hash of accounts and contract storage
    pub async fn state_root(&self) -> Result<Hash> {
        Ok(self.state.read().state_root())
    }

    /// All accounts in sorted order
    pub async fn accounts_kv(&self) -> Result<BTreeMap<Hash, AccountState>> {
        Ok(self.state.read().accounts.clone())
    }

    /// Full copy of the world state
    pub async fn snapshot(&self) -> Result<WorldState> {
        Ok(self.state.read().clone())
    }

    /// Read blockchain counters (O(1))
    pub async fn read_counters(&self) -> Result<BlockchainCounters> {
        Ok(self.counters.read().clone())
    }

    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.mempool.read().len())
    }

    /// Get reference to injected clock
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn gas_price(&self) -> u64 {
        self.gas_price
    }

    /// Get all blocks (for debugging/testing)
    pub async fn get_all_blocks(&self) -> Result<Vec<TestBlock>> {
        Ok(self.blocks.read().clone())
    }
}
