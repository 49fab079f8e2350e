//! ContractTest: contract testing harness.
//!
//! Provides a builder-pattern API for setting up isolated contract test
//! environments. Manages deployment, account funding, and provides
//! inspection methods for events, return data, log messages, and inner
//! call traces.

use std::sync::Arc;

use borsh::BorshDeserialize;
use savings_common::config::COIN_VALUE;
use savings_common::contract::{Contract, EntryId};
use savings_common::crypto::{hash, Hash};

use crate::orchestrator::Clock;

use super::chain_client::{ChainClient, ChainError};
use super::chain_client_config::{ChainClientConfig, GenesisAccount};
use super::tx_result::{ContractEvent, InnerCall, SimulationResult, TransactionError, TxResult};
use crate::tier1_component::{TestTransaction, TxPayload};

/// Balance given to the owner unless overridden
pub const DEFAULT_OWNER_BALANCE: u64 = 1_000 * COIN_VALUE;

type ConstructorArgs = Box<dyn FnOnce(&[Hash]) -> Vec<u8> + Send>;

struct Dependency {
    name: String,
    code: Arc<dyn Contract>,
    args: Vec<u8>,
}

/// Builder for creating a ContractTest environment.
///
/// Dependencies added with [`ContractTest::add_contract`] are deployed by
/// the owner first, in order; the contract under test is deployed last
/// and its constructor arguments may depend on their addresses.
///
/// # Example
/// ```ignore
/// let mut ctx = ContractTest::new("savings", Arc::new(SaveErc20OrNative))
///     .add_contract("token", Arc::new(VickishToken), borsh::to_vec(&TokenInit::vickish(supply))?)
///     .with_constructor(|deps| borsh::to_vec(&SavingsInit { token: deps[0].clone() }).unwrap_or_default())
///     .add_account(alice, 1_000_000_000)
///     .start()
///     .await?;
///
/// ctx.call_with_value(&alice, OP_NATIVE_DEPOSIT, vec![], 500).await?;
/// assert!(ctx.last_success());
/// ```
pub struct ContractTest {
    /// Contract name (for diagnostics)
    name: String,
    code: Arc<dyn Contract>,
    constructor: ConstructorArgs,
    /// Pre-funded accounts for the test
    accounts: Vec<GenesisAccount>,
    dependencies: Vec<Dependency>,
    /// Maximum gas per transaction
    max_gas: Option<u64>,
    /// Clock override
    clock: Option<Arc<dyn Clock>>,
    /// Contract owner address
    owner: Hash,
    owner_balance: u64,
}

impl ContractTest {
    /// Create a new ContractTest builder for a contract.
    ///
    /// The owner address is derived from the name, so two tests using the
    /// same name see the same addresses.
    pub fn new(name: &str, code: Arc<dyn Contract>) -> Self {
        let owner = hash(format!("owner:{}", name).as_bytes());

        Self {
            name: name.to_string(),
            code,
            constructor: Box::new(|_| Vec::new()),
            accounts: Vec::new(),
            dependencies: Vec::new(),
            max_gas: None,
            clock: None,
            owner,
            owner_balance: DEFAULT_OWNER_BALANCE,
        }
    }

    /// Fixed constructor arguments for the contract under test.
    pub fn with_args(mut self, args: Vec<u8>) -> Self {
        self.constructor = Box::new(move |_| args);
        self
    }

    /// Constructor arguments computed from the dependency addresses.
    pub fn with_constructor<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&[Hash]) -> Vec<u8> + Send + 'static,
    {
        self.constructor = Box::new(f);
        self
    }

    /// Add a pre-funded account to the test environment.
    pub fn add_account(mut self, address: Hash, balance: u64) -> Self {
        self.accounts.push(GenesisAccount::new(address, balance));
        self
    }

    /// Add a pre-funded account with a specific nonce.
    pub fn add_account_with_nonce(mut self, address: Hash, balance: u64, nonce: u64) -> Self {
        self.accounts
            .push(GenesisAccount::new(address, balance).with_nonce(nonce));
        self
    }

    /// Deploy an additional contract before the contract under test.
    pub fn add_contract(mut self, name: &str, code: Arc<dyn Contract>, args: Vec<u8>) -> Self {
        self.dependencies.push(Dependency {
            name: name.to_string(),
            code,
            args,
        });
        self
    }

    /// Set the maximum gas per transaction.
    pub fn set_max_gas(mut self, max_gas: u64) -> Self {
        self.max_gas = Some(max_gas);
        self
    }

    /// Set a custom clock for time control.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a custom contract owner.
    pub fn with_owner(mut self, owner: Hash, balance: u64) -> Self {
        self.owner = owner;
        self.owner_balance = balance;
        self
    }

    /// Build and start the test environment.
    pub async fn start(self) -> Result<ContractTestContext, ChainError> {
        let mut config = ChainClientConfig::default()
            .with_account(GenesisAccount::new(self.owner.clone(), self.owner_balance))
            .with_accounts(self.accounts);

        if let Some(max_gas) = self.max_gas {
            config = config.with_max_gas_per_tx(max_gas);
        }
        if let Some(clock) = self.clock {
            config = config.with_clock(clock);
        }

        let mut client = ChainClient::start(config).await?;

        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        for dependency in self.dependencies {
            let address = deploy(&mut client, &self.owner, &dependency.name, dependency.code, dependency.args).await?;
            dependencies.push(address);
        }

        let args = (self.constructor)(&dependencies);
        let contract_address = deploy(&mut client, &self.owner, &self.name, self.code, args).await?;

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "ContractTest '{}' deployed at {} with {} dependencies",
                self.name,
                contract_address,
                dependencies.len()
            );
        }

        Ok(ContractTestContext {
            client,
            contract_address,
            contract_name: self.name,
            dependencies,
            owner: self.owner,
            last_result: None,
            all_results: Vec::new(),
        })
    }
}

async fn deploy(
    client: &mut ChainClient,
    owner: &Hash,
    name: &str,
    code: Arc<dyn Contract>,
    args: Vec<u8>,
) -> Result<Hash, ChainError> {
    let result = client.deploy_contract(owner, code, args).await?;
    match (&result.error, result.contract_address) {
        (None, Some(address)) => Ok(address),
        (error, _) => Err(ChainError::StateTransition(format!(
            "deployment of '{}' failed: {:?}",
            name, error
        ))),
    }
}

/// Active contract test context with inspection methods.
///
/// Provides methods to call the contract, inspect results, and verify
/// behavior without needing to manually construct transactions.
pub struct ContractTestContext {
    /// Underlying ChainClient
    client: ChainClient,
    /// Address of the contract under test
    contract_address: Hash,
    /// Name of the contract under test
    contract_name: String,
    /// Addresses of the contracts added with `add_contract`, in order
    dependencies: Vec<Hash>,
    /// Owner of the contract
    owner: Hash,
    /// Last call result
    last_result: Option<TxResult>,
    /// All results in order
    all_results: Vec<TxResult>,
}

impl ContractTestContext {
    // --- Contract Calls ---

    /// Call the contract as the owner.
    pub async fn call(&mut self, entry_id: EntryId, data: Vec<u8>) -> Result<&TxResult, ChainError> {
        let owner = self.owner.clone();
        self.call_as(&owner, entry_id, data).await
    }

    /// Call the contract as a specific sender.
    pub async fn call_as(
        &mut self,
        sender: &Hash,
        entry_id: EntryId,
        data: Vec<u8>,
    ) -> Result<&TxResult, ChainError> {
        self.call_with_value(sender, entry_id, data, 0).await
    }

    /// Call the contract attaching native value.
    pub async fn call_with_value(
        &mut self,
        sender: &Hash,
        entry_id: EntryId,
        data: Vec<u8>,
        value: u64,
    ) -> Result<&TxResult, ChainError> {
        let contract = self.contract_address.clone();
        self.call_contract_as(sender, &contract, entry_id, data, value)
            .await
    }

    /// Call any deployed contract, e.g. a dependency.
    pub async fn call_contract_as(
        &mut self,
        sender: &Hash,
        contract: &Hash,
        entry_id: EntryId,
        data: Vec<u8>,
        value: u64,
    ) -> Result<&TxResult, ChainError> {
        let result = self
            .client
            .call_contract(sender, contract, entry_id, data, value)
            .await?;
        self.record(result)
    }

    /// Read-only call on the contract under test.
    pub async fn query(&self, entry_id: EntryId, data: &[u8]) -> Result<Vec<u8>, TransactionError> {
        self.client
            .query(&self.owner, &self.contract_address, entry_id, data)
            .await
    }

    /// Read-only call with borsh-decoded return data.
    pub async fn query_as<T: BorshDeserialize>(
        &self,
        entry_id: EntryId,
        data: &[u8],
    ) -> Result<T, TransactionError> {
        self.client
            .query_as(&self.contract_address, entry_id, data)
            .await
    }

    /// Read-only call on any contract with borsh-decoded return data.
    pub async fn query_contract_as<T: BorshDeserialize>(
        &self,
        contract: &Hash,
        entry_id: EntryId,
        data: &[u8],
    ) -> Result<T, TransactionError> {
        self.client.query_as(contract, entry_id, data).await
    }

    /// Simulate a contract call as a specific sender.
    pub async fn simulate_call_as(
        &self,
        sender: &Hash,
        entry_id: EntryId,
        data: Vec<u8>,
        value: u64,
    ) -> Result<SimulationResult, ChainError> {
        let nonce = self
            .client
            .blockchain()
            .next_nonce(sender)
            .await
            .map_err(|e| ChainError::StateTransition(e.to_string()))?;
        let tx = TestTransaction::new(
            sender.clone(),
            nonce,
            self.client.config().max_gas_per_tx,
            TxPayload::Invoke {
                contract: self.contract_address.clone(),
                entry_id,
                input: data,
                value,
            },
        );
        Ok(self.client.simulate_transaction(&tx).await)
    }

    fn record(&mut self, result: TxResult) -> Result<&TxResult, ChainError> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "{} call {} -> success={}",
                self.contract_name,
                result.tx_hash,
                result.success
            );
        }
        self.all_results.push(result.clone());
        self.last_result = Some(result);
        self.last_result
            .as_ref()
            .ok_or_else(|| ChainError::StateTransition("result not stored".to_string()))
    }

    // --- Result Inspection ---

    /// Returns true if the last call succeeded.
    pub fn last_success(&self) -> bool {
        self.last_result.as_ref().is_some_and(|r| r.success)
    }

    /// Returns the error from the last call (if it failed).
    pub fn last_error(&self) -> Option<&TransactionError> {
        self.last_result.as_ref().and_then(|r| r.error.as_ref())
    }

    /// Revert reason of the last call, wherever in the call tree it failed.
    pub fn last_revert_reason(&self) -> Option<&str> {
        self.last_result.as_ref().and_then(|r| r.revert_reason())
    }

    /// Returns events from the last call.
    pub fn last_events(&self) -> &[ContractEvent] {
        self.last_result.as_ref().map_or(&[], |r| &r.events)
    }

    /// Returns return data from the last call.
    pub fn last_return_data(&self) -> &[u8] {
        self.last_result.as_ref().map_or(&[], |r| &r.return_data)
    }

    /// Returns log messages from the last call.
    pub fn last_log_messages(&self) -> &[String] {
        self.last_result.as_ref().map_or(&[], |r| &r.log_messages)
    }

    /// Returns inner calls from the last call.
    pub fn last_inner_calls(&self) -> &[InnerCall] {
        self.last_result.as_ref().map_or(&[], |r| &r.inner_calls)
    }

    /// Returns gas used by the last call.
    pub fn last_gas_used(&self) -> u64 {
        self.last_result.as_ref().map_or(0, |r| r.gas_used)
    }

    /// Returns events matching a topic from the last call.
    pub fn last_events_by_topic(&self, topic: &str) -> Vec<&ContractEvent> {
        self.last_result
            .as_ref()
            .map_or(vec![], |r| r.events_by_topic(topic))
    }

    /// Returns the full last TxResult.
    pub fn last_result(&self) -> Option<&TxResult> {
        self.last_result.as_ref()
    }

    /// Returns all results in order.
    pub fn all_results(&self) -> &[TxResult] {
        &self.all_results
    }

    // --- State Queries ---

    /// Get the native balance of an account.
    pub async fn get_balance(&self, address: &Hash) -> Result<u64, TransactionError> {
        self.client.get_balance(address).await
    }

    /// Get the native balance of the contract.
    pub async fn get_contract_balance(&self) -> Result<u64, TransactionError> {
        self.client.get_balance(&self.contract_address).await
    }

    /// Get contract storage value by key.
    pub async fn get_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TransactionError> {
        self.client
            .get_contract_storage(&self.contract_address, key)
            .await
    }

    /// Get contract storage and deserialize with borsh.
    pub async fn get_storage_borsh<T: BorshDeserialize>(
        &self,
        key: &[u8],
    ) -> Result<Option<T>, TransactionError> {
        self.client
            .get_contract_state_borsh(&self.contract_address, key)
            .await
    }

    /// Get storage of another contract and deserialize with borsh.
    pub async fn get_storage_of_borsh<T: BorshDeserialize>(
        &self,
        contract: &Hash,
        key: &[u8],
    ) -> Result<Option<T>, TransactionError> {
        self.client.get_contract_state_borsh(contract, key).await
    }

    /// Get the nonce of an account.
    pub async fn get_nonce(&self, address: &Hash) -> Result<u64, TransactionError> {
        self.client.get_nonce(address).await
    }

    // --- State Override ---

    /// Force-set the balance of an account.
    pub async fn force_set_balance(
        &mut self,
        address: &Hash,
        balance: u64,
    ) -> Result<(), ChainError> {
        self.client.force_set_balance(address, balance).await
    }

    /// Force-set the nonce of an account.
    pub async fn force_set_nonce(&mut self, address: &Hash, nonce: u64) -> Result<(), ChainError> {
        self.client.force_set_nonce(address, nonce).await
    }

    // --- Chain Advancement ---

    /// Mine empty blocks to advance chain state.
    pub async fn mine_blocks(&mut self, count: u64) -> Result<u64, ChainError> {
        self.client.warp_blocks(count).await
    }

    /// Warp to a specific topoheight.
    pub async fn warp_to_topoheight(&mut self, target: u64) -> Result<(), ChainError> {
        self.client.warp_to_topoheight(target).await
    }

    /// Get current topoheight.
    pub fn current_topoheight(&self) -> u64 {
        self.client.current_topoheight()
    }

    // --- Accessors ---

    /// Get the contract address.
    pub fn contract_address(&self) -> &Hash {
        &self.contract_address
    }

    /// Address of the `index`-th contract added with `add_contract`.
    pub fn dependency(&self, index: usize) -> Option<&Hash> {
        self.dependencies.get(index)
    }

    /// Get the contract name.
    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    /// Get the owner address.
    pub fn owner(&self) -> &Hash {
        &self.owner
    }

    /// Get the underlying ChainClient.
    pub fn client(&self) -> &ChainClient {
        &self.client
    }

    /// Get mutable access to the underlying ChainClient.
    pub fn client_mut(&mut self) -> &mut ChainClient {
        &mut self.client
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use savings_common::contract::{decode_args, encode_return, ContractEnvironment, ContractError};

    /// Echo contract: entry 1 returns its input, entry 2 always reverts.
    struct Echo;

    impl Contract for Echo {
        fn name(&self) -> &'static str {
            "Echo"
        }

        fn deploy(&self, env: &mut dyn ContractEnvironment, args: &[u8]) -> Result<(), ContractError> {
            env.storage_write(b"init", args.to_vec())
        }

        fn invoke(
            &self,
            env: &mut dyn ContractEnvironment,
            entry_id: EntryId,
            input: &[u8],
        ) -> Result<Vec<u8>, ContractError> {
            match entry_id {
                1 => {
                    let value: u64 = decode_args(input)?;
                    env.emit_event("Echo", input.to_vec())?;
                    env.log("echo called");
                    encode_return(&value)
                }
                2 => Err(ContractError::revert(0x0999, "nope")),
                other => Err(ContractError::UnknownEntry(other)),
            }
        }
    }

    fn sample_hash(byte: u8) -> Hash {
        Hash::new([byte; 32])
    }

    #[tokio::test]
    async fn test_contract_test_builder() {
        let alice = sample_hash(1);
        let ctx = ContractTest::new("echo", Arc::new(Echo))
            .with_args(vec![7, 7])
            .add_account(alice.clone(), 5_000_000)
            .start()
            .await
            .unwrap();

        assert_eq!(ctx.contract_name(), "echo");
        assert_eq!(ctx.get_balance(&alice).await.unwrap(), 5_000_000);
        assert_eq!(ctx.get_storage(b"init").await.unwrap(), Some(vec![7, 7]));
        assert_eq!(ctx.current_topoheight(), 1);
        assert!(ctx.dependency(0).is_none());
    }

    #[tokio::test]
    async fn test_call_and_inspect() {
        let mut ctx = ContractTest::new("echo", Arc::new(Echo))
            .start()
            .await
            .unwrap();

        ctx.call(1, borsh::to_vec(&42u64).unwrap()).await.unwrap();
        assert!(ctx.last_success());
        assert_eq!(ctx.last_events_by_topic("Echo").len(), 1);
        assert_eq!(ctx.last_log_messages(), &["echo called".to_string()]);
        assert_eq!(ctx.last_result().unwrap().decode_return::<u64>().unwrap(), 42);
        assert!(ctx.last_gas_used() > 0);

        ctx.call(2, vec![]).await.unwrap();
        assert!(!ctx.last_success());
        assert_eq!(ctx.last_revert_reason(), Some("nope"));
        assert!(ctx.last_events().is_empty());
        assert_eq!(ctx.all_results().len(), 2);
    }

    #[tokio::test]
    async fn test_constructor_sees_dependencies() {
        let ctx = ContractTest::new("outer", Arc::new(Echo))
            .add_contract("inner", Arc::new(Echo), vec![1])
            .with_constructor(|deps| deps[0].as_bytes().to_vec())
            .start()
            .await
            .unwrap();

        let inner = ctx.dependency(0).unwrap().clone();
        assert_ne!(&inner, ctx.contract_address());
        assert_eq!(
            ctx.get_storage(b"init").await.unwrap(),
            Some(inner.as_bytes().to_vec())
        );
    }

    #[tokio::test]
    async fn test_query_and_simulate_do_not_commit() {
        let ctx = ContractTest::new("echo", Arc::new(Echo))
            .start()
            .await
            .unwrap();
        let owner = ctx.owner().clone();
        let nonce = ctx.get_nonce(&owner).await.unwrap();

        let value: u64 = ctx.query_as(1, &borsh::to_vec(&9u64).unwrap()).await.unwrap();
        assert_eq!(value, 9);

        let sim = ctx
            .simulate_call_as(&owner, 1, borsh::to_vec(&3u64).unwrap(), 0)
            .await
            .unwrap();
        sim.assert_success();
        assert_eq!(ctx.get_nonce(&owner).await.unwrap(), nonce);
    }

    #[tokio::test]
    async fn test_mine_blocks() {
        let mut ctx = ContractTest::new("echo", Arc::new(Echo))
            .start()
            .await
            .unwrap();
        let before = ctx.current_topoheight();
        ctx.mine_blocks(5).await.unwrap();
        assert_eq!(ctx.current_topoheight(), before + 5);
    }
}
