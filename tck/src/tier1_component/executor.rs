//! In-process contract executor.
//!
//! Runs one transaction against a private copy of the world state. Every
//! call frame takes a checkpoint first and rolls back to it when the frame
//! fails, so a failed inner call leaves no trace even when its caller
//! chooses to continue. The caller of the executor commits the returned
//! state only when the whole transaction succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;

use savings_common::config::{
    GAS_BASE_TRANSACTION, GAS_EVENT, GAS_EVENT_PER_BYTE, GAS_INNER_CALL, GAS_NATIVE_TRANSFER,
    GAS_STORAGE_CLEAR_REFUND, GAS_STORAGE_DELETE, GAS_STORAGE_READ, GAS_STORAGE_WRITE,
    MAX_CALL_DEPTH, MAX_EVENT_DATA_SIZE,
};
use savings_common::contract::{Contract, ContractEnvironment, ContractError, EntryId};
use savings_common::crypto::Hash;

use super::state::{DeployedContract, WorldState};
use super::transaction::{EmittedEvent, ExecutionError, InnerCallRecord};

static ZERO_HASH: Hash = Hash::zero();

struct Frame {
    contract: Hash,
    caller: Hash,
    value: u64,
}

struct Checkpoint {
    state: WorldState,
    events: usize,
    gas_refund: u64,
}

/// Frame that raised the error currently propagating
struct Fault {
    contract: Hash,
    caller: Option<Hash>,
    depth: u32,
    error: ContractError,
}

/// Result of running one transaction
#[derive(Debug)]
pub struct ExecutionOutput {
    /// Post-execution state, `None` when the transaction failed
    pub state: Option<WorldState>,
    pub result: Result<Vec<u8>, ExecutionError>,
    pub gas_used: u64,
    pub gas_refunded: u64,
    pub events: Vec<EmittedEvent>,
    pub logs: Vec<String>,
    pub inner_calls: Vec<InnerCallRecord>,
}

pub struct ContractExecutor<'a> {
    state: WorldState,
    contracts: &'a BTreeMap<Hash, DeployedContract>,
    frames: Vec<Frame>,
    topoheight: u64,
    gas_limit: u64,
    gas_used: u64,
    gas_refund: u64,
    events: Vec<EmittedEvent>,
    logs: Vec<String>,
    inner_calls: Vec<InnerCallRecord>,
    fault: Option<Fault>,
}

impl<'a> ContractExecutor<'a> {
    pub fn new(
        state: WorldState,
        contracts: &'a BTreeMap<Hash, DeployedContract>,
        topoheight: u64,
        gas_limit: u64,
    ) -> Self {
        Self {
            state,
            contracts,
            frames: Vec::new(),
            topoheight,
            gas_limit,
            gas_used: 0,
            gas_refund: 0,
            events: Vec::new(),
            logs: Vec::new(),
            inner_calls: Vec::new(),
            fault: None,
        }
    }

    /// Invoke `entry_id` on `contract` with `caller` as the transaction sender
    pub fn execute_call(
        mut self,
        caller: &Hash,
        contract: &Hash,
        entry_id: EntryId,
        input: &[u8],
        value: u64,
    ) -> ExecutionOutput {
        let result = self.run_entry(caller, contract, value, |code, env| {
            code.invoke(env, entry_id, input)
        });
        self.finish(result)
    }

    /// Run the constructor of `code` at `address`
    pub fn execute_deploy(
        mut self,
        deployer: &Hash,
        address: &Hash,
        code: Arc<dyn Contract>,
        args: &[u8],
        value: u64,
    ) -> ExecutionOutput {
        let result = self
            .charge_base()
            .and_then(|_| self.enter(deployer, address, &code, value, |code, env| {
                code.deploy(env, args).map(|_| Vec::new())
            }));
        self.finish(result)
    }

    fn run_entry<F>(
        &mut self,
        caller: &Hash,
        contract: &Hash,
        value: u64,
        run: F,
    ) -> Result<Vec<u8>, ExecutionError>
    where
        F: FnOnce(&dyn Contract, &mut dyn ContractEnvironment) -> Result<Vec<u8>, ContractError>,
    {
        self.charge_base()?;
        let code = self
            .contracts
            .get(contract)
            .map(|c| c.code.clone())
            .ok_or_else(|| ExecutionError::ContractNotFound(contract.clone()))?;
        self.enter(caller, contract, &code, value, run)
    }

    fn charge_base(&mut self) -> Result<(), ExecutionError> {
        self.charge_gas(GAS_BASE_TRANSACTION)
            .map_err(|error| ExecutionError::Contract {
                contract: ZERO_HASH.clone(),
                caller: None,
                depth: 0,
                error,
            })
    }

    // Entry frame: value comes from the sender's own balance
    fn enter<F>(
        &mut self,
        caller: &Hash,
        contract: &Hash,
        code: &Arc<dyn Contract>,
        value: u64,
        run: F,
    ) -> Result<Vec<u8>, ExecutionError>
    where
        F: FnOnce(&dyn Contract, &mut dyn ContractEnvironment) -> Result<Vec<u8>, ContractError>,
    {
        if let Err(e) = self.state.transfer(caller, contract, value) {
            return Err(match e {
                ContractError::InsufficientBalance {
                    required,
                    available,
                } => ExecutionError::InsufficientFunds {
                    have: available,
                    need: required,
                },
                _ => ExecutionError::Overflow("call value"),
            });
        }

        self.run_frame(code.as_ref(), caller, contract, value, run)
            .map_err(|error| self.attribute(contract, error))
    }

    fn run_frame<F>(
        &mut self,
        code: &dyn Contract,
        caller: &Hash,
        contract: &Hash,
        value: u64,
        run: F,
    ) -> Result<Vec<u8>, ContractError>
    where
        F: FnOnce(&dyn Contract, &mut dyn ContractEnvironment) -> Result<Vec<u8>, ContractError>,
    {
        self.frames.push(Frame {
            contract: contract.clone(),
            caller: caller.clone(),
            value,
        });
        let result = run(code, self);
        self.frames.pop();

        match &result {
            // A frame that returns Ok swallowed whatever failed below it
            Ok(_) => self.fault = None,
            Err(error) if self.fault.is_none() => {
                self.fault = Some(Fault {
                    contract: contract.clone(),
                    caller: self.frames.last().map(|f| f.contract.clone()),
                    depth: (self.frames.len() + 1) as u32,
                    error: error.clone(),
                });
            }
            Err(_) => {}
        }
        result
    }

    // Blame the innermost frame that raised this exact error
    fn attribute(&mut self, entry: &Hash, error: ContractError) -> ExecutionError {
        match self.fault.take() {
            Some(fault) if fault.error == error => ExecutionError::Contract {
                contract: fault.contract,
                caller: fault.caller,
                depth: fault.depth,
                error,
            },
            _ => ExecutionError::Contract {
                contract: entry.clone(),
                caller: None,
                depth: 1,
                error,
            },
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.clone(),
            events: self.events.len(),
            gas_refund: self.gas_refund,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.state = checkpoint.state;
        self.events.truncate(checkpoint.events);
        self.gas_refund = checkpoint.gas_refund;
    }

    fn current_contract(&self) -> Result<Hash, ContractError> {
        self.frames
            .last()
            .map(|f| f.contract.clone())
            .ok_or_else(|| ContractError::InvalidInput("no active call frame".to_string()))
    }

    fn finish(self, result: Result<Vec<u8>, ExecutionError>) -> ExecutionOutput {
        // Refunds are capped at a fifth of the gas used
        let gas_refunded = self.gas_refund.min(self.gas_used / 5);
        match result {
            Ok(data) => ExecutionOutput {
                state: Some(self.state),
                result: Ok(data),
                gas_used: self.gas_used,
                gas_refunded,
                events: self.events,
                logs: self.logs,
                inner_calls: self.inner_calls,
            },
            Err(e) => {
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("Execution failed after {} gas: {}", self.gas_used, e);
                }
                ExecutionOutput {
                    state: None,
                    result: Err(e),
                    gas_used: self.gas_used,
                    gas_refunded: 0,
                    events: Vec::new(),
                    logs: self.logs,
                    inner_calls: self.inner_calls,
                }
            }
        }
    }
}

impl ContractEnvironment for ContractExecutor<'_> {
    fn caller(&self) -> &Hash {
        self.frames.last().map(|f| &f.caller).unwrap_or(&ZERO_HASH)
    }

    fn self_address(&self) -> &Hash {
        self.frames.last().map(|f| &f.contract).unwrap_or(&ZERO_HASH)
    }

    fn call_value(&self) -> u64 {
        self.frames.last().map(|f| f.value).unwrap_or(0)
    }

    fn topoheight(&self) -> u64 {
        self.topoheight
    }

    fn storage_read(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, ContractError> {
        self.charge_gas(GAS_STORAGE_READ)?;
        let contract = self.current_contract()?;
        Ok(self.state.storage_get(&contract, key).cloned())
    }

    fn storage_write(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), ContractError> {
        self.charge_gas(GAS_STORAGE_WRITE)?;
        let contract = self.current_contract()?;
        self.state.storage_set(&contract, key.to_vec(), value);
        Ok(())
    }

    fn storage_delete(&mut self, key: &[u8]) -> Result<(), ContractError> {
        self.charge_gas(GAS_STORAGE_DELETE)?;
        let contract = self.current_contract()?;
        if self.state.storage_remove(&contract, key).is_some() {
            self.gas_refund = self.gas_refund.saturating_add(GAS_STORAGE_CLEAR_REFUND);
        }
        Ok(())
    }

    fn native_balance_of(&mut self, account: &Hash) -> Result<u64, ContractError> {
        self.charge_gas(GAS_STORAGE_READ)?;
        Ok(self.state.balance(account))
    }

    fn transfer_native(&mut self, to: &Hash, amount: u64) -> Result<(), ContractError> {
        self.charge_gas(GAS_NATIVE_TRANSFER)?;
        let contract = self.current_contract()?;
        self.state.transfer(&contract, to, amount)
    }

    fn call_contract(
        &mut self,
        contract: &Hash,
        entry_id: EntryId,
        input: &[u8],
        value: u64,
    ) -> Result<Vec<u8>, ContractError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ContractError::CallDepthExceeded(MAX_CALL_DEPTH));
        }
        self.charge_gas(GAS_INNER_CALL)?;

        let code = self
            .contracts
            .get(contract)
            .map(|c| c.code.clone())
            .ok_or_else(|| ContractError::ContractNotFound(contract.clone()))?;
        let caller = self.current_contract()?;
        let depth = (self.frames.len() + 1) as u32;
        let gas_before = self.gas_used;
        let checkpoint = self.checkpoint();

        let result = match self.state.transfer(&caller, contract, value) {
            Ok(()) => self.run_frame(code.as_ref(), &caller, contract, value, |code, env| {
                code.invoke(env, entry_id, input)
            }),
            Err(e) => Err(e),
        };

        let events = match &result {
            Ok(_) => self.events[checkpoint.events..].to_vec(),
            Err(e) => {
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!(
                        "Inner call {} -> {} (entry {}) failed: {}",
                        caller,
                        contract,
                        entry_id,
                        e
                    );
                }
                self.restore(checkpoint);
                Vec::new()
            }
        };

        self.inner_calls.push(InnerCallRecord {
            caller,
            callee: contract.clone(),
            entry_id,
            input: input.to_vec(),
            value,
            gas_used: self.gas_used.saturating_sub(gas_before),
            success: result.is_ok(),
            depth,
            return_data: result.as_ref().cloned().unwrap_or_default(),
            events,
        });

        result
    }

    fn emit_event(&mut self, topic: &str, data: Vec<u8>) -> Result<(), ContractError> {
        if data.len() > MAX_EVENT_DATA_SIZE {
            return Err(ContractError::EventTooLarge {
                size: data.len(),
                max: MAX_EVENT_DATA_SIZE,
            });
        }
        let cost = GAS_EVENT.saturating_add(GAS_EVENT_PER_BYTE.saturating_mul(data.len() as u64));
        self.charge_gas(cost)?;

        let contract = self.current_contract()?;
        self.events.push(EmittedEvent {
            contract,
            topic: topic.to_string(),
            data,
        });
        Ok(())
    }

    fn log(&mut self, message: &str) {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("[{}] {}", self.self_address(), message);
        }
        self.logs.push(message.to_string());
    }

    fn charge_gas(&mut self, amount: u64) -> Result<(), ContractError> {
        let required = self.gas_used.saturating_add(amount);
        if required > self.gas_limit {
            self.gas_used = self.gas_limit;
            return Err(ContractError::OutOfGas {
                limit: self.gas_limit,
                required,
            });
        }
        self.gas_used = required;
        Ok(())
    }
}
