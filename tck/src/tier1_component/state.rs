//! World state of the test ledger: native accounts and contract storage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use savings_common::contract::{Contract, ContractError};
use savings_common::crypto::{hash, Hash};

/// Account state for testing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    /// Native balance in base units
    pub balance: u64,
    /// Confirmed transactions count
    pub nonce: u64,
}

/// Accounts and contract storage.
///
/// Both maps are BTreeMaps so iteration, and therefore the state root, is
/// deterministic. Contracts hold native coins in `accounts` like any other
/// address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldState {
    pub accounts: BTreeMap<Hash, AccountState>,
    pub storage: BTreeMap<Hash, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl WorldState {
    pub fn balance(&self, address: &Hash) -> u64 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or(0)
    }

    pub fn nonce(&self, address: &Hash) -> u64 {
        self.accounts.get(address).map(|a| a.nonce).unwrap_or(0)
    }

    pub fn credit(&mut self, address: &Hash, amount: u64) -> Result<(), ContractError> {
        let account = self.accounts.entry(address.clone()).or_default();
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        Ok(())
    }

    pub fn debit(&mut self, address: &Hash, amount: u64) -> Result<(), ContractError> {
        let available = self.balance(address);
        if available < amount {
            return Err(ContractError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        if let Some(account) = self.accounts.get_mut(address) {
            account.balance = available - amount;
        }
        Ok(())
    }

    /// Move native coins, leaving both sides untouched on failure
    pub fn transfer(&mut self, from: &Hash, to: &Hash, amount: u64) -> Result<(), ContractError> {
        if amount == 0 || from == to {
            return self.debit(from, 0);
        }
        self.balance(to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    pub fn storage_get(&self, contract: &Hash, key: &[u8]) -> Option<&Vec<u8>> {
        self.storage.get(contract).and_then(|slots| slots.get(key))
    }

    pub fn storage_set(&mut self, contract: &Hash, key: Vec<u8>, value: Vec<u8>) {
        self.storage
            .entry(contract.clone())
            .or_default()
            .insert(key, value);
    }

    /// Returns the removed value, if the slot existed
    pub fn storage_remove(&mut self, contract: &Hash, key: &[u8]) -> Option<Vec<u8>> {
        self.storage
            .get_mut(contract)
            .and_then(|slots| slots.remove(key))
    }

    pub fn total_balance(&self) -> u128 {
        self.accounts.values().map(|a| a.balance as u128).sum()
    }

    /// Deterministic commitment over accounts and storage
    pub fn state_root(&self) -> Hash {
        let mut data = Vec::new();
        for (address, account) in &self.accounts {
            data.extend_from_slice(address.as_bytes());
            data.extend_from_slice(&account.balance.to_le_bytes());
            data.extend_from_slice(&account.nonce.to_le_bytes());
        }
        for (contract, slots) in &self.storage {
            data.extend_from_slice(contract.as_bytes());
            for (key, value) in slots {
                data.extend_from_slice(&(key.len() as u32).to_le_bytes());
                data.extend_from_slice(key);
                data.extend_from_slice(&(value.len() as u32).to_le_bytes());
                data.extend_from_slice(value);
            }
        }
        hash(&data)
    }
}

/// A contract registered on the test ledger
#[derive(Clone)]
pub struct DeployedContract {
    pub code: Arc<dyn Contract>,
    pub deployer: Hash,
    pub deployed_at: u64,
}

impl fmt::Debug for DeployedContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployedContract")
            .field("name", &self.code.name())
            .field("deployer", &self.deployer)
            .field("deployed_at", &self.deployed_at)
            .finish()
    }
}
