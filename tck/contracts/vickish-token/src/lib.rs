//! VickishToken: ERC20-style fungible token
//!
//! The full initial supply is minted to the deployer. Holders move tokens
//! with `transfer`, or authorize a spender with `approve` and let it pull
//! funds with `transfer_from`.
//!
//! # Entry points
//!
//! Arguments and return values are borsh-encoded.
//!
//! - 0x01: Transfer - `TransferArgs`
//! - 0x02: Approve - `ApproveArgs`
//! - 0x03: TransferFrom - `TransferFromArgs`
//! - 0x10: BalanceOf - `Hash` -> `u64` (query)
//! - 0x11: Allowance - `AllowanceArgs` -> `u64` (query)
//! - 0x12: TotalSupply - `()` -> `u64` (query)
//! - 0x13: Name - `()` -> `String` (query)
//! - 0x14: Symbol - `()` -> `String` (query)
//! - 0x15: Decimals - `()` -> `u8` (query)
//!
//! # Storage Layout
//!
//! - `total_supply` - [0x02] -> u64
//! - `name` - [0x03] -> String
//! - `symbol` - [0x04] -> String
//! - `decimals` - [0x05] -> u8
//! - `balance:{address}` - [0x10 | address] -> u64
//! - `allowance:{owner}:{spender}` - [0x20 | owner | spender] -> u64

mod error;
mod event;

use borsh::{BorshDeserialize, BorshSerialize};
use savings_common::{
    contract::{
        account_key, decode_args, encode_return, pair_key, read_u64, write_u64, Contract,
        ContractEnvironment, ContractError, EntryId,
    },
    crypto::Hash,
};

pub use error::*;
pub use event::*;

pub const TOKEN_NAME: &str = "VickishToken";
pub const TOKEN_SYMBOL: &str = "VKT";
pub const TOKEN_DECIMALS: u8 = 8;

const MAX_NAME_LENGTH: usize = 32;
const MAX_SYMBOL_LENGTH: usize = 8;

/// Storage key prefixes
const KEY_TOTAL_SUPPLY: u8 = 0x02;
const KEY_NAME: u8 = 0x03;
const KEY_SYMBOL: u8 = 0x04;
const KEY_DECIMALS: u8 = 0x05;
pub const KEY_BALANCE_PREFIX: u8 = 0x10;
pub const KEY_ALLOWANCE_PREFIX: u8 = 0x20;

/// Entry points
pub const OP_TRANSFER: EntryId = 0x01;
pub const OP_APPROVE: EntryId = 0x02;
pub const OP_TRANSFER_FROM: EntryId = 0x03;
pub const OP_BALANCE_OF: EntryId = 0x10;
pub const OP_ALLOWANCE: EntryId = 0x11;
pub const OP_TOTAL_SUPPLY: EntryId = 0x12;
pub const OP_NAME: EntryId = 0x13;
pub const OP_SYMBOL: EntryId = 0x14;
pub const OP_DECIMALS: EntryId = 0x15;

/// Constructor arguments
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TokenInit {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub initial_supply: u64,
}

impl TokenInit {
    pub fn vickish(initial_supply: u64) -> Self {
        Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
            initial_supply,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransferArgs {
    pub to: Hash,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ApproveArgs {
    pub spender: Hash,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransferFromArgs {
    pub from: Hash,
    pub to: Hash,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AllowanceArgs {
    pub owner: Hash,
    pub spender: Hash,
}

pub fn balance_key(account: &Hash) -> Vec<u8> {
    account_key(KEY_BALANCE_PREFIX, account)
}

pub fn allowance_key(owner: &Hash, spender: &Hash) -> Vec<u8> {
    pair_key(KEY_ALLOWANCE_PREFIX, owner, spender)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VickishToken;

impl VickishToken {
    fn balance_of(env: &mut dyn ContractEnvironment, account: &Hash) -> Result<u64, ContractError> {
        read_u64(env, &balance_key(account))
    }

    fn allowance(
        env: &mut dyn ContractEnvironment,
        owner: &Hash,
        spender: &Hash,
    ) -> Result<u64, ContractError> {
        read_u64(env, &allowance_key(owner, spender))
    }

    fn approve(
        env: &mut dyn ContractEnvironment,
        owner: &Hash,
        spender: &Hash,
        amount: u64,
    ) -> Result<(), ContractError> {
        if spender.is_zero() {
            return Err(TokenError::InvalidSpender.into());
        }

        write_u64(env, &allowance_key(owner, spender), amount)?;
        let event = ApprovalEvent {
            owner: owner.clone(),
            spender: spender.clone(),
            amount,
        };
        env.emit_event(TOPIC_APPROVAL, encode_return(&event)?)
    }

    // Every spend decrements the allowance, including u64::MAX
    fn spend_allowance(
        env: &mut dyn ContractEnvironment,
        owner: &Hash,
        spender: &Hash,
        amount: u64,
    ) -> Result<(), ContractError> {
        let current = Self::allowance(env, owner, spender)?;
        if current < amount {
            env.log("ERC20: Insufficient allowance");
            return Err(TokenError::InsufficientAllowance {
                allowance: current,
                needed: amount,
            }
            .into());
        }

        write_u64(env, &allowance_key(owner, spender), current - amount)
    }

    fn transfer(
        env: &mut dyn ContractEnvironment,
        from: &Hash,
        to: &Hash,
        amount: u64,
    ) -> Result<(), ContractError> {
        if from.is_zero() {
            return Err(TokenError::InvalidSender.into());
        }
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver.into());
        }

        let from_balance = Self::balance_of(env, from)?;
        if from_balance < amount {
            env.log("ERC20: Insufficient balance");
            return Err(TokenError::InsufficientBalance {
                balance: from_balance,
                needed: amount,
            }
            .into());
        }

        write_u64(env, &balance_key(from), from_balance - amount)?;
        // Read after the debit so a self-transfer nets to zero
        let to_balance = Self::balance_of(env, to)?;
        let new_to_balance = to_balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        write_u64(env, &balance_key(to), new_to_balance)?;

        let event = TransferEvent {
            from: from.clone(),
            to: to.clone(),
            amount,
        };
        env.emit_event(TOPIC_TRANSFER, encode_return(&event)?)
    }

    fn read_string(env: &mut dyn ContractEnvironment, key: u8) -> Result<String, ContractError> {
        match env.storage_read(&[key])? {
            Some(bytes) => String::from_utf8(bytes)
                .map_err(|e| ContractError::InvalidInput(e.to_string())),
            None => Ok(String::new()),
        }
    }
}

impl Contract for VickishToken {
    fn name(&self) -> &'static str {
        TOKEN_NAME
    }

    fn deploy(&self, env: &mut dyn ContractEnvironment, args: &[u8]) -> Result<(), ContractError> {
        let init: TokenInit = decode_args(args)?;
        if init.name.is_empty() || init.name.len() > MAX_NAME_LENGTH {
            return Err(TokenError::InvalidMetadata("name").into());
        }
        if init.symbol.is_empty() || init.symbol.len() > MAX_SYMBOL_LENGTH {
            return Err(TokenError::InvalidMetadata("symbol").into());
        }

        env.storage_write(&[KEY_NAME], init.name.into_bytes())?;
        env.storage_write(&[KEY_SYMBOL], init.symbol.into_bytes())?;
        env.storage_write(&[KEY_DECIMALS], vec![init.decimals])?;
        write_u64(env, &[KEY_TOTAL_SUPPLY], init.initial_supply)?;

        // Mint initial supply to the deployer
        if init.initial_supply > 0 {
            let owner = env.caller().clone();
            write_u64(env, &balance_key(&owner), init.initial_supply)?;
            let event = TransferEvent {
                from: Hash::zero(),
                to: owner,
                amount: init.initial_supply,
            };
            env.emit_event(TOPIC_TRANSFER, encode_return(&event)?)?;
        }

        env.log("ERC20: Initialized successfully");
        Ok(())
    }

    fn invoke(
        &self,
        env: &mut dyn ContractEnvironment,
        entry_id: EntryId,
        input: &[u8],
    ) -> Result<Vec<u8>, ContractError> {
        match entry_id {
            OP_TRANSFER => {
                let args: TransferArgs = decode_args(input)?;
                let from = env.caller().clone();
                Self::transfer(env, &from, &args.to, args.amount)?;
                Ok(Vec::new())
            }
            OP_APPROVE => {
                let args: ApproveArgs = decode_args(input)?;
                let owner = env.caller().clone();
                Self::approve(env, &owner, &args.spender, args.amount)?;
                Ok(Vec::new())
            }
            OP_TRANSFER_FROM => {
                let args: TransferFromArgs = decode_args(input)?;
                let spender = env.caller().clone();
                Self::spend_allowance(env, &args.from, &spender, args.amount)?;
                Self::transfer(env, &args.from, &args.to, args.amount)?;
                Ok(Vec::new())
            }
            OP_BALANCE_OF => {
                let account: Hash = decode_args(input)?;
                encode_return(&Self::balance_of(env, &account)?)
            }
            OP_ALLOWANCE => {
                let args: AllowanceArgs = decode_args(input)?;
                encode_return(&Self::allowance(env, &args.owner, &args.spender)?)
            }
            OP_TOTAL_SUPPLY => encode_return(&read_u64(env, &[KEY_TOTAL_SUPPLY])?),
            OP_NAME => encode_return(&Self::read_string(env, KEY_NAME)?),
            OP_SYMBOL => encode_return(&Self::read_string(env, KEY_SYMBOL)?),
            OP_DECIMALS => {
                let decimals = env
                    .storage_read(&[KEY_DECIMALS])?
                    .and_then(|bytes| bytes.first().copied())
                    .unwrap_or_default();
                encode_return(&decimals)
            }
            other => Err(ContractError::UnknownEntry(other)),
        }
    }
}
