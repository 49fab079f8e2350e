//! SaveErc20OrNative: savings vault for one ERC20-style token and the
//! native coin.
//!
//! Each depositor has two independent ledger entries. Token deposits pull
//! funds with the token's `transfer_from`, so the depositor must approve
//! the vault first. Native deposits use the value attached to the call.
//!
//! # Entry points
//!
//! - 0x01: TokenDeposit - `u64`
//! - 0x02: TokenWithdraw - `u64`
//! - 0x03: NativeDeposit - `()` (payable)
//! - 0x04: NativeWithdraw - `u64`
//! - 0x05: NativeWithdrawAll - `()`
//! - 0x10: TokenSavingsOf - `Hash` -> `u64` (query)
//! - 0x11: NativeSavingsOf - `Hash` -> `u64` (query)
//! - 0x12: TokenContractBalance - `()` -> `u64` (query)
//! - 0x13: NativeContractBalance - `()` -> `u64` (query)
//! - 0x14: TokenAddress - `()` -> `Hash` (query)
//! - 0x15: TotalTokenSavings - `()` -> `u64` (query)
//! - 0x16: TotalNativeSavings - `()` -> `u64` (query)
//!
//! # Storage Layout
//!
//! - `token` - [0x01] -> [u8; 32]
//! - `total_token_savings` - [0x02] -> u64
//! - `total_native_savings` - [0x03] -> u64
//! - `token_savings:{address}` - [0x10 | address] -> u64
//! - `native_savings:{address}` - [0x11 | address] -> u64

mod error;
mod event;

use borsh::{BorshDeserialize, BorshSerialize};
use savings_common::{
    config::NATIVE_ASSET,
    contract::{
        account_key, decode_args, encode_return, read_u64, write_u64, Contract,
        ContractEnvironment, ContractError, EntryId,
    },
    crypto::{Hash, HASH_SIZE},
};
use vickish_token::{
    AllowanceArgs, TransferArgs, TransferFromArgs, OP_ALLOWANCE, OP_BALANCE_OF, OP_TRANSFER,
    OP_TRANSFER_FROM,
};

pub use error::*;
pub use event::*;

pub const CONTRACT_NAME: &str = "SaveErc20OrNative";

const KEY_TOKEN: u8 = 0x01;
const KEY_TOTAL_TOKEN_SAVINGS: u8 = 0x02;
const KEY_TOTAL_NATIVE_SAVINGS: u8 = 0x03;
pub const KEY_TOKEN_SAVINGS_PREFIX: u8 = 0x10;
pub const KEY_NATIVE_SAVINGS_PREFIX: u8 = 0x11;

pub const OP_TOKEN_DEPOSIT: EntryId = 0x01;
pub const OP_TOKEN_WITHDRAW: EntryId = 0x02;
pub const OP_NATIVE_DEPOSIT: EntryId = 0x03;
pub const OP_NATIVE_WITHDRAW: EntryId = 0x04;
pub const OP_NATIVE_WITHDRAW_ALL: EntryId = 0x05;
pub const OP_TOKEN_SAVINGS_OF: EntryId = 0x10;
pub const OP_NATIVE_SAVINGS_OF: EntryId = 0x11;
pub const OP_TOKEN_CONTRACT_BALANCE: EntryId = 0x12;
pub const OP_NATIVE_CONTRACT_BALANCE: EntryId = 0x13;
pub const OP_TOKEN_ADDRESS: EntryId = 0x14;
pub const OP_TOTAL_TOKEN_SAVINGS: EntryId = 0x15;
pub const OP_TOTAL_NATIVE_SAVINGS: EntryId = 0x16;

/// Constructor arguments
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SavingsInit {
    pub token: Hash,
}

/// Which ledger an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ledger {
    Token,
    Native,
}

impl Ledger {
    fn key(self, account: &Hash) -> Vec<u8> {
        match self {
            Self::Token => account_key(KEY_TOKEN_SAVINGS_PREFIX, account),
            Self::Native => account_key(KEY_NATIVE_SAVINGS_PREFIX, account),
        }
    }

    fn total_key(self) -> [u8; 1] {
        match self {
            Self::Token => [KEY_TOTAL_TOKEN_SAVINGS],
            Self::Native => [KEY_TOTAL_NATIVE_SAVINGS],
        }
    }
}

pub fn token_savings_key(account: &Hash) -> Vec<u8> {
    Ledger::Token.key(account)
}

pub fn native_savings_key(account: &Hash) -> Vec<u8> {
    Ledger::Native.key(account)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SaveErc20OrNative;

impl SaveErc20OrNative {
    fn token(env: &mut dyn ContractEnvironment) -> Result<Hash, ContractError> {
        let bytes = env
            .storage_read(&[KEY_TOKEN])?
            .ok_or(SavingsError::InvalidToken)?;
        let bytes: [u8; HASH_SIZE] = bytes
            .try_into()
            .map_err(|_| SavingsError::InvalidToken)?;
        Ok(Hash::new(bytes))
    }

    fn savings_of(
        env: &mut dyn ContractEnvironment,
        ledger: Ledger,
        account: &Hash,
    ) -> Result<u64, ContractError> {
        read_u64(env, &ledger.key(account))
    }

    fn credit(
        env: &mut dyn ContractEnvironment,
        ledger: Ledger,
        account: &Hash,
        amount: u64,
    ) -> Result<(), ContractError> {
        let balance = Self::savings_of(env, ledger, account)?;
        let new_balance = balance.checked_add(amount).ok_or(SavingsError::Overflow)?;
        let total = read_u64(env, &ledger.total_key())?;
        let new_total = total.checked_add(amount).ok_or(SavingsError::Overflow)?;

        write_u64(env, &ledger.key(account), new_balance)?;
        write_u64(env, &ledger.total_key(), new_total)
    }

    // Guards run in order: zero amount, empty ledger, then insufficient balance
    fn debit(
        env: &mut dyn ContractEnvironment,
        ledger: Ledger,
        account: &Hash,
        amount: u64,
    ) -> Result<(), ContractError> {
        if amount == 0 {
            return Err(SavingsError::ZeroAmount {
                action: SavingsAction::Withdraw,
            }
            .into());
        }

        let balance = Self::savings_of(env, ledger, account)?;
        if balance == 0 {
            return Err(SavingsError::NoFunds.into());
        }
        if amount > balance {
            return Err(SavingsError::InsufficientFunds {
                balance,
                requested: amount,
            }
            .into());
        }

        let total = read_u64(env, &ledger.total_key())?;
        write_u64(env, &ledger.key(account), balance - amount)?;
        write_u64(env, &ledger.total_key(), total.saturating_sub(amount))
    }

    fn emit(
        env: &mut dyn ContractEnvironment,
        topic: &str,
        account: Hash,
        asset: Hash,
        amount: u64,
    ) -> Result<(), ContractError> {
        let event = SavingsEvent {
            account,
            asset,
            amount,
        };
        env.emit_event(topic, encode_return(&event)?)
    }

    fn token_deposit(env: &mut dyn ContractEnvironment, amount: u64) -> Result<(), ContractError> {
        if amount == 0 {
            return Err(SavingsError::ZeroAmount {
                action: SavingsAction::Deposit,
            }
            .into());
        }

        let caller = env.caller().clone();
        let this = env.self_address().clone();
        let token = Self::token(env)?;

        let allowance_args = AllowanceArgs {
            owner: caller.clone(),
            spender: this.clone(),
        };
        let raw = env.call_contract(&token, OP_ALLOWANCE, &encode_return(&allowance_args)?, 0)?;
        let allowance: u64 = decode_args(&raw)?;
        if allowance < amount {
            env.log("Savings: deposit exceeds allowance");
            return Err(SavingsError::InsufficientAuthorization {
                allowance,
                requested: amount,
            }
            .into());
        }

        let pull = TransferFromArgs {
            from: caller.clone(),
            to: this,
            amount,
        };
        env.call_contract(&token, OP_TRANSFER_FROM, &encode_return(&pull)?, 0)?;

        Self::credit(env, Ledger::Token, &caller, amount)?;
        Self::emit(env, TOPIC_DEPOSIT, caller, token, amount)
    }

    fn token_withdraw(env: &mut dyn ContractEnvironment, amount: u64) -> Result<(), ContractError> {
        let caller = env.caller().clone();
        Self::debit(env, Ledger::Token, &caller, amount)?;

        let token = Self::token(env)?;
        let payout = TransferArgs {
            to: caller.clone(),
            amount,
        };
        env.call_contract(&token, OP_TRANSFER, &encode_return(&payout)?, 0)?;

        Self::emit(env, TOPIC_WITHDRAW, caller, token, amount)
    }

    // The host credits the attached value to this contract before dispatch
    fn native_deposit(env: &mut dyn ContractEnvironment) -> Result<(), ContractError> {
        let amount = env.call_value();
        if amount == 0 {
            return Err(SavingsError::ZeroAmount {
                action: SavingsAction::Deposit,
            }
            .into());
        }

        let caller = env.caller().clone();
        Self::credit(env, Ledger::Native, &caller, amount)?;
        Self::emit(env, TOPIC_DEPOSIT, caller, NATIVE_ASSET, amount)
    }

    fn native_withdraw(env: &mut dyn ContractEnvironment, amount: u64) -> Result<(), ContractError> {
        let caller = env.caller().clone();
        Self::debit(env, Ledger::Native, &caller, amount)?;
        env.transfer_native(&caller, amount)?;
        Self::emit(env, TOPIC_WITHDRAW, caller, NATIVE_ASSET, amount)
    }

    fn native_withdraw_all(env: &mut dyn ContractEnvironment) -> Result<(), ContractError> {
        let caller = env.caller().clone();
        let balance = Self::savings_of(env, Ledger::Native, &caller)?;
        if balance == 0 {
            return Err(SavingsError::NoFunds.into());
        }
        Self::native_withdraw(env, balance)
    }

    fn token_contract_balance(env: &mut dyn ContractEnvironment) -> Result<u64, ContractError> {
        let token = Self::token(env)?;
        let this = env.self_address().clone();
        let raw = env.call_contract(&token, OP_BALANCE_OF, &encode_return(&this)?, 0)?;
        decode_args(&raw)
    }

    fn ensure_non_payable(env: &dyn ContractEnvironment) -> Result<(), ContractError> {
        if env.call_value() > 0 {
            return Err(SavingsError::NonPayable.into());
        }
        Ok(())
    }
}

impl Contract for SaveErc20OrNative {
    fn name(&self) -> &'static str {
        CONTRACT_NAME
    }

    fn deploy(&self, env: &mut dyn ContractEnvironment, args: &[u8]) -> Result<(), ContractError> {
        let init: SavingsInit = decode_args(args)?;
        if init.token.is_zero() {
            return Err(SavingsError::InvalidToken.into());
        }
        env.storage_write(&[KEY_TOKEN], init.token.as_bytes().to_vec())?;
        env.log("Savings: Initialized");
        Ok(())
    }

    fn invoke(
        &self,
        env: &mut dyn ContractEnvironment,
        entry_id: EntryId,
        input: &[u8],
    ) -> Result<Vec<u8>, ContractError> {
        if entry_id != OP_NATIVE_DEPOSIT {
            Self::ensure_non_payable(env)?;
        }

        match entry_id {
            OP_TOKEN_DEPOSIT => {
                Self::token_deposit(env, decode_args(input)?)?;
                Ok(Vec::new())
            }
            OP_TOKEN_WITHDRAW => {
                Self::token_withdraw(env, decode_args(input)?)?;
                Ok(Vec::new())
            }
            OP_NATIVE_DEPOSIT => {
                Self::native_deposit(env)?;
                Ok(Vec::new())
            }
            OP_NATIVE_WITHDRAW => {
                Self::native_withdraw(env, decode_args(input)?)?;
                Ok(Vec::new())
            }
            OP_NATIVE_WITHDRAW_ALL => {
                Self::native_withdraw_all(env)?;
                Ok(Vec::new())
            }
            OP_TOKEN_SAVINGS_OF => {
                let account: Hash = decode_args(input)?;
                encode_return(&Self::savings_of(env, Ledger::Token, &account)?)
            }
            OP_NATIVE_SAVINGS_OF => {
                let account: Hash = decode_args(input)?;
                encode_return(&Self::savings_of(env, Ledger::Native, &account)?)
            }
            OP_TOKEN_CONTRACT_BALANCE => encode_return(&Self::token_contract_balance(env)?),
            OP_NATIVE_CONTRACT_BALANCE => {
                let this = env.self_address().clone();
                encode_return(&env.native_balance_of(&this)?)
            }
            OP_TOKEN_ADDRESS => encode_return(&Self::token(env)?),
            OP_TOTAL_TOKEN_SAVINGS => encode_return(&read_u64(env, &[KEY_TOTAL_TOKEN_SAVINGS])?),
            OP_TOTAL_NATIVE_SAVINGS => encode_return(&read_u64(env, &[KEY_TOTAL_NATIVE_SAVINGS])?),
            other => Err(ContractError::UnknownEntry(other)),
        }
    }
}
