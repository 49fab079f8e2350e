//! Savings fixture: a token and a savings vault deployed side by side.
//!
//! [`SavingsFixture::deploy`] sets up the environment every savings test
//! starts from:
//!
//! 1. `owner` deploys `VickishToken` and receives the whole supply
//! 2. `owner` deploys `SaveErc20OrNative` pointing at that token
//! 3. `owner` and `other_account` both start with native coins
//!
//! ```rust,ignore
//! let mut fx = SavingsFixture::deploy().await?;
//! fx.approve(&fx.owner(), 100).await?.assert_success();
//! fx.token_deposit(&fx.owner(), 50).await?.assert_success();
//! assert_eq!(fx.token_contract_balance().await?, 50);
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use borsh::BorshSerialize;
use save_erc20_or_native::{
    SaveErc20OrNative, SavingsInit, CONTRACT_NAME, OP_NATIVE_CONTRACT_BALANCE, OP_NATIVE_DEPOSIT,
    OP_NATIVE_SAVINGS_OF, OP_NATIVE_WITHDRAW, OP_NATIVE_WITHDRAW_ALL, OP_TOKEN_ADDRESS,
    OP_TOKEN_CONTRACT_BALANCE, OP_TOKEN_DEPOSIT, OP_TOKEN_SAVINGS_OF, OP_TOKEN_WITHDRAW,
};
use savings_common::config::COIN_VALUE;
use savings_common::contract::EntryId;
use savings_common::crypto::{hash, Hash};
use vickish_token::{
    AllowanceArgs, ApproveArgs, TokenInit, TransferArgs, VickishToken, OP_ALLOWANCE,
    OP_APPROVE, OP_BALANCE_OF, OP_TOTAL_SUPPLY, OP_TRANSFER, TOKEN_NAME,
};

use crate::invariants;
use crate::orchestrator::Clock;
use crate::tier1_5::{ContractTest, ContractTestContext, TxResult};

/// Token supply minted to the owner at deployment
pub const DEFAULT_TOKEN_SUPPLY: u64 = 1_000_000 * COIN_VALUE;

/// Native balance of each funded account
pub const DEFAULT_NATIVE_BALANCE: u64 = 10_000 * COIN_VALUE;

/// Options for [`SavingsFixture`]
#[derive(Debug, Clone)]
pub struct SavingsFixtureConfig {
    pub token_supply: u64,
    pub owner_balance: u64,
    pub other_balance: u64,
    /// Extra funded accounts, created after `other_account`
    pub extra_accounts: Vec<(Hash, u64)>,
}

impl Default for SavingsFixtureConfig {
    fn default() -> Self {
        Self {
            token_supply: DEFAULT_TOKEN_SUPPLY,
            owner_balance: DEFAULT_NATIVE_BALANCE,
            other_balance: DEFAULT_NATIVE_BALANCE,
            extra_accounts: Vec::new(),
        }
    }
}

/// Deployed token + savings vault with two funded accounts.
pub struct SavingsFixture {
    ctx: ContractTestContext,
    token: Hash,
    owner: Hash,
    other_account: Hash,
}

/// Well-known address of the fixture owner
pub fn owner_address() -> Hash {
    hash(b"savings-fixture:owner")
}

/// Well-known address of the second fixture account
pub fn other_account_address() -> Hash {
    hash(b"savings-fixture:other_account")
}

fn encode<T: BorshSerialize>(value: &T) -> Result<Vec<u8>> {
    borsh::to_vec(value).context("borsh encoding failed")
}

impl SavingsFixture {
    /// Deploy with the default supply and balances.
    pub async fn deploy() -> Result<Self> {
        Self::deploy_with(SavingsFixtureConfig::default(), None).await
    }

    /// Deploy with custom amounts and an optional clock.
    pub async fn deploy_with(
        config: SavingsFixtureConfig,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self> {
        let owner = owner_address();
        let other_account = other_account_address();
        let token_args = encode(&TokenInit::vickish(config.token_supply))?;

        let mut builder = ContractTest::new(CONTRACT_NAME, Arc::new(SaveErc20OrNative))
            .with_owner(owner.clone(), config.owner_balance)
            .add_account(other_account.clone(), config.other_balance)
            .add_contract(TOKEN_NAME, Arc::new(VickishToken), token_args)
            .with_constructor(|dependencies| {
                // An empty payload makes the constructor fail, which start()
                // reports as a failed deployment
                dependencies
                    .first()
                    .and_then(|token| {
                        borsh::to_vec(&SavingsInit {
                            token: token.clone(),
                        })
                        .ok()
                    })
                    .unwrap_or_default()
            });
        for (address, balance) in config.extra_accounts {
            builder = builder.add_account(address, balance);
        }
        if let Some(clock) = clock {
            builder = builder.with_clock(clock);
        }

        let ctx = builder
            .start()
            .await
            .context("failed to deploy savings fixture")?;
        let token = ctx
            .dependency(0)
            .cloned()
            .context("token dependency missing after deployment")?;

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "SavingsFixture: token {} savings {} owner {}",
                token,
                ctx.contract_address(),
                owner
            );
        }

        Ok(Self {
            ctx,
            token,
            owner,
            other_account,
        })
    }

    pub fn owner(&self) -> Hash {
        self.owner.clone()
    }

    pub fn other_account(&self) -> Hash {
        self.other_account.clone()
    }

    pub fn token(&self) -> &Hash {
        &self.token
    }

    pub fn savings(&self) -> &Hash {
        self.ctx.contract_address()
    }

    pub fn context(&self) -> &ContractTestContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ContractTestContext {
        &mut self.ctx
    }

    // --- Token calls ---

    /// `from` approves the savings vault to spend `amount` tokens.
    pub async fn approve(&mut self, from: &Hash, amount: u64) -> Result<TxResult> {
        let args = encode(&ApproveArgs {
            spender: self.savings().clone(),
            amount,
        })?;
        self.call_token(from, OP_APPROVE, args).await
    }

    pub async fn transfer_tokens(&mut self, from: &Hash, to: &Hash, amount: u64) -> Result<TxResult> {
        let args = encode(&TransferArgs {
            to: to.clone(),
            amount,
        })?;
        self.call_token(from, OP_TRANSFER, args).await
    }

    // --- Savings calls ---

    pub async fn token_deposit(&mut self, from: &Hash, amount: u64) -> Result<TxResult> {
        self.call_savings(from, OP_TOKEN_DEPOSIT, encode(&amount)?, 0)
            .await
    }

    pub async fn token_withdraw(&mut self, from: &Hash, amount: u64) -> Result<TxResult> {
        self.call_savings(from, OP_TOKEN_WITHDRAW, encode(&amount)?, 0)
            .await
    }

    /// Deposit `value` native units, attached to the call.
    pub async fn native_deposit(&mut self, from: &Hash, value: u64) -> Result<TxResult> {
        self.call_savings(from, OP_NATIVE_DEPOSIT, Vec::new(), value)
            .await
    }

    pub async fn native_withdraw(&mut self, from: &Hash, amount: u64) -> Result<TxResult> {
        self.call_savings(from, OP_NATIVE_WITHDRAW, encode(&amount)?, 0)
            .await
    }

    pub async fn native_withdraw_all(&mut self, from: &Hash) -> Result<TxResult> {
        self.call_savings(from, OP_NATIVE_WITHDRAW_ALL, Vec::new(), 0)
            .await
    }

    // --- Queries ---

    pub async fn token_balance_of(&self, account: &Hash) -> Result<u64> {
        self.query_token(OP_BALANCE_OF, encode(account)?).await
    }

    /// Allowance `owner` granted to the savings vault
    pub async fn allowance(&self, owner: &Hash) -> Result<u64> {
        let args = encode(&AllowanceArgs {
            owner: owner.clone(),
            spender: self.savings().clone(),
        })?;
        self.query_token(OP_ALLOWANCE, args).await
    }

    pub async fn total_supply(&self) -> Result<u64> {
        self.query_token(OP_TOTAL_SUPPLY, Vec::new()).await
    }

    pub async fn token_savings_of(&self, account: &Hash) -> Result<u64> {
        self.query_savings(OP_TOKEN_SAVINGS_OF, encode(account)?)
            .await
    }

    pub async fn native_savings_of(&self, account: &Hash) -> Result<u64> {
        self.query_savings(OP_NATIVE_SAVINGS_OF, encode(account)?)
            .await
    }

    pub async fn token_contract_balance(&self) -> Result<u64> {
        self.query_savings(OP_TOKEN_CONTRACT_BALANCE, Vec::new())
            .await
    }

    pub async fn native_contract_balance(&self) -> Result<u64> {
        self.query_savings(OP_NATIVE_CONTRACT_BALANCE, Vec::new())
            .await
    }

    pub async fn token_address(&self) -> Result<Hash> {
        self.ctx
            .query_as(OP_TOKEN_ADDRESS, &[])
            .await
            .map_err(|e| anyhow::anyhow!("token_address query failed: {}", e))
    }

    /// Native balance of any account
    pub async fn native_balance(&self, account: &Hash) -> Result<u64> {
        self.ctx
            .get_balance(account)
            .await
            .map_err(|e| anyhow::anyhow!("balance of {} unavailable: {}", account, e))
    }

    /// Run every ledger invariant against the current chain state.
    pub async fn check_invariants(&self) -> Result<()> {
        invariants::check_all_on_chain(self.ctx.client().blockchain(), &self.token, self.savings())
            .await
    }

    async fn call_token(&mut self, from: &Hash, entry_id: EntryId, args: Vec<u8>) -> Result<TxResult> {
        let token = self.token.clone();
        let result = self
            .ctx
            .call_contract_as(from, &token, entry_id, args, 0)
            .await?;
        Ok(result.clone())
    }

    async fn call_savings(
        &mut self,
        from: &Hash,
        entry_id: EntryId,
        args: Vec<u8>,
        value: u64,
    ) -> Result<TxResult> {
        let result = self
            .ctx
            .call_with_value(from, entry_id, args, value)
            .await?;
        Ok(result.clone())
    }

    async fn query_token(&self, entry_id: EntryId, args: Vec<u8>) -> Result<u64> {
        self.ctx
            .query_contract_as(&self.token, entry_id, &args)
            .await
            .map_err(|e| anyhow::anyhow!("token query {} failed: {}", entry_id, e))
    }

    async fn query_savings(&self, entry_id: EntryId, args: Vec<u8>) -> Result<u64> {
        self.ctx
            .query_as(entry_id, &args)
            .await
            .map_err(|e| anyhow::anyhow!("savings query {} failed: {}", entry_id, e))
    }
}
