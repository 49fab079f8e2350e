//! Core invariant checkers
//!
//! Implements the ledger invariants the savings tests rely on:
//! - Native conservation (genesis supply == balances + burned fees)
//! - Token supply conservation (sum of token balances == total supply)
//! - Savings backing (ledger totals are covered by what the vault holds)
//! - Nonce monotonicity
//!
//! The scalar checks are pure functions. The `*_on_chain` variants read a
//! [`TestBlockchain`] and combine them.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use borsh::BorshDeserialize;
use save_erc20_or_native::{
    KEY_NATIVE_SAVINGS_PREFIX, KEY_TOKEN_SAVINGS_PREFIX, OP_TOTAL_NATIVE_SAVINGS,
    OP_TOTAL_TOKEN_SAVINGS,
};
use savings_common::config::DEFAULT_GAS_LIMIT;
use savings_common::contract::EntryId;
use savings_common::crypto::Hash;
use vickish_token::{KEY_BALANCE_PREFIX, OP_TOTAL_SUPPLY};

use crate::tier1_component::TestBlockchain;

/// Check balance conservation invariant
///
/// Verifies that the total balance before and after an operation are equal.
/// This ensures no coins are created or destroyed during execution.
///
/// # Errors
/// Returns error if balances don't match (conservation violated)
pub fn check_balance_conservation(total_before: u64, total_after: u64) -> Result<()> {
    if total_before != total_after {
        bail!(
            "Balance conservation violated: total before ({}) != total after ({}), difference: {}",
            total_before,
            total_after,
            if total_before > total_after {
                format!("-{}", total_before - total_after)
            } else {
                format!("+{}", total_after - total_before)
            }
        );
    }
    Ok(())
}

/// Check balance conservation with fee consideration
///
/// Fees are burned, so the total after should be less by exactly the fees
/// charged in between.
///
/// # Arguments
/// * `total_before` - Sum of all balances before the operation
/// * `total_after` - Sum of all balances after the operation
/// * `fees_burned` - Total fees deducted during operation
pub fn check_balance_conservation_with_fees(
    total_before: u64,
    total_after: u64,
    fees_burned: u64,
) -> Result<()> {
    let expected_after = total_before.checked_sub(fees_burned).ok_or_else(|| {
        anyhow::anyhow!(
            "Fee calculation underflow: total {} < fees {}",
            total_before,
            fees_burned
        )
    })?;

    if total_after != expected_after {
        bail!(
            "Balance conservation with fees violated: expected {} (before {} - fees {}), got {}",
            expected_after,
            total_before,
            fees_burned,
            total_after
        );
    }
    Ok(())
}

/// Check nonce monotonicity invariant
///
/// Verifies that the account nonce equals the number of included
/// transactions. Failed transactions are included and count too.
pub fn check_nonce_monotonicity(nonce: u64, confirmed_count: u64) -> Result<()> {
    if nonce != confirmed_count {
        bail!(
            "Nonce monotonicity violated: nonce ({}) != confirmed tx count ({})",
            nonce,
            confirmed_count
        );
    }
    Ok(())
}

/// Check nonce is strictly increasing
pub fn check_nonce_increment(current_nonce: u64, new_nonce: u64) -> Result<()> {
    let expected = current_nonce.checked_add(1).ok_or_else(|| {
        anyhow::anyhow!(
            "Nonce overflow: current nonce {} is at maximum",
            current_nonce
        )
    })?;

    if new_nonce != expected {
        bail!(
            "Nonce increment violated: expected {} (current {} + 1), got {}",
            expected,
            current_nonce,
            new_nonce
        );
    }
    Ok(())
}

/// Check token supply conservation
///
/// The token never mints after deployment and never burns, so the sum of
/// all balance slots must equal the recorded total supply.
pub fn check_token_supply(balances: &[u64], total_supply: u64) -> Result<()> {
    let sum = sum_balances(balances)?;
    if sum != total_supply {
        bail!(
            "Token supply conservation violated: sum of balances ({}) != total supply ({})",
            sum,
            total_supply
        );
    }
    Ok(())
}

/// Check that a savings ledger is consistent with its running total and
/// backed by what the vault actually holds.
///
/// `held` may exceed the ledger: anyone can transfer coins or tokens to the
/// vault directly without a deposit.
///
/// # Arguments
/// * `asset` - Label used in the error message ("token" or "native")
/// * `entries` - Every per-account ledger entry
/// * `recorded_total` - Running total kept by the vault
/// * `held` - Balance the vault holds of that asset
pub fn check_savings_backing(
    asset: &str,
    entries: &[u64],
    recorded_total: u64,
    held: u64,
) -> Result<()> {
    let sum = sum_balances(entries)?;
    if sum != recorded_total {
        bail!(
            "Savings ledger violated for {}: sum of entries ({}) != recorded total ({})",
            asset,
            sum,
            recorded_total
        );
    }
    if held < sum {
        bail!(
            "Savings backing violated for {}: vault holds {} but owes {}",
            asset,
            held,
            sum
        );
    }
    Ok(())
}

/// Check state root equivalence
///
/// Used to assert that a failed call left contract storage untouched.
pub fn check_state_root_equivalence(root1: &Hash, root2: &Hash) -> Result<()> {
    if root1 != root2 {
        bail!(
            "State root equivalence violated: {} != {}",
            root1.to_hex(),
            root2.to_hex()
        );
    }
    Ok(())
}

/// Calculate sum of balances with overflow checking
pub fn sum_balances(balances: &[u64]) -> Result<u64> {
    balances.iter().try_fold(0u64, |acc, &balance| {
        acc.checked_add(balance).ok_or_else(|| {
            anyhow::anyhow!(
                "Balance sum overflow at accumulator {}, adding {}",
                acc,
                balance
            )
        })
    })
}

/// Values of every storage slot whose key starts with `prefix`, decoded as
/// little-endian u64.
pub fn prefixed_u64_slots(storage: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: u8) -> Result<Vec<u64>> {
    storage
        .iter()
        .filter(|(key, _)| key.len() > 1 && key[0] == prefix)
        .map(|(key, value)| {
            let bytes: [u8; 8] = value.as_slice().try_into().map_err(|_| {
                anyhow::anyhow!(
                    "slot {} holds {} bytes, expected a u64",
                    hex::encode(key),
                    value.len()
                )
            })?;
            Ok(u64::from_le_bytes(bytes))
        })
        .collect()
}

/// Native conservation and counter consistency on a live chain
///
/// Checks that the incrementally maintained counters match a full scan of
/// the state, and that `supply == balances + fees burned`.
pub async fn check_native_conservation_on_chain(blockchain: &TestBlockchain) -> Result<()> {
    let counters = blockchain.read_counters().await?;
    let scanned = blockchain.snapshot().await?.total_balance();

    if counters.balances_total != scanned {
        bail!(
            "Counter drift: balances_total counter ({}) != scanned total ({})",
            counters.balances_total,
            scanned
        );
    }

    let accounted = counters
        .balances_total
        .checked_add(counters.fees_burned as u128)
        .context("balances + fees overflow")?;
    if accounted != counters.supply {
        bail!(
            "Native conservation violated: balances ({}) + fees burned ({}) != supply ({})",
            counters.balances_total,
            counters.fees_burned,
            counters.supply
        );
    }
    Ok(())
}

/// Token supply conservation on a live chain
pub async fn check_token_supply_on_chain(blockchain: &TestBlockchain, token: &Hash) -> Result<()> {
    let storage = blockchain.contract_storage_kv(token).await?;
    let balances = prefixed_u64_slots(&storage, KEY_BALANCE_PREFIX)?;
    let total_supply: u64 = query_u64(blockchain, token, OP_TOTAL_SUPPLY, &[]).await?;
    check_token_supply(&balances, total_supply)
}

/// Both savings ledgers of `savings` against its holdings on a live chain
pub async fn check_savings_backing_on_chain(
    blockchain: &TestBlockchain,
    token: &Hash,
    savings: &Hash,
) -> Result<()> {
    let storage = blockchain.contract_storage_kv(savings).await?;

    let token_entries = prefixed_u64_slots(&storage, KEY_TOKEN_SAVINGS_PREFIX)?;
    let token_total = query_u64(blockchain, savings, OP_TOTAL_TOKEN_SAVINGS, &[]).await?;
    let token_held = blockchain
        .contract_storage_kv(token)
        .await?
        .get(&vickish_token::balance_key(savings))
        .map(|value| {
            value
                .as_slice()
                .try_into()
                .map(u64::from_le_bytes)
                .map_err(|_| anyhow::anyhow!("corrupt token balance slot"))
        })
        .transpose()?
        .unwrap_or(0);
    check_savings_backing("token", &token_entries, token_total, token_held)?;

    let native_entries = prefixed_u64_slots(&storage, KEY_NATIVE_SAVINGS_PREFIX)?;
    let native_total = query_u64(blockchain, savings, OP_TOTAL_NATIVE_SAVINGS, &[]).await?;
    let native_held = blockchain.get_balance(savings).await?;
    check_savings_backing("native", &native_entries, native_total, native_held)
}

/// Every invariant above, for a chain hosting one token and one vault
pub async fn check_all_on_chain(
    blockchain: &TestBlockchain,
    token: &Hash,
    savings: &Hash,
) -> Result<()> {
    check_native_conservation_on_chain(blockchain).await?;
    check_token_supply_on_chain(blockchain, token).await?;
    check_savings_backing_on_chain(blockchain, token, savings).await
}

async fn query_u64(
    blockchain: &TestBlockchain,
    contract: &Hash,
    entry_id: EntryId,
    input: &[u8],
) -> Result<u64> {
    let raw = blockchain
        .query_contract(&Hash::zero(), contract, entry_id, input, DEFAULT_GAS_LIMIT)
        .await
        .map_err(|e| anyhow::anyhow!("query {} on {} failed: {}", entry_id, contract, e))?;
    u64::try_from_slice(&raw).context("query returned malformed u64")
}
