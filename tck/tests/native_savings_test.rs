#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::disallowed_methods)]
// Native coin deposit and withdraw through the savings vault
//
// The deposited amount is the value attached to the call. Withdrawals pay
// out native coins from the vault's own balance. Every transaction also
// burns its fee, so sender balances are checked against `result.fee`.

mod common;

use save_erc20_or_native::{
    SavingsEvent, ERR_NO_FUNDS, OP_NATIVE_DEPOSIT, REASON_INSUFFICIENT_FUNDS, REASON_NO_FUNDS,
    REASON_ZERO_DEPOSIT, REASON_ZERO_WITHDRAW, TOPIC_DEPOSIT, TOPIC_WITHDRAW,
};
use savings_common::config::{COIN_VALUE, NATIVE_ASSET};
use savings_common::crypto::Hash;
use savings_tck::fixtures::{SavingsFixture, SavingsFixtureConfig, DEFAULT_NATIVE_BALANCE};
use savings_tck::tier1_5::TransactionError;
use savings_tck::TestRng;

#[tokio::test]
async fn test_native_deposit() {
    let mut fx = common::setup().await;
    let owner = fx.owner();
    let before = fx.native_balance(&owner).await.unwrap();

    let result = fx.native_deposit(&owner, COIN_VALUE).await.unwrap();
    result.assert_success();

    assert_eq!(fx.native_contract_balance().await.unwrap(), COIN_VALUE);
    assert_eq!(fx.native_savings_of(&owner).await.unwrap(), COIN_VALUE);
    assert_eq!(
        fx.native_balance(&owner).await.unwrap(),
        before - COIN_VALUE - result.fee
    );

    let deposits = result.events_by_topic(TOPIC_DEPOSIT);
    assert_eq!(deposits.len(), 1);
    let event: SavingsEvent = deposits[0].decode().unwrap();
    assert_eq!(event.asset, NATIVE_ASSET);
    assert_eq!(event.amount, COIN_VALUE);
    fx.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_native_zero_deposit_reverts() {
    let mut fx = common::setup().await;
    let owner = fx.owner();

    let result = fx.native_deposit(&owner, 0).await.unwrap();
    result.assert_reverted_with(REASON_ZERO_DEPOSIT);
    assert_eq!(fx.native_contract_balance().await.unwrap(), 0);
}

#[tokio::test]
async fn test_native_deposit_ignores_input_amount() {
    let mut fx = common::setup().await;
    let owner = fx.owner();

    // Only the attached value counts, whatever the payload says
    let data = borsh::to_vec(&(5 * COIN_VALUE)).unwrap();
    fx.context_mut()
        .call_with_value(&owner, OP_NATIVE_DEPOSIT, data, 300)
        .await
        .unwrap()
        .assert_success();
    assert_eq!(fx.native_savings_of(&owner).await.unwrap(), 300);
}

#[tokio::test]
async fn test_native_withdraw_all() {
    let mut fx = common::setup().await;
    let owner = fx.owner();

    fx.native_deposit(&owner, COIN_VALUE).await.unwrap().assert_success();
    let before = fx.native_balance(&owner).await.unwrap();

    let result = fx.native_withdraw_all(&owner).await.unwrap();
    result.assert_success();

    // Payout is a host transfer, not a contract call
    assert!(result.inner_calls.is_empty());
    assert_eq!(fx.native_contract_balance().await.unwrap(), 0);
    assert_eq!(fx.native_savings_of(&owner).await.unwrap(), 0);
    assert_eq!(
        fx.native_balance(&owner).await.unwrap(),
        before + COIN_VALUE - result.fee
    );

    let event: SavingsEvent = result.events_by_topic(TOPIC_WITHDRAW)[0].decode().unwrap();
    assert_eq!(event.amount, COIN_VALUE);
    assert_eq!(event.asset, NATIVE_ASSET);
}

#[tokio::test]
async fn test_native_withdraw_all_without_savings_reverts() {
    let mut fx = common::setup().await;
    let other = fx.other_account();

    let result = fx.native_withdraw_all(&other).await.unwrap();
    result.assert_reverted_with(REASON_NO_FUNDS);
    assert_eq!(result.error.as_ref().unwrap().exit_code(), Some(ERR_NO_FUNDS));
}

#[tokio::test]
async fn test_native_partial_withdraw() {
    let mut fx = common::setup().await;
    let owner = fx.owner();

    fx.native_deposit(&owner, 1_000).await.unwrap().assert_success();
    fx.native_withdraw(&owner, 400).await.unwrap().assert_success();
    assert_eq!(fx.native_savings_of(&owner).await.unwrap(), 600);
    assert_eq!(fx.native_contract_balance().await.unwrap(), 600);

    fx.native_withdraw(&owner, 601)
        .await
        .unwrap()
        .assert_reverted_with(REASON_INSUFFICIENT_FUNDS);
    fx.native_withdraw(&owner, 0)
        .await
        .unwrap()
        .assert_reverted_with(REASON_ZERO_WITHDRAW);
    fx.native_withdraw(&owner, 600).await.unwrap().assert_success();

    fx.native_withdraw(&owner, 1)
        .await
        .unwrap()
        .assert_reverted_with(REASON_NO_FUNDS);
    fx.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_token_and_native_ledgers_are_independent() {
    let mut fx = common::setup().await;
    let owner = fx.owner();

    fx.native_deposit(&owner, 500).await.unwrap().assert_success();
    fx.token_withdraw(&owner, 100)
        .await
        .unwrap()
        .assert_reverted_with(REASON_NO_FUNDS);

    fx.approve(&owner, 70).await.unwrap().assert_success();
    fx.token_deposit(&owner, 70).await.unwrap().assert_success();
    fx.native_withdraw(&owner, 100)
        .await
        .unwrap()
        .assert_success();

    assert_eq!(fx.native_savings_of(&owner).await.unwrap(), 400);
    assert_eq!(fx.token_savings_of(&owner).await.unwrap(), 70);
}

#[tokio::test]
async fn test_deposit_more_than_native_balance_is_rejected() {
    let mut fx = common::setup().await;
    let other = fx.other_account();
    let balance = fx.native_balance(&other).await.unwrap();

    let result = fx.native_deposit(&other, balance).await.unwrap();
    // Value plus the maximum fee is unaffordable, so it never reaches a block
    assert!(matches!(
        result.error,
        Some(TransactionError::InsufficientBalance { .. })
    ));
    assert!(result.block_hash.is_none());
    assert_eq!(fx.native_balance(&other).await.unwrap(), balance);
    assert_eq!(fx.native_savings_of(&other).await.unwrap(), 0);
}

#[tokio::test]
async fn test_many_depositors_share_vault() {
    common::init_logger();
    let rng = TestRng::new_from_env_or_random();
    let depositors: Vec<Hash> = (0..6u8)
        .map(|i| savings_common::crypto::hash(&[b'd', i]))
        .collect();
    let config = SavingsFixtureConfig {
        extra_accounts: depositors
            .iter()
            .map(|d| (d.clone(), DEFAULT_NATIVE_BALANCE))
            .collect(),
        ..Default::default()
    };
    let mut fx = SavingsFixture::deploy_with(config, None).await.unwrap();

    let mut saved = Vec::with_capacity(depositors.len());
    for depositor in &depositors {
        let amount = rng.gen_range(1..=50 * COIN_VALUE);
        fx.native_deposit(depositor, amount).await.unwrap().assert_success();
        saved.push(amount);
    }
    let total: u64 = saved.iter().sum();
    assert_eq!(fx.native_contract_balance().await.unwrap(), total);

    // One depositor leaves entirely, another takes part of their savings
    let leaver = rng.gen_range(0..depositors.len());
    fx.native_withdraw_all(&depositors[leaver]).await.unwrap().assert_success();
    let partial = (leaver + 1) % depositors.len();
    let amount = rng.gen_range(1..=saved[partial]);
    fx.native_withdraw(&depositors[partial], amount).await.unwrap().assert_success();

    for (i, depositor) in depositors.iter().enumerate() {
        let expected = match i {
            i if i == leaver => 0,
            i if i == partial => saved[i] - amount,
            _ => saved[i],
        };
        assert_eq!(
            fx.native_savings_of(depositor).await.unwrap(),
            expected,
            "depositor {} (seed 0x{:016x})",
            i,
            rng.seed()
        );
    }

    let bystander = rng.choose(&depositors).unwrap();
    let result = fx.native_withdraw(bystander, total + 1).await.unwrap();
    result.assert_failed();

    assert_eq!(
        fx.native_contract_balance().await.unwrap(),
        total - saved[leaver] - amount
    );
    fx.check_invariants().await.unwrap();
}
