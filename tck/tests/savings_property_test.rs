#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::disallowed_methods)]
// Property tests for the savings ledgers
//
// Each case deploys a fresh fixture, so the case count stays small.

mod common;

use proptest::prelude::*;
use savings_tck::fixtures::{SavingsFixture, SavingsFixtureConfig};

const TOKEN_SUPPLY: u64 = 1_000_000;

async fn fresh() -> SavingsFixture {
    common::init_logger();
    SavingsFixture::deploy_with(
        SavingsFixtureConfig {
            token_supply: TOKEN_SUPPLY,
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap()
}

#[derive(Debug, Clone)]
enum Op {
    TokenDeposit(u64),
    TokenWithdraw(u64),
    NativeDeposit(u64),
    NativeWithdraw(u64),
    NativeWithdrawAll,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..5_000).prop_map(Op::TokenDeposit),
        (0u64..5_000).prop_map(Op::TokenWithdraw),
        (0u64..5_000).prop_map(Op::NativeDeposit),
        (0u64..5_000).prop_map(Op::NativeWithdraw),
        Just(Op::NativeWithdrawAll),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_token_deposit_adds(first in 1u64..10_000, second in 1u64..10_000) {
        tokio_test::block_on(async {
            let mut fx = fresh().await;
            let owner = fx.owner();
            fx.approve(&owner, first + second).await.unwrap().assert_success();

            fx.token_deposit(&owner, first).await.unwrap().assert_success();
            fx.token_deposit(&owner, second).await.unwrap().assert_success();

            assert_eq!(fx.token_savings_of(&owner).await.unwrap(), first + second);
            assert_eq!(
                fx.token_balance_of(&owner).await.unwrap(),
                TOKEN_SUPPLY - first - second
            );
            assert_eq!(fx.allowance(&owner).await.unwrap(), 0);
        });
    }

    #[test]
    fn prop_withdraw_within_savings_subtracts(saved in 1u64..10_000, pct in 0u64..=100) {
        tokio_test::block_on(async {
            let mut fx = fresh().await;
            let owner = fx.owner();
            let amount = (saved * pct / 100).max(1);

            fx.native_deposit(&owner, saved).await.unwrap().assert_success();
            fx.native_withdraw(&owner, amount).await.unwrap().assert_success();

            assert_eq!(fx.native_savings_of(&owner).await.unwrap(), saved - amount);
            assert_eq!(fx.native_contract_balance().await.unwrap(), saved - amount);
        });
    }

    #[test]
    fn prop_overdraw_fails_and_keeps_savings(saved in 1u64..10_000, extra in 1u64..10_000) {
        tokio_test::block_on(async {
            let mut fx = fresh().await;
            let owner = fx.owner();
            fx.approve(&owner, saved).await.unwrap().assert_success();
            fx.token_deposit(&owner, saved).await.unwrap().assert_success();

            let result = fx.token_withdraw(&owner, saved + extra).await.unwrap();
            result.assert_failed();

            assert_eq!(fx.token_savings_of(&owner).await.unwrap(), saved);
            assert_eq!(fx.token_contract_balance().await.unwrap(), saved);
        });
    }

    #[test]
    fn prop_random_ops_keep_invariants(ops in prop::collection::vec(op_strategy(), 1..12)) {
        tokio_test::block_on(async {
            let mut fx = fresh().await;
            let owner = fx.owner();
            fx.approve(&owner, TOKEN_SUPPLY).await.unwrap().assert_success();

            // Model of what each ledger should hold
            let mut token_saved = 0u64;
            let mut native_saved = 0u64;

            for op in ops {
                let result = match op {
                    Op::TokenDeposit(amount) => {
                        let result = fx.token_deposit(&owner, amount).await.unwrap();
                        if amount > 0 {
                            token_saved += amount;
                        }
                        result
                    }
                    Op::TokenWithdraw(amount) => {
                        let result = fx.token_withdraw(&owner, amount).await.unwrap();
                        if amount > 0 && amount <= token_saved {
                            token_saved -= amount;
                        }
                        result
                    }
                    Op::NativeDeposit(amount) => {
                        let result = fx.native_deposit(&owner, amount).await.unwrap();
                        if amount > 0 {
                            native_saved += amount;
                        }
                        result
                    }
                    Op::NativeWithdraw(amount) => {
                        let result = fx.native_withdraw(&owner, amount).await.unwrap();
                        if amount > 0 && amount <= native_saved {
                            native_saved -= amount;
                        }
                        result
                    }
                    Op::NativeWithdrawAll => {
                        let result = fx.native_withdraw_all(&owner).await.unwrap();
                        native_saved = 0;
                        result
                    }
                };
                assert!(result.block_hash.is_some());

                assert_eq!(fx.token_savings_of(&owner).await.unwrap(), token_saved);
                assert_eq!(fx.native_savings_of(&owner).await.unwrap(), native_saved);
                fx.check_invariants().await.unwrap();
            }

            assert_eq!(fx.total_supply().await.unwrap(), TOKEN_SUPPLY);
            assert_eq!(
                fx.token_balance_of(&owner).await.unwrap() + fx.token_contract_balance().await.unwrap(),
                TOKEN_SUPPLY
            );
        });
    }
}
