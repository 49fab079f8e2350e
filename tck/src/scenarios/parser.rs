//! YAML scenario parser for savings flows
//!
//! Numbers may be written as integers or as strings (`"1000000000000"`).
//! Approximate balances use a `within` structure, never a tilde.
//!
//! ## Example Scenario
//!
//! ```yaml
//! name: "Approve then deposit"
//! genesis:
//!   token_supply: "1000"
//!   accounts:
//!     - name: "owner"          # first account deploys both contracts
//!       balance: "1000000000000"
//!     - name: "bob"
//!       balance: "1000000000000"
//!       tokens: "200"          # moved from the owner after deployment
//! steps:
//!   - action: "approve"
//!     from: "bob"
//!     amount: 100
//!   - action: "token_deposit"
//!     from: "bob"
//!     amount: 150
//!     expect:
//!       status: "failure"
//!       reason: "insufficient allowance"
//!   - action: "assert_savings"
//!     account: "bob"
//!     asset: "token"
//!     eq: 0
//! invariants:
//!   - "token_supply"
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete test scenario loaded from YAML
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TestScenario {
    /// Scenario name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Genesis configuration
    pub genesis: GenesisConfig,

    /// Execution steps
    pub steps: Vec<Step>,

    /// Invariants to check after execution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invariants: Vec<ScenarioInvariant>,
}

/// Genesis configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenesisConfig {
    /// Token supply minted to the first account (defaults to the fixture supply)
    #[serde(
        default,
        deserialize_with = "deserialize_opt_u64_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_supply: Option<u64>,

    /// Genesis accounts; the first one deploys the contracts
    pub accounts: Vec<GenesisAccount>,
}

/// Genesis account with initial funding
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenesisAccount {
    /// Account name (e.g., "owner", "bob")
    pub name: String,

    /// Initial native balance
    #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
    pub balance: u64,

    /// Tokens transferred to this account from the deployer before step 1
    #[serde(
        default,
        deserialize_with = "deserialize_opt_u64_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub tokens: Option<u64>,
}

/// Which savings ledger an assertion reads
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Token,
    Native,
}

/// Test execution step
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Approve the savings vault to spend tokens
    Approve {
        from: String,
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<TxExpect>,
    },

    /// Plain token transfer between accounts
    TransferTokens {
        from: String,
        to: String,
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<TxExpect>,
    },

    TokenDeposit {
        from: String,
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<TxExpect>,
    },

    TokenWithdraw {
        from: String,
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<TxExpect>,
    },

    /// Deposit native coins; `amount` is attached as call value
    NativeDeposit {
        from: String,
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<TxExpect>,
    },

    NativeWithdraw {
        from: String,
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<TxExpect>,
    },

    NativeWithdrawAll {
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<TxExpect>,
    },

    /// Mine empty blocks
    MineBlock {
        #[serde(default = "default_block_count")]
        count: u64,
    },

    /// Assert native balance (supports eq/within/compare)
    AssertBalance {
        account: String,
        #[serde(flatten)]
        expect: BalanceExpect,
    },

    AssertTokenBalance {
        account: String,
        #[serde(flatten)]
        expect: BalanceExpect,
    },

    /// Assert an account's savings in one ledger
    AssertSavings {
        account: String,
        asset: Asset,
        #[serde(flatten)]
        expect: BalanceExpect,
    },

    /// Assert what the vault holds of an asset
    AssertContractBalance {
        asset: Asset,
        #[serde(flatten)]
        expect: BalanceExpect,
    },

    /// Assert the allowance an account granted the vault
    AssertAllowance {
        account: String,
        #[serde(flatten)]
        expect: BalanceExpect,
    },

    AssertNonce {
        account: String,
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        eq: u64,
    },
}

fn default_block_count() -> u64 {
    1
}

impl Step {
    /// Account that signs the transaction, for transaction steps
    pub fn sender(&self) -> Option<&str> {
        match self {
            Step::Approve { from, .. }
            | Step::TransferTokens { from, .. }
            | Step::TokenDeposit { from, .. }
            | Step::TokenWithdraw { from, .. }
            | Step::NativeDeposit { from, .. }
            | Step::NativeWithdraw { from, .. }
            | Step::NativeWithdrawAll { from, .. } => Some(from),
            _ => None,
        }
    }

    pub fn expectation(&self) -> Option<&TxExpect> {
        match self {
            Step::Approve { expect, .. }
            | Step::TransferTokens { expect, .. }
            | Step::TokenDeposit { expect, .. }
            | Step::TokenWithdraw { expect, .. }
            | Step::NativeDeposit { expect, .. }
            | Step::NativeWithdraw { expect, .. }
            | Step::NativeWithdrawAll { expect, .. } => expect.as_ref(),
            _ => None,
        }
    }

    /// snake_case action name, as written in YAML
    pub fn action(&self) -> &'static str {
        match self {
            Step::Approve { .. } => "approve",
            Step::TransferTokens { .. } => "transfer_tokens",
            Step::TokenDeposit { .. } => "token_deposit",
            Step::TokenWithdraw { .. } => "token_withdraw",
            Step::NativeDeposit { .. } => "native_deposit",
            Step::NativeWithdraw { .. } => "native_withdraw",
            Step::NativeWithdrawAll { .. } => "native_withdraw_all",
            Step::MineBlock { .. } => "mine_block",
            Step::AssertBalance { .. } => "assert_balance",
            Step::AssertTokenBalance { .. } => "assert_token_balance",
            Step::AssertSavings { .. } => "assert_savings",
            Step::AssertContractBalance { .. } => "assert_contract_balance",
            Step::AssertAllowance { .. } => "assert_allowance",
            Step::AssertNonce { .. } => "assert_nonce",
        }
    }
}

/// Expected outcome of a transaction step
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TxExpect {
    pub status: ExpectStatus,

    /// Substring the revert reason must contain (failure only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpectStatus {
    Success,
    Failure,
}

impl fmt::Display for ExpectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Invariants checked after the last step
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioInvariant {
    /// balances + burned fees == genesis supply
    NativeConservation,
    /// sum of token balances == total supply
    TokenSupply,
    /// savings ledgers are covered by vault holdings
    SavingsBacking,
}

/// Balance assertion modes
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum BalanceExpect {
    /// Exact equality
    Eq {
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        eq: u64,
    },

    /// Within tolerance range
    Within { within: Tolerance },

    /// Comparison operator
    Compare { compare: CompareOp },
}

impl BalanceExpect {
    /// Check `actual`, describing the mismatch on failure
    pub fn check(&self, actual: u64) -> std::result::Result<(), String> {
        match self {
            BalanceExpect::Eq { eq } if actual == *eq => Ok(()),
            BalanceExpect::Eq { eq } => Err(format!("expected {}, got {}", eq, actual)),
            BalanceExpect::Within { within } => {
                if actual.abs_diff(within.target) <= within.tolerance {
                    Ok(())
                } else {
                    Err(format!(
                        "expected {} +/- {}, got {}",
                        within.target, within.tolerance, actual
                    ))
                }
            }
            BalanceExpect::Compare { compare } => compare.check(actual),
        }
    }
}

/// Tolerance specification for approximate assertions
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Tolerance {
    #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
    pub target: u64,

    /// Allowed distance from target in either direction
    #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
    pub tolerance: u64,
}

/// Comparison operators for balance assertions
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum CompareOp {
    Gte {
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        gte: u64,
    },
    Lte {
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        lte: u64,
    },
    Gt {
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        gt: u64,
    },
    Lt {
        #[serde(deserialize_with = "deserialize_u64_from_string_or_number")]
        lt: u64,
    },
}

impl CompareOp {
    fn check(&self, actual: u64) -> std::result::Result<(), String> {
        let (ok, op, bound) = match self {
            CompareOp::Gte { gte } => (actual >= *gte, ">=", *gte),
            CompareOp::Lte { lte } => (actual <= *lte, "<=", *lte),
            CompareOp::Gt { gt } => (actual > *gt, ">", *gt),
            CompareOp::Lt { lt } => (actual < *lt, "<", *lt),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("expected {} {}, got {}", op, bound, actual))
        }
    }
}

struct U64Visitor;

impl<'de> serde::de::Visitor<'de> for U64Visitor {
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a u64 as number or string")
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(value)
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(value)
            .map_err(|_| E::custom(format!("negative value not allowed: {}", value)))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        value.parse::<u64>().map_err(E::custom)
    }
}

/// Accepts u64 as string or number
///
/// - `balance: 1000000000000` (number)
/// - `balance: "1000000000000"` (string, no underscores)
fn deserialize_u64_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_any(U64Visitor)
}

fn deserialize_opt_u64_from_string_or_number<'de, D>(
    deserializer: D,
) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_any(U64Visitor).map(Some)
}

/// Parse YAML scenario text
pub fn parse_scenario(yaml: &str) -> Result<TestScenario> {
    let scenario: TestScenario = serde_yaml::from_str(yaml)
        .map_err(|e| anyhow::anyhow!("Failed to parse YAML scenario: {}", e))?;

    validate_scenario(&scenario)?;

    Ok(scenario)
}

/// Parse a YAML scenario file
pub fn parse_scenario_file(path: &Path) -> Result<TestScenario> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&yaml).with_context(|| format!("In scenario file {}", path.display()))
}

/// Validate scenario structure
fn validate_scenario(scenario: &TestScenario) -> Result<()> {
    anyhow::ensure!(!scenario.name.is_empty(), "Scenario name cannot be empty");

    anyhow::ensure!(
        !scenario.genesis.accounts.is_empty(),
        "Scenario must have at least one genesis account"
    );

    let mut account_names = HashSet::new();
    for account in &scenario.genesis.accounts {
        anyhow::ensure!(!account.name.is_empty(), "Account name cannot be empty");
        anyhow::ensure!(
            account_names.insert(account.name.as_str()),
            "Duplicate account name: {}",
            account.name
        );
    }

    anyhow::ensure!(
        !scenario.steps.is_empty(),
        "Scenario must have at least one step"
    );

    for (index, step) in scenario.steps.iter().enumerate() {
        if let Some(from) = step.sender() {
            anyhow::ensure!(
                account_names.contains(from),
                "Step {} ({}): sender must exist in genesis: {}",
                index + 1,
                step.action(),
                from
            );
        }
        if let Some(expect) = step.expectation() {
            anyhow::ensure!(
                expect.status == ExpectStatus::Failure || expect.reason.is_none(),
                "Step {} ({}): a revert reason only makes sense with status failure",
                index + 1,
                step.action()
            );
        }
        // Token recipients and assertion targets may be fresh accounts
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn test_parse_savings_scenario() {
        let yaml = r#"
name: "Token savings"
description: "approve, deposit, withdraw"
genesis:
  token_supply: "1000"
  accounts:
    - name: "owner"
      balance: "1000000000000"
    - name: "bob"
      balance: 1000000000000
      tokens: 200
steps:
  - action: "approve"
    from: "owner"
    amount: 100
  - action: "token_deposit"
    from: "owner"
    amount: "50"
  - action: "token_withdraw"
    from: "owner"
    amount: 0
    expect:
      status: "failure"
      reason: "can't withdraw zero value"
  - action: "mine_block"
  - action: "assert_savings"
    account: "owner"
    asset: "token"
    eq: 50
invariants:
  - "token_supply"
  - "savings_backing"
"#;

        let scenario = parse_scenario(yaml).expect("Failed to parse");
        assert_eq!(scenario.name, "Token savings");
        assert_eq!(scenario.genesis.token_supply, Some(1000));
        assert_eq!(scenario.genesis.accounts[1].tokens, Some(200));
        assert_eq!(scenario.genesis.accounts[0].tokens, None);
        assert_eq!(scenario.steps.len(), 5);
        assert_eq!(scenario.invariants.len(), 2);

        match &scenario.steps[2] {
            Step::TokenWithdraw { amount, expect, .. } => {
                assert_eq!(*amount, 0);
                let expect = expect.as_ref().unwrap();
                assert_eq!(expect.status, ExpectStatus::Failure);
                assert_eq!(expect.reason.as_deref(), Some("can't withdraw zero value"));
            }
            other => panic!("Expected token_withdraw, got {:?}", other),
        }
        assert!(matches!(scenario.steps[3], Step::MineBlock { count: 1 }));
        assert!(matches!(
            scenario.steps[4],
            Step::AssertSavings {
                asset: Asset::Token,
                expect: BalanceExpect::Eq { eq: 50 },
                ..
            }
        ));
    }

    #[test]
    fn test_parse_within_and_compare() {
        let yaml = r#"
name: "Assertions"
genesis:
  accounts:
    - name: "alice"
      balance: 1000
steps:
  - action: "assert_balance"
    account: "alice"
    within:
      target: "1000"
      tolerance: "10"
  - action: "assert_contract_balance"
    asset: "native"
    compare:
      gte: "0"
"#;

        let scenario = parse_scenario(yaml).expect("Failed to parse");
        match &scenario.steps[0] {
            Step::AssertBalance {
                expect: BalanceExpect::Within { within },
                ..
            } => {
                assert_eq!(within.target, 1000);
                assert_eq!(within.tolerance, 10);
            }
            _ => panic!("Expected Within assertion"),
        }
        assert!(matches!(
            scenario.steps[1],
            Step::AssertContractBalance {
                asset: Asset::Native,
                expect: BalanceExpect::Compare {
                    compare: CompareOp::Gte { gte: 0 }
                }
            }
        ));
    }

    #[test]
    fn test_balance_expect_check() {
        assert!(BalanceExpect::Eq { eq: 5 }.check(5).is_ok());
        assert!(BalanceExpect::Eq { eq: 5 }.check(6).is_err());

        let within = BalanceExpect::Within {
            within: Tolerance {
                target: 100,
                tolerance: 3,
            },
        };
        assert!(within.check(97).is_ok());
        assert!(within.check(103).is_ok());
        assert!(within.check(104).is_err());

        let lt = BalanceExpect::Compare {
            compare: CompareOp::Lt { lt: 10 },
        };
        assert!(lt.check(9).is_ok());
        let err = lt.check(10).unwrap_err();
        assert!(err.contains("< 10"));
    }

    #[test]
    fn test_negative_number_rejected() {
        let yaml = r#"
name: "Negative"
genesis:
  accounts:
    - name: "alice"
      balance: -5
steps:
  - action: "mine_block"
"#;
        let err = parse_scenario(yaml).unwrap_err();
        assert!(err.to_string().contains("negative value"));
    }

    #[test]
    fn test_validation_duplicate_accounts() {
        let yaml = r#"
name: "Duplicate Test"
genesis:
  accounts:
    - name: "alice"
      balance: 1000
    - name: "alice"
      balance: 2000
steps:
  - action: "mine_block"
"#;

        let result = parse_scenario(yaml);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate account name"));
    }

    #[test]
    fn test_validation_unknown_sender() {
        let yaml = r#"
name: "Unknown Sender Test"
genesis:
  accounts:
    - name: "alice"
      balance: 1000
steps:
  - action: "native_deposit"
    from: "charlie"
    amount: 100
"#;

        let result = parse_scenario(yaml);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must exist in genesis"));
    }

    #[test]
    fn test_validation_reason_requires_failure() {
        let yaml = r#"
name: "Bad expectation"
genesis:
  accounts:
    - name: "alice"
      balance: 1000
steps:
  - action: "native_withdraw_all"
    from: "alice"
    expect:
      status: "success"
      reason: "nope"
"#;

        assert!(parse_scenario(yaml).is_err());
    }
}
