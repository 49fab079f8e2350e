//! Scenario execution engine.
//!
//! Runs a parsed [`TestScenario`] against a fresh [`SavingsFixture`]:
//! setup, the step sequence (transactions checked against their
//! expectations, assertions evaluated in place), then invariants. Step and
//! invariant failures are collected rather than aborting, so one report
//! shows every mismatch. Harness errors (a query that cannot run) abort.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use savings_common::crypto::{hash, Hash};

use super::parser::{
    parse_scenario, parse_scenario_file, Asset, ExpectStatus, GenesisAccount, ScenarioInvariant,
    Step, TestScenario, TxExpect,
};
use crate::fixtures::{owner_address, SavingsFixture, SavingsFixtureConfig, DEFAULT_TOKEN_SUPPLY};
use crate::invariants;
use crate::tier1_5::TxResult;

/// Outcome of one executed step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// 1-based step index
    pub index: usize,
    pub action: &'static str,
    /// None when the step passed
    pub error: Option<String>,
}

/// Outcome of a whole scenario
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub name: String,
    pub steps: Vec<StepOutcome>,
    pub invariant_errors: Vec<String>,
}

impl ScenarioResult {
    pub fn all_passed(&self) -> bool {
        self.invariant_errors.is_empty() && self.steps.iter().all(|s| s.error.is_none())
    }

    /// Every failure message, prefixed with its step
    pub fn failures(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| {
                s.error
                    .as_ref()
                    .map(|e| format!("step {} ({}): {}", s.index, s.action, e))
            })
            .chain(self.invariant_errors.iter().map(|e| format!("invariant: {}", e)))
            .collect()
    }
}

/// Run a scenario from YAML text.
pub async fn run_scenario_yaml(yaml: &str) -> Result<ScenarioResult> {
    let scenario = parse_scenario(yaml)?;
    execute_scenario(&scenario).await
}

/// Run a scenario from a YAML file.
pub async fn run_scenario_file(path: &Path) -> Result<ScenarioResult> {
    let scenario = parse_scenario_file(path)?;
    execute_scenario(&scenario).await
}

/// Address a scenario account name maps to. The first genesis account is
/// the fixture owner.
fn scenario_address(name: &str) -> Hash {
    hash(format!("scenario-account:{}", name).as_bytes())
}

struct ScenarioRun {
    fixture: SavingsFixture,
    accounts: HashMap<String, Hash>,
}

impl ScenarioRun {
    async fn setup(scenario: &TestScenario) -> Result<Self> {
        let (deployer, others): (&GenesisAccount, &[GenesisAccount]) = scenario
            .genesis
            .accounts
            .split_first()
            .ok_or_else(|| anyhow!("scenario has no genesis accounts"))?;

        let mut accounts = HashMap::new();
        accounts.insert(deployer.name.clone(), owner_address());
        let mut extra_accounts = Vec::with_capacity(others.len());
        for account in others {
            let address = scenario_address(&account.name);
            accounts.insert(account.name.clone(), address.clone());
            extra_accounts.push((address, account.balance));
        }

        let config = SavingsFixtureConfig {
            token_supply: scenario.genesis.token_supply.unwrap_or(DEFAULT_TOKEN_SUPPLY),
            owner_balance: deployer.balance,
            other_balance: 0,
            extra_accounts,
        };
        let mut fixture = SavingsFixture::deploy_with(config, None)
            .await
            .with_context(|| format!("scenario '{}' setup failed", scenario.name))?;

        // Token distribution, paid for by the deployer
        let owner = fixture.owner();
        for account in others {
            if let Some(tokens) = account.tokens.filter(|t| *t > 0) {
                let to = scenario_address(&account.name);
                let result = fixture.transfer_tokens(&owner, &to, tokens).await?;
                if !result.success {
                    return Err(anyhow!(
                        "scenario '{}': distributing {} tokens to {} failed: {:?}",
                        scenario.name,
                        tokens,
                        account.name,
                        result.error
                    ));
                }
            }
        }

        Ok(Self { fixture, accounts })
    }

    /// Named accounts resolve through genesis, unknown names get a fresh
    /// derived address.
    fn address(&self, name: &str) -> Hash {
        self.accounts
            .get(name)
            .cloned()
            .unwrap_or_else(|| scenario_address(name))
    }

    async fn run_step(&mut self, step: &Step) -> Result<Option<String>> {
        let result = match step {
            Step::Approve { from, amount, .. } => {
                let from = self.address(from);
                self.fixture.approve(&from, *amount).await?
            }
            Step::TransferTokens {
                from, to, amount, ..
            } => {
                let (from, to) = (self.address(from), self.address(to));
                self.fixture.transfer_tokens(&from, &to, *amount).await?
            }
            Step::TokenDeposit { from, amount, .. } => {
                let from = self.address(from);
                self.fixture.token_deposit(&from, *amount).await?
            }
            Step::TokenWithdraw { from, amount, .. } => {
                let from = self.address(from);
                self.fixture.token_withdraw(&from, *amount).await?
            }
            Step::NativeDeposit { from, amount, .. } => {
                let from = self.address(from);
                self.fixture.native_deposit(&from, *amount).await?
            }
            Step::NativeWithdraw { from, amount, .. } => {
                let from = self.address(from);
                self.fixture.native_withdraw(&from, *amount).await?
            }
            Step::NativeWithdrawAll { from, .. } => {
                let from = self.address(from);
                self.fixture.native_withdraw_all(&from).await?
            }
            Step::MineBlock { count } => {
                self.fixture.context_mut().client_mut().warp_blocks(*count).await?;
                return Ok(None);
            }
            Step::AssertBalance { account, expect } => {
                let actual = self.fixture.native_balance(&self.address(account)).await?;
                return Ok(expect.check(actual).err().map(|e| format!("native balance of {}: {}", account, e)));
            }
            Step::AssertTokenBalance { account, expect } => {
                let actual = self.fixture.token_balance_of(&self.address(account)).await?;
                return Ok(expect.check(actual).err().map(|e| format!("token balance of {}: {}", account, e)));
            }
            Step::AssertSavings {
                account,
                asset,
                expect,
            } => {
                let address = self.address(account);
                let actual = match asset {
                    Asset::Token => self.fixture.token_savings_of(&address).await?,
                    Asset::Native => self.fixture.native_savings_of(&address).await?,
                };
                return Ok(expect
                    .check(actual)
                    .err()
                    .map(|e| format!("{:?} savings of {}: {}", asset, account, e)));
            }
            Step::AssertContractBalance { asset, expect } => {
                let actual = match asset {
                    Asset::Token => self.fixture.token_contract_balance().await?,
                    Asset::Native => self.fixture.native_contract_balance().await?,
                };
                return Ok(expect
                    .check(actual)
                    .err()
                    .map(|e| format!("vault {:?} balance: {}", asset, e)));
            }
            Step::AssertAllowance { account, expect } => {
                let actual = self.fixture.allowance(&self.address(account)).await?;
                return Ok(expect.check(actual).err().map(|e| format!("allowance of {}: {}", account, e)));
            }
            Step::AssertNonce { account, eq } => {
                let address = self.address(account);
                let actual = self
                    .fixture
                    .context()
                    .get_nonce(&address)
                    .await
                    .map_err(|e| anyhow!("nonce of {} unavailable: {}", account, e))?;
                return Ok((actual != *eq)
                    .then(|| format!("nonce of {}: expected {}, got {}", account, eq, actual)));
            }
        };

        Ok(verify_tx(&result, step.expectation()).err())
    }

    async fn check_invariant(&self, invariant: ScenarioInvariant) -> Result<()> {
        let blockchain = self.fixture.context().client().blockchain();
        match invariant {
            ScenarioInvariant::NativeConservation => {
                invariants::check_native_conservation_on_chain(blockchain).await
            }
            ScenarioInvariant::TokenSupply => {
                invariants::check_token_supply_on_chain(blockchain, self.fixture.token()).await
            }
            ScenarioInvariant::SavingsBacking => {
                invariants::check_savings_backing_on_chain(
                    blockchain,
                    self.fixture.token(),
                    self.fixture.savings(),
                )
                .await
            }
        }
    }
}

/// Compare a transaction result with its expectation. No expectation
/// means success is expected.
fn verify_tx(result: &TxResult, expect: Option<&TxExpect>) -> std::result::Result<(), String> {
    let status = expect.map(|e| e.status).unwrap_or(ExpectStatus::Success);
    match (status, result.success) {
        (ExpectStatus::Success, true) => Ok(()),
        (ExpectStatus::Success, false) => Err(format!(
            "expected success, got failure: {}",
            result
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default()
        )),
        (ExpectStatus::Failure, true) => Err("expected failure, got success".to_string()),
        (ExpectStatus::Failure, false) => {
            let Some(wanted) = expect.and_then(|e| e.reason.as_deref()) else {
                return Ok(());
            };
            let actual = result
                .revert_reason()
                .map(str::to_string)
                .or_else(|| result.error.as_ref().map(|e| e.to_string()))
                .unwrap_or_default();
            if actual.contains(wanted) {
                Ok(())
            } else {
                Err(format!(
                    "expected revert reason containing {:?}, got {:?}",
                    wanted, actual
                ))
            }
        }
    }
}

/// Execute a parsed scenario on a fresh fixture.
pub async fn execute_scenario(scenario: &TestScenario) -> Result<ScenarioResult> {
    let mut run = ScenarioRun::setup(scenario).await?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (i, step) in scenario.steps.iter().enumerate() {
        let error = run.run_step(step).await.with_context(|| {
            format!(
                "scenario '{}' step {} ({}) could not run",
                scenario.name,
                i + 1,
                step.action()
            )
        })?;
        if let Some(error) = &error {
            log::warn!(
                "scenario '{}' step {} ({}) failed: {}",
                scenario.name,
                i + 1,
                step.action(),
                error
            );
        }
        steps.push(StepOutcome {
            index: i + 1,
            action: step.action(),
            error,
        });
    }

    let mut invariant_errors = Vec::new();
    for invariant in &scenario.invariants {
        if let Err(e) = run.check_invariant(*invariant).await {
            invariant_errors.push(format!("{:?}: {}", invariant, e));
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            "scenario '{}' finished: {} steps, {} invariants checked",
            scenario.name,
            steps.len(),
            scenario.invariants.len()
        );
    }

    Ok(ScenarioResult {
        name: scenario.name.clone(),
        steps,
        invariant_errors,
    })
}
