//! YAML scenarios describing whole savings flows.
//!
//! A scenario names its accounts, lists deposit/withdraw/approve steps with
//! their expected outcome, interleaves assertions, and ends with invariant
//! checks. See [`parser`] for the format.

pub mod parser;
pub mod runner;

pub use parser::{parse_scenario, parse_scenario_file, TestScenario};
pub use runner::{execute_scenario, run_scenario_file, run_scenario_yaml, ScenarioResult};
