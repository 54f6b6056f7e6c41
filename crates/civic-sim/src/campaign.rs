//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with the same parameters, collecting pass/fail
//! results and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use civic_core::config::MutationConfig;
use serde::{Deserialize, Serialize};

use crate::oracle::{InvariantViolation, MutationOracle, OracleResult};
use crate::{FaultConfig, SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and the simulation
/// parameters shared by every seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub citizens: usize,
    pub staff: usize,
    pub admins: usize,
    pub issues: usize,
    pub rounds: u64,
    pub action_rate_percent: u8,
    pub refetch_rate_percent: u8,
    pub fault: FaultConfig,
    pub mutation: MutationConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            citizens: sim.citizens,
            staff: sim.staff,
            admins: sim.admins,
            issues: sim.issues,
            rounds: sim.rounds,
            action_rate_percent: sim.action_rate_percent,
            refetch_rate_percent: sim.refetch_rate_percent,
            fault: sim.fault,
            mutation: sim.mutation,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            citizens: self.citizens,
            staff: self.staff,
            admins: self.admins,
            issues: self.issues,
            rounds: self.rounds,
            action_rate_percent: self.action_rate_percent,
            refetch_rate_percent: self.refetch_rate_percent,
            fault: self.fault,
            mutation: self.mutation.clone(),
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed range is empty or a per-seed parameter
    /// is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    /// Formatted invariant violations.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that saw at least one rollback, sign-out, or suppression.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Detailed trace produced by replaying a single seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        let trace = simulate_and_check(seed, config)?;
        report.seeds_run += 1;
        if trace.result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if trace.oracle.passed {
            report.seeds_passed += 1;
        } else {
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: trace.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    Ok(report)
}

/// Run a single seed and return Ok(()) on pass, Err(violations) on failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself encounters an internal
/// error (invalid config, etc). The inner `Result` distinguishes pass from
/// invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let trace = simulate_and_check(seed, config)?;
    if trace.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(trace.oracle.violations))
    }
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    simulate_and_check(seed, config)
}

fn simulate_and_check(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = MutationOracle::check_all(&result.states, &result.backend, &result.trace);
    Ok(DetailedTrace { result, oracle })
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::CrossCache {
            client,
            entity,
            key_a,
            key_b,
        } => format!("CrossCache: client {client} holds different copies of {entity} under {key_a} and {key_b}"),
        InvariantViolation::DuplicateUpvoter {
            client,
            entity,
            user,
        } => format!("DuplicateUpvoter: client {client} lists {user} twice on {entity}"),
        InvariantViolation::OwnVote {
            client,
            entity,
            local,
            authoritative,
        } => format!(
            "OwnVote: client {client} sees upvoted={local} on {entity}, backend has upvoted={authoritative}"
        ),
        InvariantViolation::NotQuiescent {
            client,
            in_flight,
            pending,
        } => format!("NotQuiescent: client {client} still has {pending} pending (in flight: {in_flight:?})"),
        InvariantViolation::SilentMutation {
            client,
            entity,
            round,
        } => format!("SilentMutation: client {client} store changed by a refused fire on {entity} in round {round}"),
        InvariantViolation::ConcurrentInFlight {
            client,
            entity,
            round,
        } => format!("ConcurrentInFlight: client {client} fired {entity} twice without completion by round {round}"),
    }
}
