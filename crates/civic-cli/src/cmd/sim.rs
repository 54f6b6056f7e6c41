//! `civic sim`: deterministic simulation campaign commands.
//!
//! `civic sim run`: execute a campaign across many seeds.
//! `civic sim replay`: replay a single seed with detailed trace output.

use std::path::Path;
use std::process;

use anyhow::Result;
use civic_core::config::{UnrecognizedResponsePolicy, load_project_config};
use civic_sim::{CampaignConfig, FaultConfig, format_violation, replay_seed, run_campaign};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section};

#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Execute deterministic simulation campaigns with configurable client counts,\n\
                      rounds, fault injection, and seed ranges. Reports pass/fail per seed\n\
                      and identifies the first failure for replay.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    civic sim run --seeds 100\n\n\
                      # Heavier faults\n    civic sim run --seeds 200 --drop 30 --malformed 20 --max-delay 5\n\n\
                      # Machine-readable output\n    civic sim run --seeds 100 --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        long_about = "Replay a specific seed to get its execution trace, oracle results,\n\
                      and violation details. Use after a campaign failure to debug.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    civic sim replay --seed 42\n\n\
                      # Machine-readable output\n    civic sim replay --seed 42 --format json"
    )]
    Replay(SimReplayArgs),
}

/// Population and fault knobs shared by `run` and `replay`.
#[derive(Args, Debug)]
pub struct SimParams {
    #[arg(long, default_value = "4")]
    pub citizens: usize,

    #[arg(long, default_value = "1")]
    pub staff: usize,

    #[arg(long, default_value = "1")]
    pub admins: usize,

    #[arg(long, default_value = "6")]
    pub issues: usize,

    /// Acting rounds per seed.
    #[arg(long, default_value = "32")]
    pub rounds: u64,

    /// Maximum response delay in rounds.
    #[arg(long, default_value = "3")]
    pub max_delay: u8,

    /// Percent of requests lost.
    #[arg(long, default_value = "10")]
    pub drop: u8,

    /// Percent of requests answered 401.
    #[arg(long, default_value = "2")]
    pub unauthorized: u8,

    /// Percent of responses matching neither shape.
    #[arg(long, default_value = "5")]
    pub malformed: u8,

    /// Percent of upvote responses sent as a delta.
    #[arg(long, default_value = "50")]
    pub delta: u8,

    /// Keep speculative state on unrecognized responses regardless of config.
    #[arg(long)]
    pub keep_speculative: bool,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    pub seed: u64,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    seed: u64,
    violations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    rounds_run: u64,
    trace_events: usize,
    clients: usize,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    trace_fingerprint: String,
}

fn build_campaign_config(
    seed_start: u64,
    seeds: u64,
    params: &SimParams,
    project_root: &Path,
) -> Result<CampaignConfig> {
    let mut mutation = load_project_config(project_root)?.mutation;
    if params.keep_speculative {
        mutation.unrecognized_response = UnrecognizedResponsePolicy::KeepSpeculative;
    }

    Ok(CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        citizens: params.citizens,
        staff: params.staff,
        admins: params.admins,
        issues: params.issues,
        rounds: params.rounds,
        fault: FaultConfig {
            max_delay_rounds: params.max_delay,
            drop_rate_percent: params.drop,
            unauthorized_rate_percent: params.unauthorized,
            malformed_rate_percent: params.malformed,
            delta_shape_percent: params.delta,
        },
        mutation,
        ..CampaignConfig::default()
    })
}

/// Execute `civic sim run`.
pub fn run_sim_run(args: &SimRunArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = build_campaign_config(args.seed_start, args.seeds, &args.params, project_root)?;
    let report = run_campaign(&config)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        all_passed: report.all_passed(),
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                seed: f.seed,
                violations: f.violations.clone(),
            })
            .collect(),
    };

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "campaign seeds_run={} rounds={} drop_pct={} malformed_pct={}",
                out.seeds_run, args.params.rounds, args.params.drop, args.params.malformed
            );
            println!(
                "results passed={} failed={} interesting_states={} all_passed={}",
                out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.all_passed
            );
            for failure in out.failures.iter().take(5) {
                println!(
                    "failure seed={} violations={}",
                    failure.seed,
                    failure.violations.len()
                );
            }
            if let Some(seed) = out.first_failure {
                println!("hint replay_seed={seed}");
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, "Simulation Campaign")?;
            pretty_kv(&mut w, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(&mut w, "Rounds", args.params.rounds.to_string())?;
            pretty_kv(
                &mut w,
                "Faults",
                format!(
                    "drop {}% / 401 {}% / garbage {}%",
                    args.params.drop, args.params.unauthorized, args.params.malformed
                ),
            )?;
            pretty_kv(
                &mut w,
                "Results",
                format!(
                    "{} passed / {} failed ({} interesting states)",
                    out.seeds_passed, out.seeds_failed, out.interesting_states_reached
                ),
            )?;

            match out.first_failure {
                None => pretty_kv(&mut w, "Status", "all seeds passed")?,
                Some(seed) => {
                    pretty_kv(
                        &mut w,
                        "Status",
                        format!("{} failures (first at seed {seed})", out.seeds_failed),
                    )?;
                    println!();
                    pretty_section(&mut w, "Failure Samples")?;
                    for failure in out.failures.iter().take(5) {
                        println!("seed {:<8} violations={}", failure.seed, failure.violations.len());
                        for violation in failure.violations.iter().take(3) {
                            println!("  - {violation}");
                        }
                    }
                    if out.failures.len() > 5 {
                        println!("... and {} more failures", out.failures.len() - 5);
                    }
                    println!();
                    pretty_kv(&mut w, "Replay", format!("civic sim replay --seed {seed}"))?;
                }
            }
        }
    }

    // Exit code 1 on any failure for CI integration
    if !report.all_passed() {
        process::exit(1);
    }

    Ok(())
}

/// Execute `civic sim replay`.
pub fn run_sim_replay(args: &SimReplayArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = build_campaign_config(args.seed, 1, &args.params, project_root)?;
    let trace = replay_seed(args.seed, &config)?;

    let out = ReplayOutput {
        seed: args.seed,
        rounds_run: trace.result.rounds_run,
        trace_events: trace.result.trace.len(),
        clients: trace.result.states.len(),
        oracle_passed: trace.oracle.passed,
        violations: trace.oracle.violations.iter().map(format_violation).collect(),
        interesting_state_reached: trace.result.interesting_state_reached,
        trace_fingerprint: trace.result.trace_fingerprint()?,
    };

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "replay seed={} rounds={} clients={} trace_events={}",
                out.seed, out.rounds_run, out.clients, out.trace_events
            );
            println!(
                "oracle passed={} violations={} interesting={} fingerprint={}",
                out.oracle_passed,
                out.violations.len(),
                out.interesting_state_reached,
                out.trace_fingerprint
            );
            for violation in &out.violations {
                println!("violation {violation}");
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, &format!("Replay seed {}", out.seed))?;
            pretty_kv(&mut w, "Rounds", out.rounds_run.to_string())?;
            pretty_kv(&mut w, "Clients", out.clients.to_string())?;
            pretty_kv(&mut w, "Trace", format!("{} events", out.trace_events))?;
            pretty_kv(&mut w, "Fingerprint", &out.trace_fingerprint)?;
            pretty_kv(
                &mut w,
                "Oracle",
                if out.oracle_passed { "passed" } else { "FAILED" },
            )?;
            for violation in &out.violations {
                println!("  - {violation}");
            }
        }
    }

    if !trace.oracle.passed {
        process::exit(1);
    }

    Ok(())
}
