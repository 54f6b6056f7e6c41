#![forbid(unsafe_code)]

mod cmd;
mod output;

use civic_core::config::resolve_config;
use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "civic: speculative issue mutations with server reconciliation",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (alias for `--format json`).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Mutations",
        about = "Walk one upvote through speculation and reconciliation",
        long_about = "Upvote a sample issue cached under two keys, answer with a scripted \
                      server response, and show the speculative and final states.",
        after_help = "EXAMPLES:\n    # Delta response confirms the speculation\n    civic demo\n\n    \
                      # Network failure rolls back\n    civic demo --respond error\n\n    \
                      # Machine-readable output\n    civic demo --respond full --json"
    )]
    Demo(cmd::demo::DemoArgs),

    #[command(
        next_help_heading = "Mutations",
        about = "Toggle your upvote on an issue",
        after_help = "EXAMPLES:\n    civic upvote 65f0c2 --as b@x.com --base-url https://civic.example/api"
    )]
    Upvote(cmd::mutate::UpvoteArgs),

    #[command(
        next_help_heading = "Mutations",
        about = "Assign a staff member to an issue (admin)",
        after_help = "EXAMPLES:\n    civic assign 65f0c2 --staff s@x.com --as root@x.com --role admin"
    )]
    Assign(cmd::mutate::AssignArgs),

    #[command(
        next_help_heading = "Mutations",
        about = "Move an issue to a new status (staff or admin)",
        after_help = "EXAMPLES:\n    civic status 65f0c2 in-progress --as s@x.com --role staff"
    )]
    Status(cmd::mutate::StatusArgs),

    #[command(next_help_heading = "Development", about = "Deterministic simulation campaigns")]
    Sim(cmd::sim::SimArgs),

    #[command(next_help_heading = "Project", about = "Inspect configuration")]
    Config(cmd::config::ConfigArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CIVIC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "civic=debug,info"
        } else {
            "civic=info,warn"
        })
    });

    let format = env::var("CIVIC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let output = match cli.format {
        Some(mode) => mode,
        None => OutputMode::from_resolved(&resolve_config(&project_root, cli.json)?.resolved_output),
    };

    match &cli.command {
        Commands::Demo(args) => cmd::demo::run_demo(args, output, &project_root),
        Commands::Upvote(args) => cmd::mutate::run_upvote(args, output, &project_root),
        Commands::Assign(args) => cmd::mutate::run_assign(args, output, &project_root),
        Commands::Status(args) => cmd::mutate::run_status(args, output, &project_root),
        Commands::Sim(args) => match &args.command {
            cmd::sim::SimCommand::Run(run) => cmd::sim::run_sim_run(run, output, &project_root),
            cmd::sim::SimCommand::Replay(replay) => {
                cmd::sim::run_sim_replay(replay, output, &project_root)
            }
        },
        Commands::Config(args) => cmd::config::run_config(args, &project_root, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["civic", "demo", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Demo(_)));
    }

    #[test]
    fn format_flag_is_global() {
        let cli = Cli::parse_from(["civic", "sim", "run", "--format", "text"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn all_subcommands_parse() {
        let subcommands = [
            vec!["civic", "demo", "--respond", "garbage"],
            vec!["civic", "upvote", "i1", "--as", "b@x.com"],
            vec!["civic", "assign", "i1", "--staff", "s@x.com", "--as", "r@x.com", "--role", "admin"],
            vec!["civic", "status", "i1", "in-progress", "--as", "s@x.com", "--role", "staff"],
            vec!["civic", "sim", "run", "--seeds", "3"],
            vec!["civic", "sim", "replay", "--seed", "7"],
            vec!["civic", "config", "show"],
            vec!["civic", "config", "path"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result = Cli::try_parse_from(["civic", "status", "i1", "done", "--as", "s@x.com"]);
        assert!(result.is_err());
    }
}
