use anyhow::{Context, Result};
use civic_core::config::{EffectiveConfig, resolve_config, user_config_path};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show the resolved configuration
    Show,
    /// Print config file locations
    Path,
}

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show => run_show(project_root, output),
        ConfigCommand::Path => run_path(project_root, output),
    }
}

fn run_show(project_root: &Path, output: OutputMode) -> Result<()> {
    let effective = resolve_config(project_root, output.is_json())
        .context("failed to resolve configuration")?;

    render_mode(output, &effective, write_text, |cfg, w| {
        pretty_section(w, "Mutation")?;
        pretty_kv(w, "Unrecognized", kebab(&cfg.project.mutation.unrecognized_response))?;
        pretty_kv(w, "Refetch", cfg.project.mutation.refetch_after_mutation.to_string())?;
        pretty_kv(w, "Rollback", kebab(&cfg.project.mutation.rollback_scope))?;
        pretty_kv(w, "Self-upvote", cfg.project.mutation.allow_self_upvote.to_string())?;
        writeln!(w)?;
        pretty_section(w, "Endpoint")?;
        pretty_kv(
            w,
            "Base URL",
            cfg.project.endpoint.base_url.as_deref().unwrap_or("(not set)"),
        )?;
        pretty_kv(w, "Token env", &cfg.project.endpoint.token_env)?;
        pretty_kv(w, "Timeout", format!("{}ms", cfg.project.endpoint.timeout_ms))?;
        writeln!(w)?;
        pretty_section(w, "Output")?;
        pretty_kv(w, "Resolved", &cfg.resolved_output)
    })
}

fn write_text(cfg: &EffectiveConfig, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    let mutation = &cfg.project.mutation;
    let endpoint = &cfg.project.endpoint;
    writeln!(w, "mutation.unrecognized_response={}", kebab(&mutation.unrecognized_response))?;
    writeln!(w, "mutation.refetch_after_mutation={}", mutation.refetch_after_mutation)?;
    writeln!(w, "mutation.rollback_scope={}", kebab(&mutation.rollback_scope))?;
    writeln!(w, "mutation.allow_self_upvote={}", mutation.allow_self_upvote)?;
    writeln!(
        w,
        "endpoint.base_url={}",
        endpoint.base_url.as_deref().unwrap_or("")
    )?;
    writeln!(w, "endpoint.token_env={}", endpoint.token_env)?;
    writeln!(w, "endpoint.timeout_ms={}", endpoint.timeout_ms)?;
    writeln!(w, "output={}", cfg.resolved_output)
}

/// Serde name of a unit enum variant.
fn kebab<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[derive(Debug, serde::Serialize)]
struct ConfigPaths {
    project: PathBuf,
    user: Option<PathBuf>,
}

fn run_path(project_root: &Path, output: OutputMode) -> Result<()> {
    let paths = ConfigPaths {
        project: project_root.join(".civic/config.toml"),
        user: user_config_path(),
    };
    let text = |p: &ConfigPaths, w: &mut dyn std::io::Write| {
        writeln!(w, "project={}", p.project.display())?;
        match &p.user {
            Some(user) => writeln!(w, "user={}", user.display()),
            None => writeln!(w, "user="),
        }
    };
    render_mode(output, &paths, text, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::config::{RollbackScope, UnrecognizedResponsePolicy};

    #[test]
    fn kebab_uses_serde_names() {
        assert_eq!(kebab(&UnrecognizedResponsePolicy::KeepSpeculative), "keep-speculative");
        assert_eq!(kebab(&RollbackScope::Entity), "entity");
    }
}
