//! `civic upvote|assign|status`: one speculative mutation against the
//! configured HTTP backend.

use std::path::Path;
use std::process;

use anyhow::{Result, bail};
use clap::Args;
use civic_core::config::{EndpointConfig, load_project_config};
use civic_core::error::ErrorCode;
use civic_core::model::{Issue, IssueStatus, Role, User};
use civic_core::mutation::{Actor, Completion, MutationOutcome};
use civic_core::session::Session;
use civic_core::transport::HttpTransport;
use civic_core::{FingerprintStore, MutationIntent, MutationKind, Mutator, QueryKey};
use serde::Serialize;

use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode, votes};

/// Identity and endpoint flags shared by every mutation command.
#[derive(Args, Debug)]
pub struct ActingArgs {
    /// Acting user's email (recorded in `upvoters`).
    #[arg(long = "as", value_name = "EMAIL")]
    pub user: String,

    /// Acting user's role.
    #[arg(long, default_value = "citizen")]
    pub role: Role,

    /// Backend base URL, overriding `[endpoint] base_url`.
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpvoteArgs {
    /// Issue id.
    pub id: String,

    #[command(flatten)]
    pub acting: ActingArgs,
}

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Issue id.
    pub id: String,

    /// Staff member's email.
    #[arg(long)]
    pub staff: String,

    #[command(flatten)]
    pub acting: ActingArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Issue id.
    pub id: String,

    /// Target status (e.g. in-progress).
    pub status: IssueStatus,

    #[command(flatten)]
    pub acting: ActingArgs,
}

#[derive(Debug, Serialize)]
struct MutateOutput {
    before: Issue,
    after: Option<Issue>,
    #[serde(flatten)]
    completion: Completion,
    notice: Option<String>,
}

pub fn run_upvote(args: &UpvoteArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    run_mutation(&args.id, MutationKind::Upvote, &args.acting, output, project_root)
}

pub fn run_assign(args: &AssignArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let kind = MutationKind::Assign {
        staff: args.staff.clone(),
    };
    run_mutation(&args.id, kind, &args.acting, output, project_root)
}

pub fn run_status(args: &StatusArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let kind = MutationKind::StatusChange {
        status: args.status,
    };
    run_mutation(&args.id, kind, &args.acting, output, project_root)
}

fn endpoint(acting: &ActingArgs, configured: &EndpointConfig) -> EndpointConfig {
    let mut endpoint = configured.clone();
    if let Some(base_url) = &acting.base_url {
        endpoint.base_url = Some(base_url.clone());
    }
    endpoint
}

fn run_mutation(
    id: &str,
    kind: MutationKind,
    acting: &ActingArgs,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let config = load_project_config(project_root)?;
    let Some(mut transport) = HttpTransport::from_config(&endpoint(acting, &config.endpoint)) else {
        render_error(
            output,
            &CliError::coded(ErrorCode::EndpointNotConfigured, "no backend endpoint configured"),
        )?;
        bail!("no backend endpoint configured");
    };

    let before = match transport.fetch_issue(id) {
        Ok(issue) => issue,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            bail!("could not load issue {id}: {err}");
        }
    };

    let mut store = FingerprintStore::new();
    store.set(QueryKey::new("issues"), vec![before.clone()]);

    let user = User::new(acting.user.clone(), acting.user.clone(), acting.role);
    let mut session = Session::signed_in(user.clone());
    let intent = MutationIntent::new(id, kind, Actor::from(&user));

    let mutator = Mutator::new(config.mutation);
    let completion = match mutator.execute(&mut store, &mut session, &mut transport, intent) {
        Ok(completion) => completion,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            bail!("{err}");
        }
    };

    let succeeded = matches!(
        completion.outcome,
        MutationOutcome::Confirmed { .. } | MutationOutcome::KeptSpeculative
    );
    let out = MutateOutput {
        after: store.find_entity(id).cloned(),
        notice: completion.outcome.notice(),
        before,
        completion,
    };

    render_mode(
        output,
        &out,
        |o, w| {
            writeln!(
                w,
                "{} outcome={}",
                o.completion.entity_id,
                o.completion.outcome.label()
            )?;
            if let Some(after) = &o.after {
                writeln!(w, "status={} upvotes={}", after.status, votes(after))?;
            }
            if let Some(notice) = &o.notice {
                writeln!(w, "notice {notice}")?;
            }
            Ok(())
        },
        |o, w| {
            pretty_section(w, &format!("Issue {}", o.completion.entity_id))?;
            pretty_kv(w, "Outcome", o.completion.outcome.label())?;
            pretty_kv(w, "Before", format!("{} {}", o.before.status, votes(&o.before)))?;
            if let Some(after) = &o.after {
                pretty_kv(w, "After", format!("{} {}", after.status, votes(after)))?;
            }
            if let Some(notice) = &o.notice {
                pretty_kv(w, "Notice", notice)?;
            }
            if let MutationOutcome::SessionRevoked { redirect } = &o.completion.outcome {
                pretty_kv(w, "Redirect", redirect)?;
            }
            Ok(())
        },
    )?;

    if !succeeded {
        process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_flag_overrides_config() {
        let acting = ActingArgs {
            user: "b@x.com".to_string(),
            role: Role::Citizen,
            base_url: Some("http://localhost:9".to_string()),
        };
        let configured = EndpointConfig {
            base_url: Some("https://civic.example".to_string()),
            ..EndpointConfig::default()
        };
        let resolved = endpoint(&acting, &configured);
        assert_eq!(resolved.base_url.as_deref(), Some("http://localhost:9"));
        assert_eq!(resolved.token_env, "CIVIC_TOKEN");
    }
}
