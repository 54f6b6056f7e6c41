//! `civic demo`: run one upvote through the speculative pipeline against a
//! scripted server response.

use std::path::Path;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use civic_core::config::load_project_config;
use civic_core::model::{Issue, Role, User};
use civic_core::mutation::{Actor, Begin, MutationOutcome};
use civic_core::session::Session;
use civic_core::transport::{MutationTransport, ScriptedTransport, TransportError};
use civic_core::{FingerprintStore, MutationIntent, MutationKind, Mutator, QueryKey};
use serde::Serialize;
use serde_json::json;

use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode, votes};

/// What the scripted server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Respond {
    /// `{upvoted, upvotes}`
    Delta,
    /// `{issue: {...}}` with an extra vote from another user
    Full,
    /// Connection failure
    Error,
    /// 409 conflict
    Rejected,
    /// 401
    Unauthorized,
    /// A body matching neither shape
    Garbage,
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Server response to simulate.
    #[arg(long, value_enum, default_value = "delta")]
    pub respond: Respond,

    /// Acting user's email.
    #[arg(long, default_value = "b@x.com")]
    pub user: String,
}

#[derive(Debug, Serialize)]
struct DemoOutput {
    before: Issue,
    speculative: Issue,
    after: Issue,
    #[serde(flatten)]
    outcome: MutationOutcome,
    notice: Option<String>,
    invalidated: Vec<String>,
    /// Every cache key holds the same copy of the issue.
    consistent: bool,
    signed_in: bool,
}

fn seed_issue() -> Issue {
    let mut issue = Issue::new("i1", "Broken streetlight on Elm St", "c@x.com");
    issue.upvotes = 2;
    issue.upvoters = vec!["a@x.com".to_string()];
    issue
}

/// Canned server answer agreeing with `user`'s speculative vote.
fn scripted(respond: Respond, speculative: &Issue, user: &str) -> ScriptedTransport {
    let transport = ScriptedTransport::new();
    match respond {
        Respond::Delta => transport.respond(json!({
            "upvoted": speculative.has_upvoted(user),
            "upvotes": speculative.upvotes,
        })),
        Respond::Full => {
            let mut server = speculative.clone();
            server.upvoters.push("d@x.com".to_string());
            server.upvotes = speculative.upvotes.saturating_add(1);
            transport.respond(json!({ "issue": server }))
        }
        Respond::Error => transport.fail(TransportError::Network("connection reset by peer".to_string())),
        Respond::Rejected => transport.fail(TransportError::Status {
            status: 409,
            body: "vote conflict".to_string(),
        }),
        Respond::Unauthorized => transport.fail(TransportError::Unauthorized { status: 401 }),
        Respond::Garbage => transport.respond(json!({ "ok": true })),
    }
}

pub fn run_demo(args: &DemoArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = load_project_config(project_root)?;
    let mutator = Mutator::new(config.mutation);

    let before = seed_issue();
    let mut store = FingerprintStore::new();
    store.set(QueryKey::new("issues"), vec![before.clone()]);
    store.set(QueryKey::new("latest"), vec![before.clone()]);

    let user = User::new("demo-user", args.user.clone(), Role::Citizen);
    let mut session = Session::signed_in(user.clone());
    let intent = MutationIntent::new(&before.id, MutationKind::Upvote, Actor::from(&user));

    let pending = match mutator.begin(&mut store, &session, intent) {
        Ok(Begin::Started(pending)) => pending,
        Ok(Begin::Suppressed) => bail!("issue {} already has a mutation in flight", before.id),
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            bail!("{err}");
        }
    };
    let speculative = pending.next_state().clone();

    let mut transport = scripted(args.respond, &speculative, &args.user);
    let result = transport.submit(pending.intent());
    let done = mutator.complete(&mut store, &mut session, pending, result);

    let copies: Vec<Issue> = store
        .keys_containing(&before.id)
        .iter()
        .filter_map(|key| store.entity(key, &before.id).cloned())
        .collect();
    let Some(after) = copies.first().cloned() else {
        bail!("issue {} vanished from the store", before.id);
    };

    let out = DemoOutput {
        consistent: copies.iter().all(|copy| *copy == after),
        before,
        speculative,
        after,
        notice: done.outcome.notice(),
        outcome: done.outcome,
        invalidated: done.invalidated.iter().map(ToString::to_string).collect(),
        signed_in: session.identity().is_some(),
    };

    render_mode(
        output,
        &out,
        |o, w| {
            writeln!(w, "before {}", votes(&o.before))?;
            writeln!(w, "speculative {}", votes(&o.speculative))?;
            writeln!(w, "after {}", votes(&o.after))?;
            writeln!(w, "outcome={} consistent={}", o.outcome.label(), o.consistent)?;
            if let Some(notice) = &o.notice {
                writeln!(w, "notice {notice}")?;
            }
            Ok(())
        },
        |o, w| {
            pretty_section(w, &format!("Upvote {} as {}", o.before.id, args.user))?;
            pretty_kv(w, "Before", votes(&o.before))?;
            pretty_kv(w, "Speculative", votes(&o.speculative))?;
            pretty_kv(w, "After", votes(&o.after))?;
            pretty_kv(w, "Outcome", o.outcome.label())?;
            pretty_kv(w, "Consistent", if o.consistent { "yes" } else { "no" })?;
            if let Some(notice) = &o.notice {
                pretty_kv(w, "Notice", notice)?;
            }
            if let MutationOutcome::SessionRevoked { redirect } = &o.outcome {
                pretty_kv(w, "Redirect", redirect)?;
            }
            Ok(())
        },
    )
}
