//! ArgMatches → CliAction conversion.

use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use serde_json::{Map, Value};
use taskledger::{EventFilter, EventType, Fact, Page, PolicyTier, TaskId, WorkspaceId};

/// What the user asked for
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Append one event
    Append(Fact),
    /// Page through a workspace
    List {
        workspace: WorkspaceId,
        filter: EventFilter,
        page: Page,
    },
    /// Verify one workspace or all of them
    Verify(VerifyTarget),
    /// Show a task's history
    Task(TaskId),
    /// Evaluate, and optionally finalize, a task's closure
    Evaluate {
        workspace: WorkspaceId,
        task: TaskId,
        tier: Option<PolicyTier>,
        finalize: bool,
    },
}

/// Scope of `verify`
#[derive(Debug, PartialEq, Eq)]
pub enum VerifyTarget {
    Workspace(WorkspaceId),
    All,
}

/// Convert clap ArgMatches into a CliAction.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction> {
    let (sub_name, m) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("no command provided"))?;

    match sub_name {
        "append" => parse_append(m),
        "list" => parse_list(m),
        "verify" => Ok(CliAction::Verify(match optional(m, "workspace") {
            Some(ws) => VerifyTarget::Workspace(ws.into()),
            None => VerifyTarget::All,
        })),
        "task" => Ok(CliAction::Task(required(m, "task")?.into())),
        "evaluate" => Ok(CliAction::Evaluate {
            workspace: required(m, "workspace")?.into(),
            task: required(m, "task")?.into(),
            tier: optional(m, "tier").map(|t| t.parse()).transpose()?,
            finalize: m.get_flag("finalize"),
        }),
        other => bail!("unknown command: {}", other),
    }
}

fn parse_append(m: &ArgMatches) -> Result<CliAction> {
    let event_type: EventType = required(m, "type")?.parse()?;
    let mut fact = Fact::new(required(m, "workspace")?, event_type);
    if let Some(task) = optional(m, "task") {
        fact = fact.task(task);
    }
    if let Some(source) = optional(m, "source") {
        fact = fact.source(source);
    }
    fact = fact.payload(match optional(m, "payload") {
        Some(raw) => parse_payload(raw)?,
        None => Value::Object(Map::new()),
    });
    Ok(CliAction::Append(fact))
}

fn parse_list(m: &ArgMatches) -> Result<CliAction> {
    let filter = EventFilter {
        task_id: optional(m, "task").map(TaskId::from),
        event_type: optional(m, "type").map(str::parse).transpose()?,
        ..EventFilter::default()
    };
    let page = Page {
        offset: m.get_one::<usize>("offset").copied().unwrap_or(0),
        limit: m.get_one::<usize>("limit").copied().unwrap_or(50),
    };
    Ok(CliAction::List {
        workspace: required(m, "workspace")?.into(),
        filter,
        page,
    })
}

/// Parse a payload argument; it must be a JSON object.
pub fn parse_payload(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).context("payload is not valid JSON")?;
    if !value.is_object() {
        bail!("payload must be a JSON object, got {}", raw);
    }
    Ok(value)
}

fn optional<'a>(m: &'a ArgMatches, id: &str) -> Option<&'a str> {
    m.get_one::<String>(id).map(String::as_str)
}

fn required<'a>(m: &'a ArgMatches, id: &str) -> Result<&'a str> {
    optional(m, id).ok_or_else(|| anyhow!("missing --{}", id))
}
