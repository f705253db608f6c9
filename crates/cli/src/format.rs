//! Output formatting for human and JSON modes.

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::json;
use taskledger::{
    ChainVerification, ClosureEvaluation, Event, EventPage, FinalizeOutcome, RecordOutcome,
    TaskHistory, WorkspaceId,
};

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

fn event_line(e: &Event) -> String {
    format!(
        "{}  {:<18} {:<10} {}  {}",
        e.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        e.event_type.as_str(),
        e.task_id.as_ref().map_or("-", |t| t.as_str()),
        short_hash(&e.event_hash),
        serde_json::Value::Object(e.payload.clone())
    )
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Format an appended event
pub fn format_record(outcome: &RecordOutcome, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(&json!({
            "event": outcome.event,
            "closureJob": outcome.closure_job,
        })),
        OutputMode::Human => {
            let mut out = format!(
                "appended {} to {}\n  id:   {}\n  hash: {}\n  prev: {}",
                outcome.event.event_type,
                outcome.event.workspace_id,
                outcome.event.id,
                outcome.event.event_hash,
                outcome.event.prev_hash.as_deref().unwrap_or("(genesis)")
            );
            if let Some(job) = &outcome.closure_job {
                out.push_str(&format!(
                    "\n  closure check {} scheduled for {}",
                    job.id, job.scheduled_for
                ));
            }
            out
        }
    }
}

/// Format a page of events
pub fn format_page(page: &EventPage, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(&json!({
            "events": page.events,
            "total": page.total,
            "offset": page.offset,
            "limit": page.limit,
            "hasMore": page.has_more,
        })),
        OutputMode::Human => {
            if page.events.is_empty() {
                return "(no events)".to_string();
            }
            let mut lines: Vec<String> = page.events.iter().map(event_line).collect();
            lines.push(format!(
                "({}-{} of {})",
                page.offset + 1,
                page.offset + page.events.len(),
                page.total
            ));
            lines.join("\n")
        }
    }
}

/// Format verification results
pub fn format_verification(results: &[(WorkspaceId, ChainVerification)], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(&results
            .iter()
            .map(|(ws, v)| json!({
                "workspaceId": ws,
                "valid": v.valid,
                "verifiedCount": v.verified_count,
                "errors": v.errors,
            }))
            .collect::<Vec<_>>()),
        OutputMode::Human => {
            if results.is_empty() {
                return "(no workspaces)".to_string();
            }
            let mut lines = Vec::new();
            for (ws, v) in results {
                let status = if v.valid { "ok" } else { "TAMPERED" };
                lines.push(format!("{}: {} ({} events)", ws, status, v.verified_count));
                for err in &v.errors {
                    lines.push(format!("  [{}] #{} {}: {}", err.kind, err.index, err.event_id, err.message));
                }
            }
            lines.join("\n")
        }
    }
}

/// Format a task history
pub fn format_history(history: &TaskHistory, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(history),
        OutputMode::Human => {
            let s = &history.summary;
            let mut lines = vec![format!(
                "task {}: {} events, {} PRs, {} approvals, CI {}, closure {:?}",
                history.task_id,
                s.event_count,
                s.pr_count,
                s.approval_count,
                if s.ci_passed { "passing" } else { "not passing" },
                s.closure
            )];
            lines.extend(history.events.iter().map(|e| format!("  {} {}", e.workspace_id, event_line(e))));
            lines.join("\n")
        }
    }
}

/// Format a closure evaluation
pub fn format_evaluation(evaluation: &ClosureEvaluation, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(evaluation),
        OutputMode::Human => {
            let c = &evaluation.checks;
            let verdict = if evaluation.eligible { "eligible" } else { "not eligible" };
            let mut out = format!(
                "{}/{}: {}\n  approvals {}/{}",
                evaluation.workspace_id, evaluation.task_id, verdict, c.approvals, c.required_approvals
            );
            let failing = c.failing();
            if !failing.is_empty() {
                out.push_str(&format!("\n  failing: {}", failing.join(", ")));
            }
            out
        }
    }
}

/// Format a finalization outcome
pub fn format_finalize(outcome: &FinalizeOutcome, mode: OutputMode) -> String {
    match outcome {
        FinalizeOutcome::Finalized(event) => match mode {
            OutputMode::Json => to_json(&json!({ "finalized": true, "event": event })),
            OutputMode::Human => format!("closed: {}", event_line(event)),
        },
        FinalizeOutcome::NotReady(evaluation) => match mode {
            OutputMode::Json => to_json(&json!({ "finalized": false, "evaluation": evaluation })),
            OutputMode::Human => format_evaluation(evaluation, mode),
        },
    }
}

/// Format an error
pub fn format_error(err: &anyhow::Error, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(&json!({ "error": format!("{:#}", err) })),
        OutputMode::Human => format!("(error) {:#}", err),
    }
}
