//! Closure policies and eligibility
//!
//! [`PolicyRegistry`] answers "which rules apply to this workspace";
//! [`PolicyEngine`] applies them to a task's history and, when every check
//! passes, appends `closure_approved`.
//!
//! Resolution order for a workspace's effective policy:
//!
//! ```text
//! override policy  ->  assigned tier preset  ->  default tier preset  ->  none
//! ```
//!
//! No policy is not an error: the evaluation reports `policy_found: false`
//! and the task is simply not eligible.

use crate::event_log::EventLogService;
use crate::summary::{check_outcomes, distinct_approvers, latest_ci_outcome, ClosureState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use taskledger_core::{
    Event, EventType, Fact, Policy, PolicyTier, Result, TaskId, WorkspaceId,
};
use tracing::{debug, info};

/// Trigger source of events the engine appends
pub const POLICY_ENGINE_SOURCE: &str = "policy_engine";

#[derive(Debug, Clone, Default)]
struct Assignment {
    tier: Option<PolicyTier>,
    custom: Option<Policy>,
}

/// Per-workspace policy assignments
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    assignments: DashMap<WorkspaceId, Assignment>,
    default_tier: Option<PolicyTier>,
}

impl PolicyRegistry {
    /// Registry with no default tier
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry applying `tier` to workspaces without an assignment
    pub fn with_default_tier(tier: Option<PolicyTier>) -> Self {
        Self {
            assignments: DashMap::new(),
            default_tier: tier,
        }
    }

    /// Tier used when a workspace has no assignment
    pub fn default_tier(&self) -> Option<PolicyTier> {
        self.default_tier
    }

    /// Assign a preset tier to a workspace
    pub fn assign_tier(&self, workspace: &WorkspaceId, tier: PolicyTier) {
        self.assignments.entry(workspace.clone()).or_default().tier = Some(tier);
    }

    /// Install a workspace-specific policy that takes precedence over any tier
    pub fn set_override(&self, workspace: &WorkspaceId, policy: Policy) -> Result<()> {
        policy.validate()?;
        self.assignments.entry(workspace.clone()).or_default().custom = Some(policy);
        Ok(())
    }

    /// Remove a workspace override; returns whether one existed
    pub fn clear_override(&self, workspace: &WorkspaceId) -> bool {
        self.assignments
            .get_mut(workspace)
            .and_then(|mut a| a.custom.take())
            .is_some()
    }

    /// Policy in force for a workspace, if any
    pub fn effective_policy(&self, workspace: &WorkspaceId) -> Option<Policy> {
        let assigned = self.assignments.get(workspace).and_then(|a| {
            a.custom
                .clone()
                .or_else(|| a.tier.map(|tier| tier.preset()))
        });
        assigned.or_else(|| self.default_tier.map(|tier| tier.preset()))
    }
}

/// Every closure check, reported independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureChecks {
    /// The workspace has an effective policy
    pub policy_found: bool,
    /// Distinct approvals found
    pub approvals: u32,
    /// Approvals the policy requires
    pub required_approvals: u32,
    /// `approvals >= required_approvals`
    pub approvals_met: bool,
    /// The policy requires a passing CI run
    pub ci_required: bool,
    /// The latest CI outcome is a pass
    pub ci_passed: bool,
    /// The policy requires every named check to pass
    pub checks_required: bool,
    /// Every named check's latest outcome is a pass and CI is not failing
    pub all_checks_passed: bool,
    /// No `closure_approved` is currently authoritative for the task
    pub not_finalized: bool,
    /// No `closure_vetoed` is currently authoritative for the task
    pub not_vetoed: bool,
}

impl ClosureChecks {
    /// Whether every applicable check passes
    pub fn eligible(&self) -> bool {
        self.failing().is_empty()
    }

    /// Names of the checks that block closure
    pub fn failing(&self) -> Vec<&'static str> {
        let mut failing = Vec::new();
        if !self.policy_found {
            failing.push("policy_found");
        }
        if !self.approvals_met {
            failing.push("approvals_met");
        }
        if self.ci_required && !self.ci_passed {
            failing.push("ci_passed");
        }
        if self.checks_required && !self.all_checks_passed {
            failing.push("all_checks_passed");
        }
        if !self.not_finalized {
            failing.push("not_finalized");
        }
        if !self.not_vetoed {
            failing.push("not_vetoed");
        }
        failing
    }
}

/// Result of [`PolicyEngine::evaluate_closure`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosureEvaluation {
    /// Subject workspace
    pub workspace_id: WorkspaceId,
    /// Subject task
    pub task_id: TaskId,
    /// All checks pass
    pub eligible: bool,
    /// Policy evaluated against
    pub policy: Option<Policy>,
    /// Individual checks
    pub checks: ClosureChecks,
    /// Evaluation time
    pub evaluated_at: DateTime<Utc>,
}

/// Result of [`PolicyEngine::evaluate_and_finalize`]
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// `closure_approved` was appended
    Finalized(Event),
    /// Not eligible; nothing was appended
    NotReady(ClosureEvaluation),
}

impl FinalizeOutcome {
    /// Whether the task was finalized
    pub fn is_finalized(&self) -> bool {
        matches!(self, FinalizeOutcome::Finalized(_))
    }
}

/// Applies policies to task histories
pub struct PolicyEngine {
    events: Arc<EventLogService>,
    policies: Arc<PolicyRegistry>,
}

impl PolicyEngine {
    /// Create an engine over an event log and a registry
    pub fn new(events: Arc<EventLogService>, policies: Arc<PolicyRegistry>) -> Self {
        Self { events, policies }
    }

    /// Policy registry
    pub fn policies(&self) -> &Arc<PolicyRegistry> {
        &self.policies
    }

    /// Evaluate whether a task may be closed now
    ///
    /// Only the task's events in `workspace` are considered. Malformed
    /// payloads never fail the evaluation; at worst they do not count.
    pub fn evaluate_closure(
        &self,
        task: &TaskId,
        workspace: &WorkspaceId,
    ) -> Result<ClosureEvaluation> {
        let events = self.events.task_events_in(workspace, task)?;
        let policy = self.policies.effective_policy(workspace);

        let approvals = u32::try_from(distinct_approvers(&events).len()).unwrap_or(u32::MAX);
        let ci = latest_ci_outcome(&events);
        let checks_ok = check_outcomes(&events).values().all(|passed| *passed);
        let closure = ClosureState::from_events(&events);
        let required_approvals = policy.as_ref().map_or(0, |p| p.required_approvals);

        let checks = ClosureChecks {
            policy_found: policy.is_some(),
            approvals,
            required_approvals,
            approvals_met: approvals >= required_approvals,
            ci_required: policy.as_ref().map_or(false, |p| p.require_ci_pass),
            ci_passed: ci == Some(true),
            checks_required: policy.as_ref().map_or(false, |p| p.require_all_checks_pass),
            all_checks_passed: checks_ok && ci != Some(false),
            not_finalized: closure != ClosureState::Approved,
            not_vetoed: closure != ClosureState::Vetoed,
        };
        let eligible = checks.eligible();

        debug!(
            workspace = %workspace,
            task = %task,
            eligible,
            events = events.len(),
            failing = ?checks.failing(),
            "closure evaluated"
        );

        Ok(ClosureEvaluation {
            workspace_id: workspace.clone(),
            task_id: task.clone(),
            eligible,
            policy,
            checks,
            evaluated_at: self.events.clock().now(),
        })
    }

    /// Re-evaluate and, if eligible, append `closure_approved`
    ///
    /// Evaluation and append happen under the workspace writer lock, so no
    /// event can land between the decision and the closure record.
    pub fn evaluate_and_finalize(
        &self,
        task: &TaskId,
        workspace: &WorkspaceId,
    ) -> Result<FinalizeOutcome> {
        let mut not_ready = None;
        let appended = self.events.append_with(workspace, || {
            let evaluation = self.evaluate_closure(task, workspace)?;
            if !evaluation.eligible {
                not_ready = Some(evaluation);
                return Ok(None);
            }
            let payload = json!({
                "tier": evaluation.policy.as_ref().map(|p| p.tier.as_str()),
                "checks": serde_json::to_value(&evaluation.checks)?,
            });
            Ok(Some(
                Fact::new(workspace.clone(), EventType::ClosureApproved)
                    .task(task.clone())
                    .source(POLICY_ENGINE_SOURCE)
                    .payload(payload),
            ))
        })?;

        match (appended, not_ready) {
            (Some(event), _) => {
                info!(workspace = %workspace, task = %task, event_id = %event.id, "task closed");
                Ok(FinalizeOutcome::Finalized(event))
            }
            (None, Some(evaluation)) => Ok(FinalizeOutcome::NotReady(evaluation)),
            (None, None) => Err(taskledger_core::Error::Internal(
                "closure decision produced neither an event nor an evaluation".into(),
            )),
        }
    }
}
