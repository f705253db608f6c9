//! Optimistic closure scheduler
//!
//! A closure proposal becomes a delayed job. When the job comes due the
//! policy engine re-evaluates the task and either closes it or reports it
//! not ready. Until then anyone may veto it.
//!
//! ```text
//! scheduled ──veto──────────────────────────> vetoed
//!     │
//!     └──due──> evaluate_and_finalize ──ok──> completed (finalized | not ready)
//!                        │
//!                        └──error──> queue.fail (retry with backoff, then failed)
//! ```
//!
//! A veto that arrives after the job was leased loses the race: both
//! `closure_approved` and `closure_vetoed` may then exist for the task, and
//! the later one in chain order is authoritative.
//!
//! Jobs in a batch run sequentially. An error in one job is reported to the
//! queue and counted; it never stops the rest of the batch.

use crate::event_log::EventLogService;
use crate::policy::{FinalizeOutcome, PolicyEngine};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::thread::JoinHandle;
use taskledger_core::{
    ClosureJob, Error, Event, EventType, Fact, JobId, Result, SchedulerConfig, TaskId, WorkspaceId,
};
use taskledger_storage::{EnqueueRequest, JobQueue};
use tracing::{debug, error, info, warn};

/// Trigger source of `closure_vetoed` events
pub const VETO_SOURCE: &str = "veto";

/// Tally of one `process_pending_jobs` run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// Jobs evaluated and completed, finalized or not
    pub processed: usize,
    /// Jobs whose evaluation or completion failed
    pub failed: usize,
    /// Completed jobs that closed their task
    pub finalized: usize,
    /// Completed jobs whose task was not eligible
    pub not_ready: usize,
    /// When the run started
    pub timestamp: DateTime<Utc>,
}

/// Who vetoed a closure and why
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VetoRequest {
    /// Free-form reason
    pub reason: Option<String>,
    /// Identity of the vetoing party
    pub vetoed_by: Option<String>,
}

/// Result of [`ClosureScheduler::veto_closure`]
#[derive(Debug, Clone, PartialEq)]
pub struct VetoOutcome {
    /// The job was cancelled before it fired
    pub cancelled: bool,
    /// The recorded `closure_vetoed` event
    pub event: Event,
}

struct Inner {
    queue: Arc<dyn JobQueue>,
    engine: Arc<PolicyEngine>,
    events: Arc<EventLogService>,
    config: SchedulerConfig,
    stopping: Mutex<bool>,
    wake: Condvar,
}

/// Schedules, cancels and runs delayed closure checks
pub struct ClosureScheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ClosureScheduler {
    /// Create a scheduler; no worker runs until [`start`](Self::start)
    pub fn new(
        queue: Arc<dyn JobQueue>,
        engine: Arc<PolicyEngine>,
        events: Arc<EventLogService>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                engine,
                events,
                config,
                stopping: Mutex::new(false),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Job queue handle
    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.inner.queue
    }

    /// Settings in effect
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Enqueue a closure check due after `delay_hours`
    ///
    /// The queue retains the job for `retention_hours` past its due time.
    pub fn schedule_closure_check(
        &self,
        workspace: &WorkspaceId,
        task: &TaskId,
        delay_hours: u32,
    ) -> Result<JobId> {
        self.inner.schedule(workspace, task, delay_hours)
    }

    /// Cancel a job that has not fired yet
    pub fn cancel_closure_job(&self, job_id: &JobId) -> Result<bool> {
        let cancelled = self.inner.queue.cancel(job_id)?;
        debug!(job_id = %job_id, cancelled, "closure job cancel requested");
        Ok(cancelled)
    }

    /// Run one batch of due jobs
    ///
    /// Only a failure to fetch the batch is an error; per-job failures are
    /// counted in the report.
    pub fn process_pending_jobs(&self) -> Result<ProcessReport> {
        self.inner.process_pending_jobs()
    }

    /// Cancel a closure job and record the veto
    ///
    /// The `closure_vetoed` event is appended whether or not the cancellation
    /// won the race; its payload says which.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: the job exists but belongs to another workspace or task
    pub fn veto_closure(
        &self,
        job_id: &JobId,
        workspace: &WorkspaceId,
        task: &TaskId,
        request: VetoRequest,
    ) -> Result<VetoOutcome> {
        if let Some(job) = self.inner.queue.get(job_id)? {
            if &job.workspace_id != workspace || &job.task_id != task {
                return Err(Error::InvalidInput(format!(
                    "job {} belongs to {}/{}, not {}/{}",
                    job_id, job.workspace_id, job.task_id, workspace, task
                )));
            }
        }

        let cancelled = self.cancel_closure_job(job_id)?;
        let event = self.inner.events.append_fact(
            Fact::new(workspace.clone(), EventType::ClosureVetoed)
                .task(task.clone())
                .source(VETO_SOURCE)
                .payload(json!({
                    "jobId": job_id.as_str(),
                    "cancelled": cancelled,
                    "reason": request.reason,
                    "vetoedBy": request.vetoed_by,
                })),
        )?;

        info!(
            workspace = %workspace,
            task = %task,
            job_id = %job_id,
            cancelled,
            "closure vetoed"
        );
        Ok(VetoOutcome { cancelled, event })
    }

    /// Spawn the polling worker; a no-op if it is already running
    ///
    /// The worker runs a batch immediately, then once per `poll_interval`.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        *self.inner.stopping.lock() = false;

        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("taskledger-closure".into())
            .spawn(move || inner.run_worker())?;
        *worker = Some(handle);
        info!(poll_interval_secs = self.inner.config.poll_interval_secs, "closure worker started");
        Ok(())
    }

    /// Signal the worker and wait for it to exit; a no-op if it is not running
    pub fn stop(&self) {
        let handle = match self.worker.lock().take() {
            Some(handle) => handle,
            None => return,
        };
        *self.inner.stopping.lock() = true;
        self.inner.wake.notify_all();
        if handle.join().is_err() {
            error!("closure worker panicked");
        }
        info!("closure worker stopped");
    }

    /// Whether the worker thread is running
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for ClosureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn hours(n: u32) -> Result<Duration> {
    Duration::try_hours(i64::from(n))
        .ok_or_else(|| Error::InvalidInput(format!("{} hours is out of range", n)))
}

impl Inner {
    fn schedule(&self, workspace: &WorkspaceId, task: &TaskId, delay_hours: u32) -> Result<JobId> {
        if workspace.is_blank() || task.is_blank() {
            return Err(Error::InvalidInput(
                "closure check needs a workspace and a task".into(),
            ));
        }
        let delay = hours(delay_hours)?;
        let retention = hours(self.config.retention_hours)?
            .checked_add(&delay)
            .ok_or_else(|| Error::InvalidInput("closure job retention is out of range".into()))?;
        let job = self.queue.enqueue(EnqueueRequest {
            workspace_id: workspace.clone(),
            task_id: task.clone(),
            delay,
            retention,
        })?;
        info!(
            workspace = %workspace,
            task = %task,
            job_id = %job.id,
            scheduled_for = %job.scheduled_for,
            "closure check scheduled"
        );
        Ok(job.id)
    }

    fn process_pending_jobs(&self) -> Result<ProcessReport> {
        let mut report = ProcessReport {
            processed: 0,
            failed: 0,
            finalized: 0,
            not_ready: 0,
            timestamp: self.events.clock().now(),
        };

        let jobs = self.queue.fetch_due(self.config.batch_size)?;
        for job in jobs {
            match self.process_job(&job) {
                Ok(finalized) => {
                    report.processed += 1;
                    if finalized {
                        report.finalized += 1;
                    } else {
                        report.not_ready += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(job_id = %job.id, task = %job.task_id, error = %e, "closure job failed");
                    if let Err(fail_err) = self.queue.fail(&job.id, &e.to_string()) {
                        warn!(job_id = %job.id, error = %fail_err, "could not report job failure");
                    }
                }
            }
        }

        if report.processed + report.failed > 0 {
            info!(
                processed = report.processed,
                failed = report.failed,
                finalized = report.finalized,
                not_ready = report.not_ready,
                "closure batch processed"
            );
        }
        Ok(report)
    }

    /// Evaluate one job; `Ok(true)` when the task was closed
    fn process_job(&self, job: &ClosureJob) -> Result<bool> {
        let outcome = self
            .engine
            .evaluate_and_finalize(&job.task_id, &job.workspace_id)?;
        self.queue.complete(&job.id)?;

        match outcome {
            FinalizeOutcome::Finalized(_) => Ok(true),
            FinalizeOutcome::NotReady(evaluation) => {
                debug!(
                    job_id = %job.id,
                    task = %job.task_id,
                    failing = ?evaluation.checks.failing(),
                    "task not ready for closure"
                );
                if let Some(hours) = self.config.recheck_ineligible_after_hours {
                    // no recheck once a decision is on the chain
                    let settled = !evaluation.checks.not_finalized || !evaluation.checks.not_vetoed;
                    if !settled {
                        if let Err(e) = self.schedule(&job.workspace_id, &job.task_id, hours) {
                            warn!(job_id = %job.id, error = %e, "could not schedule recheck");
                        }
                    }
                }
                Ok(false)
            }
        }
    }

    fn run_worker(&self) {
        loop {
            if let Err(e) = self.process_pending_jobs() {
                warn!(error = %e, "closure batch aborted");
            }

            let mut stopping = self.stopping.lock();
            if !*stopping {
                let _ = self
                    .wake
                    .wait_for(&mut stopping, self.config.poll_interval());
            }
            if *stopping {
                return;
            }
        }
    }
}
