//! Delayed closure job queue
//!
//! [`JobQueue`] is the seam to whatever durable job infrastructure hosts the
//! closure scheduler. Its contract is at-least-once:
//!
//! - `fetch_due` leases jobs (`Scheduled -> Active`); a lease that is neither
//!   completed nor failed within the lease timeout is redelivered
//! - `fail` applies the queue's own retry policy: exponential backoff until
//!   `max_attempts`, then the job is abandoned as `Failed`
//! - jobs older than their retention window are dropped, whatever their state
//! - `cancel` only succeeds on a job that has not been leased yet
//!
//! [`InMemoryJobQueue`] implements the contract in-process.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use taskledger_core::{
    Clock, ClosureJob, Error, JobId, JobStatus, Result, SchedulerConfig, TaskId, WorkspaceId,
    MAX_BACKOFF_BASE_SECS,
};
use tracing::{debug, warn};

/// Parameters of a new closure job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueRequest {
    /// Subject workspace
    pub workspace_id: WorkspaceId,
    /// Subject task
    pub task_id: TaskId,
    /// Delay before the job becomes due
    pub delay: Duration,
    /// Age after which the queue drops the job
    pub retention: Duration,
}

/// Delayed, at-least-once job storage and dispatch
pub trait JobQueue: Send + Sync {
    /// Store a new job, due after `request.delay`
    fn enqueue(&self, request: EnqueueRequest) -> Result<ClosureJob>;

    /// Cancel a job that has not started
    ///
    /// Returns `false` when the job already fired, finished, or no longer
    /// exists. Those are legitimate outcomes, not errors.
    fn cancel(&self, id: &JobId) -> Result<bool>;

    /// Look a job up by id
    fn get(&self, id: &JobId) -> Result<Option<ClosureJob>>;

    /// Lease up to `limit` due jobs, earliest first
    fn fetch_due(&self, limit: usize) -> Result<Vec<ClosureJob>>;

    /// Mark a leased job done
    fn complete(&self, id: &JobId) -> Result<()>;

    /// Report a failed attempt; returns the job's resulting status
    fn fail(&self, id: &JobId, error: &str) -> Result<JobStatus>;
}

/// Retry and lease settings of [`InMemoryJobQueue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Attempts before a job is abandoned
    pub max_attempts: u32,
    /// First retry delay; doubles with every further failure
    pub backoff_base: Duration,
    /// Time after which an unanswered lease is redelivered
    pub lease_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for QueueSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: Duration::seconds(
                config.backoff_base_secs.min(MAX_BACKOFF_BASE_SECS) as i64,
            ),
            lease_timeout: Duration::minutes(15),
        }
    }
}

/// Longest retry delay the queue hands out
const MAX_BACKOFF_SECS: i64 = 7 * 24 * 3600;

impl QueueSettings {
    /// Retry delay after the given number of failed attempts (>= 1), capped at
    /// seven days
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        let millis = self
            .backoff_base
            .num_milliseconds()
            .saturating_mul(1i64 << exponent);
        Duration::milliseconds(millis).min(Duration::seconds(MAX_BACKOFF_SECS))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    job: ClosureJob,
    expires_at: DateTime<Utc>,
    leased_at: Option<DateTime<Utc>>,
}

/// In-process job queue
pub struct InMemoryJobQueue {
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    jobs: Mutex<HashMap<JobId, Entry>>,
}

impl InMemoryJobQueue {
    /// Create an empty queue
    pub fn new(clock: Arc<dyn Clock>, settings: QueueSettings) -> Self {
        Self {
            clock,
            settings,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Retry settings in effect
    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Every retained job, ordered by `scheduled_for`
    pub fn snapshot(&self) -> Vec<ClosureJob> {
        let mut jobs: Vec<ClosureJob> = self.jobs.lock().values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        jobs
    }

    /// Number of retained jobs
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Check if the queue retains no jobs
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn housekeep(&self, jobs: &mut HashMap<JobId, Entry>, now: DateTime<Utc>) {
        jobs.retain(|id, entry| {
            let keep = entry.expires_at > now;
            if !keep {
                debug!(job_id = %id, status = %entry.job.status, "job past retention dropped");
            }
            keep
        });

        for entry in jobs.values_mut() {
            let lease_expired = entry.job.status == JobStatus::Active
                && entry
                    .leased_at
                    .map_or(false, |t| t + self.settings.lease_timeout <= now);
            if lease_expired {
                warn!(job_id = %entry.job.id, "lease expired, redelivering job");
                entry.job.status = JobStatus::Scheduled;
                entry.leased_at = None;
            }
        }
    }
}

impl JobQueue for InMemoryJobQueue {
    fn enqueue(&self, request: EnqueueRequest) -> Result<ClosureJob> {
        if request.delay < Duration::zero() {
            return Err(Error::InvalidInput("job delay must not be negative".into()));
        }
        if request.retention <= request.delay {
            return Err(Error::InvalidInput(format!(
                "retention ({}h) must exceed the job delay ({}h)",
                request.retention.num_hours(),
                request.delay.num_hours()
            )));
        }

        let now = self.clock.now();
        let out_of_range = |what: &str, d: Duration| {
            Error::InvalidInput(format!("job {} of {}h is out of range", what, d.num_hours()))
        };
        let scheduled_for = now
            .checked_add_signed(request.delay)
            .ok_or_else(|| out_of_range("delay", request.delay))?;
        let expires_at = now
            .checked_add_signed(request.retention)
            .ok_or_else(|| out_of_range("retention", request.retention))?;

        let job = ClosureJob {
            id: JobId::generate(),
            workspace_id: request.workspace_id,
            task_id: request.task_id,
            created_at: now,
            scheduled_for,
            status: JobStatus::Scheduled,
            attempts: 0,
            last_error: None,
        };
        self.jobs.lock().insert(
            job.id.clone(),
            Entry {
                job: job.clone(),
                expires_at,
                leased_at: None,
            },
        );
        Ok(job)
    }

    fn cancel(&self, id: &JobId) -> Result<bool> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock();
        self.housekeep(&mut jobs, now);
        match jobs.get_mut(id) {
            Some(entry) if entry.job.status == JobStatus::Scheduled => {
                entry.job.status = JobStatus::Vetoed;
                Ok(true)
            }
            Some(entry) if entry.job.status.is_terminal() => {
                debug!(
                    job_id = %id,
                    status = %entry.job.status,
                    "job already finished, not cancelled"
                );
                Ok(false)
            }
            Some(_) => {
                debug!(job_id = %id, "job already leased, not cancelled");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn get(&self, id: &JobId) -> Result<Option<ClosureJob>> {
        Ok(self.jobs.lock().get(id).map(|e| e.job.clone()))
    }

    fn fetch_due(&self, limit: usize) -> Result<Vec<ClosureJob>> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock();
        self.housekeep(&mut jobs, now);

        let mut due: Vec<&mut Entry> = jobs.values_mut().filter(|e| e.job.is_due(now)).collect();
        due.sort_by(|a, b| {
            a.job
                .scheduled_for
                .cmp(&b.job.scheduled_for)
                .then_with(|| a.job.created_at.cmp(&b.job.created_at))
                .then_with(|| a.job.id.cmp(&b.job.id))
        });
        due.truncate(limit);

        Ok(due
            .into_iter()
            .map(|entry| {
                entry.job.status = JobStatus::Active;
                entry.leased_at = Some(now);
                entry.job.clone()
            })
            .collect())
    }

    fn complete(&self, id: &JobId) -> Result<()> {
        let mut jobs = self.jobs.lock();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
        if entry.job.status != JobStatus::Active {
            return Err(Error::Queue(format!(
                "job {} is {}, only active jobs can complete",
                id, entry.job.status
            )));
        }
        entry.job.status = JobStatus::Completed;
        entry.leased_at = None;
        Ok(())
    }

    fn fail(&self, id: &JobId, error: &str) -> Result<JobStatus> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
        if entry.job.status != JobStatus::Active {
            return Err(Error::Queue(format!(
                "job {} is {}, only active jobs can fail",
                id, entry.job.status
            )));
        }

        entry.job.attempts += 1;
        entry.job.last_error = Some(error.to_string());
        entry.leased_at = None;
        if entry.job.attempts >= self.settings.max_attempts {
            entry.job.status = JobStatus::Failed;
            warn!(job_id = %id, attempts = entry.job.attempts, error, "job abandoned");
        } else if let Some(retry_at) =
            now.checked_add_signed(self.settings.backoff(entry.job.attempts))
        {
            entry.job.status = JobStatus::Scheduled;
            entry.job.scheduled_for = retry_at;
            debug!(job_id = %id, attempts = entry.job.attempts, %retry_at, "job retry scheduled");
        } else {
            entry.job.status = JobStatus::Failed;
            warn!(
                job_id = %id,
                attempts = entry.job.attempts,
                error,
                "retry time out of range, job abandoned"
            );
        }
        Ok(entry.job.status)
    }
}
