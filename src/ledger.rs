//! Main entry point for taskledger.
//!
//! This module provides the `Ledger` struct, which wires an event store, the
//! event log service, the policy registry and engine, and the closure
//! scheduler together.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskledger_core::{
    ChainVerification, Clock, ClosureJob, DurabilityMode, Event, Fact, LedgerConfig, PolicyTier,
    SchedulerConfig, SystemClock, WorkspaceId,
};
use taskledger_engine::{ClosureScheduler, EventLogService, PolicyEngine, PolicyRegistry};
use taskledger_storage::{
    EventStore, FileEventStore, InMemoryEventStore, InMemoryJobQueue, JobQueue, QueueSettings,
};
use tracing::{debug, info, warn};

/// The task ledger.
///
/// Create one with [`Ledger::open`], [`Ledger::in_memory`] or
/// [`Ledger::builder`].
///
/// # Example
///
/// ```ignore
/// use taskledger::prelude::*;
///
/// let ledger = Ledger::in_memory()?;
/// ledger.policies.assign_tier(&"acme".into(), PolicyTier::Standard);
///
/// let outcome = ledger.record_fact(
///     Fact::new("acme", EventType::TaskCompleted).task("T-1"),
/// )?;
/// assert!(outcome.closure_job.is_some());
///
/// let report = ledger.verify_workspace(&"acme".into())?;
/// assert!(report.valid);
/// ```
pub struct Ledger {
    config: LedgerConfig,
    file_store: Option<Arc<FileEventStore>>,

    /// Chained event appends and queries
    pub events: Arc<EventLogService>,

    /// Per-workspace closure policies
    pub policies: Arc<PolicyRegistry>,

    /// Closure eligibility and finalization
    pub engine: Arc<PolicyEngine>,

    /// Delayed, vetoable closure checks
    pub scheduler: ClosureScheduler,
}

/// Result of [`Ledger::record_fact`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// The appended event
    pub event: Event,
    /// Closure job scheduled because the event proposed closure
    pub closure_job: Option<ClosureJob>,
}

impl Ledger {
    /// Open a file-backed ledger in `path`.
    ///
    /// Uses buffered durability.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).open()
    }

    /// Create a ledger that keeps everything in memory.
    ///
    /// Nothing is written to disk and all data is lost on drop.
    pub fn in_memory() -> Result<Self> {
        Self::builder().in_memory().open()
    }

    /// Create a builder for ledger configuration.
    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::new()
    }

    /// Record a fact as the next event of its workspace.
    ///
    /// When the event proposes closure (`task_completed`, `closure_proposed`)
    /// and the workspace has an effective policy, a closure check is scheduled
    /// after the policy's `auto_close_delay_hours`.
    ///
    /// Only an append error fails the call, and it leaves nothing recorded.
    /// Once the event is in the chain the call succeeds: if scheduling the
    /// closure check fails, a warning is logged and `closure_job` is `None`.
    /// Retrying would record the fact twice.
    pub fn record_fact(&self, fact: Fact) -> Result<RecordOutcome> {
        let event = self.events.append_fact(fact)?;

        let closure_job = match (&event.task_id, event.event_type.proposes_closure()) {
            (Some(task), true) => match self.policies.effective_policy(&event.workspace_id) {
                Some(policy) => {
                    let scheduled = self
                        .scheduler
                        .schedule_closure_check(
                            &event.workspace_id,
                            task,
                            policy.auto_close_delay_hours,
                        )
                        .and_then(|job_id| self.scheduler.queue().get(&job_id));
                    match scheduled {
                        Ok(job) => job,
                        Err(e) => {
                            warn!(
                                workspace = %event.workspace_id,
                                task = %task,
                                event_id = %event.id,
                                error = %e,
                                "event recorded but closure check not scheduled"
                            );
                            None
                        }
                    }
                }
                None => {
                    debug!(
                        workspace = %event.workspace_id,
                        task = %task,
                        "closure proposed without a policy, nothing scheduled"
                    );
                    None
                }
            },
            _ => None,
        };

        Ok(RecordOutcome { event, closure_job })
    }

    /// Verify one workspace's chain.
    pub fn verify_workspace(&self, workspace: &WorkspaceId) -> Result<ChainVerification> {
        self.events.verify_workspace(workspace)
    }

    /// Verify every workspace, in workspace order.
    pub fn verify_all(&self) -> Result<Vec<(WorkspaceId, ChainVerification)>> {
        self.events
            .store()
            .workspaces()?
            .into_iter()
            .map(|ws| {
                let verification = self.events.verify_workspace(&ws)?;
                Ok((ws, verification))
            })
            .collect()
    }

    /// Force buffered log writes to stable storage.
    ///
    /// A no-op for in-memory ledgers.
    pub fn flush(&self) -> Result<()> {
        match &self.file_store {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }

    /// Stop the closure worker and flush the log.
    pub fn close(&self) -> Result<()> {
        self.scheduler.stop();
        self.flush()
    }

    /// Data directory, `None` for in-memory ledgers.
    pub fn path(&self) -> Option<&Path> {
        self.file_store.as_ref().map(|store| {
            store.path().parent().unwrap_or_else(|| store.path())
        })
    }

    /// Durability mode in effect.
    pub fn durability_mode(&self) -> DurabilityMode {
        self.config.durability
    }

    /// Configuration the ledger was opened with.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

/// Builder for ledger configuration.
///
/// # Example
///
/// ```ignore
/// // Production: file-backed, fsync on every append
/// let ledger = Ledger::builder()
///     .path("./ledger-data")
///     .strict()
///     .default_tier(PolicyTier::Standard)
///     .open()?;
///
/// // Tests: in memory, with a controllable clock
/// let clock = Arc::new(ManualClock::new(Utc::now()));
/// let ledger = Ledger::builder().in_memory().clock(clock.clone()).open()?;
/// ```
pub struct LedgerBuilder {
    config: LedgerConfig,
    clock: Option<Arc<dyn Clock>>,
    queue: Option<Arc<dyn JobQueue>>,
}

impl LedgerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: LedgerConfig::default(),
            clock: None,
            queue: None,
        }
    }

    /// Start from a loaded configuration.
    pub fn config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the data directory.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.data_dir = Some(PathBuf::from(path.as_ref()));
        self
    }

    /// Keep everything in memory; no files are created.
    pub fn in_memory(mut self) -> Self {
        self.config.durability = DurabilityMode::InMemory;
        self
    }

    /// Flush the log on every append (default).
    pub fn buffered(mut self) -> Self {
        self.config.durability = DurabilityMode::Buffered;
        self
    }

    /// Flush and fsync the log on every append.
    pub fn strict(mut self) -> Self {
        self.config.durability = DurabilityMode::Strict;
        self
    }

    /// Tier applied to workspaces without an explicit policy.
    pub fn default_tier(mut self, tier: PolicyTier) -> Self {
        self.config.default_tier = Some(tier);
        self
    }

    /// Scheduler settings.
    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.config.scheduler = scheduler;
        self
    }

    /// Time source for event timestamps and job timing.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Job queue hosting closure jobs (an in-process queue by default).
    pub fn job_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Open the ledger.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: invalid configuration, e.g. a file-backed mode
    ///   without a data directory
    /// - `Corruption` / `Io`: the existing log could not be recovered
    pub fn open(self) -> Result<Ledger> {
        let config = self.config;
        config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let (store, file_store) = match (&config.data_dir, config.durability) {
            (_, DurabilityMode::InMemory) => {
                let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
                (store, None)
            }
            (Some(dir), mode) => {
                let file = Arc::new(FileEventStore::open(dir, mode)?);
                let store: Arc<dyn EventStore> = file.clone();
                (store, Some(file))
            }
            (None, _) => {
                return Err(Error::InvalidInput(
                    "a file-backed ledger needs a data directory".into(),
                ))
            }
        };

        let queue = self.queue.unwrap_or_else(|| {
            Arc::new(InMemoryJobQueue::new(
                clock.clone(),
                QueueSettings::from(&config.scheduler),
            ))
        });

        let events = Arc::new(EventLogService::new(store, clock));
        let policies = Arc::new(PolicyRegistry::with_default_tier(config.default_tier));
        let engine = Arc::new(PolicyEngine::new(events.clone(), policies.clone()));
        let scheduler = ClosureScheduler::new(
            queue,
            engine.clone(),
            events.clone(),
            config.scheduler.clone(),
        );

        info!(
            durability = ?config.durability,
            data_dir = ?config.data_dir,
            default_tier = ?config.default_tier,
            "ledger opened"
        );

        Ok(Ledger {
            config,
            file_store,
            events,
            policies,
            engine,
            scheduler,
        })
    }
}

impl Default for LedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
