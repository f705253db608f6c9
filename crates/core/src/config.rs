//! Ledger configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration.
//!
//! ```toml
//! data_dir = "/var/lib/taskledger"
//! durability = "strict"
//! default_tier = "standard"
//!
//! [scheduler]
//! batch_size = 50
//! poll_interval_secs = 60
//! retention_hours = 168
//! max_attempts = 5
//! backoff_base_secs = 30
//! recheck_ineligible_after_hours = 12
//! ```

use crate::error::{Error, Result};
use crate::policy::PolicyTier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How appends reach disk
///
/// | Mode | Log file | fsync | Data loss window |
/// |------|----------|-------|------------------|
/// | InMemory | None | None | All (on exit) |
/// | Buffered | Append + flush | None | OS page cache |
/// | Strict | Append + flush | Every append | Zero |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityMode {
    /// No persistence
    InMemory,
    /// Flush to the OS on every append
    #[default]
    Buffered,
    /// `fdatasync` on every append
    Strict,
}

impl DurabilityMode {
    /// Whether a log file is written
    pub fn requires_log(&self) -> bool {
        !matches!(self, DurabilityMode::InMemory)
    }

    /// Whether each append is synced to stable storage
    pub fn syncs_every_append(&self) -> bool {
        matches!(self, DurabilityMode::Strict)
    }
}

/// Closure scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Maximum jobs fetched per poll
    pub batch_size: usize,
    /// Interval between polls of the background worker
    pub poll_interval_secs: u64,
    /// Jobs older than this are dropped by the queue
    pub retention_hours: u32,
    /// Attempts before a failing job is abandoned
    pub max_attempts: u32,
    /// First retry delay; doubles on each further failure
    pub backoff_base_secs: u64,
    /// Re-check a not-yet-eligible task after this many hours (off when unset)
    pub recheck_ineligible_after_hours: Option<u32>,
}

/// Upper bound on `scheduler.backoff_base_secs` (one day)
pub const MAX_BACKOFF_BASE_SECS: u64 = 86_400;

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval_secs: 60,
            retention_hours: 168,
            max_attempts: 5,
            backoff_base_secs: 30,
            recheck_ineligible_after_hours: None,
        }
    }
}

impl SchedulerConfig {
    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid("scheduler.batch_size must be greater than zero"));
        }
        if self.max_attempts == 0 {
            return Err(Error::invalid("scheduler.max_attempts must be greater than zero"));
        }
        if self.retention_hours == 0 {
            return Err(Error::invalid("scheduler.retention_hours must be greater than zero"));
        }
        if self.backoff_base_secs > MAX_BACKOFF_BASE_SECS {
            return Err(Error::invalid(format!(
                "scheduler.backoff_base_secs must be at most {}",
                MAX_BACKOFF_BASE_SECS
            )));
        }
        if self.recheck_ineligible_after_hours == Some(0) {
            return Err(Error::invalid(
                "scheduler.recheck_ineligible_after_hours must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Directory holding the event log (required unless `durability = "in_memory"`)
    pub data_dir: Option<PathBuf>,
    /// Durability mode
    pub durability: DurabilityMode,
    /// Tier applied to workspaces without an explicit policy
    pub default_tier: Option<PolicyTier>,
    /// Scheduler settings
    pub scheduler: SchedulerConfig,
}

impl LedgerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: LedgerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        if self.durability.requires_log() && self.data_dir.is_none() {
            return Err(Error::invalid(format!(
                "durability '{}' requires data_dir",
                match self.durability {
                    DurabilityMode::Strict => "strict",
                    _ => "buffered",
                }
            )));
        }
        Ok(())
    }
}
