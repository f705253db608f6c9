//! Closure policies
//!
//! A policy is a plain threshold record. The three tiers are a static lookup
//! table; workspaces may carry an override that replaces the tier preset.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named preset of closure thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyTier {
    /// No review gate, fast auto-close
    Agile,
    /// One approval and green CI
    Standard,
    /// Two approvals, green CI and every named check passing
    Hardened,
}

impl PolicyTier {
    /// Thresholds for this tier
    pub fn preset(&self) -> Policy {
        match self {
            PolicyTier::Agile => Policy {
                tier: PolicyTier::Agile,
                required_approvals: 0,
                require_ci_pass: false,
                require_all_checks_pass: false,
                auto_close_delay_hours: 24,
            },
            PolicyTier::Standard => Policy {
                tier: PolicyTier::Standard,
                required_approvals: 1,
                require_ci_pass: true,
                require_all_checks_pass: false,
                auto_close_delay_hours: 48,
            },
            PolicyTier::Hardened => Policy {
                tier: PolicyTier::Hardened,
                required_approvals: 2,
                require_ci_pass: true,
                require_all_checks_pass: true,
                auto_close_delay_hours: 72,
            },
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyTier::Agile => "agile",
            PolicyTier::Standard => "standard",
            PolicyTier::Hardened => "hardened",
        }
    }
}

impl fmt::Display for PolicyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "agile" => Ok(PolicyTier::Agile),
            "standard" => Ok(PolicyTier::Standard),
            "hardened" => Ok(PolicyTier::Hardened),
            other => Err(Error::invalid(format!("unknown policy tier '{}'", other))),
        }
    }
}

/// Closure rule set attached to a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Tier this policy derives from
    pub tier: PolicyTier,
    /// Distinct approvals required
    pub required_approvals: u32,
    /// Latest CI outcome must be a pass
    pub require_ci_pass: bool,
    /// Every named check must be passing
    pub require_all_checks_pass: bool,
    /// Delay between a closure proposal and its evaluation
    pub auto_close_delay_hours: u32,
}

impl Policy {
    /// Validate an edited policy
    pub fn validate(&self) -> Result<()> {
        if self.auto_close_delay_hours == 0 {
            return Err(Error::invalid("auto_close_delay_hours must be greater than zero"));
        }
        Ok(())
    }
}
