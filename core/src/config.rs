//! Runtime configuration. Serde structs with defaults, loadable from a
//! JSON document.

use crate::{error::ReconResult, planner::Split};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Schedule applied when an account has installments enabled but no
    /// custom splits configured.
    pub default_splits: Vec<Split>,
    pub suspicion: SuspicionConfig,
    /// Master switch for the outbound notification sender.
    pub notifications_enabled: bool,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            default_splits: vec![Split::new(30, 0), Split::new(70, 15)],
            suspicion: SuspicionConfig::default(),
            notifications_enabled: true,
        }
    }
}

impl ReconConfig {
    pub fn from_json(raw: &str) -> ReconResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspicionConfig {
    /// Days past the due date before an unresolved tranche counts as
    /// overdue. Zero means the literal due date is the deadline.
    pub grace_days: i64,
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self { grace_days: 0 }
    }
}
