//! Timestamped record of one apply call

use crate::apply::ApplyOutcome;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The outcomes of one apply, with when it ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied_at: DateTime<Utc>,
    pub detailed_log: bool,
    pub outcomes: Vec<ApplyOutcome>,
}

impl ApplyReport {
    /// Create a report stamped with the current time
    pub fn new(detailed_log: bool, outcomes: Vec<ApplyOutcome>) -> Self {
        Self {
            applied_at: Utc::now(),
            detailed_log,
            outcomes,
        }
    }

    pub fn committed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.committed).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes.len() - self.committed_count()
    }

    pub fn all_committed(&self) -> bool {
        self.rejected_count() == 0
    }

    /// Load a report from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the report to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
