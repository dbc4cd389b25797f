use crate::runner::state::{Counts, ScenarioResult};
use serde::{Deserialize, Serialize};

/// Whether a suite produced a readable result file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SuiteStatus {
    Ran,
    #[serde(rename = "not_run")]
    NotRun { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuiteEntry {
    pub suite: String,
    pub status: SuiteStatus,
    pub summary: Counts,
    pub duration_ms: Option<u64>,
}

impl SuiteEntry {
    pub fn not_run(suite: &str, reason: &str) -> Self {
        Self {
            suite: suite.to_string(),
            status: SuiteStatus::NotRun {
                reason: reason.to_string(),
            },
            summary: Counts::default(),
            duration_ms: None,
        }
    }

    pub fn ran(&self) -> bool {
        self.status == SuiteStatus::Ran
    }
}

/// Every suite of a run merged into one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedReport {
    pub generated_at: String,
    pub session_ids: Vec<String>,
    pub suites: Vec<SuiteEntry>,
    pub summary: Counts,
    /// Every scenario of every suite that ran
    pub scenarios: Vec<ScenarioResult>,
}

impl ConsolidatedReport {
    pub fn suite(&self, name: &str) -> Option<&SuiteEntry> {
        self.suites.iter().find(|s| s.suite == name)
    }

    /// Every suite ran and nothing failed or errored
    pub fn all_passed(&self) -> bool {
        self.suites.iter().all(SuiteEntry::ran) && self.summary.all_passed()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.suites.iter().filter_map(|s| s.duration_ms).sum()
    }
}
