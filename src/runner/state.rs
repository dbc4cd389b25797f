use crate::error::{HarnessError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How a single scenario ended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScenarioOutcome {
    Passed,
    Failed { message: String },
    Errored { message: String },
    #[serde(rename = "timeout")]
    TimedOut { message: String },
    Skipped { reason: String },
}

impl ScenarioOutcome {
    /// Map the value a scenario returned onto an outcome
    pub fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(HarnessError::Assertion(message)) => Self::Failed {
                message: message.clone(),
            },
            Err(e @ HarnessError::Timeout { .. }) => Self::TimedOut {
                message: e.to_string(),
            },
            Err(e) => Self::Errored {
                message: e.to_string(),
            },
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::Errored { .. } => "error",
            Self::TimedOut { .. } => "timeout",
            Self::Skipped { .. } => "skipped",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Failed { message } | Self::Errored { message } | Self::TimedOut { message } => {
                Some(message)
            }
            Self::Skipped { reason } => Some(reason),
        }
    }
}

/// API response kept with a scenario result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapturedResponse {
    pub label: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub suite: String,
    pub name: String,
    pub outcome: ScenarioOutcome,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<CapturedResponse>,
    /// Named timings recorded by the scenario, in milliseconds
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, u64>,
}

/// Summary counts; timed-out scenarios are counted as errored
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counts {
    pub passed: u32,
    pub failed: u32,
    pub errored: u32,
    pub skipped: u32,
}

impl Counts {
    pub fn record(&mut self, outcome: &ScenarioOutcome) {
        match outcome {
            ScenarioOutcome::Passed => self.passed += 1,
            ScenarioOutcome::Failed { .. } => self.failed += 1,
            ScenarioOutcome::Errored { .. } | ScenarioOutcome::TimedOut { .. } => {
                self.errored += 1
            }
            ScenarioOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: &Counts) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.errored += other.errored;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.errored + self.skipped
    }

    /// No executed scenario failed or errored
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

impl<'a> FromIterator<&'a ScenarioOutcome> for Counts {
    fn from_iter<I: IntoIterator<Item = &'a ScenarioOutcome>>(iter: I) -> Self {
        let mut counts = Counts::default();
        for outcome in iter {
            counts.record(outcome);
        }
        counts
    }
}

/// Content of one `<suite>.json` result file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuiteResults {
    pub suite: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub scenarios: Vec<ScenarioResult>,
    pub summary: Counts,
}

impl SuiteResults {
    pub fn new(suite: &str, session_id: &str) -> Self {
        Self {
            suite: suite.to_string(),
            session_id: session_id.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            scenarios: Vec::new(),
            summary: Counts::default(),
        }
    }

    pub fn push(&mut self, result: ScenarioResult) {
        self.summary.record(&result.outcome);
        self.scenarios.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn file_name(suite: &str) -> String {
        format!("{}.json", suite)
    }

    /// Write `<dir>/<suite>.json`, creating `dir` if needed
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(&self.suite));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
