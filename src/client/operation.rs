//! Handles for server-side operations and the rules that classify them.

use super::types::{Build, SettingsStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OperationKind {
    /// Load settings from VCS into the project
    Import { project_id: String },
    /// Check the VCS for new settings commits and apply them
    Sync { project_id: String },
    /// Commit the current server settings to VCS
    Export { project_id: String },
    Build { build_id: i64 },
}

/// A triggered server-side operation being watched by the harness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub kind: OperationKind,
    /// Settings status observed right before the trigger
    pub baseline: Option<SettingsStatus>,
}

/// Final classification of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TerminalStatus {
    Success,
    #[serde(rename = "noop")]
    NoOp {
        message: String,
    },
    Failure {
        reason: String,
    },
}

/// One observation of an operation while it is being polled
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Pending {
        status: String,
        /// False while the server still reports exactly the baseline status
        changed: bool,
    },
    Terminal(TerminalStatus),
}

impl Operation {
    pub fn import(project_id: &str, baseline: SettingsStatus) -> Self {
        Self::settings(
            OperationKind::Import {
                project_id: project_id.to_string(),
            },
            baseline,
        )
    }

    pub fn sync(project_id: &str, baseline: SettingsStatus) -> Self {
        Self::settings(
            OperationKind::Sync {
                project_id: project_id.to_string(),
            },
            baseline,
        )
    }

    pub fn export(project_id: &str, baseline: SettingsStatus) -> Self {
        Self::settings(
            OperationKind::Export {
                project_id: project_id.to_string(),
            },
            baseline,
        )
    }

    fn settings(kind: OperationKind, baseline: SettingsStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            baseline: Some(baseline),
        }
    }

    pub fn build(build_id: i64) -> Self {
        Self {
            id: build_id.to_string(),
            kind: OperationKind::Build { build_id },
            baseline: None,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::Import { project_id }
            | OperationKind::Sync { project_id }
            | OperationKind::Export { project_id } => Some(project_id),
            OperationKind::Build { .. } => None,
        }
    }

    /// Only a sync with nothing pending may leave the status record untouched
    pub fn may_settle_quietly(&self) -> bool {
        matches!(self.kind, OperationKind::Sync { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::Import { project_id } => write!(f, "settings import of {}", project_id),
            OperationKind::Sync { project_id } => write!(f, "settings sync of {}", project_id),
            OperationKind::Export { project_id } => write!(f, "settings export of {}", project_id),
            OperationKind::Build { build_id } => write!(f, "build #{}", build_id),
        }
    }
}

impl TerminalStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NoOp { message } => write!(f, "no-op ({})", message),
            Self::Failure { reason } => write!(f, "failure ({})", reason),
        }
    }
}

const NO_OP_MARKERS: &[&str] = &[
    "up-to-date",
    "up to date",
    "no changes",
    "nothing to commit",
    "already in sync",
    "already synchronized",
];

const IN_PROGRESS_MARKERS: &[&str] = &[
    "in progress",
    "running dsl",
    "loading",
    "scheduled",
    "waiting",
    "pending",
];

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

fn describe(status: &SettingsStatus) -> String {
    format!(
        "{}: {}",
        status.kind.as_deref().unwrap_or("unknown"),
        status.message.as_deref().unwrap_or("")
    )
}

/// Classify a settings status record against the record seen before the trigger
pub fn classify_settings(baseline: Option<&SettingsStatus>, current: &SettingsStatus) -> OperationStatus {
    let changed = match baseline {
        Some(b) => {
            b.timestamp != current.timestamp || b.message != current.message || b.kind != current.kind
        }
        None => current.timestamp.is_some() || current.message.is_some(),
    };

    if !changed {
        return OperationStatus::Pending {
            status: describe(current),
            changed: false,
        };
    }

    let message = current.message.clone().unwrap_or_default();

    if current.is_error() {
        return OperationStatus::Terminal(TerminalStatus::Failure { reason: message });
    }
    if contains_any(&message, NO_OP_MARKERS) {
        return OperationStatus::Terminal(TerminalStatus::NoOp { message });
    }
    if contains_any(&message, IN_PROGRESS_MARKERS) {
        return OperationStatus::Pending {
            status: describe(current),
            changed: true,
        };
    }

    OperationStatus::Terminal(TerminalStatus::Success)
}

/// Text in a queued or finished build that means a snapshot dependency cannot run
fn dependency_problem(build: &Build) -> Option<String> {
    [build.status_text.as_deref(), build.wait_reason.as_deref()]
        .into_iter()
        .flatten()
        .find(|text| {
            let lower = text.to_lowercase();
            lower.contains("dependenc")
                && (lower.contains("failed")
                    || lower.contains("not found")
                    || lower.contains("canceled")
                    || lower.contains("unresolved")
                    || lower.contains("does not exist"))
        })
        .map(str::to_string)
}

pub fn classify_build(build: &Build) -> OperationStatus {
    if let Some(info) = &build.canceled_info {
        let text = info
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("build was canceled");
        return OperationStatus::Terminal(TerminalStatus::Failure {
            reason: format!("canceled: {}", text),
        });
    }

    if let Some(problem) = dependency_problem(build) {
        return OperationStatus::Terminal(TerminalStatus::Failure { reason: problem });
    }

    match build.state.as_str() {
        "finished" => {
            if build.status.as_deref() == Some("SUCCESS") {
                OperationStatus::Terminal(TerminalStatus::Success)
            } else {
                let reason = build
                    .status_text
                    .clone()
                    .or_else(|| build.status.clone())
                    .unwrap_or_else(|| "build finished without status".to_string());
                OperationStatus::Terminal(TerminalStatus::Failure { reason })
            }
        }
        state => OperationStatus::Pending {
            status: state.to_string(),
            changed: true,
        },
    }
}
