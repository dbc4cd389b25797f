//! Error taxonomy shared by the API client, suites and provisioner.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Non-2xx answer, malformed body or a network failure talking to the server.
    #[error("API error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
        transient: bool,
    },

    /// A polled operation never reached a terminal status.
    #[error("{operation} did not reach a terminal status within {timeout:?} ({attempts} checks)")]
    Timeout {
        operation: String,
        timeout: Duration,
        attempts: u32,
    },

    #[error("provisioning failed: {0}")]
    Provision(String),

    /// Expected vs actual mismatch inside a scenario.
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("build configuration {build_type} has unresolved dependencies: {}", missing.join(", "))]
    UnresolvedDependency {
        build_type: String,
        missing: Vec<String>,
    },

    #[error("version control error: {0}")]
    Vcs(String),

    /// Settings DSL that cannot be rendered or parsed.
    #[error("settings DSL error: {0}")]
    Dsl(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
            message: message.into(),
            transient: matches!(status, 502..=504),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
            transient: true,
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api { transient: true, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            return Self::network(e.to_string());
        }
        match e.status() {
            Some(status) => Self::api(status.as_u16(), e.to_string()),
            None => Self::Api {
                status: None,
                message: e.to_string(),
                transient: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_are_transient() {
        assert!(HarnessError::api(503, "unavailable").is_transient());
        assert!(HarnessError::api(502, "bad gateway").is_transient());
        assert!(!HarnessError::api(400, "bad request").is_transient());
        assert!(!HarnessError::api(404, "missing").is_transient());
        assert!(HarnessError::network("connection refused").is_transient());
    }

    #[test]
    fn test_api_error_display() {
        let err = HarnessError::api(409, "Project with id already exists");
        assert_eq!(
            err.to_string(),
            "API error (409): Project with id already exists"
        );
        assert_eq!(err.status(), Some(409));

        let err = HarnessError::network("connection reset");
        assert_eq!(err.to_string(), "API error: connection reset");
    }

    #[test]
    fn test_unresolved_dependency_display() {
        let err = HarnessError::UnresolvedDependency {
            build_type: "Proj_Build".to_string(),
            missing: vec!["Proj_Test".to_string(), "Proj_Lint".to_string()],
        };
        assert!(err.to_string().contains("Proj_Test, Proj_Lint"));
    }
}
