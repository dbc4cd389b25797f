use crate::error::{HarnessError, Result};
use crate::suites::Suite;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run configuration, loaded once at startup and shared read-only (`Arc<RunConfig>`).
///
/// Sources are layered: built-in defaults, then an optional YAML file, then
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub server: ServerConfig,
    pub git: GitConfig,
    pub timeouts: Timeouts,

    /// Suites executed by `run` when none are given on the command line
    pub suites: Vec<Suite>,

    /// Delete created projects and branches after each scenario
    pub cleanup: bool,

    /// Prefix of every project id created by the harness
    pub project_prefix: String,

    /// Compose file used by `--provision` and `cleanup --containers`
    pub compose_file: Option<PathBuf>,

    /// Extra directory of `*.kts` templates, searched before the built-in ones
    pub templates_dir: Option<PathBuf>,

    /// Value of `version = "..."` in rendered Kotlin DSL
    pub dsl_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub token: Option<String>,
    /// Server version, informational (used in the compose environment)
    pub version: Option<String>,
    /// Super user token used only to create the admin account during bootstrap
    pub super_user_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub repo_url: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
    /// Location of the settings entry point inside the repository
    pub settings_path: String,
    /// Each scenario pushes to `<branch_prefix><project id>`
    pub branch_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Import / sync / export operations
    pub operation_secs: u64,
    pub build_secs: u64,
    pub poll_interval_secs: u64,
    pub readiness_secs: u64,
    pub readiness_interval_secs: u64,
    pub request_secs: u64,
    /// Attempts per request before a transient error is surfaced
    pub max_retries: u32,
    /// How long a sync may leave the status record untouched before it counts as a no-op
    pub sync_quiet_secs: u64,
}

/// How requests authenticate against the server
#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    Token(String),
    Basic { username: String, password: String },
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            git: GitConfig::default(),
            timeouts: Timeouts::default(),
            suites: Suite::ALL.to_vec(),
            cleanup: true,
            project_prefix: "TestProj_".to_string(),
            compose_file: None,
            templates_dir: None,
            dsl_version: "2024.03".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8111".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            token: None,
            version: None,
            super_user_token: None,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            repo_url: None,
            username: None,
            token: None,
            settings_path: ".teamcity/settings.kts".to_string(),
            branch_prefix: "vset/".to_string(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            operation_secs: 120,
            build_secs: 300,
            poll_interval_secs: 2,
            readiness_secs: 600,
            readiness_interval_secs: 10,
            request_secs: 30,
            max_retries: 3,
            sync_quiet_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn credentials(&self) -> Credentials {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => Credentials::Token(token.to_string()),
            _ => Credentials::Basic {
                username: self.username.clone(),
                password: self.password.clone(),
            },
        }
    }
}

impl GitConfig {
    /// Scenarios that push settings are skipped without a repository
    pub fn is_configured(&self) -> bool {
        self.repo_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn branch_for(&self, project_id: &str) -> String {
        format!("{}{}", self.branch_prefix, project_id)
    }
}

impl Timeouts {
    pub fn operation(&self) -> Duration {
        Duration::from_secs(self.operation_secs)
    }

    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness_secs)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn sync_quiet(&self) -> Duration {
        Duration::from_secs(self.sync_quiet_secs)
    }
}

impl RunConfig {
    /// Defaults, overlaid by the YAML file (if any), overlaid by the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| HarnessError::Config(format!("invalid config file: {}", e)))
    }

    /// Overlay values found through `lookup`; empty values are ignored
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TEAMCITY_URL") {
            self.server.url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("TEAMCITY_USERNAME") {
            self.server.username = v;
        }
        if let Some(v) = get("TEAMCITY_PASSWORD") {
            self.server.password = v;
        }
        if let Some(v) = get("TEAMCITY_TOKEN") {
            self.server.token = Some(v);
        }
        if let Some(v) = get("TEAMCITY_VERSION") {
            self.server.version = Some(v);
        }
        if let Some(v) = get("TEAMCITY_SUPER_USER_TOKEN") {
            self.server.super_user_token = Some(v);
        }
        if let Some(v) = get("GIT_REPO_URL") {
            self.git.repo_url = Some(v);
        }
        if let Some(v) = get("GIT_USERNAME") {
            self.git.username = Some(v);
        }
        if let Some(v) = get("GIT_TOKEN") {
            self.git.token = Some(v);
        }
        if let Some(v) = get("TEST_SUITES") {
            self.suites = Suite::parse_list(&v)?;
        }
        if let Some(v) = get("TEST_PROJECT_PREFIX") {
            self.project_prefix = v;
        }
        if let Some(v) = get("CLEANUP") {
            self.cleanup = parse_flag("CLEANUP", &v)?;
        }
        if let Some(v) = get("COMPOSE_FILE") {
            self.compose_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DSL_TEMPLATES_DIR") {
            self.templates_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DSL_VERSION") {
            self.dsl_version = v;
        }
        if let Some(v) = get("OPERATION_TIMEOUT_SECS") {
            self.timeouts.operation_secs = parse_number("OPERATION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("BUILD_TIMEOUT_SECS") {
            self.timeouts.build_secs = parse_number("BUILD_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL_SECS") {
            self.timeouts.poll_interval_secs = parse_number("POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("READINESS_TIMEOUT_SECS") {
            self.timeouts.readiness_secs = parse_number("READINESS_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("SYNC_QUIET_SECS") {
            self.timeouts.sync_quiet_secs = parse_number("SYNC_QUIET_SECS", &v)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(HarnessError::Config("server url is empty".to_string()));
        }
        url::Url::parse(&self.server.url).map_err(|e| {
            HarnessError::Config(format!("invalid server url '{}': {}", self.server.url, e))
        })?;
        if self.project_prefix.is_empty() {
            return Err(HarnessError::Config(
                "project prefix must not be empty".to_string(),
            ));
        }
        if self.timeouts.max_retries == 0 {
            return Err(HarnessError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(HarnessError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        HarnessError::Config(format!("{} must be a whole number, got '{}'", key, value))
    })
}
