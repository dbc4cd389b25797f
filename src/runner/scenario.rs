//! Scenario definitions and the per-scenario context they run against.

use super::events::{EventEmitter, TestEvent};
use super::state::CapturedResponse;
use crate::client::types::{BuildTypeRef, NewProject, Project, Properties};
use crate::client::{
    poll_status, trigger_checked_build, wait_until, CiServer, Operation, OperationKind,
    PollConfig, TerminalStatus,
};
use crate::dsl::TemplateLoader;
use crate::error::{HarnessError, Result};
use crate::suites::{fixtures, Suite};
use crate::utils::clock::Clock;
use crate::utils::config::RunConfig;
use crate::vcs::{RepositoryFactory, SettingsRepository};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

pub type ScenarioFn = for<'a> fn(&'a mut ScenarioContext) -> BoxFuture<'a, Result<()>>;

/// One independent test case of a suite
#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub run: ScenarioFn,
    /// Reported as skipped when no settings repository is configured
    pub requires_vcs: bool,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("requires_vcs", &self.requires_vcs)
            .finish()
    }
}

/// Collaborators shared by every scenario of a run
#[derive(Clone)]
pub struct HarnessEnv {
    pub config: Arc<RunConfig>,
    pub server: Arc<dyn CiServer>,
    pub repos: Arc<dyn RepositoryFactory>,
    pub clock: Arc<dyn Clock>,
    pub templates: Arc<TemplateLoader>,
    pub events: Arc<EventEmitter>,
}

/// A project created with a settings branch, VCS root and versioned settings
pub struct VersionedProject {
    pub project_id: String,
    pub vcs_root_id: String,
    pub repo: Box<dyn SettingsRepository>,
    /// Settings text pushed before versioned settings were enabled
    pub settings: String,
}

pub struct ScenarioContext {
    pub env: HarnessEnv,
    pub suite: Suite,
    projects: Vec<String>,
    branches: Vec<String>,
    responses: Vec<CapturedResponse>,
    metrics: BTreeMap<String, u64>,
}

impl ScenarioContext {
    pub fn new(env: HarnessEnv, suite: Suite) -> Self {
        Self {
            env,
            suite,
            projects: Vec::new(),
            branches: Vec::new(),
            responses: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn server(&self) -> Arc<dyn CiServer> {
        self.env.server.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.env.config
    }

    /// `<prefix><8 hex chars>`
    pub fn new_project_id(&self) -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("{}{}", self.env.config.project_prefix, &hex[..8])
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("[{}] {}", self.suite, message);
        self.env.events.emit(TestEvent::Log {
            suite: self.suite.to_string(),
            message,
        });
    }

    /// Keep a response with the scenario result
    pub fn capture<T: Serialize>(&mut self, label: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(body) => self.responses.push(CapturedResponse {
                label: label.to_string(),
                body,
            }),
            Err(e) => debug!("Could not capture {}: {}", label, e),
        }
    }

    pub fn record_metric(&mut self, name: &str, duration: Duration) {
        self.metrics
            .insert(name.to_string(), duration.as_millis() as u64);
    }

    pub fn take_responses(&mut self) -> Vec<CapturedResponse> {
        std::mem::take(&mut self.responses)
    }

    pub fn take_metrics(&mut self) -> BTreeMap<String, u64> {
        std::mem::take(&mut self.metrics)
    }

    /// Create a project and register it for cleanup
    pub async fn create_project(&mut self, project: &NewProject) -> Result<Project> {
        let created = self.env.server.create_project(project).await?;
        info!("Created project {}", created.id);
        if !self.projects.contains(&created.id) {
            self.projects.push(created.id.clone());
        }
        self.capture("create_project", &created);
        Ok(created)
    }

    /// Poll a triggered operation to its terminal status
    pub async fn poll(&mut self, operation: &Operation) -> Result<TerminalStatus> {
        let timeouts = &self.env.config.timeouts;
        let config = match operation.kind {
            OperationKind::Build { .. } => PollConfig::for_builds(timeouts),
            _ => PollConfig::for_operations(timeouts),
        };
        self.env.events.emit(TestEvent::Polling {
            suite: self.suite.to_string(),
            operation: operation.to_string(),
        });

        let status = poll_status(
            self.env.server.as_ref(),
            self.env.clock.as_ref(),
            operation,
            &config,
        )
        .await?;
        self.capture(&operation.to_string(), &status);
        Ok(status)
    }

    /// Fresh working copy of the project's settings branch, registered for cleanup
    pub async fn open_repository(&mut self, project_id: &str) -> Result<Box<dyn SettingsRepository>> {
        let branch = self.env.config.git.branch_for(project_id);
        if !self.branches.contains(&branch) {
            self.branches.push(branch.clone());
        }
        self.env.repos.open(&branch).await
    }

    pub fn render(&self, template: &str, vars: &[(&str, &str)]) -> Result<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.env.templates.render(template, &vars)
    }

    /// Commit the settings entry point and push it
    pub async fn push_settings(
        &self,
        repo: &dyn SettingsRepository,
        content: &str,
        message: &str,
    ) -> Result<String> {
        let hash = repo
            .commit_file(&self.env.config.git.settings_path, content, message)
            .await?;
        repo.push().await?;
        Ok(hash)
    }

    /// New project whose settings branch holds `settings`, with versioned settings enabled
    pub async fn versioned_project(&mut self, settings: &str) -> Result<VersionedProject> {
        let project = self.settings_project(settings).await?;
        self.enable_versioned_settings(&project).await?;
        Ok(project)
    }

    /// New project with a pushed settings branch and a VCS root pointing at it
    pub async fn settings_project(&mut self, settings: &str) -> Result<VersionedProject> {
        let project_id = self.new_project_id();
        self.create_project(&fixtures::project(&project_id)).await?;

        let repo = self.open_repository(&project_id).await?;
        self.push_settings(repo.as_ref(), settings, "Add Kotlin DSL settings")
            .await?;

        let server = self.server();
        let root = fixtures::git_vcs_root(&project_id, &self.env.config.git, repo.branch());
        let vcs_root = server.create_vcs_root(&root).await?;
        self.capture("create_vcs_root", &vcs_root);

        Ok(VersionedProject {
            project_id,
            vcs_root_id: vcs_root.id,
            repo,
            settings: settings.to_string(),
        })
    }

    /// Store settings in the project's VCS root
    pub async fn enable_versioned_settings(&mut self, project: &VersionedProject) -> Result<()> {
        let server = self.server();
        server
            .enable_versioned_settings(
                &project.project_id,
                &fixtures::versioned_settings(&project.vcs_root_id),
            )
            .await?;
        let status = server.versioned_settings_status(&project.project_id).await?;
        self.capture("versioned_settings_status", &status);
        Ok(())
    }

    pub async fn import(&mut self, project_id: &str) -> Result<TerminalStatus> {
        let operation = self.server().trigger_import(project_id).await?;
        self.poll(&operation).await
    }

    pub async fn sync(&mut self, project_id: &str) -> Result<TerminalStatus> {
        let operation = self.server().trigger_sync(project_id).await?;
        self.poll(&operation).await
    }

    pub async fn export(&mut self, project_id: &str) -> Result<TerminalStatus> {
        let operation = self.server().trigger_export(project_id).await?;
        self.poll(&operation).await
    }

    /// Render `template`, set up a versioned project and import it successfully
    pub async fn imported_project(
        &mut self,
        template: &str,
        vars: &[(&str, &str)],
    ) -> Result<VersionedProject> {
        let settings = self.render(template, vars)?;
        let project = self.versioned_project(&settings).await?;
        let status = self.import(&project.project_id).await?;
        expect_applied(&status, "settings import")?;
        Ok(project)
    }

    /// Wait until the project has at least `count` build configurations
    pub async fn wait_for_build_types(
        &self,
        project_id: &str,
        count: usize,
    ) -> Result<Vec<BuildTypeRef>> {
        let server = self.server();
        let timeouts = &self.env.config.timeouts;
        wait_until(
            self.env.clock.as_ref(),
            &format!("{} build configurations in {}", count, project_id),
            timeouts.operation(),
            timeouts.poll_interval(),
            || {
                let server = server.clone();
                async move {
                    let found = server.build_types(project_id).await?;
                    Ok::<bool, HarnessError>(found.len() >= count)
                }
            },
        )
        .await?;
        server.build_types(project_id).await
    }

    /// Id of the build configuration named `name`
    pub async fn build_type_id(&self, project_id: &str, name: &str) -> Result<String> {
        self.server()
            .build_types(project_id)
            .await?
            .into_iter()
            .find(|bt| bt.name == name)
            .map(|bt| bt.id)
            .ok_or_else(|| {
                HarnessError::assertion(format!(
                    "build configuration '{}' not found in {}",
                    name, project_id
                ))
            })
    }

    /// Trigger a build after the dependency check and poll it to the end
    pub async fn run_build(
        &mut self,
        project_id: &str,
        build_type_id: &str,
        properties: Option<Properties>,
    ) -> Result<(Operation, TerminalStatus)> {
        let operation =
            trigger_checked_build(self.env.server.as_ref(), project_id, build_type_id, properties)
                .await?;
        let status = self.poll(&operation).await?;
        Ok((operation, status))
    }

    /// Best-effort removal of everything the scenario created
    pub async fn cleanup(&mut self) {
        let projects = std::mem::take(&mut self.projects);
        let branches = std::mem::take(&mut self.branches);
        if !self.env.config.cleanup {
            debug!(
                "Cleanup disabled, keeping {} projects and {} branches",
                projects.len(),
                branches.len()
            );
            return;
        }

        for project_id in projects.iter().rev() {
            if let Err(e) = self.env.server.delete_project(project_id).await {
                warn!("Failed to delete project {}: {}", project_id, e);
            }
        }
        for branch in &branches {
            if let Err(e) = self.env.repos.delete_branch(branch).await {
                warn!("Failed to delete branch {}: {}", branch, e);
            }
        }
    }
}

/// Success or no-op; anything else fails the scenario
pub fn expect_applied(status: &TerminalStatus, what: &str) -> Result<()> {
    match status {
        TerminalStatus::Success | TerminalStatus::NoOp { .. } => Ok(()),
        TerminalStatus::Failure { reason } => Err(HarnessError::assertion(format!(
            "{} failed: {}",
            what, reason
        ))),
    }
}

/// Exactly success
pub fn expect_success(status: &TerminalStatus, what: &str) -> Result<()> {
    match status {
        TerminalStatus::Success => Ok(()),
        other => Err(HarnessError::assertion(format!(
            "{} finished as {}, expected success",
            what, other
        ))),
    }
}
