//! In-memory CI server for tests.
//!
//! Versioned settings read from and write to a shared [`MemoryRemote`], so
//! suites can be exercised end to end without a real server. Status probes
//! can also be scripted for polling tests.

use super::operation::{classify_build, classify_settings, Operation, OperationKind, OperationStatus};
use super::traits::CiServer;
use super::types::*;
use crate::dsl::model::PipelineDefinition;
use crate::error::{HarnessError, Result};
use crate::vcs::memory::MemoryRemote;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

const SETTINGS_PATH: &str = ".teamcity/settings.kts";

#[derive(Debug, Clone)]
struct FakeStep {
    name: String,
    script: String,
}

#[derive(Debug, Clone)]
struct FakeBuildType {
    id: String,
    object_id: String,
    name: String,
    steps: Vec<FakeStep>,
    dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct FakeProject {
    name: String,
    description: Option<String>,
    settings: Option<VersionedSettingsConfig>,
    status: SettingsStatus,
    build_types: Vec<FakeBuildType>,
    applied: Option<String>,
}

#[derive(Debug, Clone)]
struct FakeBuild {
    build_type_id: String,
    properties: Option<Properties>,
    reads: u32,
    /// `None` once started means success
    failure: Option<String>,
    blocked: Option<String>,
    log: String,
}

#[derive(Default)]
struct State {
    projects: BTreeMap<String, FakeProject>,
    vcs_roots: HashMap<String, (String, String)>,
    builds: BTreeMap<i64, FakeBuild>,
    users: Vec<String>,
    next_build: i64,
    tick: u64,
    unavailable: u32,
    script: VecDeque<Result<OperationStatus>>,
    repeat: Option<Result<OperationStatus>>,
    probes: u32,
    /// One-shot errors keyed by trait method name
    faults: HashMap<&'static str, HarnessError>,
    accept_invalid: bool,
}

fn copy_result(result: &Result<OperationStatus>) -> Result<OperationStatus> {
    match result {
        Ok(status) => Ok(status.clone()),
        Err(HarnessError::Api {
            status,
            message,
            transient,
        }) => Err(HarnessError::Api {
            status: *status,
            message: message.clone(),
            transient: *transient,
        }),
        Err(other) => Err(HarnessError::Assertion(other.to_string())),
    }
}

fn bad_request(message: impl Into<String>) -> HarnessError {
    HarnessError::api(400, message)
}

fn not_found(what: &str, id: &str) -> HarnessError {
    HarnessError::api(404, format!("No {} found by locator 'id:{}'", what, id))
}

fn valid_id(id: &str) -> bool {
    id.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render_dsl(build_types: &[FakeBuildType]) -> String {
    let mut out = String::from("import jetbrains.buildServer.configs.kotlin.*\n\nversion = \"2024.03\"\n\nproject {\n");
    for bt in build_types {
        out.push_str(&format!("    buildType({})\n", bt.object_id));
    }
    out.push_str("}\n");
    for bt in build_types {
        out.push_str(&format!(
            "\nobject {} : BuildType({{\n    name = \"{}\"\n",
            bt.object_id,
            bt.name.replace('"', "\\\"")
        ));
        if !bt.dependencies.is_empty() {
            out.push_str("\n    dependencies {\n");
            for dep in &bt.dependencies {
                let object = build_types
                    .iter()
                    .find(|other| &other.id == dep)
                    .map_or(dep.as_str(), |other| other.object_id.as_str());
                out.push_str(&format!("        snapshot({}) {{}}\n", object));
            }
            out.push_str("    }\n");
        }
        out.push_str("\n    steps {\n");
        for step in &bt.steps {
            out.push_str(&format!(
                "        script {{\n            name = \"{}\"\n            scriptContent = \"{}\"\n        }}\n",
                step.name.replace('"', "\\\""),
                step.script.replace('"', "\\\"")
            ));
        }
        out.push_str("    }\n})\n");
    }
    out
}

pub struct FakeServer {
    remote: Arc<MemoryRemote>,
    state: Mutex<State>,
}

impl FakeServer {
    pub fn new(remote: Arc<MemoryRemote>) -> Self {
        Self {
            remote,
            state: Mutex::new(State {
                next_build: 100,
                ..Default::default()
            }),
        }
    }

    /// Answer status probes from `script`, in order
    pub fn scripted(script: Vec<Result<OperationStatus>>) -> Self {
        let server = Self::new(MemoryRemote::new());
        server.lock().script = script.into();
        server
    }

    /// Answer every status probe with `result`
    pub fn repeating(result: Result<OperationStatus>) -> Self {
        let server = Self::new(MemoryRemote::new());
        server.lock().repeat = Some(result);
        server
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Status probes answered so far
    pub fn probes(&self) -> u32 {
        self.lock().probes
    }

    /// Fail the next `count` readiness probes with 503
    pub fn set_unavailable(&self, count: u32) {
        self.lock().unavailable = count;
    }

    /// Fail the next call to `method` with `error`
    pub fn fail_next(&self, method: &'static str, error: HarnessError) {
        self.lock().faults.insert(method, error);
    }

    fn injected(&self, method: &str) -> Result<()> {
        match self.lock().faults.remove(method) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Create projects without validating their name or id
    pub fn accept_invalid_projects(&self) {
        self.lock().accept_invalid = true;
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.lock().projects.keys().cloned().collect()
    }

    pub fn users(&self) -> Vec<String> {
        self.lock().users.clone()
    }

    /// Properties a build was queued with
    pub fn build_properties(&self, build_id: i64) -> Option<Properties> {
        self.lock()
            .builds
            .get(&build_id)
            .and_then(|b| b.properties.clone())
    }

    fn branch_of(state: &State, project: &FakeProject) -> Option<String> {
        let root = project.settings.as_ref()?.vcs_root_id.as_ref()?;
        state.vcs_roots.get(root).map(|(_, branch)| branch.clone())
    }

    fn set_status(state: &mut State, project_id: &str, kind: &str, message: String) {
        state.tick += 1;
        let timestamp = format!("2024-01-01T00:00:{:02}", state.tick);
        if let Some(project) = state.projects.get_mut(project_id) {
            project.status = SettingsStatus {
                kind: Some(kind.to_string()),
                message: Some(message),
                timestamp: Some(timestamp),
                dsl_outdated: Some(false),
            };
        }
    }

    /// Load the settings file from the project's branch. Without a change an
    /// import reports up-to-date and a sync leaves the status untouched.
    fn load_from_vcs(&self, project_id: &str, explicit: bool) -> Result<SettingsStatus> {
        let mut state = self.lock();
        let project = state
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| not_found("project", project_id))?;
        let branch = Self::branch_of(&state, &project).ok_or_else(|| {
            bad_request(format!("Versioned settings are disabled in project {}", project_id))
        })?;
        let baseline = project.status.clone();

        let Some(content) = self.remote.file(&branch, SETTINGS_PATH) else {
            if explicit {
                Self::set_status(
                    &mut state,
                    project_id,
                    "warn",
                    format!("Settings file {} not found in VCS", SETTINGS_PATH),
                );
            }
            return Ok(baseline);
        };

        if project.applied.as_deref() == Some(content.as_str()) {
            if explicit {
                Self::set_status(&mut state, project_id, "info", "Settings are up-to-date".to_string());
            }
            return Ok(baseline);
        }

        match PipelineDefinition::parse(&content) {
            Ok(def) => {
                let build_types = def
                    .build_types
                    .iter()
                    .map(|bt| FakeBuildType {
                        id: format!("{}_{}", project_id, bt.object_id),
                        object_id: bt.object_id.clone(),
                        name: bt.name.clone(),
                        steps: bt
                            .steps
                            .iter()
                            .map(|s| FakeStep {
                                name: s.label().to_string(),
                                script: s.script.clone().unwrap_or_default(),
                            })
                            .collect(),
                        dependencies: bt
                            .dependencies
                            .iter()
                            .map(|d| format!("{}_{}", project_id, d))
                            .collect(),
                    })
                    .collect();
                let revision = self.remote.head(&branch).unwrap_or_default();
                if let Some(p) = state.projects.get_mut(project_id) {
                    p.build_types = build_types;
                    p.applied = Some(content);
                }
                Self::set_status(
                    &mut state,
                    project_id,
                    "info",
                    format!("Settings were applied from revision {}", revision),
                );
            }
            Err(e) => {
                Self::set_status(
                    &mut state,
                    project_id,
                    "error",
                    format!("Failed to load settings from VCS: {}", e),
                );
            }
        }
        Ok(baseline)
    }

    fn advance_build(build: &mut FakeBuild) -> Build {
        build.reads += 1;
        let (state, status, status_text) = match (&build.blocked, build.reads) {
            (Some(reason), _) => ("queued", None, Some(reason.clone())),
            (None, 1) => ("running", None, None),
            (None, _) => match &build.failure {
                Some(text) => ("finished", Some("FAILURE"), Some(text.clone())),
                None => ("finished", Some("SUCCESS"), Some("Success".to_string())),
            },
        };
        Build {
            id: 0,
            build_type_id: Some(build.build_type_id.clone()),
            state: state.to_string(),
            status: status.map(str::to_string),
            wait_reason: if build.blocked.is_some() { status_text.clone() } else { None },
            status_text,
            canceled_info: None,
            properties: build.properties.clone(),
        }
    }

    fn find_build_type(state: &State, build_type_id: &str) -> Option<FakeBuildType> {
        state
            .projects
            .values()
            .flat_map(|p| p.build_types.iter())
            .find(|bt| bt.id == build_type_id)
            .cloned()
    }
}

#[async_trait]
impl CiServer for FakeServer {
    async fn server_info(&self) -> Result<ServerInfo> {
        let mut state = self.lock();
        if state.unavailable > 0 {
            state.unavailable -= 1;
            return Err(HarnessError::api(503, "Server is starting"));
        }
        Ok(ServerInfo {
            version: Some("2024.03 (build 156342)".to_string()),
            build_number: Some("156342".to_string()),
            web_url: None,
        })
    }

    async fn list_projects(&self) -> Result<Vec<ProjectRef>> {
        Ok(self
            .lock()
            .projects
            .iter()
            .map(|(id, p)| ProjectRef {
                id: id.clone(),
                name: p.name.clone(),
                parent_project_id: Some("_Root".to_string()),
            })
            .collect())
    }

    async fn get_project(&self, project_id: &str) -> Result<Project> {
        let state = self.lock();
        let project = state
            .projects
            .get(project_id)
            .ok_or_else(|| not_found("project", project_id))?;
        Ok(Project {
            id: project_id.to_string(),
            name: project.name.clone(),
            description: project.description.clone(),
            parent_project_id: Some("_Root".to_string()),
        })
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project> {
        self.injected("create_project")?;
        let validate = !self.lock().accept_invalid;
        if validate && project.name.trim().is_empty() {
            return Err(bad_request("Project name cannot be empty."));
        }
        if validate && !valid_id(&project.id) {
            return Err(bad_request(format!(
                "Project ID \"{}\" is invalid: it must start with a latin letter and contain only latin letters, digits and underscores",
                project.id
            )));
        }

        let mut state = self.lock();
        if state.projects.contains_key(&project.id) {
            return Err(bad_request(format!(
                "Project ID \"{}\" is already used by another project",
                project.id
            )));
        }
        state.projects.insert(
            project.id.clone(),
            FakeProject {
                name: project.name.clone(),
                description: project.description.clone(),
                ..Default::default()
            },
        );
        Ok(Project {
            id: project.id.clone(),
            name: project.name.clone(),
            description: project.description.clone(),
            parent_project_id: Some("_Root".to_string()),
        })
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        let mut state = self.lock();
        state
            .projects
            .remove(project_id)
            .map(|_| ())
            .ok_or_else(|| not_found("project", project_id))?;
        state.vcs_roots.retain(|_, root| root.0 != project_id);
        Ok(())
    }

    async fn create_vcs_root(&self, root: &NewVcsRoot) -> Result<VcsRoot> {
        let mut state = self.lock();
        if !state.projects.contains_key(&root.project.id) {
            return Err(not_found("project", &root.project.id));
        }
        if root.properties.get("url").map_or(true, str::is_empty) {
            return Err(bad_request("VCS root property 'url' is required"));
        }

        let branch = root
            .properties
            .get("branch")
            .unwrap_or("refs/heads/main")
            .trim_start_matches("refs/heads/")
            .to_string();
        let suffix: String = root
            .name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let id = format!("{}_{}", root.project.id, suffix);
        state
            .vcs_roots
            .insert(id.clone(), (root.project.id.clone(), branch));

        Ok(VcsRoot {
            id,
            name: root.name.clone(),
            properties: root.properties.clone(),
        })
    }

    async fn enable_versioned_settings(
        &self,
        project_id: &str,
        config: &VersionedSettingsConfig,
    ) -> Result<()> {
        self.injected("enable_versioned_settings")?;
        let mut state = self.lock();
        if !state.projects.contains_key(project_id) {
            return Err(not_found("project", project_id));
        }
        let root = config.vcs_root_id.clone().unwrap_or_default();
        if !state.vcs_roots.contains_key(&root) {
            return Err(not_found("VCS root", &root));
        }
        if let Some(project) = state.projects.get_mut(project_id) {
            project.settings = Some(config.clone());
        }
        Self::set_status(
            &mut state,
            project_id,
            "info",
            "Versioned settings are enabled".to_string(),
        );
        Ok(())
    }

    async fn versioned_settings_status(&self, project_id: &str) -> Result<SettingsStatus> {
        self.lock()
            .projects
            .get(project_id)
            .map(|p| p.status.clone())
            .ok_or_else(|| not_found("project", project_id))
    }

    async fn trigger_import(&self, project_id: &str) -> Result<Operation> {
        self.injected("trigger_import")?;
        let baseline = self.load_from_vcs(project_id, true)?;
        Ok(Operation::import(project_id, baseline))
    }

    async fn trigger_sync(&self, project_id: &str) -> Result<Operation> {
        let baseline = self.load_from_vcs(project_id, false)?;
        Ok(Operation::sync(project_id, baseline))
    }

    async fn trigger_export(&self, project_id: &str) -> Result<Operation> {
        let mut state = self.lock();
        let project = state
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| not_found("project", project_id))?;
        let branch = Self::branch_of(&state, &project).ok_or_else(|| {
            bad_request(format!("Versioned settings are disabled in project {}", project_id))
        })?;
        let baseline = project.status.clone();

        let dsl = render_dsl(&project.build_types);
        if self.remote.file(&branch, SETTINGS_PATH).as_deref() == Some(dsl.as_str()) {
            Self::set_status(&mut state, project_id, "info", "No changes to commit".to_string());
        } else {
            let hash = self.remote.commit(
                &branch,
                SETTINGS_PATH,
                &dsl,
                &format!("TeamCity change in '{}' project: settings exported", project.name),
            );
            if let Some(p) = state.projects.get_mut(project_id) {
                p.applied = Some(dsl);
            }
            Self::set_status(
                &mut state,
                project_id,
                "info",
                format!("Settings were committed to VCS, revision {}", hash),
            );
        }
        Ok(Operation::export(project_id, baseline))
    }

    async fn build_types(&self, project_id: &str) -> Result<Vec<BuildTypeRef>> {
        let state = self.lock();
        let project = state
            .projects
            .get(project_id)
            .ok_or_else(|| not_found("project", project_id))?;
        Ok(project
            .build_types
            .iter()
            .map(|bt| BuildTypeRef {
                id: bt.id.clone(),
                name: bt.name.clone(),
                project_id: Some(project_id.to_string()),
            })
            .collect())
    }

    async fn build_steps(&self, build_type_id: &str) -> Result<Vec<BuildStep>> {
        let bt = Self::find_build_type(&self.lock(), build_type_id)
            .ok_or_else(|| not_found("build type", build_type_id))?;
        Ok(bt
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| BuildStep {
                id: format!("RUNNER_{}", i + 1),
                name: s.name.clone(),
                kind: "simpleRunner".to_string(),
            })
            .collect())
    }

    async fn snapshot_dependencies(&self, build_type_id: &str) -> Result<Vec<String>> {
        Self::find_build_type(&self.lock(), build_type_id)
            .map(|bt| bt.dependencies)
            .ok_or_else(|| not_found("build type", build_type_id))
    }

    async fn rename_build_type(&self, build_type_id: &str, name: &str) -> Result<()> {
        let mut state = self.lock();
        let bt = state
            .projects
            .values_mut()
            .flat_map(|p| p.build_types.iter_mut())
            .find(|bt| bt.id == build_type_id)
            .ok_or_else(|| not_found("build type", build_type_id))?;
        bt.name = name.to_string();
        Ok(())
    }

    async fn delete_build_type(&self, build_type_id: &str) -> Result<()> {
        let mut state = self.lock();
        for project in state.projects.values_mut() {
            let before = project.build_types.len();
            project.build_types.retain(|bt| bt.id != build_type_id);
            if project.build_types.len() != before {
                return Ok(());
            }
        }
        Err(not_found("build type", build_type_id))
    }

    async fn trigger_build(
        &self,
        build_type_id: &str,
        properties: Option<Properties>,
    ) -> Result<Operation> {
        let mut state = self.lock();
        let bt = Self::find_build_type(&state, build_type_id)
            .ok_or_else(|| not_found("build type", build_type_id))?;

        let missing: Vec<&String> = bt
            .dependencies
            .iter()
            .filter(|d| Self::find_build_type(&state, d).is_none())
            .collect();
        let blocked = (!missing.is_empty()).then(|| {
            format!(
                "Snapshot dependency not found: {}",
                missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            )
        });

        let total = bt.steps.len();
        let mut log = String::new();
        let mut failure = None;
        for (i, step) in bt.steps.iter().enumerate() {
            log.push_str(&format!("Step {}/{}: {} (Command Line)\n", i + 1, total, step.name));
            if step.script.contains("exit 1") {
                log.push_str("Process exited with code 1\n");
                failure = Some("Process exited with code 1".to_string());
                break;
            }
            log.push_str(&format!("  {}\n", step.script));
        }

        state.next_build += 1;
        let id = state.next_build;
        state.builds.insert(
            id,
            FakeBuild {
                build_type_id: build_type_id.to_string(),
                properties,
                reads: 0,
                failure,
                blocked,
                log,
            },
        );
        Ok(Operation::build(id))
    }

    async fn build(&self, build_id: i64) -> Result<Build> {
        let mut state = self.lock();
        let build = state
            .builds
            .get_mut(&build_id)
            .ok_or_else(|| not_found("build", &build_id.to_string()))?;
        let mut snapshot = Self::advance_build(build);
        snapshot.id = build_id;
        Ok(snapshot)
    }

    async fn build_log(&self, build_id: i64) -> Result<String> {
        self.lock()
            .builds
            .get(&build_id)
            .map(|b| b.log.clone())
            .ok_or_else(|| not_found("build", &build_id.to_string()))
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .position(|u| u == username)
            .map(|i| User {
                username: username.to_string(),
                id: Some(i as i64 + 1),
            }))
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut state = self.lock();
        if state.users.contains(&user.username) {
            return Err(bad_request(format!(
                "User with username \"{}\" already exists",
                user.username
            )));
        }
        state.users.push(user.username.clone());
        Ok(User {
            username: user.username.clone(),
            id: Some(state.users.len() as i64),
        })
    }

    async fn observe(&self, operation: &Operation) -> Result<OperationStatus> {
        {
            let mut state = self.lock();
            state.probes += 1;
            if let Some(next) = state.script.pop_front() {
                return next;
            }
            if let Some(repeat) = &state.repeat {
                return copy_result(repeat);
            }
        }

        match &operation.kind {
            OperationKind::Import { project_id }
            | OperationKind::Sync { project_id }
            | OperationKind::Export { project_id } => {
                let current = self.versioned_settings_status(project_id).await?;
                Ok(classify_settings(operation.baseline.as_ref(), &current))
            }
            OperationKind::Build { build_id } => {
                let build = self.build(*build_id).await?;
                Ok(classify_build(&build))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::operation::TerminalStatus;
    use crate::dsl::templates::{self, TemplateLoader};

    async fn versioned_project(server: &FakeServer, id: &str) {
        server
            .create_project(&NewProject::new(id, "Test Project"))
            .await
            .unwrap();
        let root = server
            .create_vcs_root(&NewVcsRoot {
                name: "Settings".to_string(),
                vcs_name: "jetbrains.git".to_string(),
                project: IdRef { id: id.to_string() },
                properties: [("url", "mem://settings"), ("branch", "refs/heads/vset/P")]
                    .into_iter()
                    .collect(),
            })
            .await
            .unwrap();
        server
            .enable_versioned_settings(
                id,
                &VersionedSettingsConfig {
                    vcs_root_id: Some(root.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_import_materializes_build_types() {
        let remote = MemoryRemote::new();
        let server = FakeServer::new(remote.clone());
        versioned_project(&server, "P1").await;

        let dsl = TemplateLoader::builtin()
            .render_default(templates::MULTI_STAGE)
            .unwrap();
        remote.commit("vset/P", SETTINGS_PATH, &dsl, "Add pipeline");

        let op = server.trigger_import("P1").await.unwrap();
        assert_eq!(
            server.observe(&op).await.unwrap(),
            OperationStatus::Terminal(TerminalStatus::Success)
        );
        let types = server.build_types("P1").await.unwrap();
        assert_eq!(types.len(), 3);
        assert_eq!(
            server.snapshot_dependencies("P1_Deploy").await.unwrap(),
            vec!["P1_Build".to_string()]
        );

        let again = server.trigger_import("P1").await.unwrap();
        assert!(matches!(
            server.observe(&again).await.unwrap(),
            OperationStatus::Terminal(TerminalStatus::NoOp { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_projects_are_rejected() {
        let server = FakeServer::new(MemoryRemote::new());
        server
            .create_project(&NewProject::new("P1", "One"))
            .await
            .unwrap();

        let dup = server
            .create_project(&NewProject::new("P1", "Again"))
            .await
            .unwrap_err();
        assert_eq!(dup.status(), Some(400));

        let invalid = server
            .create_project(&NewProject::new("1-bad id", "Bad"))
            .await
            .unwrap_err();
        assert_eq!(invalid.status(), Some(400));
    }

    #[tokio::test]
    async fn test_build_runs_then_finishes() {
        let remote = MemoryRemote::new();
        let server = FakeServer::new(remote.clone());
        versioned_project(&server, "P1").await;
        let dsl = TemplateLoader::builtin()
            .render_default(templates::FAILING_BUILD)
            .unwrap();
        remote.commit("vset/P", SETTINGS_PATH, &dsl, "Add failing build");
        server.trigger_import("P1").await.unwrap();

        let op = server.trigger_build("P1_FailingBuild", None).await.unwrap();
        assert!(matches!(
            server.observe(&op).await.unwrap(),
            OperationStatus::Pending { .. }
        ));
        assert!(matches!(
            server.observe(&op).await.unwrap(),
            OperationStatus::Terminal(TerminalStatus::Failure { .. })
        ));
    }

    #[tokio::test]
    async fn test_export_commits_current_settings() {
        let remote = MemoryRemote::new();
        let server = FakeServer::new(remote.clone());
        versioned_project(&server, "P1").await;
        let dsl = TemplateLoader::builtin()
            .render_default(templates::SIMPLE_BUILD)
            .unwrap();
        remote.commit("vset/P", SETTINGS_PATH, &dsl, "Add build");
        server.trigger_import("P1").await.unwrap();

        server.rename_build_type("P1_Build", "Renamed").await.unwrap();
        server.trigger_export("P1").await.unwrap();

        let exported = remote.file("vset/P", SETTINGS_PATH).unwrap();
        let def = PipelineDefinition::parse(&exported).unwrap();
        assert_eq!(def.build_types[0].name, "Renamed");
        assert_eq!(def.build_types[0].steps.len(), 2);
    }
}
