//! HTTP implementation of [`CiServer`] over the server's `/app/rest` API.

use super::operation::{classify_build, classify_settings, Operation, OperationKind, OperationStatus, TerminalStatus};
use super::poll::{poll_status, PollConfig};
use super::retry::{retry_transient, RetryPolicy};
use super::traits::CiServer;
use super::types::*;
use crate::error::{HarnessError, Result};
use crate::utils::clock::SystemClock;
use crate::utils::config::{Credentials, RunConfig, ServerConfig, Timeouts};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Largest body excerpt kept in error messages and logs
const EXCERPT_LEN: usize = 300;

#[derive(Debug, Clone)]
enum Body {
    Empty,
    Json(serde_json::Value),
    Text(String),
}

/// REST client for the CI server
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    /// Server root without trailing slash, e.g. `http://localhost:8111`
    root: String,
    credentials: Credentials,
    retry: RetryPolicy,
}

impl RestClient {
    pub fn new(server: &ServerConfig, timeouts: &Timeouts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeouts.request())
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            root: server.url.trim_end_matches('/').to_string(),
            credentials: server.credentials(),
            retry: RetryPolicy::new(timeouts.max_retries, timeouts.poll_interval()),
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::new(&config.server, &config.timeouts)
    }

    /// Same server, different identity (e.g. the super-user token during bootstrap)
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Poll a triggered operation on the wall clock until it is terminal
    pub async fn poll_status(
        &self,
        operation: &Operation,
        timeout: Duration,
        interval: Duration,
    ) -> Result<TerminalStatus> {
        let clock = SystemClock::new();
        poll_status(self, &clock, operation, &PollConfig::new(timeout, interval)).await
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/app/rest{}", self.root, path)
    }

    /// One HTTP exchange; non-2xx answers become `HarnessError::Api`
    async fn send(&self, method: Method, url: &str, body: &Body, accept: &str) -> Result<Response> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(ACCEPT, accept);

        request = match &self.credentials {
            Credentials::Token(token) => request.bearer_auth(token),
            Credentials::Basic { username, password } => request.basic_auth(username, Some(password)),
        };

        request = match body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Text(text) => request
                .header(CONTENT_TYPE, "text/plain")
                .body(text.clone()),
        };

        debug!("→ {} {}", method, url);
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!("← {} {} {}", status.as_u16(), method, url);
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = excerpt(&text);
        warn!("← {} {} {}: {}", status.as_u16(), method, url, message);
        Err(HarnessError::api(
            status.as_u16(),
            if message.is_empty() {
                status.to_string()
            } else {
                message
            },
        ))
    }

    async fn execute(
        &self,
        policy: &RetryPolicy,
        method: Method,
        url: String,
        body: Body,
        accept: &str,
    ) -> Result<String> {
        let name = format!("{} {}", method, url);
        let text = retry_transient(policy, &name, || async {
            let response = self.send(method.clone(), &url, &body, accept).await?;
            Ok(response.text().await?)
        })
        .await?;
        info!("{} ok ({} bytes)", name, text.len());
        Ok(text)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        policy: &RetryPolicy,
        method: Method,
        path: &str,
        body: Body,
    ) -> Result<T> {
        let url = self.api_url(path);
        let text = self
            .execute(policy, method.clone(), url.clone(), body, "application/json")
            .await?;
        serde_json::from_str(&text).map_err(|e| HarnessError::Api {
            status: None,
            message: format!(
                "malformed response from {} {}: {} (body: {})",
                method,
                url,
                e,
                excerpt(&text)
            ),
            transient: false,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json(&self.retry, Method::GET, path, Body::Empty)
            .await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request_json(&self.retry, Method::POST, path, Body::Json(serde_json::to_value(body)?))
            .await
    }

    /// Request whose answer body is not needed
    async fn call(&self, method: Method, path: &str, body: Body) -> Result<()> {
        self.execute(&self.retry, method, self.api_url(path), body, "*/*")
            .await
            .map(|_| ())
    }

    async fn settings_action(&self, project_id: &str, action: &str) -> Result<SettingsStatus> {
        let baseline = self.versioned_settings_status(project_id).await?;
        self.call(
            Method::POST,
            &format!("/projects/id:{}/versionedSettings/{}", project_id, action),
            Body::Empty,
        )
        .await?;
        Ok(baseline)
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > EXCERPT_LEN {
        let cut: String = trimmed.chars().take(EXCERPT_LEN).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl CiServer for RestClient {
    async fn server_info(&self) -> Result<ServerInfo> {
        self.get("/server").await
    }

    async fn list_projects(&self) -> Result<Vec<ProjectRef>> {
        let list: ProjectList = self.get("/projects").await?;
        Ok(list.project)
    }

    async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.get(&format!("/projects/id:{}", project_id)).await
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project> {
        let created: Project = self.post("/projects", project).await?;
        debug!("POST /projects returned {}", created.id);
        Ok(created)
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/projects/id:{}", project_id),
            Body::Empty,
        )
        .await
    }

    async fn create_vcs_root(&self, root: &NewVcsRoot) -> Result<VcsRoot> {
        self.post("/vcs-roots", root).await
    }

    async fn enable_versioned_settings(
        &self,
        project_id: &str,
        config: &VersionedSettingsConfig,
    ) -> Result<()> {
        self.call(
            Method::PUT,
            &format!("/projects/id:{}/versionedSettings/config", project_id),
            Body::Json(serde_json::to_value(config)?),
        )
        .await
    }

    async fn versioned_settings_status(&self, project_id: &str) -> Result<SettingsStatus> {
        self.get(&format!("/projects/id:{}/versionedSettings/status", project_id))
            .await
    }

    async fn trigger_import(&self, project_id: &str) -> Result<Operation> {
        let baseline = self.settings_action(project_id, "loadSettings").await?;
        Ok(Operation::import(project_id, baseline))
    }

    async fn trigger_sync(&self, project_id: &str) -> Result<Operation> {
        let baseline = self.settings_action(project_id, "checkForChanges").await?;
        Ok(Operation::sync(project_id, baseline))
    }

    async fn trigger_export(&self, project_id: &str) -> Result<Operation> {
        let baseline = self
            .settings_action(project_id, "commitCurrentSettings")
            .await?;
        Ok(Operation::export(project_id, baseline))
    }

    async fn build_types(&self, project_id: &str) -> Result<Vec<BuildTypeRef>> {
        let list: BuildTypeList = self
            .get(&format!("/buildTypes?locator=project:{}", project_id))
            .await?;
        Ok(list.build_type)
    }

    async fn build_steps(&self, build_type_id: &str) -> Result<Vec<BuildStep>> {
        let list: StepList = self
            .get(&format!("/buildTypes/id:{}/steps", build_type_id))
            .await?;
        Ok(list.step)
    }

    async fn snapshot_dependencies(&self, build_type_id: &str) -> Result<Vec<String>> {
        let list: SnapshotDependencyList = self
            .get(&format!("/buildTypes/id:{}/snapshot-dependencies", build_type_id))
            .await?;
        Ok(list
            .snapshot_dependency
            .iter()
            .map(|d| d.source_id().to_string())
            .collect())
    }

    async fn rename_build_type(&self, build_type_id: &str, name: &str) -> Result<()> {
        self.call(
            Method::PUT,
            &format!("/buildTypes/id:{}/name", build_type_id),
            Body::Text(name.to_string()),
        )
        .await
    }

    async fn delete_build_type(&self, build_type_id: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/buildTypes/id:{}", build_type_id),
            Body::Empty,
        )
        .await
    }

    async fn trigger_build(
        &self,
        build_type_id: &str,
        properties: Option<Properties>,
    ) -> Result<Operation> {
        let body = NewBuild {
            build_type: IdRef {
                id: build_type_id.to_string(),
            },
            properties,
        };
        let queued: Build = self.post("/buildQueue", &body).await?;
        info!("Queued build #{} of {}", queued.id, build_type_id);
        Ok(Operation::build(queued.id))
    }

    async fn build(&self, build_id: i64) -> Result<Build> {
        self.get(&format!("/builds/id:{}", build_id)).await
    }

    async fn build_log(&self, build_id: i64) -> Result<String> {
        let url = format!("{}/downloadBuildLog.html?buildId={}", self.root, build_id);
        self.execute(&self.retry, Method::GET, url, Body::Empty, "text/plain")
            .await
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        match self.get(&format!("/users/username:{}", username)).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        self.post("/users", user).await
    }

    /// Probes go out once; the poll loop owns the transient-failure budget
    async fn observe(&self, operation: &Operation) -> Result<OperationStatus> {
        let once = RetryPolicy::none();
        match &operation.kind {
            OperationKind::Import { project_id }
            | OperationKind::Sync { project_id }
            | OperationKind::Export { project_id } => {
                let current: SettingsStatus = self
                    .request_json(
                        &once,
                        Method::GET,
                        &format!("/projects/id:{}/versionedSettings/status", project_id),
                        Body::Empty,
                    )
                    .await?;
                Ok(classify_settings(operation.baseline.as_ref(), &current))
            }
            OperationKind::Build { build_id } => {
                let build: Build = self
                    .request_json(
                        &once,
                        Method::GET,
                        &format!("/builds/id:{}", build_id),
                        Body::Empty,
                    )
                    .await?;
                Ok(classify_build(&build))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(url: &str, token: Option<&str>) -> RestClient {
        let server = ServerConfig {
            url: url.to_string(),
            token: token.map(str::to_string),
            ..Default::default()
        };
        RestClient::new(&server, &Timeouts::default())
            .unwrap()
            .with_retry_policy(RetryPolicy::new(3, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_server_info_uses_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/app/rest/server")
            .match_header("authorization", "Bearer secret-token")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"version": "2024.03 (build 156342)", "buildNumber": "156342"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("secret-token"));
        let info = client.server_info().await.unwrap();

        assert_eq!(info.build_number.as_deref(), Some("156342"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_basic_auth_without_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/app/rest/projects")
            .match_header("authorization", "Basic YWRtaW46YWRtaW4=")
            .with_status(200)
            .with_body(r#"{"count": 2, "project": [{"id": "_Root", "name": "<Root project>"}, {"id": "TestProj_1", "name": "Test Project"}]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), None);
        let projects = client.list_projects().await.unwrap();

        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1].id, "TestProj_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_project_posts_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/app/rest/projects")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "id": "TestProj_1",
                "parentProject": {"locator": "id:_Root"}
            })))
            .with_status(200)
            .with_body(r#"{"id": "TestProj_1", "name": "Test Project TestProj_1"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let project = client
            .create_project(&NewProject::new("TestProj_1", "Test Project TestProj_1"))
            .await
            .unwrap();

        assert_eq!(project.name, "Test Project TestProj_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_request_is_api_error_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/app/rest/projects")
            .with_status(400)
            .with_body("Project name cannot be empty.")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let err = client
            .create_project(&NewProject::new("TestProj_2", ""))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("Project name cannot be empty"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gateway_errors_are_retried_three_times() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/app/rest/server")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let err = client.server_info().await.unwrap_err();

        assert!(err.is_transient());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/projects/id:TestProj_1")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let err = client.get_project("TestProj_1").await.unwrap_err();

        assert!(matches!(err, HarnessError::Api { transient: false, .. }));
        assert!(err.to_string().contains("malformed response"));
    }

    #[tokio::test]
    async fn test_trigger_sync_records_baseline() {
        let mut server = Server::new_async().await;
        let status = server
            .mock("GET", "/app/rest/projects/id:P1/versionedSettings/status")
            .with_status(200)
            .with_body(r#"{"type": "info", "message": "Settings loaded", "timestamp": "t1"}"#)
            .create_async()
            .await;
        let trigger = server
            .mock("POST", "/app/rest/projects/id:P1/versionedSettings/checkForChanges")
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let op = client.trigger_sync("P1").await.unwrap();

        assert_eq!(op.project_id(), Some("P1"));
        assert_eq!(
            op.baseline.and_then(|b| b.message).as_deref(),
            Some("Settings loaded")
        );
        status.assert_async().await;
        trigger.assert_async().await;
    }

    #[tokio::test]
    async fn test_trigger_build_with_properties() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/app/rest/buildQueue")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "buildType": {"id": "P1_Build"},
                "properties": {"property": [{"name": "env.TEST_PARAM", "value": "test_value"}]}
            })))
            .with_status(200)
            .with_body(r#"{"id": 101, "state": "queued", "buildTypeId": "P1_Build"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let props: Properties = [("env.TEST_PARAM", "test_value")].into_iter().collect();
        let op = client.trigger_build("P1_Build", Some(props)).await.unwrap();

        assert_eq!(op.kind, OperationKind::Build { build_id: 101 });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_build_types_and_dependencies() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/buildTypes")
            .match_query(Matcher::UrlEncoded("locator".into(), "project:P1".into()))
            .with_status(200)
            .with_body(r#"{"count": 2, "buildType": [{"id": "P1_Test", "name": "Test"}, {"id": "P1_Build", "name": "Build"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/rest/buildTypes/id:P1_Build/snapshot-dependencies")
            .with_status(200)
            .with_body(r#"{"snapshot-dependency": [{"id": "P1_Test", "source-buildType": {"id": "P1_Test", "name": "Test"}}]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let types = client.build_types("P1").await.unwrap();
        let deps = client.snapshot_dependencies("P1_Build").await.unwrap();

        assert_eq!(types.len(), 2);
        assert_eq!(deps, vec!["P1_Test".to_string()]);
    }

    #[tokio::test]
    async fn test_find_user_maps_not_found_to_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/users/username:admin")
            .with_status(404)
            .with_body("User not found")
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        assert!(client.find_user("admin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_build_log_is_plain_text() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/downloadBuildLog.html")
            .match_query(Matcher::UrlEncoded("buildId".into(), "7".into()))
            .with_status(200)
            .with_body("Step 1/2: Build (Command Line)\nStep 2/2: Test (Command Line)\n")
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let log = client.build_log(7).await.unwrap();
        assert!(log.contains("Step 2/2: Test"));
    }

    #[tokio::test]
    async fn test_observe_probes_build_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/app/rest/builds/id:5")
            .with_status(502)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("t"));
        let err = client.observe(&Operation::build(5)).await.unwrap_err();

        assert!(err.is_transient());
        mock.assert_async().await;
    }
}
