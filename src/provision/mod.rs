//! Bring the CI server up and prepare it for a run.

pub mod cleanup;

pub use cleanup::{sweep, CleanupReport};

use crate::client::types::{NewUser, ServerInfo};
use crate::client::{wait_until, CiServer};
use crate::error::{HarnessError, Result};
use crate::utils::binary_resolver;
use crate::utils::{Clock, RunConfig};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;

/// `docker compose` around one compose file
pub struct ContainerRuntime {
    docker: PathBuf,
    compose_file: PathBuf,
    server_version: Option<String>,
}

impl ContainerRuntime {
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let compose_file = config.compose_file.clone().ok_or_else(|| {
            HarnessError::Config("no compose file configured (COMPOSE_FILE)".to_string())
        })?;
        if !compose_file.exists() {
            return Err(HarnessError::Config(format!(
                "compose file not found: {}",
                compose_file.display()
            )));
        }
        Ok(Self {
            docker: binary_resolver::find_docker()?,
            compose_file,
            server_version: config.server.version.clone(),
        })
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    async fn compose(&self, args: &[&str]) -> Result<()> {
        let mut command = Command::new(&self.docker);
        command
            .arg("compose")
            .arg("-f")
            .arg(&self.compose_file)
            .args(args)
            .stdin(Stdio::null());
        if let Some(version) = &self.server_version {
            command.env("TEAMCITY_VERSION", version);
        }

        debug!("docker compose {}", args.join(" "));
        let output = command.output().await?;
        if !output.status.success() {
            return Err(HarnessError::Provision(format!(
                "docker compose {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    pub async fn up(&self) -> Result<()> {
        info!("Starting containers from {}", self.compose_file.display());
        self.compose(&["up", "-d"]).await
    }

    pub async fn down(&self) -> Result<()> {
        info!("Stopping containers from {}", self.compose_file.display());
        self.compose(&["down"]).await
    }
}

/// Readiness wait and one-time setup of the server
pub struct Provisioner {
    config: Arc<RunConfig>,
    server: Arc<dyn CiServer>,
    /// Client authenticated with the super user token, used to create the admin
    bootstrap: Option<Arc<dyn CiServer>>,
    clock: Arc<dyn Clock>,
}

impl Provisioner {
    pub fn new(config: Arc<RunConfig>, server: Arc<dyn CiServer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            server,
            bootstrap: None,
            clock,
        }
    }

    pub fn with_bootstrap_server(mut self, server: Arc<dyn CiServer>) -> Self {
        self.bootstrap = Some(server);
        self
    }

    /// Optionally start containers, then wait, set up and verify
    pub async fn provision(&self, start_containers: bool) -> Result<ServerInfo> {
        if start_containers {
            ContainerRuntime::from_config(&self.config)?.up().await?;
        }
        let info = self.wait_ready().await?;
        self.ensure_admin().await?;
        self.verify().await?;
        Ok(info)
    }

    /// Probe the server until it answers, within the readiness timeout
    pub async fn wait_ready(&self) -> Result<ServerInfo> {
        let timeouts = &self.config.timeouts;
        let server = self.server.clone();
        let ready: Arc<Mutex<Option<ServerInfo>>> = Arc::new(Mutex::new(None));
        let slot = ready.clone();

        info!("Waiting for server at {}", self.config.server.url);
        let waited = wait_until(
            self.clock.as_ref(),
            "server readiness",
            timeouts.readiness(),
            timeouts.readiness_interval(),
            || {
                let server = server.clone();
                let slot = slot.clone();
                async move {
                    match server.server_info().await {
                        Ok(info) => {
                            if let Ok(mut slot) = slot.lock() {
                                *slot = Some(info);
                            }
                            Ok(true)
                        }
                        Err(e) => {
                            debug!("Server not ready: {}", e);
                            Ok(false)
                        }
                    }
                }
            },
        )
        .await;

        match waited {
            Ok(()) => {
                let info = ready.lock().ok().and_then(|mut slot| slot.take()).unwrap_or_default();
                info!(
                    "Server ready (version {})",
                    info.version.as_deref().unwrap_or("unknown")
                );
                Ok(info)
            }
            Err(HarnessError::Timeout { timeout, attempts, .. }) => Err(HarnessError::Provision(
                format!(
                    "server at {} not ready after {:?} ({} checks)",
                    self.config.server.url, timeout, attempts
                ),
            )),
            Err(other) => Err(other),
        }
    }

    /// Create the admin account unless it already exists
    pub async fn ensure_admin(&self) -> Result<()> {
        let server = self.bootstrap.as_ref().unwrap_or(&self.server);
        let username = &self.config.server.username;

        if server.find_user(username).await?.is_some() {
            debug!("Admin user {} already present", username);
            return Ok(());
        }

        let user = NewUser::system_admin(username, &self.config.server.password);
        match server.create_user(&user).await {
            Ok(_) => {
                info!("Created admin user {}", username);
                Ok(())
            }
            Err(HarnessError::Api { status, message, .. })
                if status == Some(409) || message.contains("already exists") =>
            {
                debug!("Admin user {} already exists", username);
                Ok(())
            }
            Err(e) => Err(HarnessError::Provision(format!(
                "cannot create admin user {}: {}",
                username, e
            ))),
        }
    }

    /// Confirm the configured credentials work by listing projects
    pub async fn verify(&self) -> Result<usize> {
        match self.server.list_projects().await {
            Ok(projects) => {
                info!("Credentials verified ({} projects visible)", projects.len());
                Ok(projects.len())
            }
            Err(e) => {
                warn!("Credential check failed: {}", e);
                Err(HarnessError::Provision(format!(
                    "credentials rejected by {}: {}",
                    self.config.server.url, e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeServer;
    use crate::utils::ManualClock;
    use crate::vcs::memory::MemoryRemote;
    use std::time::Duration;

    fn provisioner(server: Arc<FakeServer>, clock: Arc<ManualClock>) -> Provisioner {
        let mut config = RunConfig::default();
        config.timeouts.readiness_secs = 10;
        config.timeouts.readiness_interval_secs = 2;
        Provisioner::new(Arc::new(config), server, clock)
    }

    #[tokio::test]
    async fn test_waits_for_server_to_come_up() {
        let server = Arc::new(FakeServer::new(MemoryRemote::new()));
        server.set_unavailable(3);
        let clock = Arc::new(ManualClock::new());

        let info = provisioner(server, clock.clone())
            .provision(false)
            .await
            .unwrap();

        assert!(info.version.unwrap().starts_with("2024.03"));
        assert_eq!(clock.now(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_unready_server_is_a_provision_error() {
        let server = Arc::new(FakeServer::new(MemoryRemote::new()));
        server.set_unavailable(100);
        let clock = Arc::new(ManualClock::new());

        let err = provisioner(server, clock.clone()).wait_ready().await.unwrap_err();

        assert!(matches!(err, HarnessError::Provision(_)));
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_admin_setup_is_idempotent() {
        let server = Arc::new(FakeServer::new(MemoryRemote::new()));
        let p = provisioner(server.clone(), Arc::new(ManualClock::new()));

        p.ensure_admin().await.unwrap();
        p.ensure_admin().await.unwrap();

        assert_eq!(server.users(), vec!["admin".to_string()]);
    }

    #[test]
    fn test_container_runtime_needs_compose_file() {
        let err = ContainerRuntime::from_config(&RunConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::Config(_)));
    }
}
