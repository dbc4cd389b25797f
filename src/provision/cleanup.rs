//! Best-effort removal of everything a run may have left behind.

use super::ContainerRuntime;
use crate::client::CiServer;
use crate::utils::RunConfig;
use crate::vcs::RepositoryFactory;
use log::{info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CleanupReport {
    pub projects_removed: Vec<String>,
    pub branches_removed: usize,
    pub containers_stopped: bool,
    /// One line per failed removal; never escalated
    pub failures: Vec<String>,
}

/// Delete every project whose id starts with the test prefix, with its settings branch
pub async fn sweep(
    config: &RunConfig,
    server: &dyn CiServer,
    repos: &dyn RepositoryFactory,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    let projects = match server.list_projects().await {
        Ok(projects) => projects,
        Err(e) => {
            warn!("Cannot list projects for cleanup: {}", e);
            report.failures.push(format!("list projects: {}", e));
            return report;
        }
    };

    let ours = projects
        .into_iter()
        .filter(|p| p.id.starts_with(&config.project_prefix));
    for project in ours {
        match server.delete_project(&project.id).await {
            Ok(()) => {
                info!("Deleted project {}", project.id);
                report.projects_removed.push(project.id.clone());
            }
            Err(e) => {
                warn!("Failed to delete project {}: {}", project.id, e);
                report.failures.push(format!("project {}: {}", project.id, e));
                continue;
            }
        }

        if config.git.is_configured() {
            let branch = config.git.branch_for(&project.id);
            match repos.delete_branch(&branch).await {
                Ok(()) => report.branches_removed += 1,
                Err(e) => {
                    warn!("Failed to delete branch {}: {}", branch, e);
                    report.failures.push(format!("branch {}: {}", branch, e));
                }
            }
        }
    }

    report
}

/// `docker compose down`, recording rather than returning failures
pub async fn stop_containers(config: &RunConfig, report: &mut CleanupReport) {
    let stopped = match ContainerRuntime::from_config(config) {
        Ok(runtime) => runtime.down().await,
        Err(e) => Err(e),
    };
    match stopped {
        Ok(()) => report.containers_stopped = true,
        Err(e) => {
            warn!("Failed to stop containers: {}", e);
            report.failures.push(format!("containers: {}", e));
        }
    }
}

/// Stop the containers a run started itself, unless cleanup is disabled.
/// `None` when there was nothing to stop.
pub async fn teardown_run(config: &RunConfig, started_containers: bool) -> Option<CleanupReport> {
    if !started_containers {
        return None;
    }
    if !config.cleanup {
        info!("Cleanup disabled, leaving containers running");
        return None;
    }
    let mut report = CleanupReport::default();
    stop_containers(config, &mut report).await;
    Some(report)
}
