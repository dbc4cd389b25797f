use super::operation::{classify_build, classify_settings, Operation, OperationKind, OperationStatus};
use super::types::*;
use crate::error::Result;
use async_trait::async_trait;

/// REST surface of the CI server used by suites and the provisioner
#[async_trait]
pub trait CiServer: Send + Sync {
    async fn server_info(&self) -> Result<ServerInfo>;

    async fn list_projects(&self) -> Result<Vec<ProjectRef>>;
    async fn get_project(&self, project_id: &str) -> Result<Project>;
    async fn create_project(&self, project: &NewProject) -> Result<Project>;
    async fn delete_project(&self, project_id: &str) -> Result<()>;

    async fn create_vcs_root(&self, root: &NewVcsRoot) -> Result<VcsRoot>;
    async fn enable_versioned_settings(
        &self,
        project_id: &str,
        config: &VersionedSettingsConfig,
    ) -> Result<()>;
    async fn versioned_settings_status(&self, project_id: &str) -> Result<SettingsStatus>;

    /// Load settings from the VCS root into the project
    async fn trigger_import(&self, project_id: &str) -> Result<Operation>;
    /// Ask the server to pick up new settings commits
    async fn trigger_sync(&self, project_id: &str) -> Result<Operation>;
    /// Commit the server's current settings into the VCS root
    async fn trigger_export(&self, project_id: &str) -> Result<Operation>;

    async fn build_types(&self, project_id: &str) -> Result<Vec<BuildTypeRef>>;
    async fn build_steps(&self, build_type_id: &str) -> Result<Vec<BuildStep>>;
    /// Ids of the build configurations this one snapshot-depends on
    async fn snapshot_dependencies(&self, build_type_id: &str) -> Result<Vec<String>>;
    async fn rename_build_type(&self, build_type_id: &str, name: &str) -> Result<()>;
    async fn delete_build_type(&self, build_type_id: &str) -> Result<()>;

    async fn trigger_build(
        &self,
        build_type_id: &str,
        properties: Option<Properties>,
    ) -> Result<Operation>;
    async fn build(&self, build_id: i64) -> Result<Build>;
    async fn build_log(&self, build_id: i64) -> Result<String>;

    async fn find_user(&self, username: &str) -> Result<Option<User>>;
    async fn create_user(&self, user: &NewUser) -> Result<User>;

    /// One status probe of a triggered operation
    async fn observe(&self, operation: &Operation) -> Result<OperationStatus> {
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
