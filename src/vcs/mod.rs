//! Version-control side of versioned settings.

pub mod git;
#[cfg(test)]
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use git::{GitFactory, GitRepository};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commit {
    pub hash: String,
    pub subject: String,
}

/// Working copy of the settings repository, checked out on one branch
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    fn branch(&self) -> &str;

    /// Write `content` to `path` and commit it; returns the new commit hash
    async fn commit_file(&self, path: &str, content: &str, message: &str) -> Result<String>;

    async fn push(&self) -> Result<()>;

    /// Local HEAD
    async fn head(&self) -> Result<String>;

    /// Tip of the branch on the remote, if the branch exists there
    async fn remote_head(&self) -> Result<Option<String>>;

    /// Latest commits of the remote branch, newest first
    async fn remote_history(&self, limit: usize) -> Result<Vec<Commit>>;

    /// File content at the remote branch tip
    async fn read_remote_file(&self, path: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait RepositoryFactory: Send + Sync {
    /// Fresh working copy on `branch`, created from the default branch if missing
    async fn open(&self, branch: &str) -> Result<Box<dyn SettingsRepository>>;

    async fn delete_branch(&self, branch: &str) -> Result<()>;
}

/// Factory used when no settings repository is configured
pub struct NoRepository;

#[async_trait]
impl RepositoryFactory for NoRepository {
    async fn open(&self, branch: &str) -> Result<Box<dyn SettingsRepository>> {
        Err(crate::error::HarnessError::Vcs(format!(
            "cannot open branch {}: no settings repository configured (GIT_REPO_URL)",
            branch
        )))
    }

    async fn delete_branch(&self, _branch: &str) -> Result<()> {
        Ok(())
    }
}

/// Git-backed factory when a repository is configured, [`NoRepository`] otherwise
pub fn factory_from_config(
    config: &crate::utils::config::GitConfig,
) -> Result<std::sync::Arc<dyn RepositoryFactory>> {
    if config.is_configured() {
        Ok(std::sync::Arc::new(GitFactory::from_config(config)?))
    } else {
        Ok(std::sync::Arc::new(NoRepository))
    }
}
