//! In-memory remote and working copies for tests.

use super::{Commit, RepositoryFactory, SettingsRepository};
use crate::error::{HarnessError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Snapshot {
    hash: String,
    subject: String,
    files: HashMap<String, String>,
}

fn new_hash() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Branches of a shared remote, oldest commit first
#[derive(Debug, Default)]
pub struct MemoryRemote {
    branches: Mutex<HashMap<String, Vec<Snapshot>>>,
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn branch(&self, branch: &str) -> Vec<Snapshot> {
        self.branches
            .lock()
            .map(|b| b.get(branch).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn head(&self, branch: &str) -> Option<String> {
        self.branch(branch).last().map(|s| s.hash.clone())
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        self.branch(branch)
            .last()
            .and_then(|s| s.files.get(path).cloned())
    }

    pub fn history(&self, branch: &str) -> Vec<Commit> {
        self.branch(branch)
            .iter()
            .rev()
            .map(|s| Commit {
                hash: s.hash.clone(),
                subject: s.subject.clone(),
            })
            .collect()
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.branches
            .lock()
            .map(|b| b.contains_key(branch))
            .unwrap_or(false)
    }

    /// Commit straight onto the remote, the way the server's export does
    pub fn commit(&self, branch: &str, path: &str, content: &str, subject: &str) -> String {
        let hash = new_hash();
        if let Ok(mut branches) = self.branches.lock() {
            let commits = branches.entry(branch.to_string()).or_default();
            let mut files = commits.last().map(|s| s.files.clone()).unwrap_or_default();
            files.insert(path.to_string(), content.to_string());
            commits.push(Snapshot {
                hash: hash.clone(),
                subject: subject.to_string(),
                files,
            });
        }
        hash
    }

    fn replace(&self, branch: &str, commits: Vec<Snapshot>) {
        if let Ok(mut branches) = self.branches.lock() {
            branches.insert(branch.to_string(), commits);
        }
    }

    fn remove(&self, branch: &str) {
        if let Ok(mut branches) = self.branches.lock() {
            branches.remove(branch);
        }
    }
}

pub struct MemoryRepository {
    remote: Arc<MemoryRemote>,
    branch: String,
    local: Mutex<Vec<Snapshot>>,
}

#[async_trait]
impl SettingsRepository for MemoryRepository {
    fn branch(&self) -> &str {
        &self.branch
    }

    async fn commit_file(&self, path: &str, content: &str, message: &str) -> Result<String> {
        let mut local = self
            .local
            .lock()
            .map_err(|_| HarnessError::Vcs("working copy poisoned".to_string()))?;
        let mut files = local.last().map(|s| s.files.clone()).unwrap_or_default();
        files.insert(path.to_string(), content.to_string());
        let hash = new_hash();
        local.push(Snapshot {
            hash: hash.clone(),
            subject: message.to_string(),
            files,
        });
        Ok(hash)
    }

    async fn push(&self) -> Result<()> {
        let local = self
            .local
            .lock()
            .map_err(|_| HarnessError::Vcs("working copy poisoned".to_string()))?
            .clone();
        let remote = self.remote.branch(&self.branch);
        if remote.len() > local.len() || remote.iter().zip(&local).any(|(r, l)| r.hash != l.hash) {
            return Err(HarnessError::Vcs(format!(
                "push to {} rejected: remote contains work you do not have",
                self.branch
            )));
        }
        self.remote.replace(&self.branch, local);
        Ok(())
    }

    async fn head(&self) -> Result<String> {
        self.local
            .lock()
            .ok()
            .and_then(|l| l.last().map(|s| s.hash.clone()))
            .ok_or_else(|| HarnessError::Vcs("no commits yet".to_string()))
    }

    async fn remote_head(&self) -> Result<Option<String>> {
        Ok(self.remote.head(&self.branch))
    }

    async fn remote_history(&self, limit: usize) -> Result<Vec<Commit>> {
        Ok(self
            .remote
            .history(&self.branch)
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn read_remote_file(&self, path: &str) -> Result<Option<String>> {
        Ok(self.remote.file(&self.branch, path))
    }
}

pub struct MemoryFactory {
    pub remote: Arc<MemoryRemote>,
}

impl MemoryFactory {
    pub fn new(remote: Arc<MemoryRemote>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl RepositoryFactory for MemoryFactory {
    async fn open(&self, branch: &str) -> Result<Box<dyn SettingsRepository>> {
        Ok(Box::new(MemoryRepository {
            remote: self.remote.clone(),
            branch: branch.to_string(),
            local: Mutex::new(self.remote.branch(branch)),
        }))
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.remote.remove(branch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_is_rejected_when_remote_moved() {
        let remote = MemoryRemote::new();
        let factory = MemoryFactory::new(remote.clone());
        let repo = factory.open("vset/P1").await.unwrap();

        remote.commit("vset/P1", "settings.kts", "server", "Export from server");
        repo.commit_file("settings.kts", "local", "Local change").await.unwrap();

        assert!(repo.push().await.is_err());

        let fresh = factory.open("vset/P1").await.unwrap();
        fresh.commit_file("settings.kts", "local", "Local change").await.unwrap();
        fresh.push().await.unwrap();
        assert_eq!(remote.history("vset/P1").len(), 2);
        assert_eq!(remote.file("vset/P1", "settings.kts").as_deref(), Some("local"));
    }
}
