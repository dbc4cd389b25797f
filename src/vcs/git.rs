//! `git` executable driving a temporary working copy.

use super::{Commit, RepositoryFactory, SettingsRepository};
use crate::error::{HarnessError, Result};
use crate::utils::binary_resolver;
use crate::utils::config::GitConfig;
use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;

const AUTHOR_NAME: &str = "vset-tester";
const AUTHOR_EMAIL: &str = "vset-tester@localhost";

/// Embed username/token into an http(s) remote; other remotes pass through
pub fn authenticated_url(repo_url: &str, username: Option<&str>, token: Option<&str>) -> String {
    let Ok(mut url) = url::Url::parse(repo_url) else {
        return repo_url.to_string();
    };
    if !matches!(url.scheme(), "http" | "https") {
        return repo_url.to_string();
    }
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        let user = username.filter(|u| !u.is_empty()).unwrap_or("git");
        if url.set_username(user).is_err() || url.set_password(Some(token)).is_err() {
            return repo_url.to_string();
        }
    }
    url.to_string()
}

/// Remote with any password replaced, for logs
pub fn redact(remote: &str) -> String {
    match url::Url::parse(remote) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => remote.to_string(),
    }
}

async fn run_git(git: &Path, dir: &Path, args: &[&str]) -> Result<String> {
    debug!("git {}", args.iter().map(|a| redact(a)).collect::<Vec<_>>().join(" "));
    let output = Command::new(git)
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| HarnessError::Vcs(format!("failed to execute git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HarnessError::Vcs(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            redact(stderr.trim())
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Opens working copies of one settings repository
#[derive(Debug, Clone)]
pub struct GitFactory {
    git: PathBuf,
    remote: String,
}

impl GitFactory {
    pub fn new(git: PathBuf, remote: String) -> Self {
        Self { git, remote }
    }

    pub fn from_config(config: &GitConfig) -> Result<Self> {
        let repo_url = config
            .repo_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| HarnessError::Config("GIT_REPO_URL is not configured".to_string()))?;

        Ok(Self::new(
            binary_resolver::find_git()?,
            authenticated_url(repo_url, config.username.as_deref(), config.token.as_deref()),
        ))
    }
}

#[async_trait]
impl RepositoryFactory for GitFactory {
    async fn open(&self, branch: &str) -> Result<Box<dyn SettingsRepository>> {
        Ok(Box::new(
            GitRepository::open(&self.git, &self.remote, branch).await?,
        ))
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        let dir = TempDir::new()?;
        run_git(&self.git, dir.path(), &["init", "--quiet"]).await?;
        run_git(
            &self.git,
            dir.path(),
            &["push", "--quiet", &self.remote, "--delete", branch],
        )
        .await?;
        info!("Deleted branch {}", branch);
        Ok(())
    }
}

/// Clone of the settings repository in a temporary directory, removed on drop
pub struct GitRepository {
    git: PathBuf,
    dir: TempDir,
    branch: String,
}

impl GitRepository {
    pub async fn open(git: &Path, remote: &str, branch: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let target = dir.path().to_string_lossy().to_string();
        run_git(git, dir.path(), &["clone", "--quiet", remote, &target]).await?;

        let repo = Self {
            git: git.to_path_buf(),
            dir,
            branch: branch.to_string(),
        };

        let tracking = format!("origin/{}", branch);
        if repo.remote_head().await?.is_some() {
            repo.run(&["checkout", "--quiet", "-B", branch, &tracking]).await?;
        } else {
            repo.run(&["checkout", "--quiet", "-B", branch]).await?;
        }
        info!("Cloned {} on branch {}", redact(remote), branch);
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        run_git(&self.git, self.dir.path(), args).await
    }

    async fn fetch(&self) -> Result<()> {
        self.run(&["fetch", "--quiet", "origin", &self.branch]).await.map(|_| ())
    }
}

#[async_trait]
impl SettingsRepository for GitRepository {
    fn branch(&self) -> &str {
        &self.branch
    }

    async fn commit_file(&self, path: &str, content: &str, message: &str) -> Result<String> {
        let full_path = self.dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;

        self.run(&["add", path]).await?;
        let name = format!("user.name={}", AUTHOR_NAME);
        let email = format!("user.email={}", AUTHOR_EMAIL);
        self.run(&[
            "-c",
            &name,
            "-c",
            &email,
            "commit",
            "--quiet",
            "--allow-empty",
            "-m",
            message,
        ])
        .await?;

        let hash = self.head().await?;
        info!("Created commit {} on {}", hash, self.branch);
        Ok(hash)
    }

    async fn push(&self) -> Result<()> {
        self.run(&["push", "--quiet", "-u", "origin", &self.branch])
            .await?;
        info!("Pushed {}", self.branch);
        Ok(())
    }

    async fn head(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"]).await
    }

    async fn remote_head(&self) -> Result<Option<String>> {
        let refname = format!("refs/heads/{}", self.branch);
        let out = self.run(&["ls-remote", "origin", &refname]).await?;
        Ok(out
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(str::to_string))
    }

    async fn remote_history(&self, limit: usize) -> Result<Vec<Commit>> {
        if self.remote_head().await?.is_none() {
            return Ok(Vec::new());
        }
        self.fetch().await?;

        let count = format!("-n{}", limit);
        let tracking = format!("origin/{}", self.branch);
        let out = self
            .run(&["log", "--format=%H%x1f%s", &count, &tracking])
            .await?;

        Ok(out
            .lines()
            .filter_map(|line| {
                let (hash, subject) = line.split_once('\u{1f}')?;
                Some(Commit {
                    hash: hash.to_string(),
                    subject: subject.to_string(),
                })
            })
            .collect())
    }

    async fn read_remote_file(&self, path: &str) -> Result<Option<String>> {
        if self.remote_head().await?.is_none() {
            return Ok(None);
        }
        self.fetch().await?;

        let spec = format!("origin/{}:{}", self.branch, path);
        match self.run(&["show", &spec]).await {
            Ok(content) => Ok(Some(content)),
            Err(_) => Ok(None),
        }
    }
}
