use crate::error::{HarnessError, Result};
use std::path::PathBuf;

/// Find an external tool: explicit override variable first, then system PATH
pub fn find_binary(name: &str, override_var: &str) -> Result<PathBuf> {
    let mut checked_paths = Vec::new();

    if let Ok(path) = std::env::var(override_var) {
        let path = PathBuf::from(path);
        checked_paths.push(format!("{}: {:?}", override_var, path));
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(path) = which::which(name) {
        return Ok(path);
    }
    checked_paths.push("system PATH".to_string());

    Err(HarnessError::Config(format!(
        "could not find '{}'. Checked:\n{}",
        name,
        checked_paths.join("\n")
    )))
}

pub fn find_git() -> Result<PathBuf> {
    find_binary("git", "VSET_GIT_BIN")
}

pub fn find_docker() -> Result<PathBuf> {
    find_binary("docker", "VSET_DOCKER_BIN")
}
