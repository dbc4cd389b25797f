//! Request payloads shared by the suites.

use crate::client::types::{IdRef, NewProject, NewVcsRoot, Properties, VersionedSettingsConfig};
use crate::utils::config::GitConfig;

pub fn project(project_id: &str) -> NewProject {
    NewProject::new(project_id, &format!("Test Project {}", project_id))
        .with_description("Automated test project for Kotlin DSL validation")
}

/// Git root pointing at the scenario's settings branch
pub fn git_vcs_root(project_id: &str, git: &GitConfig, branch: &str) -> NewVcsRoot {
    let mut properties = vec![
        ("url", git.repo_url.clone().unwrap_or_default()),
        ("branch", format!("refs/heads/{}", branch)),
    ];
    match git.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            properties.push(("authMethod", "PASSWORD".to_string()));
            properties.push(("username", git.username.clone().unwrap_or_default()));
            properties.push(("secure:password", token.to_string()));
        }
        None => properties.push(("authMethod", "ANONYMOUS".to_string())),
    }

    NewVcsRoot {
        name: format!("{}_VCS", project_id),
        vcs_name: "jetbrains.git".to_string(),
        project: IdRef {
            id: project_id.to_string(),
        },
        properties: properties.into_iter().collect::<Properties>(),
    }
}

/// Kotlin settings, synchronized both ways, loaded from VCS on enable
pub fn versioned_settings(vcs_root_id: &str) -> VersionedSettingsConfig {
    VersionedSettingsConfig {
        format: Some("kotlin".to_string()),
        synchronization_mode: Some("enabled".to_string()),
        allow_ui_editing: Some(true),
        store_secure_values_outside_vcs: Some(true),
        vcs_root_id: Some(vcs_root_id.to_string()),
        import_decision: Some("importFromVCS".to_string()),
        build_settings_mode: Some("useFromVCS".to_string()),
    }
}
