//! REST payloads exchanged with the CI server.
//!
//! Field names follow the server's JSON (camelCase, a few hyphenated list
//! keys). Optional fields default so partial `fields=` answers still parse.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerInfo {
    pub version: Option<String>,
    pub build_number: Option<String>,
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_project_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProjectList {
    pub project: Vec<ProjectRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    pub locator: String,
}

/// Body of `POST /projects`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parent_project: Locator,
}

impl NewProject {
    /// Top-level project under `_Root`
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            parent_project: Locator {
                locator: "id:_Root".to_string(),
            },
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Properties {
    pub property: Vec<Property>,
}

impl Properties {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.property
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            property: iter
                .into_iter()
                .map(|(name, value)| Property {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

/// Body of `POST /vcs-roots`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVcsRoot {
    pub name: String,
    pub vcs_name: String,
    pub project: IdRef,
    pub properties: Properties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcsRoot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
}

/// `versionedSettings/config`, sent and received
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionedSettingsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synchronization_mode: Option<String>,
    #[serde(rename = "allowUIEditing", skip_serializing_if = "Option::is_none")]
    pub allow_ui_editing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_secure_values_outside_vcs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs_root_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_settings_mode: Option<String>,
}

/// `versionedSettings/status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsStatus {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<String>,
    pub dsl_outdated: Option<bool>,
}

impl SettingsStatus {
    pub fn is_error(&self) -> bool {
        matches!(
            self.kind.as_deref().map(str::to_lowercase).as_deref(),
            Some("error") | Some("warn") | Some("warning")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTypeRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct BuildTypeList {
    pub build_type: Vec<BuildTypeRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StepList {
    pub step: Vec<BuildStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SnapshotDependency {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "source-buildType", default)]
    pub source_build_type: Option<BuildTypeRef>,
}

impl SnapshotDependency {
    /// Id of the build configuration depended upon
    pub fn source_id(&self) -> &str {
        self.source_build_type
            .as_ref()
            .map(|s| s.id.as_str())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SnapshotDependencyList {
    #[serde(rename = "snapshot-dependency")]
    pub snapshot_dependency: Vec<SnapshotDependency>,
}

/// Body of `POST /buildQueue`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBuild {
    pub build_type: IdRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Build {
    pub id: i64,
    pub build_type_id: Option<String>,
    /// queued | running | finished
    pub state: String,
    /// SUCCESS | FAILURE | UNKNOWN, once finished
    pub status: Option<String>,
    pub status_text: Option<String>,
    pub wait_reason: Option<String>,
    pub canceled_info: Option<serde_json::Value>,
    pub properties: Option<Properties>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub role_id: String,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Roles {
    pub role: Vec<Role>,
}

/// Body of `POST /users`
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub roles: Roles,
}

impl NewUser {
    pub fn system_admin(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            roles: Roles {
                role: vec![Role {
                    role_id: "SYSTEM_ADMIN".to_string(),
                    scope: "g".to_string(),
                }],
            },
        }
    }
}
