//! Structural comparison between a DSL definition and what the server reports.

use super::model::PipelineDefinition;
use crate::client::CiServer;
use crate::error::Result;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualBuildType {
    pub id: String,
    pub name: String,
    /// Step names, or the runner type for unnamed steps
    pub steps: Vec<String>,
    /// Names of snapshot dependencies
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActualProject {
    pub build_types: Vec<ActualBuildType>,
}

impl ActualProject {
    /// Read build types, steps and snapshot dependencies of a project
    pub async fn fetch(server: &dyn CiServer, project_id: &str) -> Result<Self> {
        let refs = server.build_types(project_id).await?;
        let mut build_types = Vec::with_capacity(refs.len());

        for bt in &refs {
            let steps = server
                .build_steps(&bt.id)
                .await?
                .into_iter()
                .map(|s| if s.name.is_empty() { s.kind } else { s.name })
                .collect();
            let dependencies = server
                .snapshot_dependencies(&bt.id)
                .await?
                .into_iter()
                .map(|id| {
                    refs.iter()
                        .find(|r| r.id == id)
                        .map(|r| r.name.clone())
                        .unwrap_or(id)
                })
                .collect();

            build_types.push(ActualBuildType {
                id: bt.id.clone(),
                name: bt.name.clone(),
                steps,
                dependencies,
            });
        }

        Ok(Self { build_types })
    }

    pub fn find(&self, name: &str) -> Option<&ActualBuildType> {
        self.build_types.iter().find(|bt| bt.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    MissingBuildType {
        name: String,
    },
    UnexpectedBuildType {
        name: String,
    },
    StepsDiffer {
        build_type: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    DependenciesDiffer {
        build_type: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::MissingBuildType { name } => write!(f, "build type '{}' is missing", name),
            Mismatch::UnexpectedBuildType { name } => {
                write!(f, "build type '{}' is not in the definition", name)
            }
            Mismatch::StepsDiffer {
                build_type,
                expected,
                actual,
            } => write!(
                f,
                "steps of '{}' differ: expected {:?}, got {:?}",
                build_type, expected, actual
            ),
            Mismatch::DependenciesDiffer {
                build_type,
                expected,
                actual,
            } => write!(
                f,
                "dependencies of '{}' differ: expected {:?}, got {:?}",
                build_type, expected, actual
            ),
        }
    }
}

/// Compare build type names, step order and dependencies. Unnamed expected
/// steps only count toward the step total.
pub fn compare(expected: &PipelineDefinition, actual: &ActualProject) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    for def in &expected.build_types {
        let Some(found) = actual.find(&def.name) else {
            mismatches.push(Mismatch::MissingBuildType {
                name: def.name.clone(),
            });
            continue;
        };

        let steps_match = def.steps.len() == found.steps.len()
            && def
                .steps
                .iter()
                .zip(&found.steps)
                .all(|(step, actual)| step.name.as_ref().map_or(true, |n| n == actual));
        if !steps_match {
            mismatches.push(Mismatch::StepsDiffer {
                build_type: def.name.clone(),
                expected: def.steps.iter().map(|s| s.label().to_string()).collect(),
                actual: found.steps.clone(),
            });
        }

        let mut want = expected.dependency_names(def);
        let mut got = found.dependencies.clone();
        want.sort();
        got.sort();
        if want != got {
            mismatches.push(Mismatch::DependenciesDiffer {
                build_type: def.name.clone(),
                expected: want,
                actual: got,
            });
        }
    }

    for bt in &actual.build_types {
        if expected.find(&bt.name).is_none() {
            mismatches.push(Mismatch::UnexpectedBuildType {
                name: bt.name.clone(),
            });
        }
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::templates::{self, TemplateLoader};

    fn multi_stage() -> PipelineDefinition {
        let text = TemplateLoader::builtin()
            .render_default(templates::MULTI_STAGE)
            .unwrap();
        PipelineDefinition::parse(&text).unwrap()
    }

    fn actual(name: &str, steps: &[&str], deps: &[&str]) -> ActualBuildType {
        ActualBuildType {
            id: format!("P_{}", name),
            name: name.to_string(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_matching_project_has_no_mismatches() {
        let project = ActualProject {
            build_types: vec![
                actual("Deploy", &["Deploy application"], &["Build"]),
                actual("Test", &["Run tests"], &[]),
                actual("Build", &["Build application"], &["Test"]),
            ],
        };
        assert!(compare(&multi_stage(), &project).is_empty());
    }

    #[test]
    fn test_reports_each_difference() {
        let project = ActualProject {
            build_types: vec![
                actual("Test", &["Run tests", "Extra"], &[]),
                actual("Build", &["Build application"], &[]),
                actual("Lint", &["lint"], &[]),
            ],
        };
        let mismatches = compare(&multi_stage(), &project);

        assert!(mismatches.contains(&Mismatch::MissingBuildType {
            name: "Deploy".to_string()
        }));
        assert!(mismatches.contains(&Mismatch::UnexpectedBuildType {
            name: "Lint".to_string()
        }));
        assert!(mismatches
            .iter()
            .any(|m| matches!(m, Mismatch::StepsDiffer { build_type, .. } if build_type == "Test")));
        assert!(mismatches
            .iter()
            .any(|m| matches!(m, Mismatch::DependenciesDiffer { build_type, .. } if build_type == "Build")));
        assert_eq!(mismatches.len(), 4);
    }
}
