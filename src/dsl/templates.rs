//! Kotlin DSL fixtures.
//!
//! Templates come from a directory of `*.kts` files, falling back to the
//! built-in set below. `${name}` placeholders are substituted from a variable
//! map; unknown placeholders are left untouched so Kotlin string templates
//! survive rendering.

use crate::error::{HarnessError, Result};
use crate::utils::config::RunConfig;
use log::debug;
use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

pub const SIMPLE_BUILD: &str = "simple_build";
pub const MULTI_STAGE: &str = "multi_stage";
pub const FAILING_BUILD: &str = "failing_build";
pub const UPDATED_BUILD: &str = "updated_build";
pub const LARGE_PROJECT: &str = "large_project";
pub const GENERATED_BUILDS: &str = "generated_builds";
pub const MALFORMED: &str = "malformed";

const BLOCK_START: &str = "// BUILD_TEMPLATE_START";
const BLOCK_END: &str = "// BUILD_TEMPLATE_END";
const DECLARATIONS: &str = "// BUILD_DECLARATIONS";

const SIMPLE_BUILD_KTS: &str = r#"import jetbrains.buildServer.configs.kotlin.*
import jetbrains.buildServer.configs.kotlin.buildSteps.script

version = "${dsl_version}"

project {
    buildType(Build)
}

object Build : BuildType({
    name = "Build"

    vcs {
        root(DslContext.settingsRoot)
    }

    steps {
        script {
            name = "Compile"
            scriptContent = "echo 'Hello from Kotlin DSL!'"
        }
        script {
            name = "Verify"
            scriptContent = "echo 'Verifying build output'"
        }
    }
})
"#;

const MULTI_STAGE_KTS: &str = r#"import jetbrains.buildServer.configs.kotlin.*
import jetbrains.buildServer.configs.kotlin.buildSteps.script

version = "${dsl_version}"

project {
    buildType(Test)
    buildType(Build)
    buildType(Deploy)
}

object Test : BuildType({
    name = "Test"

    steps {
        script {
            name = "Run tests"
            scriptContent = "echo 'Running tests'"
        }
    }
})

object Build : BuildType({
    name = "Build"

    dependencies {
        snapshot(Test) {}
    }

    steps {
        script {
            name = "Build application"
            scriptContent = "echo 'Building application'"
        }
    }
})

object Deploy : BuildType({
    name = "Deploy"

    dependencies {
        snapshot(Build) {}
    }

    steps {
        script {
            name = "Deploy application"
            scriptContent = "echo 'Deploying application'"
        }
    }
})
"#;

const FAILING_BUILD_KTS: &str = r#"import jetbrains.buildServer.configs.kotlin.*
import jetbrains.buildServer.configs.kotlin.buildSteps.script

version = "${dsl_version}"

project {
    buildType(FailingBuild)
}

object FailingBuild : BuildType({
    name = "Failing Build"

    steps {
        script {
            name = "Fail"
            scriptContent = "exit 1"  // fails the build on purpose
        }
    }
})
"#;

const UPDATED_BUILD_KTS: &str = r#"import jetbrains.buildServer.configs.kotlin.*
import jetbrains.buildServer.configs.kotlin.buildSteps.script

version = "${dsl_version}"

project {
    buildType(Build)
}

object Build : BuildType({
    name = "Updated Build"

    steps {
        script {
            name = "Setup"
            scriptContent = "echo 'Setting up environment'"
        }
        script {
            name = "Build"
            scriptContent = "echo 'Building application'"
        }
        script {
            name = "Test"
            scriptContent = "echo 'Running tests'"
        }
        script {
            name = "Package"
            scriptContent = "echo 'Packaging application'"
        }
    }
})
"#;

const LARGE_PROJECT_KTS: &str = r#"import jetbrains.buildServer.configs.kotlin.*
import jetbrains.buildServer.configs.kotlin.buildSteps.script

version = "${dsl_version}"

project {
    buildType(Build1)
    buildType(Build2)
    buildType(Build3)
    buildType(Deploy)
}

object Build1 : BuildType({
    name = "Unit Tests"

    steps {
        script {
            name = "Unit"
            scriptContent = "echo 'Running unit tests'"
        }
    }
})

object Build2 : BuildType({
    name = "Integration Tests"

    steps {
        script {
            name = "Integration"
            scriptContent = "echo 'Running integration tests'"
        }
    }
})

object Build3 : BuildType({
    name = "Performance Tests"

    steps {
        script {
            name = "Performance"
            scriptContent = "echo 'Running performance tests'"
        }
    }
})

object Deploy : BuildType({
    name = "Deploy"

    dependencies {
        snapshot(Build1) {}
        snapshot(Build2) {}
        snapshot(Build3) {}
    }

    steps {
        script {
            name = "Deploy"
            scriptContent = "echo 'Deploying application'"
        }
    }
})
"#;

const GENERATED_BUILDS_KTS: &str = r#"import jetbrains.buildServer.configs.kotlin.*
import jetbrains.buildServer.configs.kotlin.buildSteps.script

version = "${dsl_version}"

project {
// BUILD_DECLARATIONS
}

// BUILD_TEMPLATE_START
object ${build_name} : BuildType({
    name = "${build_name}"
    description = "${build_description}"

    steps {
        script {
            name = "Step ${build_number}"
            scriptContent = "echo 'Running build ${build_number}'"
        }
    }
})
// BUILD_TEMPLATE_END
"#;

const MALFORMED_KTS: &str = r#"import jetbrains.buildServer.configs.kotlin.*

version = "${dsl_version}"

project {
    buildType(Broken
}

object Broken : BuildType({
    name = "Broken"

    steps {
        script {
            scriptContent = "echo 'unterminated block'"
"#;

const BUILTINS: &[(&str, &str)] = &[
    (SIMPLE_BUILD, SIMPLE_BUILD_KTS),
    (MULTI_STAGE, MULTI_STAGE_KTS),
    (FAILING_BUILD, FAILING_BUILD_KTS),
    (UPDATED_BUILD, UPDATED_BUILD_KTS),
    (LARGE_PROJECT, LARGE_PROJECT_KTS),
    (GENERATED_BUILDS, GENERATED_BUILDS_KTS),
    (MALFORMED, MALFORMED_KTS),
];

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").expect("placeholder pattern"))
}

/// Replace `${key}` with values from `vars`, leaving unknown keys as they are
pub fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
    placeholder()
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Repeat the `BUILD_TEMPLATE` block `count` times as `Build1..BuildN` and
/// list them where `// BUILD_DECLARATIONS` stands. Text without a block is returned as is.
pub fn expand_builds(template: &str, count: usize) -> String {
    let (start, end) = match (template.find(BLOCK_START), template.find(BLOCK_END)) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return template.to_string(),
    };

    let block = &template[start + BLOCK_START.len()..end];
    let mut builds = Vec::with_capacity(count);
    let mut declarations = Vec::with_capacity(count);

    for i in 1..=count {
        let build_name = format!("Build{}", i);
        declarations.push(format!("    buildType({})", build_name));

        let vars: HashMap<String, String> = [
            ("build_name", build_name.clone()),
            ("build_number", i.to_string()),
            (
                "build_description",
                format!("Automated build configuration {}", i),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        builds.push(substitute(block.trim_matches('\n'), &vars));
    }

    let mut result = String::with_capacity(template.len() * count.max(1));
    result.push_str(&template[..start]);
    result.push_str(&builds.join("\n\n"));
    result.push_str(&template[end + BLOCK_END.len()..]);
    result.replace(DECLARATIONS, &declarations.join("\n"))
}

/// Loads DSL templates from an optional directory and the built-in set
#[derive(Debug, Clone, Default)]
pub struct TemplateLoader {
    dir: Option<PathBuf>,
    defaults: HashMap<String, String>,
}

impl TemplateLoader {
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn with_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(HarnessError::Config(format!(
                "DSL templates directory not found: {}",
                dir.display()
            )));
        }
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            defaults: HashMap::new(),
        })
    }

    /// Loader for a run: configured directory (if any) and the DSL version as default variable
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let loader = match &config.templates_dir {
            Some(dir) => Self::with_dir(dir)?,
            None => Self::builtin(),
        };
        Ok(loader.with_default("dsl_version", &config.dsl_version))
    }

    pub fn with_default(mut self, key: &str, value: &str) -> Self {
        self.defaults.insert(key.to_string(), value.to_string());
        self
    }

    fn dir_templates(&self) -> Vec<(String, PathBuf)> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };
        WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "kts"))
            .filter_map(|entry| {
                let stem = entry.path().file_stem()?.to_string_lossy().to_string();
                Some((stem, entry.path().to_path_buf()))
            })
            .collect()
    }

    /// Names of every template available, sorted
    pub fn list_available(&self) -> Vec<String> {
        let names: BTreeSet<String> = BUILTINS
            .iter()
            .map(|(name, _)| name.to_string())
            .chain(self.dir_templates().into_iter().map(|(name, _)| name))
            .collect();
        names.into_iter().collect()
    }

    /// Raw template text; a directory template shadows a built-in of the same name
    pub fn load(&self, name: &str) -> Result<String> {
        if let Some((_, path)) = self.dir_templates().into_iter().find(|(n, _)| n == name) {
            debug!("Loading DSL template {} from {}", name, path.display());
            return Ok(std::fs::read_to_string(path)?);
        }

        BUILTINS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, text)| text.to_string())
            .ok_or_else(|| {
                HarnessError::Config(format!(
                    "template '{}' not found. Available: {}",
                    name,
                    self.list_available().join(", ")
                ))
            })
    }

    /// Template with block expansion (`build_count`) and variables applied
    pub fn render(&self, name: &str, vars: &HashMap<String, String>) -> Result<String> {
        let mut all = self.defaults.clone();
        all.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut text = self.load(name)?;
        if let Some(count) = all.get("build_count") {
            let count: usize = count.parse().map_err(|_| {
                HarnessError::Dsl(format!("build_count must be a number, got '{}'", count))
            })?;
            text = expand_builds(&text, count);
        }
        Ok(substitute(&text, &all))
    }

    pub fn render_default(&self, name: &str) -> Result<String> {
        self.render(name, &HashMap::new())
    }
}
