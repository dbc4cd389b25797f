//! Builds of imported configurations: status, step order, parameters and dependencies.

use crate::client::types::Properties;
use crate::client::{poll_status, trigger_checked_build, wait_until, PollConfig, TerminalStatus};
use crate::dsl::{templates, PipelineDefinition};
use crate::error::{HarnessError, Result};
use crate::runner::scenario::expect_success;
use crate::runner::{Scenario, ScenarioContext};
use futures::future::{join_all, BoxFuture};
use regex::Regex;
use std::sync::OnceLock;

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "build_success",
        run: build_success,
        requires_vcs: true,
    },
    Scenario {
        name: "build_with_parameters",
        run: build_with_parameters,
        requires_vcs: true,
    },
    Scenario {
        name: "multi_stage_pipeline",
        run: multi_stage_pipeline,
        requires_vcs: true,
    },
    Scenario {
        name: "failing_build_reports_failure",
        run: failing_build_reports_failure,
        requires_vcs: true,
    },
    Scenario {
        name: "concurrent_builds",
        run: concurrent_builds,
        requires_vcs: true,
    },
    Scenario {
        name: "updated_pipeline_step_order",
        run: updated_pipeline_step_order,
        requires_vcs: true,
    },
    Scenario {
        name: "unresolved_dependency_fails_fast",
        run: unresolved_dependency_fails_fast,
        requires_vcs: true,
    },
];

const CONCURRENT_BUILDS: usize = 3;

fn step_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)Step (\d+)/(\d+): (.+?)(?: \([^()]*\))?\s*$").expect("step line pattern")
    })
}

/// Names of the steps a build log reports as started, in log order
pub fn executed_steps(log: &str) -> Vec<String> {
    let mut steps: Vec<(usize, String)> = Vec::new();
    for caps in step_line().captures_iter(log) {
        let index: usize = caps[1].parse().unwrap_or(0);
        if steps.iter().all(|(i, _)| *i != index) {
            steps.push((index, caps[3].trim().to_string()));
        }
    }
    steps.into_iter().map(|(_, name)| name).collect()
}

/// Step labels declared for `build_type` in `settings`
fn declared_steps(settings: &str, build_type: &str) -> Result<Vec<String>> {
    let definition = PipelineDefinition::parse(settings)?;
    let def = definition.find(build_type).ok_or_else(|| {
        HarnessError::Dsl(format!("no build configuration named '{}'", build_type))
    })?;
    Ok(def.steps.iter().map(|s| s.label().to_string()).collect())
}

async fn verify_step_order(
    ctx: &mut ScenarioContext,
    build_id: i64,
    expected: &[String],
) -> Result<()> {
    let log = ctx.server().build_log(build_id).await?;
    let executed = executed_steps(&log);
    ctx.capture("executed_steps", &executed);
    verify_eq!(executed, expected.to_vec(), "executed build steps");
    Ok(())
}

fn build_id(operation: &crate::client::Operation) -> Result<i64> {
    match operation.kind {
        crate::client::OperationKind::Build { build_id } => Ok(build_id),
        _ => Err(HarnessError::assertion(format!("{} is not a build", operation))),
    }
}

fn build_success(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 1).await?;
        let build_type = ctx.build_type_id(&project.project_id, "Build").await?;

        let (operation, status) = ctx.run_build(&project.project_id, &build_type, None).await?;
        expect_success(&status, "build")?;

        let expected = declared_steps(&project.settings, "Build")?;
        verify_step_order(ctx, build_id(&operation)?, &expected).await
    })
}

fn build_with_parameters(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 1).await?;
        let build_type = ctx.build_type_id(&project.project_id, "Build").await?;

        let properties: Properties = [
            ("env.TEST_PARAM", "test_value"),
            ("system.test.parameter", "param_value"),
        ]
        .into_iter()
        .collect();
        let (operation, status) = ctx
            .run_build(&project.project_id, &build_type, Some(properties.clone()))
            .await?;
        expect_success(&status, "parameterized build")?;

        let build = ctx.server().build(build_id(&operation)?).await?;
        ctx.capture("build", &build);
        let actual = build.properties.unwrap_or_default();
        for property in &properties.property {
            verify_eq!(
                actual.get(&property.name),
                Some(property.value.as_str()),
                format!("build parameter {}", property.name)
            );
        }
        Ok(())
    })
}

fn multi_stage_pipeline(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::MULTI_STAGE, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 3).await?;
        let server = ctx.server();

        let test = ctx.build_type_id(&project.project_id, "Test").await?;
        let build = ctx.build_type_id(&project.project_id, "Build").await?;
        let deploy = ctx.build_type_id(&project.project_id, "Deploy").await?;

        let deploy_deps = server.snapshot_dependencies(&deploy).await?;
        verify!(
            deploy_deps.contains(&build),
            "Deploy does not depend on Build: {:?}",
            deploy_deps
        );
        let build_deps = server.snapshot_dependencies(&build).await?;
        verify!(
            build_deps.contains(&test),
            "Build does not depend on Test: {:?}",
            build_deps
        );

        let (operation, status) = ctx.run_build(&project.project_id, &deploy, None).await?;
        expect_success(&status, "Deploy build")?;
        let expected = declared_steps(&project.settings, "Deploy")?;
        verify_step_order(ctx, build_id(&operation)?, &expected).await
    })
}

fn failing_build_reports_failure(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::FAILING_BUILD, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 1).await?;
        let build_type = ctx.build_type_id(&project.project_id, "Failing Build").await?;

        let (_, status) = ctx.run_build(&project.project_id, &build_type, None).await?;
        verify!(
            matches!(status, TerminalStatus::Failure { .. }),
            "build with a failing step finished as {}",
            status
        );
        Ok(())
    })
}

fn concurrent_builds(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 1).await?;
        let build_type = ctx.build_type_id(&project.project_id, "Build").await?;
        let server = ctx.server();

        let mut operations = Vec::with_capacity(CONCURRENT_BUILDS);
        for _ in 0..CONCURRENT_BUILDS {
            operations.push(
                trigger_checked_build(server.as_ref(), &project.project_id, &build_type, None)
                    .await?,
            );
        }
        let mut ids: Vec<&str> = operations.iter().map(|op| op.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        verify_eq!(ids.len(), CONCURRENT_BUILDS, "distinct queued builds");

        let config = PollConfig::for_builds(&ctx.config().timeouts);
        let clock = ctx.env.clock.clone();
        let statuses = join_all(
            operations
                .iter()
                .map(|op| poll_status(server.as_ref(), clock.as_ref(), op, &config)),
        )
        .await;

        for (operation, status) in operations.iter().zip(statuses) {
            let status = status?;
            ctx.capture(&operation.to_string(), &status);
            expect_success(&status, &operation.to_string())?;
        }
        Ok(())
    })
}

fn updated_pipeline_step_order(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 1).await?;

        let updated = ctx.render(templates::UPDATED_BUILD, &[])?;
        ctx.push_settings(project.repo.as_ref(), &updated, "Update build steps")
            .await?;
        let status = ctx.sync(&project.project_id).await?;
        expect_success(&status, "sync of the updated pipeline")?;

        let server = ctx.server();
        let timeouts = &ctx.config().timeouts;
        let project_id = project.project_id.as_str();
        wait_until(
            ctx.env.clock.as_ref(),
            "build configuration 'Updated Build'",
            timeouts.operation(),
            timeouts.poll_interval(),
            || {
                let server = server.clone();
                async move {
                    let found = server.build_types(project_id).await?;
                    Ok::<bool, HarnessError>(found.iter().any(|bt| bt.name == "Updated Build"))
                }
            },
        )
        .await?;

        let build_type = ctx.build_type_id(project_id, "Updated Build").await?;
        let (operation, status) = ctx.run_build(project_id, &build_type, None).await?;
        expect_success(&status, "build of the updated pipeline")?;

        let expected = declared_steps(&updated, "Updated Build")?;
        verify_step_order(ctx, build_id(&operation)?, &expected).await
    })
}

fn unresolved_dependency_fails_fast(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::MULTI_STAGE, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 3).await?;
        let server = ctx.server();

        let build = ctx.build_type_id(&project.project_id, "Build").await?;
        let deploy = ctx.build_type_id(&project.project_id, "Deploy").await?;
        server.delete_build_type(&build).await?;

        let started = ctx.env.clock.now();
        match ctx.run_build(&project.project_id, &deploy, None).await {
            Err(HarnessError::UnresolvedDependency { missing, .. }) => {
                verify!(
                    missing.contains(&build),
                    "unresolved dependencies {:?} do not name {}",
                    missing,
                    build
                );
            }
            Err(HarnessError::Timeout { .. }) => {
                return Err(HarnessError::assertion(
                    "build with a missing dependency waited until timeout",
                ))
            }
            Err(other) => return Err(other),
            Ok((_, status)) => verify!(
                status.is_failure(),
                "build with a missing dependency finished as {}",
                status
            ),
        }

        let elapsed = ctx.env.clock.now().saturating_sub(started);
        let limit = ctx.config().timeouts.build();
        verify!(
            elapsed < limit,
            "dependency failure took {:?}, build timeout is {:?}",
            elapsed,
            limit
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::TestHarness;
    use crate::suites::Suite;
    use crate::utils::clock::Clock;

    async fn run(harness: &TestHarness, name: &str) -> Result<()> {
        let scenario = SCENARIOS.iter().find(|s| s.name == name).unwrap();
        let mut ctx = harness.context(Suite::Pipeline);
        let result = (scenario.run)(&mut ctx).await;
        ctx.cleanup().await;
        result
    }

    #[test]
    fn test_executed_steps_from_log() {
        let log = "\
[10:00:01] Step 1/3: Setup (Command Line)
[10:00:01]   echo 'Setting up'
[10:00:02] Step 2/3: Build (Command Line)
[10:00:03] Step 2/3: Build (Command Line)
[10:00:04] Step 3/3: Unit tests (Command Line)
";
        assert_eq!(executed_steps(log), vec!["Setup", "Build", "Unit tests"]);
        assert!(executed_steps("no steps here").is_empty());
    }

    #[tokio::test]
    async fn test_every_pipeline_scenario_passes_against_fake_server() {
        let harness = TestHarness::new();
        for scenario in SCENARIOS {
            if let Err(e) = run(&harness, scenario.name).await {
                panic!("{} failed: {}", scenario.name, e);
            }
        }
    }

    #[tokio::test]
    async fn test_build_parameters_reach_the_server() {
        let harness = TestHarness::new();
        let mut ctx = harness.context(Suite::Pipeline);
        (SCENARIOS[1].run)(&mut ctx).await.unwrap();

        let build = ctx
            .take_responses()
            .into_iter()
            .find(|r| r.label == "build")
            .unwrap();
        let id = build.body["id"].as_i64().unwrap();
        let properties = harness.server.build_properties(id).unwrap();
        assert_eq!(properties.get("env.TEST_PARAM"), Some("test_value"));
        ctx.cleanup().await;
    }

    #[tokio::test]
    async fn test_missing_dependency_is_classified_without_waiting() {
        let harness = TestHarness::new();
        run(&harness, "unresolved_dependency_fails_fast").await.unwrap();
        assert!(harness.clock.now() < harness.env.config.timeouts.build());
    }
}
