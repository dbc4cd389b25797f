//! Bidirectional synchronization between the server and the settings repository.

use crate::client::TerminalStatus;
use crate::dsl::compare::{compare, ActualProject};
use crate::dsl::{templates, PipelineDefinition};
use crate::error::Result;
use crate::runner::scenario::expect_success;
use crate::runner::{Scenario, ScenarioContext};
use futures::future::BoxFuture;

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "vcs_to_server",
        run: vcs_to_server,
        requires_vcs: true,
    },
    Scenario {
        name: "server_to_vcs",
        run: server_to_vcs,
        requires_vcs: true,
    },
    Scenario {
        name: "sync_without_changes_is_noop",
        run: sync_without_changes_is_noop,
        requires_vcs: true,
    },
    Scenario {
        name: "large_change_sync",
        run: large_change_sync,
        requires_vcs: true,
    },
];

/// Builds generated for the large synchronization
const LARGE_CHANGE_BUILDS: usize = 10;

async fn assert_matches(ctx: &mut ScenarioContext, project_id: &str, settings: &str) -> Result<()> {
    let expected = PipelineDefinition::parse(settings)?;
    let actual = ActualProject::fetch(ctx.server().as_ref(), project_id).await?;
    ctx.capture("synchronized_project", &actual);

    let mismatches = compare(&expected, &actual);
    verify!(
        mismatches.is_empty(),
        "server settings differ from the repository: {}",
        mismatches
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    );
    Ok(())
}

fn vcs_to_server(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 1).await?;

        let updated = ctx.render(templates::UPDATED_BUILD, &[])?;
        ctx.push_settings(project.repo.as_ref(), &updated, "Update build steps")
            .await?;

        let status = ctx.sync(&project.project_id).await?;
        expect_success(&status, "sync of the pushed change")?;
        assert_matches(ctx, &project.project_id, &updated).await
    })
}

fn server_to_vcs(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        let server = ctx.server();
        let build_types = ctx.wait_for_build_types(&project.project_id, 1).await?;
        let before = project.repo.remote_head().await?;

        let new_name = format!("Renamed Build {}", &project.project_id[project.project_id.len() - 4..]);
        server.rename_build_type(&build_types[0].id, &new_name).await?;

        let status = ctx.export(&project.project_id).await?;
        expect_success(&status, "export of server settings")?;

        let history = project.repo.remote_history(5).await?;
        ctx.capture("remote_history", &history);
        verify!(
            history.first().map(|c| &c.hash) != before.as_ref(),
            "export did not add a commit to {}",
            project.repo.branch()
        );

        let path = &ctx.config().git.settings_path;
        let exported = project
            .repo
            .read_remote_file(path)
            .await?
            .unwrap_or_default();
        verify!(
            exported.contains(&new_name),
            "{} on {} does not mention '{}'",
            path,
            project.repo.branch(),
            new_name
        );
        let definition = PipelineDefinition::parse(&exported)?;
        verify!(
            definition.find(&new_name).is_some(),
            "exported settings have no build configuration named '{}'",
            new_name
        );
        Ok(())
    })
}

fn sync_without_changes_is_noop(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 1).await?;

        let started = ctx.env.clock.now();
        let status = ctx.sync(&project.project_id).await?;
        let elapsed = ctx.env.clock.now().saturating_sub(started);
        ctx.record_metric("sync_ms", elapsed);

        verify!(
            matches!(status, TerminalStatus::NoOp { .. }),
            "sync without pending changes finished as {}, expected no-op",
            status
        );
        let limit = ctx.config().timeouts.operation() / 2;
        verify!(
            elapsed < limit,
            "no-op sync took {:?}, expected under {:?}",
            elapsed,
            limit
        );
        Ok(())
    })
}

fn large_change_sync(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        ctx.wait_for_build_types(&project.project_id, 1).await?;

        let count = LARGE_CHANGE_BUILDS.to_string();
        let large = ctx.render(templates::GENERATED_BUILDS, &[("build_count", count.as_str())])?;
        ctx.push_settings(project.repo.as_ref(), &large, "Generate build configurations")
            .await?;

        let started = ctx.env.clock.now();
        let status = ctx.sync(&project.project_id).await?;
        expect_success(&status, "large sync")?;
        ctx.wait_for_build_types(&project.project_id, LARGE_CHANGE_BUILDS)
            .await?;
        let elapsed = ctx.env.clock.now().saturating_sub(started);
        ctx.record_metric("large_sync_ms", elapsed);
        ctx.log(format!(
            "{} build configurations synchronized in {:?}",
            LARGE_CHANGE_BUILDS, elapsed
        ));

        let limit = ctx.config().timeouts.operation();
        verify!(
            elapsed <= limit,
            "large sync took {:?}, over the {:?} operation timeout",
            elapsed,
            limit
        );
        assert_matches(ctx, &project.project_id, &large).await
    })
}
