//! Project creation and settings import from VCS.

use super::fixtures;
use crate::client::types::NewProject;
use crate::client::TerminalStatus;
use crate::dsl::compare::{compare, ActualProject};
use crate::dsl::{templates, PipelineDefinition};
use crate::error::{HarnessError, Result};
use crate::runner::scenario::expect_applied;
use crate::runner::{Scenario, ScenarioContext};
use futures::future::BoxFuture;

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "project_basic",
        run: project_basic,
        requires_vcs: false,
    },
    Scenario {
        name: "project_validation_errors",
        run: project_validation_errors,
        requires_vcs: false,
    },
    Scenario {
        name: "import_with_vcs_integration",
        run: import_with_vcs_integration,
        requires_vcs: true,
    },
    Scenario {
        name: "import_matches_definition",
        run: import_matches_definition,
        requires_vcs: true,
    },
    Scenario {
        name: "reimport_is_idempotent",
        run: reimport_is_idempotent,
        requires_vcs: true,
    },
    Scenario {
        name: "malformed_settings_rejected",
        run: malformed_settings_rejected,
        requires_vcs: true,
    },
];

/// A 4xx answer: the server understood the request and refused it
fn is_rejection(error: &HarnessError) -> bool {
    matches!(
        error,
        HarnessError::Api {
            status: Some(400..=499),
            transient: false,
            ..
        }
    )
}

/// Ok when `result` is a client error rejection; an accepted request fails the
/// scenario and any other error is returned as is
fn expect_rejected<T>(result: Result<T>, what: &str) -> Result<()> {
    match result {
        Ok(_) => Err(HarnessError::assertion(format!(
            "{} was accepted, expected a 4xx rejection",
            what
        ))),
        Err(e) if is_rejection(&e) => Ok(()),
        Err(e) => Err(e),
    }
}

fn project_basic(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project_id = ctx.new_project_id();
        let payload = fixtures::project(&project_id);

        let created = ctx.create_project(&payload).await?;
        verify_eq!(created.id, project_id, "created project id");
        verify_eq!(created.name, payload.name, "created project name");

        let fetched = ctx.server().get_project(&project_id).await?;
        ctx.capture("get_project", &fetched);
        verify_eq!(fetched.id, project_id, "fetched project id");
        verify!(
            ctx.server()
                .list_projects()
                .await?
                .iter()
                .any(|p| p.id == project_id),
            "{} missing from the project list",
            project_id
        );
        Ok(())
    })
}

fn project_validation_errors(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        // Requests go through the context so a wrongly accepted project is still cleaned up
        let unnamed = NewProject::new(&ctx.new_project_id(), "");
        expect_rejected(ctx.create_project(&unnamed).await, "project without a name")?;

        let bad_id = NewProject::new("1-invalid id", "Invalid Id Project");
        expect_rejected(ctx.create_project(&bad_id).await, "project with an invalid id")?;

        let project_id = ctx.new_project_id();
        ctx.create_project(&fixtures::project(&project_id)).await?;
        expect_rejected(
            ctx.create_project(&fixtures::project(&project_id)).await,
            "project with a duplicate id",
        )?;
        Ok(())
    })
}

fn import_with_vcs_integration(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let settings = ctx.render(templates::SIMPLE_BUILD, &[])?;
        let project = ctx.versioned_project(&settings).await?;

        verify!(!project.vcs_root_id.is_empty(), "VCS root has no id");
        let status = ctx
            .server()
            .versioned_settings_status(&project.project_id)
            .await?;
        verify!(
            !status.is_error(),
            "versioned settings report an error: {}",
            status.message.unwrap_or_default()
        );

        let remote = project.repo.remote_head().await?;
        verify!(remote.is_some(), "settings branch was not pushed");
        Ok(())
    })
}

fn import_matches_definition(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::LARGE_PROJECT, &[]).await?;
        let expected = PipelineDefinition::parse(&project.settings)?;

        ctx.wait_for_build_types(&project.project_id, expected.build_types.len())
            .await?;
        let actual = ActualProject::fetch(ctx.server().as_ref(), &project.project_id).await?;
        ctx.capture("imported_project", &actual);

        let mismatches = compare(&expected, &actual);
        verify!(
            mismatches.is_empty(),
            "imported settings differ from the definition: {}",
            mismatches
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        );
        Ok(())
    })
}

fn reimport_is_idempotent(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let project = ctx.imported_project(templates::SIMPLE_BUILD, &[]).await?;
        let server = ctx.server();
        ctx.wait_for_build_types(&project.project_id, 1).await?;
        let before = ActualProject::fetch(server.as_ref(), &project.project_id).await?;

        let status = ctx.import(&project.project_id).await?;
        expect_applied(&status, "second import")?;

        let after = ActualProject::fetch(server.as_ref(), &project.project_id).await?;
        verify_eq!(after, before, "project after re-import");
        Ok(())
    })
}

fn malformed_settings_rejected(ctx: &mut ScenarioContext) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let settings = ctx.render(templates::MALFORMED, &[])?;
        let project = ctx.settings_project(&settings).await?;
        let server = ctx.server();

        let enabled = server
            .enable_versioned_settings(
                &project.project_id,
                &fixtures::versioned_settings(&project.vcs_root_id),
            )
            .await;
        match enabled {
            Ok(()) => {}
            Err(e) if is_rejection(&e) => {
                ctx.log(format!("versioned settings rejected: {}", e));
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        match server.trigger_import(&project.project_id).await {
            Err(e) if is_rejection(&e) => {
                ctx.log(format!("import rejected: {}", e));
            }
            Err(e) => return Err(e),
            Ok(operation) => {
                let status = ctx.poll(&operation).await?;
                verify!(
                    matches!(status, TerminalStatus::Failure { .. }),
                    "malformed settings import finished as {}",
                    status
                );
            }
        }

        let build_types = server.build_types(&project.project_id).await?;
        verify!(
            build_types.is_empty(),
            "malformed settings created {} build configurations",
            build_types.len()
        );
        Ok(())
    })
}
