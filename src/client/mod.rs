//! API client for the CI server.

#[cfg(test)]
pub mod fake;
pub mod operation;
pub mod poll;
pub mod rest;
pub mod retry;
pub mod traits;
pub mod types;

pub use operation::{Operation, OperationKind, OperationStatus, TerminalStatus};
pub use poll::{poll_status, wait_until, PollConfig, PollPhase, PollState};
pub use rest::RestClient;
pub use retry::RetryPolicy;
pub use traits::CiServer;

use crate::error::{HarnessError, Result};
use log::warn;

/// Fail with `UnresolvedDependency` if `build_type_id` snapshot-depends on a
/// configuration that no longer exists in `project_id`
pub async fn ensure_dependencies_resolved(
    server: &dyn CiServer,
    project_id: &str,
    build_type_id: &str,
) -> Result<()> {
    let known: Vec<String> = server
        .build_types(project_id)
        .await?
        .into_iter()
        .map(|bt| bt.id)
        .collect();
    let missing: Vec<String> = server
        .snapshot_dependencies(build_type_id)
        .await?
        .into_iter()
        .filter(|dep| !known.contains(dep))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    warn!(
        "{} depends on missing configurations: {}",
        build_type_id,
        missing.join(", ")
    );
    Err(HarnessError::UnresolvedDependency {
        build_type: build_type_id.to_string(),
        missing,
    })
}

/// Trigger a build after checking its snapshot dependencies resolve
pub async fn trigger_checked_build(
    server: &dyn CiServer,
    project_id: &str,
    build_type_id: &str,
    properties: Option<types::Properties>,
) -> Result<Operation> {
    ensure_dependencies_resolved(server, project_id, build_type_id).await?;
    server.trigger_build(build_type_id, properties).await
}
