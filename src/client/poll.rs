//! Bounded polling of triggered operations.
//!
//! Every wait goes through a [`Clock`], so the loops below can be driven by a
//! `ManualClock` in tests.

use super::operation::{Operation, OperationStatus, TerminalStatus};
use super::traits::CiServer;
use crate::error::{HarnessError, Result};
use crate::utils::clock::Clock;
use crate::utils::config::Timeouts;
use log::{debug, warn};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
    /// Consecutive transient probe failures tolerated before giving up
    pub max_transient_failures: u32,
    /// How long a sync may leave its status untouched before it is a no-op (zero = never)
    pub quiet_period: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            max_transient_failures: 3,
            quiet_period: Duration::from_secs(30),
        }
    }

    pub fn with_quiet_period(mut self, period: Duration) -> Self {
        self.quiet_period = period;
        self
    }

    /// Settings operations
    pub fn for_operations(timeouts: &Timeouts) -> Self {
        Self {
            max_transient_failures: timeouts.max_retries.max(1),
            quiet_period: timeouts.sync_quiet(),
            ..Self::new(timeouts.operation(), timeouts.poll_interval())
        }
    }

    /// Builds, which never settle quietly
    pub fn for_builds(timeouts: &Timeouts) -> Self {
        Self {
            max_transient_failures: timeouts.max_retries.max(1),
            quiet_period: Duration::ZERO,
            ..Self::new(timeouts.build(), timeouts.poll_interval())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Pending,
    Succeeded,
    NoOp,
    Failed,
    TimedOut,
}

impl PollPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollPhase::Pending)
    }
}

/// State of one polling loop; lives only as long as the loop
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollState {
    pub operation_id: String,
    pub phase: PollPhase,
    pub last_status: Option<String>,
    pub started: Duration,
    pub deadline: Duration,
    pub attempts: u32,
    pub transient_failures: u32,
    pub unchanged_probes: u32,
    /// When the status record was first seen unchanged in the current quiet stretch
    pub quiet_since: Option<Duration>,
}

impl PollState {
    pub fn new(operation: &Operation, now: Duration, timeout: Duration) -> Self {
        Self {
            operation_id: operation.id.clone(),
            phase: PollPhase::Pending,
            last_status: None,
            started: now,
            deadline: now + timeout,
            attempts: 0,
            transient_failures: 0,
            unchanged_probes: 0,
            quiet_since: None,
        }
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.started)
    }

    pub fn is_expired(&self, now: Duration) -> bool {
        now >= self.deadline
    }

    /// Feed one probe result. `Ok(Some(_))` means the operation reached a terminal status.
    pub fn record(
        &mut self,
        probe: Result<OperationStatus>,
        now: Duration,
        config: &PollConfig,
        settles_quietly: bool,
    ) -> Result<Option<TerminalStatus>> {
        self.attempts += 1;

        match probe {
            Ok(OperationStatus::Terminal(status)) => {
                self.transient_failures = 0;
                self.phase = match &status {
                    TerminalStatus::Success => PollPhase::Succeeded,
                    TerminalStatus::NoOp { .. } => PollPhase::NoOp,
                    TerminalStatus::Failure { .. } => PollPhase::Failed,
                };
                Ok(Some(status))
            }
            Ok(OperationStatus::Pending { status, changed }) => {
                self.transient_failures = 0;
                self.last_status = Some(status);

                if changed || !settles_quietly {
                    self.unchanged_probes = 0;
                    self.quiet_since = None;
                    return Ok(None);
                }

                self.unchanged_probes += 1;
                let since = *self.quiet_since.get_or_insert(now);
                let quiet_for = now.saturating_sub(since);
                if !config.quiet_period.is_zero() && quiet_for >= config.quiet_period {
                    self.phase = PollPhase::NoOp;
                    return Ok(Some(TerminalStatus::NoOp {
                        message: format!(
                            "settings unchanged for {:?} ({} checks)",
                            quiet_for, self.unchanged_probes
                        ),
                    }));
                }
                Ok(None)
            }
            Err(e) if e.is_transient() => {
                self.transient_failures += 1;
                if self.transient_failures >= config.max_transient_failures {
                    self.phase = PollPhase::Failed;
                    return Err(e);
                }
                warn!(
                    "Probe of {} failed ({}/{}): {}",
                    self.operation_id, self.transient_failures, config.max_transient_failures, e
                );
                Ok(None)
            }
            Err(e) => {
                self.phase = PollPhase::Failed;
                Err(e)
            }
        }
    }

    fn expire(&mut self, description: &str, timeout: Duration) -> HarnessError {
        self.phase = PollPhase::TimedOut;
        HarnessError::Timeout {
            operation: description.to_string(),
            timeout,
            attempts: self.attempts,
        }
    }
}

/// Probe `operation` every `interval` until it is terminal or `timeout` elapses.
///
/// Returns exactly one terminal status, or `HarnessError::Timeout`. Transient probe
/// failures are tolerated up to `max_transient_failures` in a row.
pub async fn poll_status(
    server: &dyn CiServer,
    clock: &dyn Clock,
    operation: &Operation,
    config: &PollConfig,
) -> Result<TerminalStatus> {
    let description = operation.to_string();
    let mut state = PollState::new(operation, clock.now(), config.timeout);

    loop {
        let probe = server.observe(operation).await;
        let settles_quietly = operation.may_settle_quietly();
        if let Some(status) = state.record(probe, clock.now(), config, settles_quietly)? {
            debug!(
                "{} finished as {} after {} checks ({:?})",
                description,
                status,
                state.attempts,
                state.elapsed(clock.now())
            );
            return Ok(status);
        }

        let now = clock.now();
        if state.is_expired(now) {
            return Err(state.expire(&description, config.timeout));
        }

        debug!(
            "{} pending ({}), check {}",
            description,
            state.last_status.as_deref().unwrap_or("no status"),
            state.attempts
        );
        clock
            .sleep(config.interval.min(state.deadline.saturating_sub(now)))
            .await;

        if state.is_expired(clock.now()) {
            return Err(state.expire(&description, config.timeout));
        }
    }
}

/// Wait until `condition` holds. Errors from the condition propagate immediately.
pub async fn wait_until<F, Fut>(
    clock: &dyn Clock,
    description: &str,
    timeout: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = clock.now() + timeout;
    let mut attempts = 0;

    loop {
        attempts += 1;
        if condition().await? {
            return Ok(());
        }

        let now = clock.now();
        if now >= deadline {
            break;
        }
        clock.sleep(interval.min(deadline - now)).await;
        if clock.now() >= deadline {
            break;
        }
    }

    Err(HarnessError::Timeout {
        operation: description.to_string(),
        timeout,
        attempts,
    })
}
