use super::events::TestEvent;
use super::scenario::{HarnessEnv, Scenario, ScenarioContext};
use super::state::{ScenarioOutcome, ScenarioResult, SuiteResults};
use crate::suites::Suite;
use futures::FutureExt;
use log::{error, info, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Runs the scenarios of one suite, one after another. A failing or
/// panicking scenario is recorded and the next one still runs.
pub struct SuiteExecutor {
    env: HarnessEnv,
    session_id: String,
}

impl SuiteExecutor {
    pub fn new(env: HarnessEnv, session_id: &str) -> Self {
        Self {
            env,
            session_id: session_id.to_string(),
        }
    }

    pub async fn run(&self, suite: Suite, scenarios: &[Scenario]) -> SuiteResults {
        let mut results = SuiteResults::new(suite.as_str(), &self.session_id);
        let started = self.env.clock.now();

        self.env.events.emit(TestEvent::SuiteStarted {
            suite: suite.to_string(),
            scenario_count: scenarios.len(),
        });
        info!("Running {} suite ({} scenarios)", suite, scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(suite, scenario).await;
            results.push(result);
        }
        results.finish();

        self.env.events.emit(TestEvent::SuiteFinished {
            suite: suite.to_string(),
            summary: results.summary,
            duration_ms: self.env.clock.now().saturating_sub(started).as_millis() as u64,
        });
        results
    }

    async fn run_scenario(&self, suite: Suite, scenario: &Scenario) -> ScenarioResult {
        self.env.events.emit(TestEvent::ScenarioStarted {
            suite: suite.to_string(),
            name: scenario.name.to_string(),
        });

        let mut ctx = ScenarioContext::new(self.env.clone(), suite);
        let started = self.env.clock.now();

        let outcome = if scenario.requires_vcs && !self.env.config.git.is_configured() {
            ScenarioOutcome::Skipped {
                reason: "GIT_REPO_URL not configured".to_string(),
            }
        } else {
            match AssertUnwindSafe((scenario.run)(&mut ctx)).catch_unwind().await {
                Ok(result) => ScenarioOutcome::from_result(&result),
                Err(panic) => ScenarioOutcome::Errored {
                    message: format!("scenario panicked: {}", panic_message(panic.as_ref())),
                },
            }
        };
        let duration_ms = self.env.clock.now().saturating_sub(started).as_millis() as u64;

        ctx.cleanup().await;

        match &outcome {
            ScenarioOutcome::Passed => info!("{}::{} passed ({}ms)", suite, scenario.name, duration_ms),
            ScenarioOutcome::Skipped { reason } => {
                info!("{}::{} skipped: {}", suite, scenario.name, reason)
            }
            ScenarioOutcome::Failed { message } => {
                warn!("{}::{} failed: {}", suite, scenario.name, message)
            }
            other => error!(
                "{}::{} {}: {}",
                suite,
                scenario.name,
                other.label(),
                other.message().unwrap_or_default()
            ),
        }

        self.env.events.emit(TestEvent::ScenarioFinished {
            suite: suite.to_string(),
            name: scenario.name.to_string(),
            outcome: outcome.clone(),
            duration_ms,
        });

        ScenarioResult {
            suite: suite.to_string(),
            name: scenario.name.to_string(),
            outcome,
            duration_ms,
            responses: ctx.take_responses(),
            metrics: ctx.take_metrics(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
