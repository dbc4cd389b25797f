pub mod events;
pub mod executor;
pub mod scenario;
pub mod state;

use crate::error::Result;
use crate::suites::Suite;
use log::{error, info};
use std::path::Path;

pub use events::*;
pub use executor::SuiteExecutor;
pub use scenario::{HarnessEnv, Scenario, ScenarioContext, ScenarioFn};
pub use state::*;

/// Results of every suite that ran in one session
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session_id: String,
    pub suites: Vec<SuiteResults>,
    pub summary: Counts,
}

impl RunOutcome {
    /// Every requested suite produced results and no scenario failed or errored
    pub fn all_passed(&self, requested: usize) -> bool {
        self.suites.len() == requested && self.summary.all_passed()
    }
}

/// Run each suite as its own task and write `<output>/<suite>.json` as they finish
pub async fn run_suites(env: HarnessEnv, suites: &[Suite], output: &Path) -> Result<RunOutcome> {
    std::fs::create_dir_all(output)?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let started = env.clock.now();
    env.events.emit(TestEvent::SessionStarted {
        session_id: session_id.clone(),
        suites: suites.iter().map(|s| s.to_string()).collect(),
    });

    let mut handles = Vec::with_capacity(suites.len());
    for &suite in suites {
        let executor = SuiteExecutor::new(env.clone(), &session_id);
        let output = output.to_path_buf();
        let handle = tokio::spawn(async move {
            let results = executor.run(suite, suite.scenarios()).await;
            match results.write_to(&output) {
                Ok(path) => info!("Wrote {}", path.display()),
                Err(e) => error!("Failed to write {} results: {}", suite, e),
            }
            results
        });
        handles.push((suite, handle));
    }

    let mut all = Vec::with_capacity(handles.len());
    let mut summary = Counts::default();
    for (suite, handle) in handles {
        match handle.await {
            Ok(results) => {
                summary.merge(&results.summary);
                all.push(results);
            }
            Err(e) => error!("{} suite task aborted: {}", suite, e),
        }
    }

    env.events.emit(TestEvent::SessionFinished {
        summary,
        duration_ms: env.clock.now().saturating_sub(started).as_millis() as u64,
    });

    Ok(RunOutcome {
        session_id,
        suites: all,
        summary,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::HarnessEnv;
    use crate::client::fake::FakeServer;
    use crate::dsl::TemplateLoader;
    use crate::runner::events::EventEmitter;
    use crate::utils::clock::ManualClock;
    use crate::utils::config::RunConfig;
    use crate::vcs::memory::{MemoryFactory, MemoryRemote};
    use std::sync::Arc;

    /// Fake server and in-memory remote wired into a harness environment
    pub struct TestHarness {
        pub env: HarnessEnv,
        pub server: Arc<FakeServer>,
        pub remote: Arc<MemoryRemote>,
        pub clock: Arc<ManualClock>,
    }

    impl TestHarness {
        pub fn new() -> Self {
            Self::with_config(|_| {})
        }

        pub fn without_repository() -> Self {
            Self::with_config(|config| config.git.repo_url = None)
        }

        pub fn with_config(adjust: impl FnOnce(&mut RunConfig)) -> Self {
            let mut config = RunConfig::default();
            config.git.repo_url = Some("https://git.example.com/settings.git".to_string());
            config.cleanup = true;
            adjust(&mut config);

            let remote = MemoryRemote::new();
            let server = Arc::new(FakeServer::new(remote.clone()));
            let clock = Arc::new(ManualClock::new());
            let templates = TemplateLoader::builtin().with_default("dsl_version", &config.dsl_version);

            let env = HarnessEnv {
                config: Arc::new(config),
                server: server.clone(),
                repos: Arc::new(MemoryFactory::new(remote.clone())),
                clock: clock.clone(),
                templates: Arc::new(templates),
                events: Arc::new(EventEmitter::default()),
            };
            Self {
                env,
                server,
                remote,
                clock,
            }
        }

        pub fn context(&self, suite: crate::suites::Suite) -> crate::runner::ScenarioContext {
            crate::runner::ScenarioContext::new(self.env.clone(), suite)
        }
    }
}
