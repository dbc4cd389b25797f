use super::state::{Counts, ScenarioOutcome};
use tokio::sync::broadcast;

/// Harness events for real-time console output
#[derive(Debug, Clone)]
pub enum TestEvent {
    // Session events
    SessionStarted {
        session_id: String,
        suites: Vec<String>,
    },
    SessionFinished {
        summary: Counts,
        duration_ms: u64,
    },

    // Suite events
    SuiteStarted {
        suite: String,
        scenario_count: usize,
    },
    SuiteFinished {
        suite: String,
        summary: Counts,
        duration_ms: u64,
    },

    // Scenario events
    ScenarioStarted {
        suite: String,
        name: String,
    },
    ScenarioFinished {
        suite: String,
        name: String,
        outcome: ScenarioOutcome,
        duration_ms: u64,
    },

    /// Waiting on a server-side operation
    Polling {
        suite: String,
        operation: String,
    },

    Log {
        suite: String,
        message: String,
    },
}

/// Event emitter for broadcasting harness events
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(256);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration as StdDuration;

/// Console event listener printing one spinner per running suite
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Piped output gets no spinners or escape codes
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut spinners: HashMap<String, ProgressBar> = HashMap::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::SessionStarted { session_id, suites } => {
                    multi
                        .println(format!(
                            "\n{} Test session started: {} ({})",
                            "▶".green().bold(),
                            session_id.cyan(),
                            suites.join(", ")
                        ))
                        .ok();
                }

                TestEvent::SessionFinished {
                    summary,
                    duration_ms,
                } => {
                    for (_, pb) in spinners.drain() {
                        pb.finish_and_clear();
                    }
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

                    println!("\n{} Test session finished", "■".blue().bold());
                    println!("  Total scenarios: {}", summary.total());
                    println!(
                        "  {} passed, {} failed, {} errored, {} skipped",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.errored.to_string().red(),
                        summary.skipped.to_string().yellow()
                    );
                    println!("  Duration: {}ms", duration_ms);
                }

                TestEvent::SuiteStarted {
                    suite,
                    scenario_count,
                } => {
                    multi
                        .println(format!(
                            "  {} Suite: {} ({} scenarios)",
                            "→".blue(),
                            suite.white().bold(),
                            scenario_count
                        ))
                        .ok();
                }

                TestEvent::SuiteFinished {
                    suite,
                    summary,
                    duration_ms,
                } => {
                    if let Some(pb) = spinners.remove(&suite) {
                        pb.finish_and_clear();
                    }
                    let status = if summary.all_passed() {
                        "PASSED".green().bold()
                    } else {
                        "FAILED".red().bold()
                    };
                    multi
                        .println(format!(
                            "  {} Suite {} [{}] {}/{} passed ({}ms)",
                            "←".blue(),
                            suite,
                            status,
                            summary.passed,
                            summary.total(),
                            duration_ms
                        ))
                        .ok();
                }

                TestEvent::ScenarioStarted { suite, name } => {
                    let pb = spinners
                        .entry(suite.clone())
                        .or_insert_with(|| {
                            let pb = multi.add(ProgressBar::new_spinner());
                            if let Ok(style) = ProgressStyle::default_spinner()
                                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                                .template("    {spinner} {msg}")
                            {
                                pb.set_style(style);
                            }
                            pb.enable_steady_tick(StdDuration::from_millis(100));
                            pb
                        })
                        .clone();
                    pb.set_message(format!("[{}] {}... ", suite, name.dimmed()));
                }

                TestEvent::ScenarioFinished {
                    suite,
                    name,
                    outcome,
                    duration_ms,
                } => {
                    let line = match &outcome {
                        ScenarioOutcome::Passed => {
                            format!("    {} [{}] {} ({}ms)", "✓".green(), suite, name, duration_ms)
                        }
                        ScenarioOutcome::Skipped { reason } => format!(
                            "    {} [{}] {} ({})",
                            "○".yellow(),
                            suite,
                            name,
                            reason.dimmed()
                        ),
                        other => format!(
                            "    {} [{}] {} {} ({}ms)\n        {}",
                            "✗".red(),
                            suite,
                            name,
                            other.label().to_uppercase().red(),
                            duration_ms,
                            other.message().unwrap_or_default().dimmed()
                        ),
                    };
                    multi.println(line).ok();
                }

                TestEvent::Polling { suite, operation } => {
                    if let Some(pb) = spinners.get(&suite) {
                        pb.set_message(format!(
                            "[{}] {}",
                            suite,
                            format!("waiting for {}", operation).dimmed()
                        ));
                    }
                }

                TestEvent::Log { suite, message } => {
                    multi.println(format!("      [{}] {}", suite, message)).ok();
                }
            }
        }
    }
}
