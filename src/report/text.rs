use super::types::{ConsolidatedReport, SuiteStatus};
use crate::runner::state::ScenarioOutcome;
use colored::Colorize;

/// Plain console summary of a consolidated report
pub fn render(report: &ConsolidatedReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "Versioned settings test report".bold()));

    for entry in &report.suites {
        match &entry.status {
            SuiteStatus::Ran => {
                let c = &entry.summary;
                let line = format!(
                    "  {:<10} {} passed, {} failed, {} errors, {} skipped",
                    entry.suite, c.passed, c.failed, c.errored, c.skipped
                );
                if c.all_passed() {
                    out.push_str(&format!("{}\n", line.green()));
                } else {
                    out.push_str(&format!("{}\n", line.red()));
                }
            }
            SuiteStatus::NotRun { reason } => {
                out.push_str(&format!(
                    "{}\n",
                    format!("  {:<10} not run ({})", entry.suite, reason).yellow()
                ));
            }
        }
    }

    let problems: Vec<_> = report
        .scenarios
        .iter()
        .filter(|s| {
            !matches!(
                s.outcome,
                ScenarioOutcome::Passed | ScenarioOutcome::Skipped { .. }
            )
        })
        .collect();
    if !problems.is_empty() {
        out.push_str(&format!("\n{}\n", "Problems:".bold()));
        for s in problems {
            out.push_str(&format!(
                "  {} {}::{} {}\n",
                format!("[{}]", s.outcome.label()).red(),
                s.suite,
                s.name,
                s.outcome.message().unwrap_or("").dimmed()
            ));
        }
    }

    let c = &report.summary;
    out.push_str(&format!(
        "\nTotal: {} passed, {} failed, {} errors, {} skipped\n",
        c.passed, c.failed, c.errored, c.skipped
    ));
    out
}
