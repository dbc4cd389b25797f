use super::types::{ConsolidatedReport, SuiteEntry, SuiteStatus};
use crate::runner::state::{ScenarioOutcome, ScenarioResult};
use anyhow::Result;
use std::path::Path;

/// Write the HTML report, or print it when no output is given
pub fn generate(report: &ConsolidatedReport, output: Option<&Path>) -> Result<()> {
    let html = generate_html(report);

    if let Some(path) = output {
        std::fs::write(path, html)?;
        println!("HTML report saved to: {}", path.display());
    } else {
        println!("{}", html);
    }

    Ok(())
}

const STYLE: &str = r#"
        :root {
            --bg-primary: #0a0f1d;
            --bg-secondary: #141b2d;
            --bg-tertiary: #1f2937;
            --border: #374151;
            --text-primary: #f9fafb;
            --text-secondary: #9ca3af;
            --green: #10b981;
            --red: #ef4444;
            --yellow: #f59e0b;
            --purple: #8b5cf6;
            --glass: rgba(255, 255, 255, 0.03);
        }
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: system-ui, -apple-system, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.5;
            padding: 3rem 1rem;
        }
        .container { max-width: 1100px; margin: 0 auto; }
        header { margin-bottom: 3rem; display: flex; justify-content: space-between; align-items: flex-end; }
        h1 { font-size: 2.25rem; font-weight: 800; letter-spacing: -0.025em; }
        .kicker { font-size: 0.875rem; font-weight: 600; color: var(--purple); text-transform: uppercase; letter-spacing: 0.1em; }
        .summary { display: grid; grid-template-columns: repeat(auto-fit, minmax(180px, 1fr)); gap: 1.5rem; margin-bottom: 3rem; }
        .stat { background: var(--bg-secondary); border: 1px solid var(--border); padding: 1.5rem; border-radius: 1rem; }
        .stat-value { font-size: 2.5rem; font-weight: 800; }
        .stat-label { color: var(--text-secondary); font-size: 0.875rem; text-transform: uppercase; letter-spacing: 0.05em; }
        .stat.passed .stat-value { color: var(--green); }
        .stat.failed .stat-value { color: var(--red); }
        .stat.skipped .stat-value { color: var(--yellow); }
        .progress-bar { background: var(--bg-secondary); height: 12px; border-radius: 6px; overflow: hidden; border: 1px solid var(--border); margin-bottom: 4rem; }
        .progress-fill { height: 100%; background: linear-gradient(90deg, var(--green), #34d399); }
        .suite { background: var(--bg-secondary); border: 1px solid var(--border); border-radius: 1.25rem; margin-bottom: 2rem; overflow: hidden; }
        .suite-header { padding: 1.5rem; background: var(--glass); display: flex; justify-content: space-between; align-items: center; border-bottom: 1px solid var(--border); }
        .suite-header h3 { font-size: 1.25rem; font-weight: 700; display: flex; gap: 0.75rem; align-items: center; }
        .badge { padding: 0.25rem 0.75rem; border-radius: 9999px; font-size: 0.75rem; font-weight: 600; text-transform: uppercase; }
        .suite.passed .badge { background: rgba(16, 185, 129, 0.1); color: var(--green); }
        .suite.failed .badge { background: rgba(239, 68, 68, 0.1); color: var(--red); }
        .suite.not-run .badge { background: rgba(245, 158, 11, 0.1); color: var(--yellow); }
        .scenarios { padding: 1rem 1.5rem; }
        .scenario { padding: 1rem; border-radius: 0.75rem; display: flex; gap: 1rem; margin-bottom: 0.5rem; }
        .scenario:hover { background: var(--bg-tertiary); }
        .scenario-icon { width: 2rem; height: 2rem; display: flex; align-items: center; justify-content: center; border-radius: 0.5rem; flex-shrink: 0; }
        .scenario.passed .scenario-icon { background: rgba(16, 185, 129, 0.1); color: var(--green); }
        .scenario.failed .scenario-icon, .scenario.error .scenario-icon, .scenario.timeout .scenario-icon { background: rgba(239, 68, 68, 0.1); color: var(--red); }
        .scenario.skipped .scenario-icon { background: rgba(245, 158, 11, 0.1); color: var(--yellow); }
        .scenario-content { flex: 1; min-width: 0; }
        .scenario-name { font-family: monospace; font-size: 0.9375rem; font-weight: 500; }
        .scenario-meta { display: flex; gap: 1rem; margin-top: 0.25rem; color: var(--text-secondary); font-size: 0.75rem; }
        .message { background: rgba(239, 68, 68, 0.1); border-radius: 0.5rem; padding: 0.75rem; margin-top: 0.75rem; color: #fca5a5; font-size: 0.8125rem; font-family: monospace; border: 1px solid rgba(239, 68, 68, 0.2); }
        .scenario.skipped .message { background: rgba(245, 158, 11, 0.1); color: #fcd34d; border-color: rgba(245, 158, 11, 0.2); }
        details { margin-top: 0.75rem; }
        summary { cursor: pointer; color: var(--text-secondary); font-size: 0.8125rem; }
        pre { margin-top: 0.5rem; padding: 0.75rem; background: rgba(0, 0, 0, 0.3); border-radius: 0.5rem; font-size: 0.75rem; overflow-x: auto; }
        .meta { margin-top: 4rem; padding-top: 2rem; border-top: 1px solid var(--border); color: var(--text-secondary); font-size: 0.875rem; display: flex; justify-content: center; gap: 2rem; }
"#;

fn generate_html(report: &ConsolidatedReport) -> String {
    let summary = &report.summary;
    let executed = summary.total() - summary.skipped;
    let pass_rate = if executed > 0 {
        (summary.passed as f64 / executed as f64 * 100.0) as u32
    } else {
        0
    };

    let mut suites_html = String::new();
    for entry in &report.suites {
        suites_html.push_str(&suite_html(report, entry));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Versioned Settings Report</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
        <header>
            <div>
                <div class="kicker">Kotlin DSL</div>
                <h1>Versioned Settings Report</h1>
            </div>
            <div style="text-align: right;">
                <div style="font-size: 0.875rem; color: var(--text-secondary);">Suite Time</div>
                <div style="font-size: 1.25rem; font-weight: 700;">{duration}</div>
            </div>
        </header>

        <div class="summary">
            <div class="stat"><div class="stat-value">{total}</div><div class="stat-label">Scenarios</div></div>
            <div class="stat passed"><div class="stat-value">{passed}</div><div class="stat-label">Passed</div></div>
            <div class="stat failed"><div class="stat-value">{failed}</div><div class="stat-label">Failed</div></div>
            <div class="stat failed"><div class="stat-value">{errored}</div><div class="stat-label">Errors</div></div>
            <div class="stat skipped"><div class="stat-value">{skipped}</div><div class="stat-label">Skipped</div></div>
        </div>

        <div style="display: flex; justify-content: space-between; margin-bottom: 0.75rem;">
            <span style="font-weight: 600; font-size: 0.875rem;">Success Rate</span>
            <span style="font-weight: 700; color: var(--green);">{pass_rate}%</span>
        </div>
        <div class="progress-bar"><div class="progress-fill" style="width: {pass_rate}%"></div></div>

        {suites_html}

        <div class="meta">
            <span>Sessions: {sessions}</span>
            <span>Generated: {generated}</span>
        </div>
    </div>
</body>
</html>"#,
        duration = format_duration(report.total_duration_ms()),
        total = summary.total(),
        passed = summary.passed,
        failed = summary.failed,
        errored = summary.errored,
        skipped = summary.skipped,
        sessions = html_escape(&report.session_ids.join(", ")),
        generated = html_escape(&report.generated_at),
    )
}

fn suite_html(report: &ConsolidatedReport, entry: &SuiteEntry) -> String {
    let (class, badge, body) = match &entry.status {
        SuiteStatus::NotRun { reason } => (
            "not-run",
            "Not run".to_string(),
            format!(r#"<div class="scenario skipped"><div class="message">{}</div></div>"#, html_escape(reason)),
        ),
        SuiteStatus::Ran => {
            let c = &entry.summary;
            let class = if c.all_passed() { "passed" } else { "failed" };
            let body: String = report
                .scenarios
                .iter()
                .filter(|s| s.suite == entry.suite)
                .map(scenario_html)
                .collect();
            (class, format!("{}/{} passed", c.passed, c.total()), body)
        }
    };

    let duration = entry
        .duration_ms
        .map(|d| format!(r#"<span class="scenario-meta">{}</span>"#, format_duration(d)))
        .unwrap_or_default();

    format!(
        r#"
        <div class="suite {class}">
            <div class="suite-header">
                <h3>{name} <span class="badge">{badge}</span></h3>
                {duration}
            </div>
            <div class="scenarios">{body}</div>
        </div>"#,
        name = html_escape(&entry.suite),
    )
}

fn scenario_html(scenario: &ScenarioResult) -> String {
    let icon = match scenario.outcome {
        ScenarioOutcome::Passed => "✓",
        ScenarioOutcome::Failed { .. } => "✗",
        ScenarioOutcome::Errored { .. } => "!",
        ScenarioOutcome::TimedOut { .. } => "⧗",
        ScenarioOutcome::Skipped { .. } => "○",
    };

    let message = scenario
        .outcome
        .message()
        .map(|m| format!(r#"<div class="message">{}</div>"#, html_escape(m)))
        .unwrap_or_default();

    let metrics: String = scenario
        .metrics
        .iter()
        .map(|(name, value)| format!("<span>{}: {}</span>", html_escape(name), format_duration(*value)))
        .collect();

    let responses = if scenario.responses.is_empty() {
        String::new()
    } else {
        let body: String = scenario
            .responses
            .iter()
            .map(|r| {
                let json = serde_json::to_string_pretty(&r.body).unwrap_or_default();
                format!("<b>{}</b>\n{}\n", html_escape(&r.label), html_escape(&json))
            })
            .collect();
        format!(
            "<details><summary>{} captured responses</summary><pre>{}</pre></details>",
            scenario.responses.len(),
            body
        )
    };

    format!(
        r#"
                <div class="scenario {class}">
                    <div class="scenario-icon">{icon}</div>
                    <div class="scenario-content">
                        <div class="scenario-name">{name}</div>
                        <div class="scenario-meta"><span>{duration}</span>{metrics}</div>
                        {message}
                        {responses}
                    </div>
                </div>"#,
        class = scenario.outcome.label(),
        name = html_escape(&scenario.name),
        duration = format_duration(scenario.duration_ms),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60000;
        let seconds = (ms % 60000) as f64 / 1000.0;
        format!("{}m {:.0}s", minutes, seconds)
    }
}
