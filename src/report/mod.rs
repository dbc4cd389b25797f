pub mod aggregate;
pub mod html;
pub mod json;
pub mod junit;
pub mod text;
pub mod types;

pub use aggregate::aggregate;
pub use types::{ConsolidatedReport, SuiteEntry, SuiteStatus};

use anyhow::Result;
use std::path::Path;

/// Aggregate the result files in `results_dir` and render them in `format`
pub fn generate_report(
    results_dir: &Path,
    suites: &[&str],
    format: &str,
    output: Option<&Path>,
) -> Result<ConsolidatedReport> {
    if !results_dir.is_dir() {
        anyhow::bail!("Results directory not found: {}", results_dir.display());
    }
    let report = aggregate(results_dir, suites);

    match format {
        "json" => json::generate(&report, output)?,
        "html" => html::generate(&report, output)?,
        "junit" => match output {
            Some(path) => std::fs::write(path, junit::generate_junit_xml(&report)?)?,
            None => println!("{}", junit::generate_junit_xml(&report)?),
        },
        "text" => print!("{}", text::render(&report)),
        _ => anyhow::bail!("Unknown format: {}", format),
    }

    Ok(report)
}

/// Write `report.json`, `report.html` and `junit.xml` next to the suite results
pub fn write_all(report: &ConsolidatedReport, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    json::generate(report, Some(&output_dir.join("report.json")))?;
    html::generate(report, Some(&output_dir.join("report.html")))?;
    junit::write_report(report, output_dir)?;
    Ok(())
}
