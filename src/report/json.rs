use super::types::ConsolidatedReport;
use anyhow::Result;
use std::path::Path;

/// Write the consolidated report as JSON, or print it when no output is given
pub fn generate(report: &ConsolidatedReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output {
        std::fs::write(path, json)?;
        println!("JSON report saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}

/// Read back a report written by [`generate`]
pub fn load(path: &Path) -> Result<ConsolidatedReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
