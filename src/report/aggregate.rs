//! Merge per-suite result files into one report.

use super::types::{ConsolidatedReport, SuiteEntry, SuiteStatus};
use crate::runner::state::{Counts, SuiteResults};
use chrono::Utc;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Result files in `dir`, keyed by file stem
fn result_files(dir: &Path) -> HashMap<String, PathBuf> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&escaped).join("*.json").to_string_lossy().to_string();
    let Ok(paths) = glob::glob(&pattern) else {
        warn!("Invalid results pattern {}", pattern);
        return HashMap::new();
    };
    paths
        .filter_map(|p| p.ok())
        .filter_map(|p| Some((p.file_stem()?.to_string_lossy().to_string(), p)))
        .collect()
}

/// Read `<suite>.json` for every expected suite. A missing or unreadable file
/// marks the suite "not run"; aggregation itself never fails.
pub fn aggregate(dir: &Path, suites: &[&str]) -> ConsolidatedReport {
    let files = result_files(dir);
    let mut entries = Vec::with_capacity(suites.len());
    let mut scenarios = Vec::new();
    let mut session_ids: Vec<String> = Vec::new();
    let mut summary = Counts::default();

    for &suite in suites {
        let Some(path) = files.get(suite) else {
            debug!("No result file for {} in {}", suite, dir.display());
            entries.push(SuiteEntry::not_run(suite, "no result file"));
            continue;
        };

        match SuiteResults::read_from(path) {
            Ok(results) => {
                // Counts are rebuilt from the scenarios rather than trusted from the file
                let counts: Counts = results.scenarios.iter().map(|s| &s.outcome).collect();
                summary.merge(&counts);
                if !session_ids.contains(&results.session_id) {
                    session_ids.push(results.session_id.clone());
                }
                entries.push(SuiteEntry {
                    suite: suite.to_string(),
                    status: SuiteStatus::Ran,
                    summary: counts,
                    duration_ms: results
                        .finished_at
                        .map(|end| (end - results.started_at).num_milliseconds().max(0) as u64),
                });
                scenarios.extend(results.scenarios);
            }
            Err(e) => {
                warn!("Unreadable result file {}: {}", path.display(), e);
                entries.push(SuiteEntry::not_run(
                    suite,
                    &format!("unreadable result file: {}", e),
                ));
            }
        }
    }

    ConsolidatedReport {
        generated_at: Utc::now().to_rfc3339(),
        session_ids,
        suites: entries,
        summary,
        scenarios,
    }
}

/// Report for a run that never started, e.g. after a provisioning failure
pub fn not_run(suites: &[&str], reason: &str) -> ConsolidatedReport {
    ConsolidatedReport {
        generated_at: Utc::now().to_rfc3339(),
        session_ids: Vec::new(),
        suites: suites
            .iter()
            .map(|suite| SuiteEntry::not_run(suite, reason))
            .collect(),
        summary: Counts::default(),
        scenarios: Vec::new(),
    }
}
