use super::types::{ConsolidatedReport, SuiteEntry, SuiteStatus};
use crate::runner::state::{ScenarioOutcome, ScenarioResult};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

/// JUnit XML with one `<testsuite>` per suite and one `<testcase>` per scenario
pub fn generate_junit_xml(report: &ConsolidatedReport) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let summary = &report.summary;
    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "vset-tester"));
    suites_start.push_attribute(("tests", summary.total().to_string().as_str()));
    suites_start.push_attribute(("failures", summary.failed.to_string().as_str()));
    suites_start.push_attribute(("errors", summary.errored.to_string().as_str()));
    suites_start.push_attribute(("skipped", summary.skipped.to_string().as_str()));
    suites_start.push_attribute(("time", seconds(report.total_duration_ms()).as_str()));
    writer.write_event(Event::Start(suites_start))?;

    for entry in &report.suites {
        write_test_suite(&mut writer, report, entry)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn write_test_suite<W: std::io::Write>(
    writer: &mut Writer<W>,
    report: &ConsolidatedReport,
    entry: &SuiteEntry,
) -> Result<()> {
    let counts = &entry.summary;
    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", entry.suite.as_str()));
    suite_start.push_attribute(("tests", counts.total().to_string().as_str()));
    suite_start.push_attribute(("failures", counts.failed.to_string().as_str()));
    suite_start.push_attribute(("errors", counts.errored.to_string().as_str()));
    suite_start.push_attribute(("skipped", counts.skipped.to_string().as_str()));
    suite_start.push_attribute(("time", seconds(entry.duration_ms.unwrap_or(0)).as_str()));
    suite_start.push_attribute(("timestamp", report.generated_at.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    if let SuiteStatus::NotRun { reason } = &entry.status {
        writer.write_event(Event::Start(BytesStart::new("system-out")))?;
        writer.write_event(Event::Text(BytesText::new(&format!("not run: {}", reason))))?;
        writer.write_event(Event::End(BytesEnd::new("system-out")))?;
    }

    for scenario in report.scenarios.iter().filter(|s| s.suite == entry.suite) {
        write_test_case(writer, scenario)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    scenario: &ScenarioResult,
) -> Result<()> {
    let classname = format!("vset.{}", scenario.suite);
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", scenario.name.as_str()));
    case_start.push_attribute(("classname", classname.as_str()));
    case_start.push_attribute(("time", seconds(scenario.duration_ms).as_str()));
    writer.write_event(Event::Start(case_start))?;

    let (element, kind) = match &scenario.outcome {
        ScenarioOutcome::Passed => ("", ""),
        ScenarioOutcome::Failed { .. } => ("failure", "AssertionError"),
        ScenarioOutcome::Errored { .. } => ("error", "HarnessError"),
        ScenarioOutcome::TimedOut { .. } => ("error", "Timeout"),
        ScenarioOutcome::Skipped { .. } => ("skipped", ""),
    };

    if !element.is_empty() {
        let message = scenario.outcome.message().unwrap_or("");
        let mut start = BytesStart::new(element);
        start.push_attribute(("message", message));
        if !kind.is_empty() {
            start.push_attribute(("type", kind));
        }
        if element == "skipped" {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(message)))?;
            writer.write_event(Event::End(BytesEnd::new(element)))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write `junit.xml` into `output_dir`
pub fn write_report(report: &ConsolidatedReport, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(report)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}
