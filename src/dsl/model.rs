//! Structural model of a Kotlin settings DSL.
//!
//! This is not a Kotlin parser. It understands the subset the fixtures use:
//! a `project { buildType(X) ... }` block, `object X : BuildType({ ... })`
//! declarations with a `name`, a `steps` block and snapshot dependencies.

use crate::error::{HarnessError, Result};
use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDef {
    /// Block keyword, e.g. `script`
    pub kind: String,
    pub name: Option<String>,
    pub script: Option<String>,
}

impl StepDef {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildTypeDef {
    /// Kotlin object name, the suffix of the server-side id
    pub object_id: String,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<StepDef>,
    /// Object ids of snapshot dependencies
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDefinition {
    pub version: Option<String>,
    /// In `project { }` declaration order
    pub build_types: Vec<BuildTypeDef>,
}

impl PipelineDefinition {
    pub fn parse(source: &str) -> Result<Self> {
        parse(source)
    }

    pub fn find(&self, name: &str) -> Option<&BuildTypeDef> {
        self.build_types.iter().find(|bt| bt.name == name)
    }

    pub fn by_object_id(&self, object_id: &str) -> Option<&BuildTypeDef> {
        self.build_types.iter().find(|bt| bt.object_id == object_id)
    }

    /// Display names of the build types `build_type` depends on
    pub fn dependency_names(&self, build_type: &BuildTypeDef) -> Vec<String> {
        build_type
            .dependencies
            .iter()
            .map(|id| {
                self.by_object_id(id)
                    .map(|bt| bt.name.clone())
                    .unwrap_or_else(|| id.clone())
            })
            .collect()
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("DSL pattern"))
}

fn project_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(?m)^\s*project\s*\{")
}

fn object_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"object\s+(\w+)\s*:\s*BuildType\s*\(\s*\{")
}

fn reference_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"buildType\s*\(\s*(\w+)\s*\)")
}

fn snapshot_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"snapshot\s*\(\s*(\w+)\s*\)")
}

/// Blank out comments and string literal contents, keeping byte offsets
fn mask_literals(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        let rest = &bytes[i..];
        if rest.starts_with(b"//") {
            while i < len && bytes[i] != b'\n' {
                out[i] = b' ';
                i += 1;
            }
        } else if rest.starts_with(b"/*") {
            while i < len && !bytes[i..].starts_with(b"*/") {
                if bytes[i] != b'\n' {
                    out[i] = b' ';
                }
                i += 1;
            }
            for _ in 0..2 {
                if i < len {
                    out[i] = b' ';
                    i += 1;
                }
            }
        } else if rest.starts_with(b"\"\"\"") {
            i += 3;
            while i < len && !bytes[i..].starts_with(b"\"\"\"") {
                out[i] = b' ';
                i += 1;
            }
            i = (i + 3).min(len);
        } else if bytes[i] == b'"' {
            i += 1;
            while i < len && bytes[i] != b'"' && bytes[i] != b'\n' {
                if bytes[i] == b'\\' && i + 1 < len {
                    out[i] = b' ';
                    i += 1;
                }
                out[i] = b' ';
                i += 1;
            }
            i += 1;
        } else {
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn check_balanced(masked: &str) -> Result<()> {
    let mut braces: i64 = 0;
    let mut parens: i64 = 0;
    for (line_no, line) in masked.lines().enumerate() {
        for c in line.chars() {
            match c {
                '{' => braces += 1,
                '}' => braces -= 1,
                '(' => parens += 1,
                ')' => parens -= 1,
                _ => {}
            }
            if braces < 0 || parens < 0 {
                return Err(HarnessError::Dsl(format!(
                    "unexpected closing bracket on line {}",
                    line_no + 1
                )));
            }
        }
    }
    if braces != 0 || parens != 0 {
        return Err(HarnessError::Dsl(format!(
            "unbalanced brackets ({} unclosed braces, {} unclosed parentheses)",
            braces, parens
        )));
    }
    Ok(())
}

/// Index of the `}` closing the `{` at `open`
fn matching_brace(masked: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in masked.bytes().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Brace depth of `pos` relative to the start of `range`
fn depth_at(masked: &str, range: &Range<usize>, pos: usize) -> i64 {
    masked[range.start..pos].bytes().fold(0, |depth, b| match b {
        b'{' => depth + 1,
        b'}' => depth - 1,
        _ => depth,
    })
}

/// `keyword { ... }` blocks directly inside `range`, as (keyword, inner range)
fn child_blocks(masked: &str, range: Range<usize>) -> Vec<(String, Range<usize>)> {
    let bytes = masked.as_bytes();
    let mut blocks = Vec::new();
    let mut i = range.start;

    while i < range.end {
        if bytes[i] == b'{' {
            let close = match matching_brace(masked, i) {
                Some(close) if close < range.end => close,
                _ => break,
            };

            let head = masked[range.start..i].trim_end();
            let keyword: String = head
                .chars()
                .rev()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            if !keyword.is_empty() {
                blocks.push((keyword, i + 1..close));
            }
            i = close + 1;
        } else {
            i += 1;
        }
    }
    blocks
}

/// Value of the string literal starting at or after `pos` in `source`
fn string_literal_at(source: &str, pos: usize) -> Option<String> {
    let rest = &source[pos..];
    let start = rest.find('"')?;
    let rest = &rest[start..];

    if let Some(raw) = rest.strip_prefix("\"\"\"") {
        let end = raw.find("\"\"\"")?;
        return Some(raw[..end].to_string());
    }

    let mut value = String::new();
    let mut chars = rest[1..].chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(value),
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                other => value.push(other),
            },
            c => value.push(c),
        }
    }
    None
}

/// String assigned to `key` at the top level of `range`
fn assignment(source: &str, masked: &str, range: &Range<usize>, key: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"\b{}\s*=\s*", regex::escape(key))).ok()?;
    let pos = pattern
        .find_iter(&masked[range.clone()])
        .map(|m| range.start + m.start())
        .find(|&pos| depth_at(masked, range, pos) == 0)?;
    let value_pos = pos + masked[pos..].find('=')? + 1;
    string_literal_at(source, value_pos)
}

fn parse_build_type(source: &str, masked: &str, object_id: &str, body: Range<usize>) -> Result<BuildTypeDef> {
    let name = assignment(source, masked, &body, "name").ok_or_else(|| {
        HarnessError::Dsl(format!("build type {} has no name", object_id))
    })?;
    let description = assignment(source, masked, &body, "description");

    let mut steps = Vec::new();
    let mut dependencies = Vec::new();

    for (keyword, inner) in child_blocks(masked, body.clone()) {
        match keyword.as_str() {
            "steps" => {
                for (kind, step) in child_blocks(masked, inner) {
                    steps.push(StepDef {
                        kind,
                        name: assignment(source, masked, &step, "name"),
                        script: assignment(source, masked, &step, "scriptContent"),
                    });
                }
            }
            "dependencies" => {
                dependencies.extend(
                    snapshot_pattern()
                        .captures_iter(&masked[inner])
                        .map(|caps| caps[1].to_string()),
                );
            }
            _ => {}
        }
    }

    Ok(BuildTypeDef {
        object_id: object_id.to_string(),
        name,
        description,
        steps,
        dependencies,
    })
}

/// Parse a settings DSL into its build types
pub fn parse(source: &str) -> Result<PipelineDefinition> {
    let masked = mask_literals(source);
    check_balanced(&masked)?;

    let version = Regex::new(r#"(?m)^\s*version\s*=\s*"([^"]*)""#)
        .ok()
        .and_then(|re| re.captures(source).map(|caps| caps[1].to_string()));

    let project_open = project_pattern()
        .find(&masked)
        .map(|m| m.end() - 1)
        .ok_or_else(|| HarnessError::Dsl("no project block found".to_string()))?;
    let project_close = matching_brace(&masked, project_open)
        .ok_or_else(|| HarnessError::Dsl("project block is not closed".to_string()))?;
    let references: Vec<String> = reference_pattern()
        .captures_iter(&masked[project_open..project_close])
        .map(|caps| caps[1].to_string())
        .collect();

    let mut declared = Vec::new();
    for caps in object_pattern().captures_iter(&masked) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let open = whole.end() - 1;
        let close = matching_brace(&masked, open).ok_or_else(|| {
            HarnessError::Dsl(format!("build type {} is not closed", id.as_str()))
        })?;
        declared.push(parse_build_type(source, &masked, id.as_str(), open + 1..close)?);
    }

    let mut build_types = Vec::with_capacity(references.len());
    for reference in &references {
        let def = declared
            .iter()
            .find(|bt| &bt.object_id == reference)
            .ok_or_else(|| {
                HarnessError::Dsl(format!(
                    "build type {} is registered in the project but never declared",
                    reference
                ))
            })?;
        build_types.push(def.clone());
    }

    for bt in &build_types {
        if let Some(missing) = bt
            .dependencies
            .iter()
            .find(|dep| !declared.iter().any(|d| &d.object_id == *dep))
        {
            return Err(HarnessError::Dsl(format!(
                "{} depends on undeclared build type {}",
                bt.object_id, missing
            )));
        }
    }

    Ok(PipelineDefinition {
        version,
        build_types,
    })
}
