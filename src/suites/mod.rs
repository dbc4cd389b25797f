//! The three test suites and their scenarios.

/// Fail the scenario with an assertion error unless `cond` holds
macro_rules! verify {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::HarnessError::Assertion(format!($($arg)+)));
        }
    };
}

/// Fail unless both sides are equal, showing both
macro_rules! verify_eq {
    ($left:expr, $right:expr, $what:expr) => {{
        let (left, right) = (&$left, &$right);
        if left != right {
            return Err($crate::error::HarnessError::Assertion(format!(
                "{}: expected {:?}, got {:?}",
                $what, right, left
            )));
        }
    }};
}

pub mod fixtures;
pub mod import;
pub mod pipeline;
pub mod sync;

use crate::error::{HarnessError, Result};
use crate::runner::Scenario;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suite {
    Import,
    Sync,
    Pipeline,
}

impl Suite {
    pub const ALL: [Suite; 3] = [Suite::Import, Suite::Sync, Suite::Pipeline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Suite::Import => "import",
            Suite::Sync => "sync",
            Suite::Pipeline => "pipeline",
        }
    }

    pub fn scenarios(&self) -> &'static [Scenario] {
        match self {
            Suite::Import => import::SCENARIOS,
            Suite::Sync => sync::SCENARIOS,
            Suite::Pipeline => pipeline::SCENARIOS,
        }
    }

    /// Comma separated names; `all` selects every suite. Duplicates are dropped.
    pub fn parse_list(value: &str) -> Result<Vec<Suite>> {
        let mut suites = Vec::new();
        for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if name.eq_ignore_ascii_case("all") {
                return Ok(Self::ALL.to_vec());
            }
            let suite: Suite = name.parse()?;
            if !suites.contains(&suite) {
                suites.push(suite);
            }
        }
        if suites.is_empty() {
            return Err(HarnessError::Config("no test suite selected".to_string()));
        }
        Ok(suites)
    }
}

impl FromStr for Suite {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "import" | "dsl_import" => Ok(Suite::Import),
            "sync" | "synchronization" => Ok(Suite::Sync),
            "pipeline" | "pipeline_execution" => Ok(Suite::Pipeline),
            other => Err(HarnessError::Config(format!(
                "unknown suite '{}', expected one of: import, sync, pipeline, all",
                other
            ))),
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
