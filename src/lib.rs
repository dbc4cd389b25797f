pub mod client;
pub mod dsl;
pub mod error;
pub mod provision;
pub mod report;
pub mod runner;
pub mod suites;
pub mod utils;
pub mod vcs;

// Re-export common items
pub use error::{HarnessError, Result};
pub use report::generate_report;
pub use runner::run_suites;
