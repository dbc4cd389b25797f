pub mod binary_resolver;
pub mod clock;
pub mod config;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Credentials, RunConfig};
