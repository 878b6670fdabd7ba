//! Scenario discovery, execution and reporting
//!
//! Scenario files are loaded and filtered up front, so a malformed file
//! fails the run before any browser starts. The runner then executes each
//! scenario once per project and hands results to the reporters.

pub mod artifacts;
pub mod discovery;
pub mod report;
pub mod runner;
pub mod scenario;

pub use discovery::{discover, relative_display, Filters};
pub use report::{Reporter, Reporters};
pub use runner::{Outcome, RunSummary, Runner, ScenarioResult};
pub use scenario::{Scenario, ScenarioFile, Step};
