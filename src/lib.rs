//! Scenarios CLI - a configuration-driven browser scenario runner
//!
//! This library loads YAML scenario scripts, runs them against real
//! browsers through the W3C WebDriver protocol and reports the results.

pub mod browser;
pub mod cli;
pub mod commands;
pub mod common;
pub mod testing;
pub mod webdriver;

// Re-export commonly used types for tests
pub use common::config::RunConfig;
pub use common::{Error, Result};
