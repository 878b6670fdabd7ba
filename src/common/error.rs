//! Error types for the scenario runner
//!
//! Errors fall into two families: run-level errors (bad configuration,
//! unreadable scenario files) that abort the run before anything executes,
//! and scenario-level errors (timeouts, failed assertions, driver trouble)
//! that the runner catches at the scenario boundary.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Which independent ceiling a timeout error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Action,
    Navigation,
    Assertion,
    Scenario,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Action => write!(f, "action"),
            Self::Navigation => write!(f, "navigation"),
            Self::Assertion => write!(f, "assertion"),
            Self::Scenario => write!(f, "scenario"),
        }
    }
}

/// Main error type for the scenario runner
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file '{path}': {message}")]
    ConfigParse { path: String, message: String },

    #[error("Invalid scenario file '{path}': {message}")]
    ScenarioParse { path: String, message: String },

    #[error("Focused scenarios are not allowed when forbid_only is set: {0}")]
    FocusedScenarios(String),

    #[error("No scenarios found. Use --pass-with-no-tests to allow an empty run")]
    NoScenarios,

    // === Driver Errors ===
    #[error("WebDriver binary '{name}' not found. Searched: {searched}")]
    DriverNotFound { name: String, searched: String },

    #[error("WebDriver failed to start: {0}")]
    DriverStartFailed(String),

    #[error("Failed to reach WebDriver endpoint: {0}")]
    DriverUnreachable(String),

    #[error("Failed to open browser session: {0}")]
    SessionFailed(String),

    // === WebDriver Protocol Errors ===
    #[error("WebDriver command '{command}' failed ({code}): {message}")]
    WebDriver {
        command: String,
        code: String,
        message: String,
    },

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),

    // === Scenario Errors ===
    #[error("{kind} timeout of {ms}ms exceeded: {what}")]
    Timeout {
        kind: TimeoutKind,
        ms: u64,
        what: String,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Selector '{selector}' resolved to {count} elements")]
    StrictMode { selector: String, count: usize },

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("Script error: {0}")]
    Script(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a timeout error for one of the independent ceilings
    pub fn timeout(kind: TimeoutKind, ms: u64, what: impl Into<String>) -> Self {
        Self::Timeout {
            kind,
            ms,
            what: what.into(),
        }
    }

    /// Create a WebDriver command failure
    pub fn webdriver(command: &str, code: &str, message: &str) -> Self {
        Self::WebDriver {
            command: command.to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a scenario parse error
    pub fn scenario_parse(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::ScenarioParse {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error is one of the timeout ceilings
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Failures of the browser infrastructure rather than of the scenario
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Error::DriverNotFound { .. }
            | Error::DriverStartFailed(_)
            | Error::DriverUnreachable(_)
            | Error::SessionFailed(_)
            | Error::Protocol(_) => true,
            Error::WebDriver { code, .. } => matches!(
                code.as_str(),
                "invalid session id" | "session not created" | "unknown error"
            ),
            _ => false,
        }
    }
}
