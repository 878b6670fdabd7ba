//! Common utilities shared by the CLI, the browser layer and the runner

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result, TimeoutKind};

/// Shorten text for inclusion in an error message
pub fn truncate_for_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
