//! Logging and tracing configuration
//!
//! Console output belongs to the reporters, so the stderr layer stays at
//! INFO for this crate. A second, more verbose layer goes to a log file in
//! the platform data directory; that is where WebDriver traffic ends up.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::paths;

/// Name of the run log inside the log directory
const LOG_FILE_NAME: &str = "runner.log";

/// Keeps the file writer alive; drop it to flush
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
    pub log_file: Option<PathBuf>,
}

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate (DEBUG with `verbose`), WARN for
/// dependencies. The log file always records DEBUG for this crate.
pub fn init_cli(verbose: bool) -> LogGuard {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "scenarios=debug,warn"
        } else {
            "scenarios=info,warn"
        })
    });

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(console_filter);

    let file_setup = paths::log_dir().and_then(|dir| {
        std::fs::create_dir_all(&dir).ok()?;
        let appender = tracing_appender::rolling::never(&dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Some((writer, guard, dir.join(LOG_FILE_NAME)))
    });

    match file_setup {
        Some((writer, guard, log_file)) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::new("scenarios=debug,info"));

            tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .init();

            LogGuard {
                _guard: Some(guard),
                log_file: Some(log_file),
            }
        }
        None => {
            tracing_subscriber::registry().with(console_layer).init();
            LogGuard {
                _guard: None,
                log_file: None,
            }
        }
    }
}
