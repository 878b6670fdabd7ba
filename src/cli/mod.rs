//! CLI command handling
//!
//! Loads the configuration for a command, runs it and formats the output.

use std::path::PathBuf;
use std::sync::Arc;

use crate::commands::Commands;
use crate::common::config::{Environment, Overrides, RunConfig};
use crate::common::{Error, Result};
use crate::testing::{discover, relative_display, Filters, Reporters, Runner, ScenarioFile};
use crate::webdriver::WebDriverLauncher;

/// Dispatch a CLI command
///
/// Returns whether the command succeeded; a run with failing scenarios is
/// not an error but still exits non-zero.
pub async fn dispatch(command: Commands) -> Result<bool> {
    let env = Environment::from_env()?;

    match command {
        Commands::Run {
            paths,
            grep,
            grep_invert,
            projects,
            headed,
            debug,
            workers,
            retries,
            reporters,
            max_failures,
            pass_with_no_tests,
            config,
        } => {
            let overrides = Overrides {
                workers,
                retries,
                reporters,
                projects,
                max_failures,
                headed,
                debug,
            };
            let config = load(config, env, &overrides)?;
            let filters = Filters::new(paths, grep.as_deref(), grep_invert.as_deref())?;

            let files = discover(&config, &filters)?;
            if files.is_empty() {
                if pass_with_no_tests {
                    println!("No scenarios found");
                    return Ok(true);
                }
                return Err(Error::NoScenarios);
            }

            let config = Arc::new(config);
            let launcher = Arc::new(WebDriverLauncher::new(config.webdriver.clone()));
            let mut reporters = Reporters::from_config(&config);
            let summary = Runner::new(config, launcher)
                .run(&files, &mut reporters)
                .await?;

            Ok(summary.is_success())
        }

        Commands::List {
            paths,
            grep,
            projects,
            config,
        } => {
            let overrides = Overrides {
                projects,
                ..Default::default()
            };
            let config = load(config, env, &overrides)?;
            let filters = Filters::new(paths, grep.as_deref(), None)?;
            let files = discover(&config, &filters)?;

            print!("{}", format_listing(&config, &files));
            Ok(true)
        }

        Commands::ShowConfig { config } => {
            let config = load(config, env, &Overrides::default())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(true)
        }
    }
}

fn load(path: Option<PathBuf>, env: Environment, overrides: &Overrides) -> Result<RunConfig> {
    let config = RunConfig::load(path.as_deref(), env, overrides)?;
    tracing::debug!(
        config_file = ?config.config_file,
        ci = config.ci,
        workers = config.workers,
        retries = config.retries,
        "configuration resolved"
    );
    Ok(config)
}

/// One line per scenario and project, then a count
pub fn format_listing(config: &RunConfig, files: &[ScenarioFile]) -> String {
    let mut out = String::new();
    let mut count = 0;

    for project in &config.projects {
        for file in files {
            let path = relative_display(&file.path, &config.test_dir);
            for scenario in &file.scenarios {
                out.push_str(&format!("  [{}] › {} › {}", project.name, path, scenario.full_title()));
                if scenario.skip.is_some() {
                    out.push_str(" (skipped)");
                }
                out.push('\n');
                count += 1;
            }
        }
    }

    let file_count = files.len();
    out.push_str(&format!(
        "Total: {} scenario{} in {} file{}\n",
        count,
        if count == 1 { "" } else { "s" },
        file_count,
        if file_count == 1 { "" } else { "s" }
    ));
    out
}
