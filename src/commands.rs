//! CLI command definitions
//!
//! Defines the clap commands for the scenarios CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios in every configured project
    Run {
        /// Only run scenario files whose path contains one of these
        paths: Vec<String>,

        /// Only run scenarios whose full title matches this regex
        #[arg(long, short = 'g')]
        grep: Option<String>,

        /// Skip scenarios whose full title matches this regex
        #[arg(long)]
        grep_invert: Option<String>,

        /// Only run these projects (repeatable)
        #[arg(long = "project", short = 'p')]
        projects: Vec<String>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// One worker, headed, no retries and no timeouts
        #[arg(long)]
        debug: bool,

        /// Number of concurrent workers
        #[arg(long, short = 'j', allow_negative_numbers = true)]
        workers: Option<i64>,

        /// Retries for failing scenarios
        #[arg(long, allow_negative_numbers = true)]
        retries: Option<i64>,

        /// Reporter(s): list, dot, json, junit (repeatable)
        #[arg(long = "reporter", short = 'r')]
        reporters: Vec<String>,

        /// Stop starting scenarios after this many failures
        #[arg(long = "max-failures", short = 'x')]
        max_failures: Option<u64>,

        /// Exit successfully when no scenario is selected
        #[arg(long)]
        pass_with_no_tests: bool,

        /// Configuration file (default: scenarios.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// List the scenarios a run would execute
    #[command(alias = "ls")]
    List {
        /// Only list scenario files whose path contains one of these
        paths: Vec<String>,

        /// Only list scenarios whose full title matches this regex
        #[arg(long, short = 'g')]
        grep: Option<String>,

        /// Only list these projects (repeatable)
        #[arg(long = "project", short = 'p')]
        projects: Vec<String>,

        /// Configuration file (default: scenarios.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the resolved configuration as JSON
    ShowConfig {
        /// Configuration file (default: scenarios.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}
