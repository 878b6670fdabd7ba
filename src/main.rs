//! Scenarios CLI - a configuration-driven browser scenario runner
//!
//! Runs YAML scenario scripts against real browsers through WebDriver.

use clap::Parser;
use commands::Commands;
use scenarios::{cli, commands, common::logging};

#[derive(Parser)]
#[command(name = "scenarios", about = "Configuration-driven browser scenario runner")]
#[command(version, long_about = None)]
struct Cli {
    /// Log debug details to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log = logging::init_cli(cli.verbose);

    let success = match cli::dispatch(cli.command).await {
        Ok(success) => success,
        Err(e) => {
            eprintln!("Error: {e}");
            false
        }
    };

    // Flush the log file before exiting
    drop(log);
    if !success {
        std::process::exit(1);
    }
}
