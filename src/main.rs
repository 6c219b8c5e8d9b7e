//! `jobctl` binary entry point.
//!
//! A thin composition layer: parse CLI arguments, run the requested
//! command against a freshly assembled tracker, and report fatal errors
//! with an appropriate exit code.

use clap::Parser;

use mr_tracker::app::handle_fatal_error;
use mr_tracker::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    if let Err(e) = execute_command(cli.command, verbose).await {
        handle_fatal_error(e, verbose);
    }
}
