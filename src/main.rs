use clap::Parser;
use std::process::ExitCode;

use parfor::cli::{Cli, Output};
use parfor::parallel::is_cancellation;

/// Conventional exit status for an interrupted run
const EXIT_CANCELLED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(false, cli.quiet);

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_cancellation(&err) => {
            output.warning("Run cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(err) => {
            output.error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
