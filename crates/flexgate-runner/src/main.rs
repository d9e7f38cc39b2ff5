//! `flexgate`: FLEX paging gateway.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use flexgate_runner::config::DEFAULT_CONFIG_FILE;
use flexgate_runner::logging::init_tracing;
use flexgate_runner::startup::{self, RunOptions};
use tracing::error;

/// Raw TCP and HTTP/JSON front ends for a FLEX-FSK-TX paging transmitter.
///
/// Settings are read from the configuration file, or from environment
/// variables of the same names when the file does not exist.
#[derive(Parser, Debug)]
#[command(name = "flexgate", version, about, long_about = None)]
struct Cli {
    /// Validate and encode requests but never touch the transmitter
    #[arg(short, long)]
    debug: bool,

    /// Log AT traffic, encoded payloads, and parsed requests
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(cli.verbose);

    let options = RunOptions {
        config_path: cli.config,
        debug: cli.debug,
    };
    match startup::run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
