//! qkernel binary entry point.

use std::process::ExitCode;

use qkernel::cli::{self, Command};
use qkernel::commands::{self, document_exists};
use qkernel::config::Config;
use qkernel::logging;
use tracing::debug;

/// Exit status for usage errors.
const USAGE_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => return usage_error(&e.to_string()),
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let Some(command) = args.command.clone() else {
        return usage_error("missing command");
    };
    if let Command::Run(run) = &command {
        if !document_exists(&run.file) {
            return usage_error(&format!("file not found: {}", run.file.display()));
        }
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_with_level(config.log_filter()) {
        eprintln!("warning: logging unavailable: {e}");
    }
    debug!(version = env!("CARGO_PKG_VERSION"), ?command, "qkernel starting");

    match commands::dispatch(&command, &config).await {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn usage_error(message: &str) -> ExitCode {
    eprintln!("error: {message}");
    eprintln!("Try 'qkernel --help' for more information.");
    ExitCode::from(USAGE_ERROR)
}
