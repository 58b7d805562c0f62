//! ocrmux - OCR text enhancement router
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use ocrmux::cli::{Cli, Commands};
use ocrmux::core::logging::{self, LogSettings};
use ocrmux::storage::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_settings = LogSettings::from_env(cli.log_level.as_deref(), cli.json_output, cli.verbose);
    logging::init(&log_settings);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("Error [{}]: {e}", e.error_code());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> ocrmux::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;
    let config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => ocrmux::cli::serve::execute(&args, &config).await,
        Commands::Enhance(args) => ocrmux::cli::enhance::execute(&args, &config, format, pretty).await,
        Commands::Providers => ocrmux::cli::providers::execute(&config, format, pretty).await,
    }
}
