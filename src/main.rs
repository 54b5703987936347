// Entrypoint for the CLI application.
// - Keeps `main` small: set up logging, parse arguments and dispatch.
// - Logs go to stderr so they do not tear the progress bars.

use clap::Parser;
use docflow_cli::cli::{self, Args};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match cli::dispatch(args) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
