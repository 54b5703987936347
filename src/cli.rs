// Command line surface. With no subcommand the interactive menu runs.

use crate::api::ApiClient;
use crate::controller::{Outcome, DEFAULT_POLL_INTERVAL};
use crate::ui::{self, RunSettings};
use crate::workflow::Workflow;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

#[derive(Parser, Debug)]
#[command(name = "docflow", version, about = "Upload a folder to the invoice service and fetch the result")]
pub struct Args {
    /// Base URL of the service.
    #[arg(long, env = "DOCFLOW_URL", default_value = DEFAULT_SERVER_URL, global = true)]
    pub server_url: String,
    /// Where results are saved. Defaults to the user's download folder.
    #[arg(long, global = true)]
    pub out_dir: Option<PathBuf>,
    /// Delay between progress requests.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64, global = true)]
    pub poll_interval_ms: u64,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pair invoices with screenshots into one PDF.
    Merge {
        /// Folder to upload; a folder dialog opens when omitted.
        folder: Option<PathBuf>,
        /// Invoice share of each merged page's height (0-1).
        #[arg(long, value_parser = parse_ratio)]
        inv_ratio: Option<f32>,
    },
    /// Extract invoice fields into a text report.
    Extract {
        /// Folder to upload; a folder dialog opens when omitted.
        folder: Option<PathBuf>,
    },
}

fn parse_ratio(raw: &str) -> Result<f32, String> {
    let ratio: f32 = raw.parse().map_err(|_| format!("not a number: {raw}"))?;
    if ratio > 0.0 && ratio < 1.0 {
        Ok(ratio)
    } else {
        Err("must be between 0 and 1".into())
    }
}

pub fn dispatch(args: Args) -> Result<ExitCode> {
    let out_dir = args
        .out_dir
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let api = ApiClient::new(&args.server_url, &out_dir)?;
    let mut settings = RunSettings {
        poll_interval: Duration::from_millis(args.poll_interval_ms.max(1)),
        inv_ratio: None,
    };
    info!(server = api.base_url(), out_dir = %out_dir.display(), "starting");

    let (workflow, folder) = match args.command {
        None => {
            ui::main_menu(&api, &settings)?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Command::Merge { folder, inv_ratio }) => {
            settings.inv_ratio = inv_ratio;
            (Workflow::Merge, folder)
        }
        Some(Command::Extract { folder }) => (Workflow::Extract, folder),
    };

    let outcome = ui::run_workflow(&api, workflow, folder.as_deref(), &settings)?;
    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
