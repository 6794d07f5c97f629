mod cli;
mod context;
mod core;
mod error;
mod filter;
pub(crate) mod git;
mod logging;
mod pr;
mod utils;

pub(crate) use error::{AppError, AppResult};

use clap::Parser;
use std::process::exit;
use tracing::error;

use crate::cli::GetVerbosity;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    logging::setup_logger(cli.cmd.get_verbosity().tracing_level_filter(), cli.color);

    if let Err(e) = cli.cmd.run().await {
        error!("{e}");
        exit(1);
    }
}
