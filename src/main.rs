//! Carousel - Account-Pool Trade Automation Engine

mod cli;
mod config;
mod domain;
mod engine;
mod ports;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::{CliApp, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug)?;

    match app.command {
        Command::Run(cmd) => cli::run_command(cmd).await,
        Command::Status(cmd) => cli::status_command(cmd).await,
        Command::Equalize(cmd) => cli::equalize_command(cmd).await,
        Command::Tax(cmd) => cli::tax_command(cmd).await,
        Command::Monitor(cmd) => cli::monitor_command(cmd).await,
        Command::Extract(cmd) => cli::extract_command(cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };

    fmt().with_env_filter(filter).init();
    Ok(())
}
