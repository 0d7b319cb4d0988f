//! CLI Commands
//!
//! Command definitions and handlers connecting the CLI to the engine. Every
//! handler prints a `CommandResponse` envelope as JSON. Nothing is persisted
//! between invocations; `run` is the long-lived entry point, the other
//! commands operate on a fresh paper-mode engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{load_config, Config};
use crate::domain::error::CommandResponse;
use crate::engine::{Engine, MonitorConditions};
use crate::ports::sim::{SimLedger, SimPriceFeed};

/// Seed reserves for the paper-mode liquidity venue
const VENUE_BASE_RESERVE: f64 = 10.0;
const VENUE_TOKEN_RESERVE: f64 = 1_000_000.0;

#[derive(Parser, Debug)]
#[command(name = "carousel", about = "Account-pool trade automation engine")]
pub struct CliApp {
    /// Enable info-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the engine until interrupted
    Run(RunCmd),

    /// Show a status snapshot
    Status(StatusCmd),

    /// Level base balances across the pool
    Equalize(EqualizeCmd),

    /// Tax policy operations
    Tax(TaxCmd),

    /// Auto-extraction monitor operations
    Monitor(MonitorCmd),

    /// Run the full extraction sequence
    Extract(ExtractCmd),
}

#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Skip the normal trade loops
    #[arg(long)]
    pub no_trading: bool,

    /// Start the chart-activity loop as well
    #[arg(long)]
    pub chart: bool,

    /// Arm the auto-extraction monitor
    #[arg(long)]
    pub monitor: bool,

    /// Stop after this many seconds instead of waiting for ctrl-c
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct EqualizeCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Base units kept on the primary account, overrides config
    #[arg(long, value_name = "AMOUNT")]
    pub reserve: Option<f64>,
}

#[derive(Parser, Debug)]
pub struct TaxCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub action: TaxAction,
}

#[derive(Subcommand, Debug)]
pub enum TaxAction {
    /// Install the default 3%/5% policy
    Enable,
    /// Remove the policy
    Disable,
    /// Install a policy with explicit rates
    Set {
        #[arg(long, value_name = "PCT")]
        buy: f64,
        #[arg(long, value_name = "PCT")]
        sell: f64,
    },
    /// Exempt an account from tax
    Exempt {
        #[arg(value_name = "ACCOUNT")]
        account: u8,
    },
    /// Revoke an account's exemption
    Unexempt {
        #[arg(value_name = "ACCOUNT")]
        account: u8,
    },
    /// Show policies and collection stats
    Status,
}

#[derive(Parser, Debug)]
pub struct MonitorCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub action: MonitorAction,
}

#[derive(Subcommand, Debug)]
pub enum MonitorAction {
    /// Arm the monitor with the configured thresholds
    Start {
        /// Volume threshold override, number of trades
        #[arg(long, value_name = "AMOUNT")]
        volume: Option<u64>,
        /// Time limit override, minutes
        #[arg(long, value_name = "MINUTES")]
        time: Option<u64>,
        /// Price drop override, percent
        #[arg(long, value_name = "PCT")]
        drop: Option<f64>,
    },
    /// Disarm the monitor
    Cancel,
    /// Show the armed state
    Status,
}

#[derive(Parser, Debug)]
pub struct ExtractCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,
}

/// Load configuration, falling back to defaults when the file is absent
fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path).with_context(|| format!("failed to load {}", path.display()))
    } else {
        tracing::warn!("config file {} not found, using defaults", path.display());
        Ok(Config::default())
    }
}

/// Build a paper-mode engine over an in-memory ledger: every configured
/// account funded, one liquidity venue seeded for the trading token.
pub async fn build_paper_engine(config: &Config) -> Result<(Engine, Arc<SimLedger>)> {
    let sim = Arc::new(SimLedger::new());
    for i in 1..=config.accounts.count {
        sim.fund(
            &format!("{}-{}", config.accounts.label_prefix, i),
            config.accounts.initial_balance,
        );
    }
    sim.create_venue(&config.trading.token, VENUE_BASE_RESERVE, VENUE_TOKEN_RESERVE);

    let feed = Arc::new(SimPriceFeed::default());
    let engine = Engine::new(config, sim.clone(), feed)
        .await
        .context("failed to build engine")?;
    Ok((engine, sim))
}

fn print_response<T: Serialize>(response: &CommandResponse<T>) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(response).context("failed to serialize response")?
    );
    Ok(())
}

pub async fn run_command(cmd: RunCmd) -> Result<()> {
    let config = load_or_default(&cmd.config)?;
    tracing::info!("starting engine, state is in-memory only and lost on exit");
    let (engine, _sim) = build_paper_engine(&config).await?;

    if !cmd.no_trading {
        engine.start_trading().await.context("failed to start trading")?;
    }
    if cmd.chart {
        engine.start_chart().await.context("failed to start chart loop")?;
    }
    if cmd.monitor {
        engine.start_monitor(None).await.context("failed to arm monitor")?;
    }

    let mut outcome_rx = engine.monitor().subscribe();
    let wait_outcome = async {
        loop {
            if outcome_rx.borrow().is_some() {
                return;
            }
            if outcome_rx.changed().await.is_err() {
                return;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
        }
        _ = wait_outcome, if cmd.monitor => {
            tracing::info!("monitor reached a terminal state");
        }
        _ = sleep_opt(cmd.duration) => {
            tracing::info!("run duration elapsed");
        }
    }

    engine.shutdown().await;
    let status = engine.status().await;
    if let Some(outcome) = engine.monitor().outcome() {
        print_response(&CommandResponse::ok(serde_json::json!({
            "status": status,
            "monitor_outcome": outcome,
        })))?;
    } else {
        print_response(&CommandResponse::ok(status))?;
    }
    Ok(())
}

/// Pending forever when no duration is given
async fn sleep_opt(duration: Option<u64>) {
    match duration {
        Some(secs) => tokio::time::sleep(std::time::Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

pub async fn status_command(cmd: StatusCmd) -> Result<()> {
    let config = load_or_default(&cmd.config)?;
    let (engine, _sim) = build_paper_engine(&config).await?;
    print_response(&CommandResponse::ok(engine.status().await))
}

pub async fn equalize_command(cmd: EqualizeCmd) -> Result<()> {
    let config = load_or_default(&cmd.config)?;
    let (engine, _sim) = build_paper_engine(&config).await?;
    print_response(&CommandResponse::from_result(
        engine.equalize(cmd.reserve).await,
    ))
}

pub async fn tax_command(cmd: TaxCmd) -> Result<()> {
    let config = load_or_default(&cmd.config)?;
    let (engine, _sim) = build_paper_engine(&config).await?;
    let tax = engine.tax();
    let token = engine.token().to_string();

    match cmd.action {
        TaxAction::Enable => {
            let policy = tax.enable(&token).await;
            print_response(&CommandResponse::ok(policy))
        }
        TaxAction::Disable => {
            let removed = tax.disable(&token).await;
            print_response(&CommandResponse::ok(serde_json::json!({
                "token": token,
                "removed": removed,
            })))
        }
        TaxAction::Set { buy, sell } => print_response(&CommandResponse::from_result(
            tax.set_policy(&token, buy, sell, engine.pool().primary_id())
                .await,
        )),
        TaxAction::Exempt { account } => {
            tax.exempt_account(&token, account).await;
            print_response(&CommandResponse::ok(serde_json::json!({
                "token": token,
                "account": account,
                "exempt": true,
            })))
        }
        TaxAction::Unexempt { account } => {
            tax.unexempt_account(&token, account).await;
            print_response(&CommandResponse::ok(serde_json::json!({
                "token": token,
                "account": account,
                "exempt": false,
            })))
        }
        TaxAction::Status => print_response(&CommandResponse::ok(tax.summary().await)),
    }
}

pub async fn monitor_command(cmd: MonitorCmd) -> Result<()> {
    let config = load_or_default(&cmd.config)?;
    let (engine, _sim) = build_paper_engine(&config).await?;

    match cmd.action {
        MonitorAction::Start { volume, time, drop } => {
            let conditions = MonitorConditions {
                volume_threshold: volume.unwrap_or(config.monitor.volume_threshold),
                time_limit_minutes: time.unwrap_or(config.monitor.time_limit_minutes),
                drop_percent_threshold: drop.unwrap_or(config.monitor.drop_percent_threshold),
            };
            match engine.start_monitor(Some(conditions)).await {
                Ok(()) => print_response(&CommandResponse::ok(engine.monitor().status().await)),
                Err(e) => print_response(&CommandResponse::<()>::failed(e.to_string())),
            }
        }
        MonitorAction::Cancel => {
            let was_armed = engine.cancel_monitor().await;
            print_response(&CommandResponse::ok(serde_json::json!({
                "active": false,
                "was_armed": was_armed,
            })))
        }
        MonitorAction::Status => print_response(&CommandResponse::ok(
            engine.monitor().status().await,
        )),
    }
}

pub async fn extract_command(cmd: ExtractCmd) -> Result<()> {
    let config = load_or_default(&cmd.config)?;
    let (engine, _sim) = build_paper_engine(&config).await?;
    print_response(&CommandResponse::from_result(engine.extract().await))
}
