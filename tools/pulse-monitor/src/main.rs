//! pulse-monitor: headless monitor for the Restaurant Pulse dashboard.
//!
//! Drives the sync client from the command line: streams live changes,
//! prints one-shot status snapshots and sends scrape commands.
//!
//! ## Usage
//!
//! ```bash
//! # Follow live updates from a local backend
//! pulse-monitor watch
//!
//! # One-shot status from a remote backend
//! pulse-monitor --api-url http://pulse.example.com:8000 status
//!
//! # Kick off a scraping cycle
//! pulse-monitor scrape trigger
//! ```

mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulse_sync::{SyncConfig, SyncCoordinator};
use pulse_telemetry::{gather_text, init_telemetry, TelemetryConfig};
use pulse_types::{ResourceKey, ScrapeCommand};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Restaurant Pulse headless monitor
#[derive(Parser, Debug)]
#[command(name = "pulse-monitor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// REST base URL (overrides config file and PULSE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// WebSocket URL (overrides config file and PULSE_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON formatted logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream live changes until Ctrl-C
    Watch {
        /// Interval between full pull refreshes in milliseconds
        #[arg(long, default_value_t = 30_000, value_parser = clap::value_parser!(u64).range(1..))]
        refresh_ms: u64,

        /// Print Prometheus metrics on exit
        #[arg(long)]
        print_metrics: bool,
    },
    /// Print the current dashboard state and exit
    Status,
    /// Send a scrape command (start, stop or trigger)
    Scrape { command: ScrapeCommand },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::for_tool("pulse-monitor");
    telemetry.json_logs |= cli.json_logs;
    let _telemetry = init_telemetry(telemetry).context("Failed to initialize telemetry")?;

    let config = load_config(&cli)?;
    let client = SyncCoordinator::new(config).context("Failed to create sync client")?;

    match cli.command {
        Command::Watch {
            refresh_ms,
            print_metrics,
        } => watch(&client, Duration::from_millis(refresh_ms), print_metrics).await,
        Command::Status => status(&client).await,
        Command::Scrape { command } => scrape(&client, command).await,
    }
}

/// Config file, then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config =
        SyncConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(url) = &cli.ws_url {
        config.connection.ws_url = url.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn watch(client: &SyncCoordinator, refresh_every: Duration, print_metrics: bool) -> Result<()> {
    let changes = client.subscribe(|change, snapshot| {
        println!("{}", render::change_line(change, snapshot));
    });
    client.start().context("Failed to start sync client")?;
    info!(refresh_ms = refresh_every.as_millis() as u64, "Watching; press Ctrl-C to stop");

    let mut ticker = tokio::time::interval(refresh_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let report = client.refresh().await;
                for (key, err) in &report.failed {
                    warn!(key = %key, error = %err, "Refresh failed");
                }
            }
        }
    }

    changes.unsubscribe();
    client.shutdown();
    println!("{}", render::status_report(&client.snapshot()));

    if print_metrics {
        print!("{}", gather_text().context("Failed to render metrics")?);
    }
    Ok(())
}

async fn status(client: &SyncCoordinator) -> Result<()> {
    let report = client.refresh().await;
    if report.loaded.is_empty() {
        let (key, err) = report
            .failed
            .first()
            .context("Nothing to load")?;
        anyhow::bail!("Failed to load {key}: {err}");
    }
    for (key, err) in &report.failed {
        eprintln!("warning: {key}: {err}");
    }
    if let Err(err) = client.load(ResourceKey::Health).await {
        eprintln!("warning: {}: {err}", ResourceKey::Health);
    }

    println!("{}", render::status_report(&client.snapshot()));
    Ok(())
}

async fn scrape(client: &SyncCoordinator, command: ScrapeCommand) -> Result<()> {
    let ack = client
        .execute(command)
        .await
        .with_context(|| format!("Scrape {command} failed"))?;
    println!("{}", ack.message);
    Ok(())
}
