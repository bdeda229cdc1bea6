//! pagecast-send - Background daemon for scheduled posts
//!
//! Sweeps the post queue at a fixed interval: due posts are charged,
//! written by the content generators and published to their pages.

use anyhow::{Context, Result};
use clap::Parser;
use libpagecast::logging::LoggingConfig;
use libpagecast::{Config, PagecastError, PagecastService, Pipeline, SweepReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pagecast-send")]
#[command(version)]
#[command(about = "Background daemon that generates and publishes scheduled posts")]
#[command(long_about = "\
pagecast-send - Background daemon for scheduled posts

DESCRIPTION:
    pagecast-send is a long-running daemon that sweeps the Pagecast queue
    and turns due posts into published ones.

    Each sweep charges the account's credits, generates a caption and an
    image, publishes both to the connected page and records the outcome.
    Failed generations are refunded. Posts whose account cannot pay stay
    scheduled until credits are bought.

USAGE:
    # Run in foreground (logs to stderr)
    pagecast-send

    # Run with custom poll interval
    pagecast-send --poll-interval 30

    # Run a single sweep and print what it did
    pagecast-send --once --format json

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current sweep)

CONFIGURATION:
    Configuration file: ~/.config/pagecast/config.toml
    Database location: ~/.local/share/pagecast/pagecast.db

    [scheduling]
    poll_interval = 60    # seconds between sweeps
    batch_size = 50       # due posts fetched per sweep
    max_concurrency = 4   # posts processed in parallel
    stale_after = 900     # seconds before an in-flight post is stale
    stale_action = \"fail\" # or \"reclaim\"

    API keys are read from OPENAI_API_KEY and GEMINI_API_KEY.

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run one sweep and exit
    #[arg(long)]
    once: bool,

    /// Output format for the --once report (text, json)
    #[arg(short = 'f', long, default_value = "text", value_name = "FORMAT")]
    format: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Exit code of the first Pagecast error in the chain, 1 otherwise
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PagecastError>())
        .map(PagecastError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    if cli.format != "text" && cli.format != "json" {
        return Err(PagecastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            cli.format
        ))
        .into());
    }
    if cli.poll_interval == Some(0) {
        return Err(PagecastError::InvalidInput(
            "Poll interval must be at least 1 second".to_string(),
        )
        .into());
    }

    let config = Config::load().context("Failed to load configuration")?;
    let poll_interval = cli
        .poll_interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.scheduling.poll_interval());

    let service = PagecastService::from_config(config)
        .await
        .context("Failed to open database")?;
    let pipeline = service
        .pipeline()
        .context("Failed to set up content generation and publishing")?;

    if cli.once {
        let report = pipeline.sweep().await.context("Sweep failed")?;
        print_report(&report, &cli.format)?;
        return Ok(());
    }

    info!(poll_interval_secs = poll_interval.as_secs(), "pagecast-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    run_daemon_loop(&pipeline, poll_interval, shutdown).await;

    info!("pagecast-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;

    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!(signal, "Received shutdown signal, finishing current sweep");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, finishing current sweep");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}

/// Sweep, then sleep until the next poll, checking for shutdown every second
async fn run_daemon_loop(pipeline: &Pipeline, poll_interval: Duration, shutdown: Arc<AtomicBool>) {
    let mut totals = SweepReport::default();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        match pipeline.sweep().await {
            Ok(report) => totals += report,
            // Database trouble is usually transient; the next sweep retries
            Err(e) => error!(error = %e, "Sweep failed"),
        }

        for _ in 0..poll_interval.as_secs() {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    info!(
        published = totals.published,
        failed = totals.failed,
        deferred = totals.deferred,
        "Totals since start"
    );
}

fn print_report(report: &SweepReport, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.is_idle() {
        println!("Nothing due");
        return Ok(());
    }

    println!(
        "Sweep complete: {} due, {} generated, {} published, {} failed, {} deferred",
        report.due, report.generated, report.published, report.failed, report.deferred
    );
    if report.recovered > 0 {
        println!("Recovered {} stale post(s)", report.recovered);
    }
    if report.skipped > 0 || report.errors > 0 {
        println!(
            "Skipped {} post(s) claimed elsewhere, {} database error(s)",
            report.skipped, report.errors
        );
    }
    Ok(())
}
