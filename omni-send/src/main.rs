//! omni-send - Background daemon for scheduled publishing
//!
//! Polls the schedule queue and runs due content through the publish
//! dispatcher at the scheduled time.

use clap::Parser;
use libomnipost::adapters::AdapterSet;
use libomnipost::logging::{LogFormat, LoggingConfig};
use libomnipost::{
    Config, Database, Dispatcher, FileCredentialProvider, OmnipostError, Result, Scanner,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "omni-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
omni-send - Background daemon for scheduled publishing

DESCRIPTION:
    omni-send is a long-running daemon that polls the Omnipost schedule queue
    and publishes due content through the network adapters.

    Each pass publishes every pending variant of each due content item, then
    finalizes: the content is marked published and the schedule removed, even
    when individual variants fail. Failed variants stay queued for manual
    retry; a schedule never fires twice.

USAGE:
    # Run in foreground (logs to stderr)
    omni-send

    # Custom poll interval
    omni-send --poll-interval 30s

    # Process the queue once and exit
    omni-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current pass)

CONFIGURATION:
    Configuration file: ~/.config/omnipost/config.toml
    Credentials file:   ~/.config/omnipost/credentials.toml
    Database location:  ~/.local/share/omnipost/omnipost.db

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
    2 - Credential error
")]
struct Cli {
    /// How often to check for due schedules
    #[arg(long, value_name = "DURATION", default_value = "60s")]
    poll_interval: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process due schedules once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(LogFormat::Text, "info".to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let poll_interval = humantime::parse_duration(&cli.poll_interval).map_err(|e| {
        OmnipostError::InvalidInput(format!(
            "Invalid --poll-interval '{}': {}",
            cli.poll_interval, e
        ))
    })?;

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let credentials = Arc::new(FileCredentialProvider::load(&config.credentials.path)?);
    let dispatcher = Dispatcher::new(db, credentials, AdapterSet::from_config(&config)?);
    let scanner = Scanner::new(dispatcher);

    info!("omni-send daemon starting");

    if cli.once {
        run_pass(&scanner).await;
        info!("omni-send: processed queue once, exiting");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    info!("Poll interval: {}", humantime::format_duration(poll_interval));
    run_daemon_loop(&scanner, poll_interval, shutdown).await;

    info!("omni-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| OmnipostError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Main daemon loop
async fn run_daemon_loop(scanner: &Scanner, poll_interval: Duration, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        run_pass(scanner).await;

        // Sleep until next poll, checking for shutdown every second
        let mut remaining = poll_interval;
        while !remaining.is_zero() {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            let slice = remaining.min(Duration::from_secs(1));
            sleep(slice).await;
            remaining -= slice;
        }
    }
}

/// One scan pass; runtime errors are logged, never fatal to the daemon
async fn run_pass(scanner: &Scanner) {
    match scanner.process_due_schedules(chrono::Utc::now()).await {
        Ok(report) => {
            if report.processed > 0 || report.errors > 0 {
                info!(
                    processed = report.processed,
                    errors = report.errors,
                    "Scan pass complete"
                );
            }
        }
        Err(e) => error!("Scan pass failed: {}", e),
    }
}
