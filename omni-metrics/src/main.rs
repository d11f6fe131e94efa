//! omni-metrics - Engagement metrics collection and inspection
//!
//! Runs reconciliation passes against the networks and shows the stored
//! engagement records.

use chrono::DateTime;
use clap::{Parser, Subcommand};
use libomnipost::adapters::AdapterSet;
use libomnipost::{
    Config, Database, FileCredentialProvider, Metric, OmnipostError, ReconcileEngine, Result,
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "omni-metrics")]
#[command(version)]
#[command(about = "Engagement metrics collection and inspection")]
#[command(long_about = "\
omni-metrics - Engagement metrics collection and inspection

DESCRIPTION:
    omni-metrics reconciles local engagement records with the networks and
    displays what is stored. A reconcile pass fetches each account's recent
    posts, refreshes the metric record of every published variant it finds,
    and retires variants whose remote post is gone.

COMMANDS:
    reconcile   Run one reconciliation pass
    list        List stored metric records
    show        Show the metric record for one variant

USAGE EXAMPLES:
    # Reconcile all published variants
    omni-metrics reconcile
    omni-metrics reconcile --format json

    # All stored metrics
    omni-metrics list

    # Metrics for one content item's variants
    omni-metrics list --content <CONTENT_ID>

    # One variant
    omni-metrics show <VARIANT_ID>

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Credential error
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation pass
    Reconcile {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List stored metric records
    List {
        /// Restrict to one content item's variants
        #[arg(long, value_name = "CONTENT_ID")]
        content: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the metric record for one variant
    Show {
        /// Variant ID
        variant_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::Reconcile { format } => cmd_reconcile(&db, &config, &format).await,
        Commands::List { content, format } => cmd_list(&db, content.as_deref(), &format).await,
        Commands::Show { variant_id } => cmd_show(&db, &variant_id).await,
    }
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(OmnipostError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// Run one reconciliation pass
async fn cmd_reconcile(db: &Database, config: &Config, format: &str) -> Result<()> {
    validate_format(format)?;

    let credentials = Arc::new(FileCredentialProvider::load(&config.credentials.path)?);
    let engine = ReconcileEngine::new(db.clone(), credentials, AdapterSet::from_config(config)?);

    let report = engine.reconcile().await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|e| OmnipostError::InvalidInput(e.to_string()))?
        );
    } else {
        println!("Updated: {}", report.updated);
        println!("Retired: {}", report.retired);
    }

    Ok(())
}

/// List stored metric records
async fn cmd_list(db: &Database, content: Option<&str>, format: &str) -> Result<()> {
    validate_format(format)?;

    let metrics = db.list_metrics(content).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&metrics)
                .map_err(|e| OmnipostError::InvalidInput(e.to_string()))?
        );
    } else {
        for metric in &metrics {
            println!("{}", format_metric_line(metric));
        }
    }

    Ok(())
}

/// Show the metric record for one variant
async fn cmd_show(db: &Database, variant_id: &str) -> Result<()> {
    db.get_variant(variant_id)
        .await?
        .ok_or_else(|| OmnipostError::NotFound(format!("Variant {} not found", variant_id)))?;

    let metric = db.get_metric(variant_id).await?.ok_or_else(|| {
        OmnipostError::NotFound(format!("No metric record for variant {}", variant_id))
    })?;

    println!("Variant:     {}", metric.variant_id);
    println!("Likes:       {}", metric.likes);
    println!("Comments:    {}", metric.comments);
    println!("Shares:      {}", metric.shares);
    match metric.impressions {
        Some(n) => println!("Impressions: {}", n),
        None => println!("Impressions: unavailable"),
    }
    println!("Collected:   {}", format_collected_at(metric.collected_at));

    Ok(())
}

fn format_metric_line(metric: &Metric) -> String {
    let impressions = metric
        .impressions
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} | likes {} | comments {} | shares {} | impressions {} | {}",
        metric.variant_id,
        metric.likes,
        metric.comments,
        metric.shares,
        impressions,
        format_collected_at(metric.collected_at)
    )
}

fn format_collected_at(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
