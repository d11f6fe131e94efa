//! omni-post - Compose and publish content across networks
//!
//! Creates a content item with per-network variants, then either publishes
//! immediately, attaches a schedule, or saves a draft.

use clap::Parser;
use libomnipost::adapters::AdapterSet;
use libomnipost::scheduling::parse_publish_at;
use libomnipost::{
    Config, ContentItem, ContentStatus, Database, Dispatcher, FileCredentialProvider,
    MediaKind, MediaRef, Network, OmnipostError, Result, Schedule, Variant,
};
use std::io::Read;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "omni-post")]
#[command(version)]
#[command(about = "Compose and publish content across networks")]
#[command(long_about = "\
omni-post - Compose and publish content across networks

DESCRIPTION:
    omni-post creates a content item with one variant per target network and
    either publishes it immediately, attaches a schedule for the omni-send
    daemon, or saves it as a draft.

USAGE EXAMPLES:
    # Publish to the default networks right away
    omni-post --user alice \"Release day!\"

    # Pipe the body from stdin
    cat announcement.txt | omni-post --user alice --network bluesky

    # Per-network text override
    omni-post --user alice --network bluesky --network instagram \\
        --text-override instagram=\"Shorter caption\" \"Long form text\"

    # Attach ordered media (position follows flag order)
    omni-post --user alice --network instagram \\
        --media image=https://cdn.example.com/a.jpg \\
        --media video=https://cdn.example.com/b.mp4 \"Caption\"

    # Schedule for later
    omni-post --user alice --schedule 2h \"See you at the stream\"
    omni-post --user alice --schedule 2026-09-01T15:00:00Z --timezone Europe/Berlin \"Launch\"

    # Save a draft without publishing
    omni-post --user alice --draft \"Work in progress\"

CONFIGURATION:
    Configuration file: ~/.config/omnipost/config.toml
    Credentials file:   ~/.config/omnipost/credentials.toml
    Database location:  ~/.local/share/omnipost/omnipost.db

    Override with environment variables:
        OMNIPOST_CONFIG    - Path to config file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Credential error
    3 - Invalid input
")]
struct Cli {
    /// Content body (reads from stdin if not provided)
    body: Option<String>,

    /// User whose linked accounts are used
    #[arg(short, long, env = "OMNIPOST_USER")]
    user: String,

    /// Target network (repeatable; defaults from config)
    #[arg(short, long = "network")]
    networks: Vec<String>,

    /// Per-network text override, NETWORK=TEXT (repeatable)
    #[arg(long = "text-override", value_name = "NETWORK=TEXT")]
    text_overrides: Vec<String>,

    /// Attach media, KIND=URL where KIND is image or video (repeatable, ordered)
    #[arg(short, long = "media", value_name = "KIND=URL")]
    media: Vec<String>,

    /// Optional title
    #[arg(long)]
    title: Option<String>,

    /// Tag to attach (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Schedule instead of publishing now ("now", "2h", RFC 3339)
    #[arg(short, long, value_name = "WHEN")]
    schedule: Option<String>,

    /// Display timezone recorded with the schedule
    #[arg(long, default_value = "UTC")]
    timezone: String,

    /// Save as draft without publishing or scheduling
    #[arg(short, long)]
    draft: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
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
    let body = read_body(cli.body.as_deref())?;
    if body.trim().is_empty() {
        return Err(OmnipostError::InvalidInput(
            "Content body cannot be empty".to_string(),
        ));
    }

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    let networks = resolve_networks(&cli.networks, &config)?;
    let overrides = parse_overrides(&cli.text_overrides)?;
    let media = parse_media(&cli.media)?;

    for (network, _) in &overrides {
        if !networks.contains(network) {
            return Err(OmnipostError::InvalidInput(format!(
                "--text-override targets {} which is not a selected network",
                network
            )));
        }
    }

    // Create the content item and its variants
    let mut content = ContentItem::new(cli.user.clone(), body);
    content.title = cli.title.clone();
    content.tags = cli.tags.clone();
    db.create_content(&content).await?;

    for (position, (kind, url)) in media.into_iter().enumerate() {
        db.create_media_ref(&MediaRef::new(content.id.clone(), position as i64, kind, url))
            .await?;
    }

    let mut variant_ids = Vec::new();
    for network in &networks {
        let mut variant = Variant::new(content.id.clone(), *network);
        variant.text_override = overrides
            .iter()
            .find(|(n, _)| n == network)
            .map(|(_, t)| t.clone());
        db.create_variant(&variant).await?;
        variant_ids.push(variant.id);
    }

    println!("Content: {}", content.id);

    if cli.draft {
        println!("Saved as draft ({} variant(s))", variant_ids.len());
        return Ok(());
    }

    if let Some(when) = &cli.schedule {
        let publish_at = parse_publish_at(when, chrono::Utc::now())?;
        db.create_schedule(&Schedule::new(
            content.id.clone(),
            publish_at.timestamp(),
            cli.timezone.clone(),
        ))
        .await?;
        db.set_content_status(&content.id, ContentStatus::Scheduled)
            .await?;
        println!(
            "Scheduled for {} ({})",
            publish_at.to_rfc3339(),
            cli.timezone
        );
        return Ok(());
    }

    // Immediate publish through the dispatcher
    let credentials = Arc::new(FileCredentialProvider::load(&config.credentials.path)?);
    let dispatcher = Dispatcher::new(db.clone(), credentials, AdapterSet::from_config(&config)?);

    let results = dispatcher.publish_content(&content.id).await?;

    let mut failures = 0;
    for result in &results {
        match &result.outcome {
            Ok(report) => {
                let permalink = report.permalink.as_deref().unwrap_or("-");
                println!("{}: published {} {}", result.network, report.external_id, permalink);
            }
            Err(err) => {
                failures += 1;
                println!("{}: FAILED ({})", result.network, err);
            }
        }
    }

    if failures > 0 {
        return Err(OmnipostError::InvalidInput(format!(
            "{} of {} variant(s) failed to publish",
            failures,
            results.len()
        )));
    }

    Ok(())
}

/// Body from the positional argument or stdin.
fn read_body(arg: Option<&str>) -> Result<String> {
    match arg {
        Some(body) => Ok(body.to_string()),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| OmnipostError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
            Ok(buffer.trim_end().to_string())
        }
    }
}

/// Selected networks from flags, falling back to configured defaults.
fn resolve_networks(flags: &[String], config: &Config) -> Result<Vec<Network>> {
    let names = if flags.is_empty() {
        &config.defaults.networks
    } else {
        flags
    };

    if names.is_empty() {
        return Err(OmnipostError::InvalidInput(
            "No target networks selected and no defaults configured".to_string(),
        ));
    }

    let mut networks = Vec::new();
    for name in names {
        let network: Network = name
            .parse()
            .map_err(OmnipostError::InvalidInput)?;
        if !networks.contains(&network) {
            networks.push(network);
        }
    }
    Ok(networks)
}

/// Parse repeated NETWORK=TEXT override flags.
fn parse_overrides(flags: &[String]) -> Result<Vec<(Network, String)>> {
    let mut overrides = Vec::new();
    for flag in flags {
        let (name, text) = flag.split_once('=').ok_or_else(|| {
            OmnipostError::InvalidInput(format!(
                "Invalid --text-override '{}'. Expected NETWORK=TEXT",
                flag
            ))
        })?;
        let network: Network = name.parse().map_err(OmnipostError::InvalidInput)?;
        overrides.push((network, text.to_string()));
    }
    Ok(overrides)
}

/// Parse repeated KIND=URL media flags; flag order becomes media position.
fn parse_media(flags: &[String]) -> Result<Vec<(MediaKind, String)>> {
    let mut media = Vec::new();
    for flag in flags {
        let (kind, url) = flag.split_once('=').ok_or_else(|| {
            OmnipostError::InvalidInput(format!(
                "Invalid --media '{}'. Expected KIND=URL (image or video)",
                flag
            ))
        })?;
        let kind = MediaKind::parse(kind).ok_or_else(|| {
            OmnipostError::InvalidInput(format!(
                "Unknown media kind '{}'. Expected image or video",
                kind
            ))
        })?;
        if url.is_empty() {
            return Err(OmnipostError::InvalidInput(
                "Media URL cannot be empty".to_string(),
            ));
        }
        media.push((kind, url.to_string()));
    }
    Ok(media)
}
