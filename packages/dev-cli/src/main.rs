//! `hdt`: operator CLI for the ticket aggregation stack.
//!
//! Loads the platform catalog from a JSON config file and runs aggregate
//! searches, URL detection, and health checks from the terminal.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aggregation::{HealthStatus, MultiPlatformManager, PlatformKey, PlatformsConfig};

#[derive(Parser)]
#[command(name = "hdt", about = "Multi-platform ticket aggregation CLI")]
struct Cli {
    /// Path to the platforms config JSON. Falls back to
    /// HDT_PLATFORMS_CONFIG, then ./platforms.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured platforms with capabilities and identity pools
    Platforms,
    /// Detect which platform owns an event URL
    Detect { url: String },
    /// Search events across all enabled platforms
    Search {
        query: String,
        /// Optional location filter
        #[arg(long)]
        location: Option<String>,
        /// Max results per platform
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Probe every enabled platform and report health
    Health,
    /// Reset identity cooldowns for one platform
    ClearRotation { platform: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dev_cli=info,aggregation=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let manager = load_manager(cli.config.as_deref())?;

    match cli.command {
        Commands::Platforms => platforms(&manager),
        Commands::Detect { url } => detect(&manager, &url),
        Commands::Search {
            query,
            location,
            limit,
        } => search(&manager, &query, location.as_deref(), limit).await,
        Commands::Health => health(&manager).await,
        Commands::ClearRotation { platform } => {
            manager.clear_rotation_cache(&PlatformKey::from(platform.as_str()));
            println!("{} rotation cleared for {platform}", "ok".green());
            Ok(())
        }
    }
}

fn load_manager(path: Option<&std::path::Path>) -> Result<MultiPlatformManager> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var("HDT_PLATFORMS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("platforms.json")),
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading platforms config {}", path.display()))?;
    let config = PlatformsConfig::from_json(&raw).context("parsing platforms config")?;
    MultiPlatformManager::from_config(&config).context("building platform manager")
}

fn platforms(manager: &MultiPlatformManager) -> Result<()> {
    let stats = manager.aggregated_statistics();
    println!(
        "{} platforms ({} enabled, {} api / {} scrape)",
        stats.total_platforms.to_string().bright_cyan(),
        stats.enabled_platforms,
        stats.api_backed,
        stats.scrape_backed
    );
    println!();

    for (key, status) in manager.platforms_status() {
        let state = if status.enabled {
            "enabled".green()
        } else {
            "disabled".red()
        };
        let caps = status
            .capabilities
            .iter()
            .map(|c| format!("{c:?}").to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");
        print!(
            "  {:<20} {} [{:?}] {}",
            key.as_str().bold(),
            state,
            status.adapter,
            caps
        );
        if let (Some(avail), Some(total)) = (status.identities_available, status.identity_pool_size)
        {
            print!("  identities {avail}/{total}");
        }
        println!();
    }
    Ok(())
}

fn detect(manager: &MultiPlatformManager, url: &str) -> Result<()> {
    match manager.detect_platform(url) {
        Some(key) => println!("{} {}", "platform:".bold(), key.as_str().bright_cyan()),
        None => println!("{}", "no platform matches this URL".yellow()),
    }
    Ok(())
}

async fn search(
    manager: &MultiPlatformManager,
    query: &str,
    location: Option<&str>,
    limit: usize,
) -> Result<()> {
    let result = manager
        .search_events_across_platforms(query, location, limit)
        .await;

    println!(
        "{} events from {} platforms",
        result.events.len().to_string().bright_cyan(),
        result.platforms_searched
    );
    for event in &result.events {
        let price = event
            .price
            .as_ref()
            .and_then(|p| p.min.map(|m| format!("{} {:.2}", p.currency, m)))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {}  {}  {}  [{}]",
            event.start_time.format("%Y-%m-%d %H:%M"),
            event.title.bold(),
            price,
            event.platform.as_str().dimmed()
        );
    }

    for (key, err) in &result.errors {
        println!("  {} {key}: {err}", "failed".red());
    }
    for (key, count) in &result.rejected {
        println!("  {} {key}: {count} results rejected", "warn".yellow());
    }
    Ok(())
}

async fn health(manager: &MultiPlatformManager) -> Result<()> {
    let records = manager.perform_health_check().await;
    for (key, record) in records {
        let label = match record.status {
            HealthStatus::Healthy => "healthy".green(),
            HealthStatus::Degraded => "degraded".yellow(),
            HealthStatus::Down => "down".red(),
        };
        print!(
            "  {:<20} {} ({}ms)",
            key.as_str().bold(),
            label,
            record.latency_ms
        );
        if let Some(reason) = record.errors.first() {
            print!("  {}", reason.dimmed());
        }
        println!();
    }
    Ok(())
}
