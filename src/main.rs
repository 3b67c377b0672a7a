mod config;
mod coordinator;
mod error;
mod models;
mod normalize;
mod retry;
mod scrapers;
mod sink;

use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Args, RunConfig};
use coordinator::{Coordinator, MERGED_FILE};
use scrapers::ChromeScraper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let output_dir = std::env::current_dir().context("Failed to resolve the working directory")?;
    let config = RunConfig::from_args(&args, output_dir);

    info!("🚗 Subscription Scout");
    info!(
        "Sites: {}",
        config
            .sites
            .iter()
            .map(|s| s.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let scraper = Arc::new(ChromeScraper::new(config::chrome_path()));
    let mut coordinator = Coordinator::configure(config, scraper);
    let summary = coordinator.run().await?;

    for unit in &summary.units {
        match &unit.error {
            None => info!("✅ {}: {} rows", unit.source, unit.rows),
            Some(error) => {
                warn!("❌ {}: {} rows before failing: {}", unit.source, unit.rows, error)
            }
        }
    }
    if let Some(rows) = summary.merged_rows {
        info!("💾 {} rows saved to {}", rows, MERGED_FILE);
    }

    if summary.all_failed() {
        bail!("Every selected site failed");
    }
    Ok(())
}
