//! CLI entry point for the crawl worker.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

mod app;
mod cli;

use app::config::RunConfig;
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let config = RunConfig::resolve(&args)?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!(db = %config.db_path.display(), "crawl worker starting");

    let stats = app::runtime::run(config).await?;

    info!(
        claimed = stats.claimed(),
        stored = stats.stored(),
        not_found = stats.not_found(),
        soft_failures = stats.soft_failures(),
        "crawl worker finished"
    );

    Ok(())
}
