//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Claim, fetch and record pages from a shared crawl queue.
///
/// Any number of crawl-worker processes may point at the same database; each
/// item is processed by exactly one of them at a time.
#[derive(Parser, Debug)]
#[command(name = "crawl-worker")]
#[command(author, version, about)]
pub struct Args {
    /// Proxy list file; enables proxy mode (one endpoint per line)
    #[arg(value_name = "PROXY_FILE")]
    pub proxy_file: Option<PathBuf>,

    /// Queue/record database path [default: crawl.db]
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// TOML config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Category to populate from (repeatable; replaces configured categories)
    #[arg(long = "category", value_name = "CATEGORY")]
    pub categories: Vec<String>,

    /// Prefix prepended to relative identifiers
    #[arg(long, value_name = "URL")]
    pub url_prefix: Option<String>,

    /// Do not seed the queue before running
    #[arg(long)]
    pub skip_populate: bool,

    /// At startup, release items claimed longer ago than this many seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub release_stale_after: Option<u64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
