//! Run configuration: CLI flags layered over an optional TOML file.
//!
//! Precedence is CLI > config file > built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crawl_worker_core::DatabaseOptions;
use crawl_worker_core::crawl::HttpFetcherConfig;
use crawl_worker_core::crawl::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_ACCEPT_LANGUAGE, DEFAULT_URL_PREFIX, READ_TIMEOUT_SECS,
};
use serde::Deserialize;
use url::Url;

use crate::cli::Args;

const DEFAULT_DB_PATH: &str = "crawl.db";
const DEFAULT_CATEGORY: &str = "/store/apps/category/GAME_ARCADE";

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) db_path: Option<PathBuf>,
    pub(crate) categories: Option<Vec<String>>,
    pub(crate) url_prefix: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) accept_language: Option<String>,
    pub(crate) connect_timeout_secs: Option<u64>,
    pub(crate) read_timeout_secs: Option<u64>,
    pub(crate) db_max_connections: Option<u32>,
    pub(crate) db_busy_timeout_ms: Option<u32>,
    pub(crate) release_stale_after_secs: Option<u64>,
    pub(crate) verbosity: Option<VerbositySetting>,
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl FileConfig {
    /// Reads and validates a config file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::parse(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates config values against runtime constraints.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(categories) = &self.categories
            && categories.iter().any(|c| c.trim().is_empty())
        {
            bail!("Invalid config value for `categories`: entries must be non-empty");
        }
        if let Some(prefix) = &self.url_prefix {
            validate_url_prefix("config value for `url_prefix`", prefix)?;
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        if let Some(value) = self.db_max_connections
            && !(1..=20).contains(&value)
        {
            bail!("Invalid config value for `db_max_connections`: {value}. Expected range: 1..=20");
        }
        if let Some(value) = self.db_busy_timeout_ms
            && value > 120_000
        {
            bail!(
                "Invalid config value for `db_busy_timeout_ms`: {value}. Expected range: 0..=120000"
            );
        }
        if self.release_stale_after_secs == Some(0) {
            bail!("Invalid config value for `release_stale_after_secs`: 0. Expected at least 1");
        }
        Ok(())
    }
}

/// Relative queue identifiers are joined onto the prefix, so it must be an
/// absolute http(s) URL.
fn validate_url_prefix(source: &str, prefix: &str) -> Result<()> {
    match Url::parse(prefix) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => bail!("Invalid {source}: '{prefix}'. Expected an http(s) URL"),
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub(crate) struct RunConfig {
    pub(crate) db_path: PathBuf,
    pub(crate) db_options: DatabaseOptions,
    pub(crate) proxy_file: Option<PathBuf>,
    pub(crate) categories: Vec<String>,
    pub(crate) url_prefix: String,
    pub(crate) accept_language: String,
    pub(crate) fetcher: HttpFetcherConfig,
    pub(crate) release_stale_after: Option<Duration>,
    pub(crate) skip_populate: bool,
    pub(crate) log_level: &'static str,
}

impl RunConfig {
    /// Layers `args` over the config file they name, if any.
    pub(crate) fn resolve(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        if let Some(prefix) = &args.url_prefix {
            validate_url_prefix("--url-prefix", prefix)?;
        }
        Ok(Self::merge(args, file))
    }

    fn merge(args: &Args, file: FileConfig) -> Self {
        let categories = if args.categories.is_empty() {
            file.categories
                .unwrap_or_else(|| vec![DEFAULT_CATEGORY.to_string()])
        } else {
            args.categories.clone()
        };

        let mut fetcher = HttpFetcherConfig::default();
        if let Some(user_agent) = file.user_agent {
            fetcher.user_agent = user_agent;
        }
        fetcher.connect_timeout =
            Duration::from_secs(file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS));
        fetcher.read_timeout =
            Duration::from_secs(file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS));

        let mut db_options = DatabaseOptions::default();
        if let Some(max_connections) = file.db_max_connections {
            db_options.max_connections = max_connections;
        }
        if let Some(busy_timeout_ms) = file.db_busy_timeout_ms {
            db_options.busy_timeout_ms = busy_timeout_ms;
        }

        Self {
            db_path: args
                .db
                .clone()
                .or(file.db_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            db_options,
            proxy_file: args.proxy_file.clone(),
            categories,
            url_prefix: args
                .url_prefix
                .clone()
                .or(file.url_prefix)
                .unwrap_or_else(|| DEFAULT_URL_PREFIX.to_string()),
            accept_language: file
                .accept_language
                .unwrap_or_else(|| DEFAULT_ACCEPT_LANGUAGE.to_string()),
            fetcher,
            release_stale_after: args
                .release_stale_after
                .or(file.release_stale_after_secs)
                .map(Duration::from_secs),
            skip_populate: args.skip_populate,
            log_level: resolve_log_level(args, file.verbosity),
        }
    }
}

/// Priority: quiet flag > verbose flag > config verbosity > info.
///
/// `RUST_LOG`, when set, overrides all of these at subscriber setup.
fn resolve_log_level(args: &Args, verbosity: Option<VerbositySetting>) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => {}
        1 => return "debug",
        _ => return "trace",
    }
    match verbosity {
        Some(VerbositySetting::Quiet) => "error",
        Some(VerbositySetting::Verbose | VerbositySetting::Debug) => "debug",
        Some(VerbositySetting::Default) | None => "info",
    }
}
