//! Error types for proxy loading and selection.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or selecting proxy endpoints.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy list file does not exist.
    #[error("proxy file not found: {path}")]
    MissingFile {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The proxy list file exists but could not be read.
    #[error("failed to read proxy file {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A line could not be parsed as an endpoint.
    #[error("malformed proxy entry on line {line} ('{content}'): {reason}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// Offending line, trimmed.
        content: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Proxy mode is on but the pool is empty.
    #[error("no proxies available")]
    NoProxiesAvailable,
}

impl ProxyError {
    pub(crate) fn malformed(line: usize, content: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            content: content.to_string(),
            reason: reason.into(),
        }
    }
}
