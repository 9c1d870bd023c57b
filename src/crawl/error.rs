//! Error types for the crawl module.

use thiserror::Error;

use crate::parser::ParseError;
use crate::proxy::ProxyError;
use crate::queue::QueueError;

/// Errors raised while issuing a single page request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The response body could not be read as text.
    #[error("failed to read body of {url}: {source}")]
    Body {
        /// The URL whose body failed.
        url: String,
        /// The underlying decode/transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The target is not a valid URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client (or a proxied variant of it) could not be built.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Creates a network or timeout error from a reqwest send failure.
    pub fn from_send(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else if source.is_builder() {
            Self::InvalidUrl { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// Failures inside one item's processing; caught at the item boundary.
#[derive(Debug, Error)]
pub enum ItemError {
    /// Queue or record store failure.
    #[error(transparent)]
    Store(#[from] QueueError),

    /// The page fetched fine but held no usable record.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Proxy mode is on but no endpoint could be selected.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Errors that end the worker loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Claiming kept failing on connectivity.
    #[error("queue store unavailable after {attempts} consecutive claim attempts: {source}")]
    StoreUnavailable {
        /// Consecutive failed claims.
        attempts: u32,
        /// The last failure.
        #[source]
        source: QueueError,
    },

    /// Claiming failed for a reason retrying will not fix.
    #[error("claim failed: {0}")]
    Claim(#[source] QueueError),
}
