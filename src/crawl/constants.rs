//! Constants for the crawl module (timeouts, request profile, claim retry).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (2 minutes).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Default `Accept-Language` sent with every page request.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.6,en;q=0.4,es;q=0.2";

/// Prefix prepended to relative identifiers.
pub const DEFAULT_URL_PREFIX: &str = "https://play.google.com";

/// Pause between claim attempts while the queue store is unreachable.
pub const CLAIM_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Consecutive unreachable-store claims before the worker gives up.
pub const MAX_CLAIM_FAILURES: u32 = 10;
