//! Wait policy between soft failures.
//!
//! Without proxies every request leaves from the same address, so each
//! consecutive failure doubles the pause (`2^streak` seconds) until the
//! streak reaches [`DEFAULT_CAP_STREAK`], after which the pause is pinned at
//! [`DEFAULT_MAX_WAIT`]. With proxies the pause is a flat
//! [`DEFAULT_PROXY_WAIT`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use crawl_worker_core::crawl::BackoffPolicy;
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.next_wait(3, false), Duration::from_secs(8));
//! assert_eq!(policy.next_wait(3, true), Duration::from_secs(2));
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

/// Flat wait used in proxy mode.
pub const DEFAULT_PROXY_WAIT: Duration = Duration::from_secs(2);

/// Ceiling wait once the streak reaches the cap.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(20 * 60);

/// Streak at which the ceiling applies.
pub const DEFAULT_CAP_STREAK: u32 = 8;

/// Maps a failure streak to the pause before the next attempt.
///
/// # Delay Calculation
///
/// ```text
/// proxy mode:        proxy_wait
/// streak >= cap:     max_wait
/// otherwise:         min(2^streak seconds, max_wait)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    proxy_wait: Duration,
    max_wait: Duration,
    cap_streak: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            proxy_wait: DEFAULT_PROXY_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
            cap_streak: DEFAULT_CAP_STREAK,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy with custom bounds.
    #[must_use]
    pub fn new(proxy_wait: Duration, max_wait: Duration, cap_streak: u32) -> Self {
        Self {
            proxy_wait,
            max_wait,
            cap_streak,
        }
    }

    /// Pause to apply after the failure that brought the streak to `streak`.
    #[must_use]
    #[instrument(level = "debug", skip(self))]
    pub fn next_wait(&self, streak: u32, proxy_enabled: bool) -> Duration {
        let wait = if proxy_enabled {
            self.proxy_wait
        } else if streak >= self.cap_streak {
            self.max_wait
        } else {
            // None once 2^streak no longer fits in u64
            2u64.checked_pow(streak)
                .map_or(self.max_wait, Duration::from_secs)
                .min(self.max_wait)
        };

        debug!(wait_ms = wait.as_millis(), "computed backoff");
        wait
    }
}
