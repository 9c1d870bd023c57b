//! The crawl worker loop.
//!
//! Each iteration claims one item, decides what to do with it and settles it:
//!
//! 1. Claim. An empty queue ends the loop.
//! 2. If a record for the item already exists in the current period, retire it
//!    without fetching.
//! 3. Fetch (through the next proxy when proxy mode is on) and classify.
//! 4. Success: parse, attach related items, persist, retire.
//!    Not found: retire. Soft failure: reset the session, back off, release.
//! 5. Cleanup: any item not retired is released back to idle, whatever
//!    happened above (errors and panics included).
//!
//! Many processes may run this loop against the same store; the store's atomic
//! claim is the only coordination between them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use reqwest::header::HeaderMap;
use tracing::{debug, error, info, instrument, warn};

use super::backoff::BackoffPolicy;
use super::classify::{FetchClass, classify_error, classify_response};
use super::constants::{CLAIM_RETRY_DELAY, DEFAULT_URL_PREFIX, MAX_CLAIM_FAILURES};
use super::error::{ItemError, WorkerError};
use super::fetcher::{FetchRequest, PageFetcher};
use super::FetchError;
use crate::parser::PageParser;
use crate::period::Period;
use crate::proxy::ProxySelector;
use crate::queue::{QueueItem, QueueStore, resolve_target};
use crate::records::{ProcessedRecord, RecordStore};

/// Suspends the loop for a backoff wait.
#[async_trait]
pub trait Pause: Send + Sync {
    /// Waits for `duration`.
    async fn pause(&self, duration: Duration);
}

/// [`Pause`] backed by the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How one claimed item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A record already exists for the current period.
    Fresh,
    /// Fetched, parsed and persisted.
    Stored,
    /// The target is gone.
    NotFound,
    /// Transient fetch failure; the loop waited `wait` before settling.
    SoftFailure {
        /// Response status, when there was a response.
        status: Option<u16>,
        /// Backoff applied.
        wait: Duration,
    },
    /// Parsed fine but the record was not stored.
    PersistFailed {
        /// Why the insert did not happen.
        reason: String,
    },
    /// Processing raised an error or panicked.
    Failed {
        /// Error text.
        error: String,
    },
}

impl ItemOutcome {
    /// Whether the item leaves the queue. Every other outcome releases it.
    #[must_use]
    pub fn retires_item(&self) -> bool {
        matches!(self, Self::Fresh | Self::Stored | Self::NotFound)
    }
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    claimed: usize,
    stored: usize,
    skipped_fresh: usize,
    not_found: usize,
    soft_failures: usize,
    persist_failures: usize,
    errors: usize,
}

impl WorkerStats {
    /// Items claimed.
    #[must_use]
    pub fn claimed(&self) -> usize {
        self.claimed
    }

    /// Records persisted.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.stored
    }

    /// Items retired because they were already processed this period.
    #[must_use]
    pub fn skipped_fresh(&self) -> usize {
        self.skipped_fresh
    }

    /// Items retired as not found.
    #[must_use]
    pub fn not_found(&self) -> usize {
        self.not_found
    }

    /// Soft failures (each one applied a backoff wait).
    #[must_use]
    pub fn soft_failures(&self) -> usize {
        self.soft_failures
    }

    /// Records that were parsed but not stored.
    #[must_use]
    pub fn persist_failures(&self) -> usize {
        self.persist_failures
    }

    /// Items whose processing errored or panicked.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors
    }

    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Fresh => self.skipped_fresh += 1,
            ItemOutcome::Stored => self.stored += 1,
            ItemOutcome::NotFound => self.not_found += 1,
            ItemOutcome::SoftFailure { .. } => self.soft_failures += 1,
            ItemOutcome::PersistFailed { .. } => self.persist_failures += 1,
            ItemOutcome::Failed { .. } => self.errors += 1,
        }
    }
}

/// Loop settings that are not collaborators.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Prefix for relative identifiers.
    pub url_prefix: String,
    /// Headers sent with every page request.
    pub headers: HeaderMap,
    /// Wait between claims while the store is unreachable.
    pub claim_retry_delay: Duration,
    /// Consecutive unreachable-store claims tolerated.
    pub max_claim_failures: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            headers: HeaderMap::new(),
            claim_retry_delay: CLAIM_RETRY_DELAY,
            max_claim_failures: MAX_CLAIM_FAILURES,
        }
    }
}

/// One worker process's loop over the shared queue.
pub struct CrawlWorker {
    queue: Arc<dyn QueueStore>,
    records: Arc<dyn RecordStore>,
    parser: Arc<dyn PageParser>,
    fetcher: Box<dyn PageFetcher>,
    proxies: Option<Arc<ProxySelector>>,
    backoff: BackoffPolicy,
    pause: Arc<dyn Pause>,
    settings: WorkerSettings,
    period: Option<Period>,
    streak: u32,
}

impl std::fmt::Debug for CrawlWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlWorker")
            .field("proxy_mode", &self.proxies.is_some())
            .field("backoff", &self.backoff)
            .field("settings", &self.settings)
            .field("streak", &self.streak)
            .finish_non_exhaustive()
    }
}

impl CrawlWorker {
    /// Creates a worker in direct (no proxy) mode with default settings.
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueStore>,
        records: Arc<dyn RecordStore>,
        parser: Arc<dyn PageParser>,
        fetcher: Box<dyn PageFetcher>,
    ) -> Self {
        Self {
            queue,
            records,
            parser,
            fetcher,
            proxies: None,
            backoff: BackoffPolicy::default(),
            pause: Arc::new(TokioPause),
            settings: WorkerSettings::default(),
            period: None,
            streak: 0,
        }
    }

    /// Routes every request through `proxies`.
    #[must_use]
    pub fn with_proxies(mut self, proxies: Arc<ProxySelector>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    /// Replaces the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces how backoff waits are served.
    #[must_use]
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    /// Replaces the loop settings.
    #[must_use]
    pub fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Pins the freshness period instead of using today's date.
    #[must_use]
    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    /// Consecutive soft failures since the last success.
    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Runs until the queue has nothing claimable.
    ///
    /// Per-item failures never end the loop; they are logged, counted and the
    /// item is released.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::StoreUnavailable`] after too many consecutive
    /// unreachable-store claims, or [`WorkerError::Claim`] when claiming fails
    /// for any other reason.
    #[instrument(skip(self), fields(proxy_mode = self.proxies.is_some()))]
    pub async fn run(&mut self) -> Result<WorkerStats, WorkerError> {
        let mut stats = WorkerStats::default();
        let mut claim_failures: u32 = 0;

        info!("starting crawl loop");

        loop {
            let item = match self.queue.claim().await {
                Ok(Some(item)) => {
                    claim_failures = 0;
                    item
                }
                Ok(None) => break,
                Err(e) if e.is_store_unavailable() => {
                    claim_failures += 1;
                    if claim_failures >= self.settings.max_claim_failures {
                        return Err(WorkerError::StoreUnavailable {
                            attempts: claim_failures,
                            source: e,
                        });
                    }
                    warn!(
                        error = %e,
                        attempt = claim_failures,
                        retry_in_ms = self.settings.claim_retry_delay.as_millis(),
                        "queue store unavailable; retrying claim"
                    );
                    self.pause.pause(self.settings.claim_retry_delay).await;
                    continue;
                }
                Err(e) => return Err(WorkerError::Claim(e)),
            };

            stats.claimed += 1;
            debug!(item_id = item.id, url = %item.url, "claimed item");

            let outcome = match AssertUnwindSafe(self.process(&item)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => ItemOutcome::Failed {
                    error: panic_message(panic.as_ref()),
                },
            };

            self.settle(&item, &outcome).await;
            stats.record(&outcome);
        }

        info!(
            claimed = stats.claimed,
            stored = stats.stored,
            skipped_fresh = stats.skipped_fresh,
            not_found = stats.not_found,
            soft_failures = stats.soft_failures,
            persist_failures = stats.persist_failures,
            errors = stats.errors,
            "crawl loop complete"
        );
        Ok(stats)
    }

    async fn process(&mut self, item: &QueueItem) -> ItemOutcome {
        match self.try_process(item).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(url = %item.url, error = %e, "item processing failed");
                ItemOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_process(&mut self, item: &QueueItem) -> Result<ItemOutcome, ItemError> {
        let target = item.target_url(&self.settings.url_prefix);
        let period = self.period.unwrap_or_else(Period::today);

        if self.queue.is_freshly_processed(&target, period).await? {
            info!(url = %target, %period, "already processed this period");
            return Ok(ItemOutcome::Fresh);
        }

        let proxy = match &self.proxies {
            Some(selector) => Some(selector.next()?.clone()),
            None => None,
        };

        let response = self
            .fetcher
            .fetch(FetchRequest {
                url: &target,
                headers: &self.settings.headers,
                proxy: proxy.as_ref(),
            })
            .await;

        let class = match &response {
            Ok(page) => classify_response(page.status, &page.body),
            Err(e) => classify_error(e),
        };

        let page = match (class, response) {
            (FetchClass::Success, Ok(page)) => page,
            (FetchClass::NotFound, response) => {
                let status = response.as_ref().ok().map(|p| p.status);
                info!(url = %target, status = ?status, "target not found; retiring");
                return Ok(ItemOutcome::NotFound);
            }
            (_, response) => {
                let status = response.as_ref().ok().map(|p| p.status);
                let wait = self.soft_failure(&target, status, response.err()).await;
                return Ok(ItemOutcome::SoftFailure { status, wait });
            }
        };

        self.streak = 0;

        let parsed = self.parser.parse_record(&page.body, &target)?;
        let mut record = ProcessedRecord::from_parsed(target.clone(), period, parsed);
        match self.parser.parse_related(&page.body) {
            Ok(related) => record.set_related(
                related
                    .iter()
                    .map(|id| resolve_target(id, &self.settings.url_prefix)),
            ),
            Err(e) => debug!(url = %target, error = %e, "no related items extracted"),
        }

        match self.records.insert(&record).await {
            Ok(true) => {
                info!(
                    url = %target,
                    related = record.related_urls.len(),
                    "record stored"
                );
                Ok(ItemOutcome::Stored)
            }
            Ok(false) => {
                warn!(url = %target, %period, "record already exists; not stored");
                Ok(ItemOutcome::PersistFailed {
                    reason: "record already exists for this period".to_string(),
                })
            }
            Err(e) => {
                warn!(url = %target, error = %e, "failed to store record");
                Ok(ItemOutcome::PersistFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn soft_failure(
        &mut self,
        target: &str,
        status: Option<u16>,
        error: Option<FetchError>,
    ) -> Duration {
        if let Err(e) = self.fetcher.reset() {
            warn!(error = %e, "failed to reset fetcher session; keeping the old one");
        }

        self.streak = self.streak.saturating_add(1);
        let wait = self.backoff.next_wait(self.streak, self.proxies.is_some());

        let error = error.map(|e| e.to_string()).unwrap_or_default();
        warn!(
            url = %target,
            status = ?status,
            error = %error,
            streak = self.streak,
            wait_ms = wait.as_millis(),
            "soft failure; backing off"
        );
        self.pause.pause(wait).await;
        wait
    }

    // Exactly one of remove or release runs for each claimed item.
    async fn settle(&self, item: &QueueItem, outcome: &ItemOutcome) {
        if outcome.retires_item() {
            match self.queue.remove(&item.url).await {
                Ok(()) => return,
                Err(e) => {
                    error!(url = %item.url, error = %e, "failed to remove item; releasing instead");
                }
            }
        }

        if let Err(e) = self.queue.release(&item.url, false).await {
            error!(url = %item.url, error = %e, "failed to release item");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(panic = %detail, "item processing panicked");
    format!("panicked: {detail}")
}
