//! Seeds the queue from the source corpus.
//!
//! For each configured category every candidate is checked in order: a
//! candidate already processed this period is skipped, one already queued is
//! skipped, anything else is inserted idle. Run before the worker loop starts.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::crawl::constants::DEFAULT_URL_PREFIX;
use crate::period::Period;
use crate::queue::{QueueStore, Result, resolve_target};
use crate::records::SourceCorpus;

/// Fills the queue with this period's outstanding candidates.
pub struct Populator {
    queue: Arc<dyn QueueStore>,
    corpus: Arc<dyn SourceCorpus>,
    url_prefix: String,
}

impl std::fmt::Debug for Populator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Populator")
            .field("url_prefix", &self.url_prefix)
            .finish_non_exhaustive()
    }
}

impl Populator {
    /// Creates a populator resolving relative candidates against the default prefix.
    #[must_use]
    pub fn new(queue: Arc<dyn QueueStore>, corpus: Arc<dyn SourceCorpus>) -> Self {
        Self {
            queue,
            corpus,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
        }
    }

    /// Sets the prefix used to resolve candidates for the freshness check.
    #[must_use]
    pub fn with_url_prefix(mut self, url_prefix: impl Into<String>) -> Self {
        self.url_prefix = url_prefix.into();
        self
    }

    /// Inserts every outstanding candidate of `categories` and returns how
    /// many were added.
    ///
    /// A candidate another process inserted between the membership check and
    /// the insert is not counted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::queue::QueueError`] if the corpus or the queue store fails.
    #[instrument(skip(self, categories), fields(categories = categories.len(), %period))]
    pub async fn populate(&self, categories: &[String], period: Period) -> Result<usize> {
        let mut added = 0;

        for category in categories {
            let candidates = self.corpus.candidates(category).await?;
            let mut category_added = 0;

            for candidate in &candidates {
                let target = resolve_target(candidate, &self.url_prefix);
                if self.queue.is_freshly_processed(&target, period).await? {
                    debug!(url = %candidate, "already processed this period");
                    continue;
                }
                if self.queue.contains(candidate).await? {
                    debug!(url = %candidate, "already queued");
                    continue;
                }
                if self.queue.insert(candidate).await? {
                    category_added += 1;
                }
            }

            info!(
                %category,
                candidates = candidates.len(),
                added = category_added,
                "category populated"
            );
            added += category_added;
        }

        info!(added, "queue populated");
        Ok(added)
    }
}
