//! Repository seam for queue operations.
//!
//! The worker loop and the populator depend on this trait rather than on
//! [`Queue`] directly, so tests can substitute failing or recording stores.

use async_trait::async_trait;

use super::{Queue, QueueItem, Result};
use crate::period::Period;

/// Contract of the shared work set.
///
/// Implementations must make [`claim`](QueueStore::claim) a single atomic
/// find-and-flag operation of the underlying store.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Atomically claims one idle item, or `None` when nothing is claimable.
    async fn claim(&self) -> Result<Option<QueueItem>>;

    /// Sets the busy flag; tolerates the item no longer existing.
    async fn release(&self, url: &str, busy: bool) -> Result<()>;

    /// Deletes the item; idempotent.
    async fn remove(&self, url: &str) -> Result<()>;

    /// Adds an idle item; returns `false` when the identifier was already queued.
    async fn insert(&self, url: &str) -> Result<bool>;

    /// Whether the identifier is present in the queue.
    async fn contains(&self, url: &str) -> Result<bool>;

    /// Whether a record for `url` exists with reference date `period`.
    async fn is_freshly_processed(&self, url: &str, period: Period) -> Result<bool>;
}

#[async_trait]
impl QueueStore for Queue {
    async fn claim(&self) -> Result<Option<QueueItem>> {
        Queue::claim(self).await
    }

    async fn release(&self, url: &str, busy: bool) -> Result<()> {
        Queue::release(self, url, busy).await
    }

    async fn remove(&self, url: &str) -> Result<()> {
        Queue::remove(self, url).await
    }

    async fn insert(&self, url: &str) -> Result<bool> {
        Queue::insert(self, url).await
    }

    async fn contains(&self, url: &str) -> Result<bool> {
        Queue::contains(self, url).await
    }

    async fn is_freshly_processed(&self, url: &str, period: Period) -> Result<bool> {
        Queue::is_freshly_processed(self, url, period).await
    }
}
