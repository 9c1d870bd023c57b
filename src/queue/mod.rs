//! Queue module: the shared work set every worker process claims from.
//!
//! This module provides `SQLite`-backed queue management. Each item moves
//! through `busy = false` → (claim) → `busy = true` → removed or released.
//!
//! # Overview
//!
//! - [`Queue`] - SQLite implementation of the queue store
//! - [`QueueStore`] - the abstract contract the worker and populator use
//! - [`QueueItem`] - Individual queue entry
//! - [`QueueError`] - Operation error types, including `StoreUnavailable`
//!
//! # Example
//!
//! ```ignore
//! use crawl_worker_core::queue::Queue;
//! use crawl_worker_core::Database;
//!
//! let db = Database::new_in_memory().await?;
//! let queue = Queue::new(db);
//!
//! queue.insert("https://example.com/page").await?;
//!
//! if let Some(item) = queue.claim().await? {
//!     // ... fetch and persist ...
//!     queue.remove(&item.url).await?;
//! }
//! ```

mod error;
mod item;
mod repository;

pub use error::{QueueDbErrorKind, QueueError};
pub use item::{QueueItem, resolve_target};
pub use repository::QueueStore;

use std::time::Duration;

use sqlx::Row;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::period::Period;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Queue manager backed by the shared database.
///
/// Claim atomicity comes from a single `UPDATE ... RETURNING` statement, so
/// any number of processes may share the same database file.
#[derive(Debug, Clone)]
pub struct Queue {
    db: Database,
}

impl Queue {
    /// Creates a new queue manager with the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds an item with `busy = false`.
    ///
    /// Returns `true` if a row was created, `false` if the identifier was
    /// already queued. The `UNIQUE(url)` constraint decides, not a prior read,
    /// so concurrent populators cannot create duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the insert fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn insert(&self, url: &str) -> Result<bool> {
        let result = sqlx::query(
            r"INSERT INTO queue (url, busy)
              VALUES (?, 0)
              ON CONFLICT(url) DO NOTHING",
        )
        .bind(url)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Claims one idle item, marking it busy, and returns it.
    ///
    /// Returns `None` when every item is busy or the queue is empty. No
    /// ordering is guaranteed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StoreUnavailable`] when the database cannot be reached.
    #[instrument(skip(self))]
    pub async fn claim(&self) -> Result<Option<QueueItem>> {
        // Atomic UPDATE...RETURNING: find and flag happen in one statement
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET busy = 1, claimed_at = datetime('now')
              WHERE busy = 0 AND id = (
                  SELECT id FROM queue
                  WHERE busy = 0
                  LIMIT 1
              )
              RETURNING id, url, busy, claimed_at, created_at",
        )
        .fetch_optional(self.db.pool())
        .await?;

        if let Some(item) = &item {
            debug!(item_id = item.id, url = %item.url, "claimed item");
        }

        Ok(item)
    }

    /// Sets the busy flag explicitly.
    ///
    /// Idempotent; succeeds even if the item no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the update fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn release(&self, url: &str, busy: bool) -> Result<()> {
        sqlx::query(
            r"UPDATE queue
              SET busy = ?,
                  claimed_at = CASE WHEN ? THEN datetime('now') ELSE NULL END
              WHERE url = ?",
        )
        .bind(busy)
        .bind(busy)
        .bind(url)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Deletes an item permanently. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the delete fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn remove(&self, url: &str) -> Result<()> {
        sqlx::query(r"DELETE FROM queue WHERE url = ?")
            .bind(url)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Whether a record for `url` with reference date `period` already exists.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the query fails.
    #[instrument(skip(self), fields(url = %url, period = %period))]
    pub async fn is_freshly_processed(&self, url: &str, period: Period) -> Result<bool> {
        let row = sqlx::query(
            r"SELECT EXISTS(
                  SELECT 1 FROM records WHERE url = ? AND reference_date = ?
              ) AS fresh",
        )
        .bind(url)
        .bind(period.to_db_string())
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get::<i64, _>("fresh") != 0)
    }

    /// Whether the identifier is currently queued (busy or not).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the query fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn contains(&self, url: &str) -> Result<bool> {
        let row = sqlx::query(r"SELECT EXISTS(SELECT 1 FROM queue WHERE url = ?) AS queued")
            .bind(url)
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get::<i64, _>("queued") != 0)
    }

    /// Gets a queue item by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the query fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Option<QueueItem>> {
        let item = sqlx::query_as::<_, QueueItem>(
            r"SELECT id, url, busy, claimed_at, created_at FROM queue WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(item)
    }

    /// Counts all queued items.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM queue")
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }

    /// Counts items currently claimed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the query fails.
    pub async fn count_busy(&self) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM queue WHERE busy = 1")
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }

    /// Clears `busy` on items claimed more than `older_than` ago.
    ///
    /// A worker killed mid-item leaves its claim behind forever; running this
    /// at startup returns such items to the pool. Busy rows with no claim
    /// timestamp are treated as stale.
    ///
    /// # Returns
    ///
    /// The number of items released.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the update fails.
    #[instrument(skip(self), fields(older_than_secs = older_than.as_secs()))]
    pub async fn release_stale(&self, older_than: Duration) -> Result<u64> {
        let modifier = format!("-{} seconds", older_than.as_secs());
        let result = sqlx::query(
            r"UPDATE queue
              SET busy = 0, claimed_at = NULL
              WHERE busy = 1
                AND (claimed_at IS NULL OR claimed_at <= datetime('now', ?))",
        )
        .bind(modifier)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
