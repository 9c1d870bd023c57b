//! Record persistence and the source corpus.
//!
//! - [`RecordStore`] / [`Records`] - where extracted [`ProcessedRecord`]s land
//! - [`SourceCorpus`] / [`Corpus`] - categorized candidates the populator
//!   seeds the queue from

mod record;

pub use record::ProcessedRecord;

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::instrument;

use crate::db::Database;
use crate::period::Period;
use crate::queue::{QueueError, Result};

/// Persistence contract for extracted records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Stores the record. Returns `false` when a record for the same target
    /// and period already exists.
    async fn insert(&self, record: &ProcessedRecord) -> Result<bool>;
}

/// Enumerates candidate identifiers per category.
#[async_trait]
pub trait SourceCorpus: Send + Sync {
    /// All identifiers filed under `category`.
    async fn candidates(&self, category: &str) -> Result<Vec<String>>;
}

/// SQLite record store.
#[derive(Debug, Clone)]
pub struct Records {
    db: Database,
}

impl Records {
    /// Creates a record store over the given database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stores a record unless one already exists for its target and period.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if encoding or the insert fails.
    #[instrument(skip(self, record), fields(url = %record.url, period = %record.reference_date))]
    pub async fn insert(&self, record: &ProcessedRecord) -> Result<bool> {
        let attributes = serde_json::to_string(&record.attributes)
            .map_err(|e| QueueError::serialization("attributes", &e))?;
        let related_urls = serde_json::to_string(&record.related_urls)
            .map_err(|e| QueueError::serialization("related_urls", &e))?;

        let result = sqlx::query(
            r"INSERT INTO records (url, reference_date, title, category, attributes, related_urls)
              VALUES (?, ?, ?, ?, ?, ?)
              ON CONFLICT(url, reference_date) DO NOTHING",
        )
        .bind(&record.url)
        .bind(record.reference_date.to_db_string())
        .bind(record.title.as_deref())
        .bind(record.category.as_deref())
        .bind(attributes)
        .bind(related_urls)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Loads the record for `url` in `period`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the query or decoding fails.
    #[instrument(skip(self), fields(url = %url, period = %period))]
    pub async fn get(&self, url: &str, period: Period) -> Result<Option<ProcessedRecord>> {
        let row = sqlx::query(
            r"SELECT url, title, category, attributes, related_urls
              FROM records
              WHERE url = ? AND reference_date = ?",
        )
        .bind(url)
        .bind(period.to_db_string())
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| decode_record(&row, period)).transpose()
    }

    /// Counts all stored records.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM records")
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }
}

fn decode_record(row: &SqliteRow, period: Period) -> Result<ProcessedRecord> {
    let attributes: String = row.try_get("attributes")?;
    let related_urls: String = row.try_get("related_urls")?;

    Ok(ProcessedRecord {
        url: row.try_get("url")?,
        reference_date: period,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        attributes: serde_json::from_str::<BTreeMap<String, String>>(&attributes)
            .map_err(|e| QueueError::serialization("attributes", &e))?,
        related_urls: serde_json::from_str(&related_urls)
            .map_err(|e| QueueError::serialization("related_urls", &e))?,
    })
}

#[async_trait]
impl RecordStore for Records {
    async fn insert(&self, record: &ProcessedRecord) -> Result<bool> {
        Records::insert(self, record).await
    }
}

/// SQLite source corpus.
#[derive(Debug, Clone)]
pub struct Corpus {
    db: Database,
}

impl Corpus {
    /// Creates a corpus view over the given database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Files `url` under `category`. Returns `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the insert fails.
    #[instrument(skip(self), fields(url = %url, category = %category))]
    pub async fn add(&self, url: &str, category: &str) -> Result<bool> {
        let result = sqlx::query(
            r"INSERT INTO corpus (url, category)
              VALUES (?, ?)
              ON CONFLICT(url) DO NOTHING",
        )
        .bind(url)
        .bind(category)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists identifiers in `category`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the query fails.
    #[instrument(skip(self), fields(category = %category))]
    pub async fn candidates(&self, category: &str) -> Result<Vec<String>> {
        let urls = sqlx::query_scalar::<_, String>(
            r"SELECT url FROM corpus WHERE category = ? ORDER BY url",
        )
        .bind(category)
        .fetch_all(self.db.pool())
        .await?;

        Ok(urls)
    }
}

#[async_trait]
impl SourceCorpus for Corpus {
    async fn candidates(&self, category: &str) -> Result<Vec<String>> {
        Corpus::candidates(self, category).await
    }
}
