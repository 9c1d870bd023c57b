//! Crawl Worker Core Library
//!
//! Building blocks for a distributed crawler: many worker processes share one
//! queue of target identifiers, each claiming an item atomically, fetching and
//! classifying it, persisting the extracted record, and retiring or releasing
//! the item.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`queue`] - The shared work set (atomic claim, release, remove, insert)
//! - [`records`] - Processed records and the categorized source corpus
//! - [`crawl`] - Page fetching, backoff and the worker loop
//! - [`proxy`] - Proxy list loading and round-robin selection
//! - [`parser`] - Extracting records and related items from pages
//! - [`populate`] - Seeding the queue from the corpus
//! - [`period`] - The calendar period freshness is judged against

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crawl;
pub mod db;
pub mod parser;
pub mod period;
pub mod populate;
pub mod proxy;
pub mod queue;
pub mod records;
mod user_agent;

// Re-export commonly used types
pub use crawl::{
    BackoffPolicy, CrawlWorker, FetchClass, FetchError, HttpFetcher, PageFetcher, WorkerError,
    WorkerStats, classify_response,
};
pub use db::{Database, DatabaseOptions, DbError};
pub use parser::{HtmlPageParser, PageParser, ParseError, ParsedPage};
pub use period::Period;
pub use populate::Populator;
pub use proxy::{ProxyEndpoint, ProxyError, ProxySelector};
pub use queue::{Queue, QueueError, QueueItem, QueueStore};
pub use records::{Corpus, ProcessedRecord, RecordStore, Records, SourceCorpus};
