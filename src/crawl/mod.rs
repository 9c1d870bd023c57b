//! Crawl module: fetching pages and driving the worker loop.
//!
//! # Overview
//!
//! - [`CrawlWorker`] - claims items, fetches, classifies, persists, settles
//! - [`BackoffPolicy`] - pause after a soft failure
//! - [`PageFetcher`] / [`HttpFetcher`] - the request seam and its reqwest implementation
//! - [`classify_response`] / [`FetchClass`] - success, not found or soft failure
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use crawl_worker_core::crawl::{CrawlWorker, HttpFetcher};
//! use crawl_worker_core::parser::HtmlPageParser;
//! use crawl_worker_core::queue::Queue;
//! use crawl_worker_core::records::Records;
//! use crawl_worker_core::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new_in_memory().await?;
//! let mut worker = CrawlWorker::new(
//!     Arc::new(Queue::new(db.clone())),
//!     Arc::new(Records::new(db)),
//!     Arc::new(HtmlPageParser::with_defaults()?),
//!     Box::new(HttpFetcher::new()?),
//! );
//! let stats = worker.run().await?;
//! println!("stored {} records", stats.stored());
//! # Ok(())
//! # }
//! ```

mod backoff;
mod classify;
pub mod constants;
mod error;
mod fetcher;
mod worker;

pub use backoff::{BackoffPolicy, DEFAULT_CAP_STREAK, DEFAULT_MAX_WAIT, DEFAULT_PROXY_WAIT};
pub use classify::{FetchClass, classify_error, classify_response};
pub use error::{FetchError, ItemError, WorkerError};
pub use fetcher::{
    FetchRequest, FetchedPage, HttpFetcher, HttpFetcherConfig, PageFetcher, request_headers,
};
pub use worker::{CrawlWorker, ItemOutcome, Pause, TokioPause, WorkerSettings, WorkerStats};
