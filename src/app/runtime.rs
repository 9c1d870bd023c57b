//! Startup sequence for one worker process.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use crawl_worker_core::crawl::{
    CrawlWorker, HttpFetcher, WorkerSettings, WorkerStats, request_headers,
};
use crawl_worker_core::{
    Corpus, Database, HtmlPageParser, Period, Populator, ProxyError, ProxySelector, Queue, Records,
};
use tracing::{debug, info, warn};

use super::config::RunConfig;

/// Loads proxies, opens the store, seeds the queue and runs the loop to completion.
///
/// Any error returned here happened at startup or ended the loop; per-item
/// failures are handled inside the worker.
pub(crate) async fn run(config: RunConfig) -> Result<WorkerStats> {
    let proxies = match &config.proxy_file {
        Some(path) => {
            let mut selector = ProxySelector::new();
            selector.load_file(path)?;
            if selector.is_empty() {
                bail!(ProxyError::NoProxiesAvailable);
            }
            info!(proxies = selector.len(), "proxy mode enabled");
            Some(Arc::new(selector))
        }
        None => {
            debug!("proxy mode disabled");
            None
        }
    };

    let headers = request_headers(&config.accept_language)
        .with_context(|| format!("Invalid accept_language '{}'", config.accept_language))?;
    let fetcher = HttpFetcher::with_config(config.fetcher.clone())?;
    let parser = HtmlPageParser::with_defaults()?;

    let db = Database::with_options(&config.db_path, &config.db_options)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.db_path.display()))?;
    if !db.is_wal_enabled().await? {
        warn!(
            path = %config.db_path.display(),
            "database is not in WAL mode; concurrent workers will contend on writes"
        );
    }
    let queue = Arc::new(Queue::new(db.clone()));

    if let Some(older_than) = config.release_stale_after {
        let released = queue.release_stale(older_than).await?;
        info!(released, older_than_secs = older_than.as_secs(), "released stale claims");
    }

    let period = Period::today();

    if config.skip_populate {
        debug!("skipping queue population");
    } else {
        let populator = Populator::new(queue.clone(), Arc::new(Corpus::new(db.clone())))
            .with_url_prefix(config.url_prefix.clone());
        populator.populate(&config.categories, period).await?;
    }

    let mut worker = CrawlWorker::new(
        queue,
        Arc::new(Records::new(db.clone())),
        Arc::new(parser),
        Box::new(fetcher),
    )
    .with_settings(WorkerSettings {
        url_prefix: config.url_prefix,
        headers,
        ..WorkerSettings::default()
    });
    if let Some(proxies) = proxies {
        worker = worker.with_proxies(proxies);
    }

    let stats = worker.run().await;
    db.close().await;
    Ok(stats?)
}
