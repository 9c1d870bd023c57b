//! Page fetching over HTTP.
//!
//! [`PageFetcher`] is the seam the worker loop talks to. [`HttpFetcher`] is the
//! production implementation: a reqwest client with a cookie jar that is
//! thrown away on [`PageFetcher::reset`], so a fresh session starts after
//! every soft failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument};

use super::FetchError;
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::proxy::ProxyEndpoint;
use crate::user_agent;

/// One page request.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// Absolute URL to fetch.
    pub url: &'a str,
    /// Headers sent with the request.
    pub headers: &'a HeaderMap,
    /// Proxy to route through, if any.
    pub proxy: Option<&'a ProxyEndpoint>,
}

/// A response that completed, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// Issues page requests for the worker loop.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Performs a GET and returns the status and body.
    ///
    /// Non-2xx statuses are returned as pages, not errors; classification is
    /// the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when no response was received.
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchedPage, FetchError>;

    /// Drops session state (cookies, pooled connections).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if a replacement client cannot be
    /// built; the previous session stays in use.
    fn reset(&mut self) -> Result<(), FetchError>;
}

/// Builds the request profile headers.
///
/// # Errors
///
/// Returns an error if `accept_language` is not a valid header value.
pub fn request_headers(accept_language: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(accept_language)?);
    Ok(headers)
}

/// Client construction settings.
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// `User-Agent` header value.
    pub user_agent: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Per-read timeout.
    pub read_timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: user_agent::default_user_agent(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

/// reqwest-backed [`PageFetcher`].
///
/// Proxied clients are built lazily, one per endpoint, and share the direct
/// client's cookie jar.
#[derive(Debug)]
pub struct HttpFetcher {
    config: HttpFetcherConfig,
    jar: Arc<Jar>,
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
}

impl HttpFetcher {
    /// Creates a fetcher with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(HttpFetcherConfig::default())
    }

    /// Creates a fetcher with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the client cannot be built.
    #[instrument(level = "debug", skip(config), fields(user_agent = %config.user_agent))]
    pub fn with_config(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let jar = Arc::new(Jar::default());
        let direct = build_client(&config, Arc::clone(&jar), None)?;
        Ok(Self {
            config,
            jar,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Client, FetchError> {
        let Some(endpoint) = proxy else {
            return Ok(self.direct.clone());
        };

        let key = endpoint.to_string();
        let mut cache = self
            .proxied
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(client) = cache.get(&key) {
            return Ok(client.clone());
        }

        let client = build_client(&self.config, Arc::clone(&self.jar), Some(endpoint))?;
        debug!(proxy = %endpoint, "built proxied client");
        cache.insert(key, client.clone());
        Ok(client)
    }
}

fn build_client(
    config: &HttpFetcherConfig,
    jar: Arc<Jar>,
    proxy: Option<&ProxyEndpoint>,
) -> Result<Client, FetchError> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .user_agent(config.user_agent.clone())
        .gzip(true)
        .cookie_provider(jar);

    if let Some(endpoint) = proxy {
        let mut reqwest_proxy =
            Proxy::all(endpoint.url()).map_err(|source| FetchError::ClientBuild { source })?;
        if let Some((user, pass)) = &endpoint.credentials {
            reqwest_proxy = reqwest_proxy.basic_auth(user, pass);
        }
        builder = builder.proxy(reqwest_proxy);
    }

    builder
        .build()
        .map_err(|source| FetchError::ClientBuild { source })
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self, request), fields(url = %request.url, proxy = ?request.proxy.map(ProxyEndpoint::url)))]
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchedPage, FetchError> {
        if url::Url::parse(request.url).is_err() {
            return Err(FetchError::invalid_url(request.url));
        }

        let client = self.client_for(request.proxy)?;
        let response = client
            .get(request.url)
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|source| FetchError::from_send(request.url, source))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| FetchError::Body {
            url: request.url.to_string(),
            source,
        })?;

        debug!(status, bytes = body.len(), "fetched page");
        Ok(FetchedPage { status, body })
    }

    fn reset(&mut self) -> Result<(), FetchError> {
        let jar = Arc::new(Jar::default());
        let direct = build_client(&self.config, Arc::clone(&jar), None)?;
        self.jar = jar;
        self.direct = direct;
        self.proxied
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        debug!("fetcher session reset");
        Ok(())
    }
}
