//! # Caching Strategy Engine
//!
//! Serves HTTP requests from the network, the local response cache, or both,
//! depending on how [`CacheRules`] classify them.
//!
//! | Class | Strategy |
//! |-------|----------|
//! | Data | network-first, cached copy on failure |
//! | Asset | cache-first |
//! | Document | stale-while-revalidate, offline page as last resort |
//! | Passthrough | network only |
//!
//! Only 2xx responses are stored, and only once the whole body has been read.

pub mod rules;

pub use rules::{CacheRules, Request, RequestKind, ResourceClass};

use crate::client::local_db::{CachedResponse, LocalDatabase, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures_util::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("network error: {0}")]
    Network(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Network(err.to_string())
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflinePlaceholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<CachedResponse> for Response {
    fn from(cached: CachedResponse) -> Self {
        Self {
            status: cached.status,
            content_type: cached.content_type,
            body: cached.body,
            source: ResponseSource::Cache,
        }
    }
}

/// Network side of the cache
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fails only when no response was received
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError>;
}

/// [`Fetcher`] over reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        let response = self
            .client
            .request(request.method.clone(), &request.url)
            .send()
            .await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok(Response {
            status,
            content_type,
            body,
            source: ResponseSource::Network,
        })
    }
}

/// Routes requests through the configured caching strategies
#[derive(Clone)]
pub struct CacheEngine {
    rules: CacheRules,
    fetcher: Arc<dyn Fetcher>,
    db: LocalDatabase,
}

impl CacheEngine {
    pub fn new(rules: CacheRules, fetcher: Arc<dyn Fetcher>, db: LocalDatabase) -> Self {
        Self { rules, fetcher, db }
    }

    pub fn rules(&self) -> &CacheRules {
        &self.rules
    }

    pub async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        let class = self.rules.classify(request);
        tracing::trace!(url = %request.url, ?class, "cache fetch");
        match class {
            ResourceClass::Passthrough => self.fetcher.fetch(request).await,
            ResourceClass::Data => self.network_first(request).await,
            ResourceClass::Asset => self.cache_first(request).await,
            ResourceClass::Document => self.stale_while_revalidate(request).await,
        }
    }

    async fn network_first(&self, request: &Request) -> Result<Response, CacheError> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                store(&self.db, &request.url, &response).await;
                Ok(response)
            }
            Err(e) => {
                if let Some(cached) = self.db.cached_response(&request.url).await? {
                    tracing::debug!(url = %request.url, error = %e, "network failed, serving cached copy");
                    return Ok(cached.into());
                }
                if request.kind == RequestKind::Document {
                    return Ok(self.offline_placeholder());
                }
                Err(e)
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Result<Response, CacheError> {
        if let Some(cached) = self.db.cached_response(&request.url).await? {
            return Ok(cached.into());
        }
        let response = self.fetcher.fetch(request).await?;
        store(&self.db, &request.url, &response).await;
        Ok(response)
    }

    async fn stale_while_revalidate(&self, request: &Request) -> Result<Response, CacheError> {
        if let Some(cached) = self.db.cached_response(&request.url).await? {
            let fetcher = Arc::clone(&self.fetcher);
            let db = self.db.clone();
            let request = request.clone();
            tokio::spawn(async move {
                match fetcher.fetch(&request).await {
                    Ok(fresh) => store(&db, &request.url, &fresh).await,
                    Err(e) => tracing::debug!(url = %request.url, error = %e, "background refresh failed"),
                }
            });
            return Ok(cached.into());
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                store(&self.db, &request.url, &response).await;
                Ok(response)
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "offline with nothing cached");
                Ok(self.offline_placeholder())
            }
        }
    }

    fn offline_placeholder(&self) -> Response {
        Response {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: Bytes::from(self.rules.offline_page().to_string()),
            source: ResponseSource::OfflinePlaceholder,
        }
    }

    /// Fetch and store a set of assets. Nothing is stored unless every URL
    /// returns a 2xx response.
    pub async fn precache(&self, urls: &[String]) -> Result<usize, CacheError> {
        let fetched = try_join_all(urls.iter().map(|url| async move {
            let response = self.fetcher.fetch(&Request::get(url.as_str())).await?;
            if !response.is_success() {
                return Err(CacheError::Network(format!("{url} returned {}", response.status)));
            }
            Ok((url, response))
        }))
        .await?;
        for (url, response) in &fetched {
            self.db.cache_response(&to_cached(url, response)).await?;
        }
        tracing::info!(count = fetched.len(), "assets precached");
        Ok(fetched.len())
    }

    /// Drop every cached response
    pub async fn purge(&self) -> Result<u64, CacheError> {
        let purged = self.db.purge_http_cache().await?;
        tracing::info!(purged, "response cache purged");
        Ok(purged)
    }
}

fn to_cached(url: &str, response: &Response) -> CachedResponse {
    CachedResponse {
        url: url.to_string(),
        status: response.status,
        content_type: response.content_type.clone(),
        body: response.body.clone(),
        stored_at: Utc::now(),
    }
}

/// Cache a successful response. A failed write only costs the cached copy.
async fn store(db: &LocalDatabase, url: &str, response: &Response) {
    if !response.is_success() {
        return;
    }
    if let Err(e) = db.cache_response(&to_cached(url, response)).await {
        tracing::warn!(url, error = %e, "could not cache response");
    }
}
