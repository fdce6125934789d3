//! RemoteSource trait: pluggable access to the replication feed
//!
//! - `HttpSource`: reqwest client against the public feed
//! - `MemorySource`: canned resources for tests and offline replays

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::ReplicationConfig;

/// Errors raised while reading a single remote resource.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {status} for {path}")]
    Status {
        path: String,
        status: reqwest::StatusCode,
    },
    #[error("Resource not found: {0}")]
    NotFound(String),
}

/// Read access to resources addressed relative to the feed base.
///
/// Implementations must be thread-safe (Send + Sync): download workers share
/// one source.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch the raw bytes of `path` (relative to the feed base).
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, SourceError>;

    /// Human-readable location for logging
    fn describe(&self) -> String;
}

// ============================================================================
// HTTP
// ============================================================================

/// HTTP client for the public replication feed.
#[derive(Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    /// Build a client for the configured base URL and timeout.
    pub fn new(config: &ReplicationConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("raid-detector/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: format!("{}/", config.base_url.trim_end_matches('/')),
        })
    }

    /// Full URL of a feed-relative path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let url = self.url_for(path);
        tracing::debug!(url = %url, "GET");

        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            reqwest::StatusCode::OK => Ok(resp.bytes().await?.to_vec()),
            reqwest::StatusCode::NOT_FOUND => Err(SourceError::NotFound(url)),
            status => Err(SourceError::Status { path: url, status }),
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

// ============================================================================
// In-Memory
// ============================================================================

/// Fixed set of resources served from memory.
///
/// Counts fetches so callers can assert which resources were requested.
#[derive(Default)]
pub struct MemorySource {
    resources: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource at `path`.
    pub fn with_resource(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(path.into(), bytes.into());
        self
    }

    /// Number of `fetch` calls served so far, including misses.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.resources
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))
    }

    fn describe(&self) -> String {
        format!("memory ({} resources)", self.resources.len())
    }
}
