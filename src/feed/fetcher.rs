use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::feed::parser::{parse_feed, FeedItem, ParseResult};
use crate::util::{AddressPolicy, UrlValidationError};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching a single feed.
///
/// These never leave [`FeedFetcher::fetch`]; they are logged and turned into
/// an empty item list.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// SEC-001: Locator refused by the address policy
    #[error("Refused feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
}

/// Fetches and parses feeds, absorbing every failure into an empty result.
///
/// Cloning is cheap: the HTTP client and the concurrency permits are shared.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    timeout: Duration,
    policy: AddressPolicy,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent.clamp(1, Semaphore::MAX_PERMITS))),
            timeout,
            policy: AddressPolicy::default(),
        }
    }

    /// Sets which hosts feeds may be fetched from. Public hosts only by
    /// default.
    pub fn with_address_policy(mut self, policy: AddressPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetches the feed at `locator`.
    ///
    /// Returns an empty list on a non-success status, transport error,
    /// timeout, oversized body or unparseable document. A single bad feed must
    /// never abort the tree walk.
    pub async fn fetch(&self, locator: &str) -> Vec<FeedItem> {
        // The semaphore is never closed
        let Ok(_permit) = self.permits.acquire().await else {
            return Vec::new();
        };

        tracing::debug!(feed = %locator, "Fetching feed");
        match self.fetch_inner(locator).await {
            Ok(items) => {
                tracing::info!(feed = %locator, items = items.len(), "Done parsing feed");
                items
            }
            Err(FetchError::HttpStatus(status)) => {
                tracing::debug!(feed = %locator, status = status, "Feed returned non-success status");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(feed = %locator, error = %e, "Feed fetch failed");
                Vec::new()
            }
        }
    }

    async fn fetch_inner(&self, locator: &str) -> Result<Vec<FeedItem>, FetchError> {
        let url = self.policy.validate(locator)?;
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = tokio::time::timeout(self.timeout, read_limited_bytes(response, MAX_FEED_SIZE))
            .await
            .map_err(|_| FetchError::Timeout)??;

        let ParseResult { items, skipped } =
            parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        if skipped > 0 {
            tracing::warn!(
                feed = %locator,
                filtered = skipped,
                "Entries without a link skipped"
            );
        }

        Ok(items)
    }
}

pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Builds the shared HTTP client used for feeds and OPML.
///
/// Idle connections per host are not capped so hundreds of feeds can be
/// fetched in parallel from the same few hosts.
pub fn build_client(user_agent: &str) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .pool_max_idle_per_host(usize::MAX)
        .connect_timeout(Duration::from_secs(10))
        .build()
}
