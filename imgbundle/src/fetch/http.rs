//! HTTP retrieval of source bytes.
//!
//! The [`Fetcher`] trait is the network seam: the pipeline only ever talks
//! to it, so tests inject fakes with controlled latency and failures.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use super::error::{FetchError, FetchResult};

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("imgbundle/", env!("CARGO_PKG_VERSION"));

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = FetchResult<Bytes>> + Send + 'a>>;

/// Retrieves the complete body of a source URL.
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return its bytes.
    ///
    /// Non-success statuses are errors.
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// [`Fetcher`] backed by an async reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestFetcher {
    /// Create a fetcher with no request timeout.
    pub fn new() -> FetchResult<Self> {
        Self::with_options(None, DEFAULT_USER_AGENT)
    }

    /// Create a fetcher with an optional per-request timeout and user agent.
    pub fn with_options(timeout: Option<Duration>, user_agent: &str) -> FetchResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| FetchError::Client {
            reason: e.to_string(),
        })?;

        Ok(Self { client, timeout })
    }

    /// The configured per-request timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.map(|t| t.as_secs()).unwrap_or(0),
            }
        } else if err.is_builder() {
            FetchError::InvalidUrl {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    async fn get(&self, url: &str) -> FetchResult<Bytes> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(url, e)
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        debug!(url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(self.get(url))
    }
}
