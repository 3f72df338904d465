//! Page fetching and catalog URL construction
//!
//! [`PageFetcher`] is the only network read used for HTML documents. It makes
//! a single attempt per call; retry policy lives with the callers (see
//! [`crate::retry`]).

use crate::config::{CatalogConfig, HttpConfig};
use crate::error::{Error, Result};
use crate::types::SessionId;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Retrieves the HTML text of a page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the document at `url`
    ///
    /// # Errors
    /// Returns [`Error::Network`] on connection failure, timeout or a
    /// non-success HTTP status.
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// [`PageFetcher`] backed by a shared reqwest client
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    /// Upper bound for one whole page request
    request_timeout: Duration,
}

impl HttpPageFetcher {
    /// Create a fetcher with the configured timeout and user agent
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = build_client(config)?;
        Ok(Self::with_client(client, config.request_timeout))
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::network(url.as_str(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(url.as_str(), status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::network(url.as_str(), &e))?;

        debug!(url = %url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

/// Build the HTTP client shared by page fetches and downloads
///
/// The request timeout here only bounds connecting; downloads enforce their own
/// stall timeout per chunk, so the overall request is not capped.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.request_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| Error::Config {
            message: format!("failed to create HTTP client: {}", e),
            key: Some("http".to_string()),
        })
}

/// URL of the year index page: `<base>/videos/<event><year>/`
///
/// # Errors
/// Returns [`Error::InvalidUrl`] if the resulting URL is not absolute.
pub fn index_url(catalog: &CatalogConfig, year: u16) -> Result<Url> {
    catalog_url(catalog, &format!("videos/{}/", catalog.event(year)))
}

/// URL of a session detail page: `<base>/videos/play/<event><year>/<id>/`
///
/// # Errors
/// Returns [`Error::InvalidUrl`] if the resulting URL is not absolute or the
/// identifier would escape its path segment.
pub fn session_url(catalog: &CatalogConfig, year: u16, session: &SessionId) -> Result<Url> {
    let id = session.as_str();
    if id.is_empty() || id.contains(['/', '?', '#', '\\']) || id == "." || id == ".." {
        return Err(Error::InvalidUrl {
            url: id.to_string(),
            reason: "session identifier is not a single path segment".to_string(),
        });
    }
    catalog_url(
        catalog,
        &format!("videos/play/{}/{}/", catalog.event(year), id),
    )
}

fn catalog_url(catalog: &CatalogConfig, path: &str) -> Result<Url> {
    let base = catalog.base_url.trim_end_matches('/');
    let text = format!("{}/{}", base, path);

    let url = Url::parse(&text).map_err(|e| Error::InvalidUrl {
        url: text.clone(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(Error::InvalidUrl {
            url: text,
            reason: "expected an absolute http(s) URL".to_string(),
        });
    }

    Ok(url)
}
