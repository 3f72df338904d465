//! Session selection resolution
//!
//! Turns a [`Selection`] into the ordered list of sessions a run processes.
//! Explicit selections never touch the network; `All` is discovered from the
//! year index page and any failure there is fatal for the run.

use crate::config::Config;
use crate::error::Result;
use crate::extract::LinkExtractor;
use crate::fetcher::{PageFetcher, index_url};
use crate::retry::fetch_with_retry;
use crate::types::{Selection, SessionId, dedup_preserving_order};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces the canonical session list for a run
pub struct SessionResolver {
    fetcher: Arc<dyn PageFetcher>,
    extractor: LinkExtractor,
}

impl SessionResolver {
    /// Create a resolver using `fetcher` for index pages
    pub fn new(fetcher: Arc<dyn PageFetcher>, extractor: LinkExtractor) -> Self {
        Self { fetcher, extractor }
    }

    /// Resolve the configured selection
    ///
    /// - `Explicit(ids)`: duplicates removed, first occurrence order kept
    /// - `All`: ids linked from the year index page, unique and sorted
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidUrl`] or [`crate::Error::Network`] when
    /// the index page cannot be fetched; no partial set is returned.
    pub async fn resolve(&self, config: &Config) -> Result<Vec<SessionId>> {
        match &config.selection {
            Selection::Explicit(ids) => {
                let resolved = dedup_preserving_order(ids);
                debug!(
                    requested = ids.len(),
                    resolved = resolved.len(),
                    "Using explicit session selection"
                );
                Ok(resolved)
            }
            Selection::All => {
                let url = index_url(&config.catalog, config.year)?;
                info!(url = %url, year = config.year, "Discovering sessions from index page");

                let html = fetch_with_retry(&config.retry, || self.fetcher.fetch(&url)).await?;
                let ids = self.extractor.session_ids(&html);

                info!(count = ids.len(), "Discovered sessions");
                Ok(ids)
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::Error;
    use crate::types::Resolution;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use url::Url;

    /// Fetcher that serves one canned body (or error) and records requests
    struct StubFetcher {
        body: Option<String>,
        requests: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn serving(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: Some(body.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                body: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> Result<String> {
            self.requests.lock().unwrap().push(url.to_string());
            match &self.body {
                Some(body) => Ok(body.clone()),
                None => Err(Error::Network {
                    url: url.to_string(),
                    status: Some(404),
                    timeout: false,
                    connect: false,
                    message: "HTTP 404".into(),
                }),
            }
        }
    }

    fn resolver(fetcher: Arc<StubFetcher>) -> SessionResolver {
        SessionResolver::new(
            fetcher,
            LinkExtractor::new("wwdc2016", Resolution::Sd).unwrap(),
        )
    }

    fn config(selection: Selection) -> Config {
        Config {
            selection,
            retry: RetryConfig::none(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_explicit_selection_dedups_without_network() {
        let fetcher = StubFetcher::failing();
        let ids = resolver(fetcher.clone())
            .resolve(&config(Selection::explicit(["412", "100", "100"])))
            .await
            .unwrap();

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, vec![SessionId::from("100"), SessionId::from("412")]);
        assert_eq!(ids.len(), 2);
        assert_eq!(fetcher.request_count(), 0, "explicit selection must not fetch");
    }

    #[tokio::test]
    async fn test_all_selection_discovers_sorted_unique_ids() {
        let fetcher = StubFetcher::serving(
            r#"<a href="/videos/play/wwdc2016/205/">A</a>
               <a href="/videos/play/wwdc2016/101/">B</a>
               <a href="/videos/play/wwdc2016/101/">B again</a>"#,
        );
        let ids = resolver(fetcher.clone())
            .resolve(&config(Selection::All))
            .await
            .unwrap();

        assert_eq!(ids, vec![SessionId::from("101"), SessionId::from("205")]);
        assert_eq!(
            fetcher.requests.lock().unwrap().as_slice(),
            ["https://developer.apple.com/videos/wwdc2016/"]
        );
    }

    #[tokio::test]
    async fn test_all_selection_index_failure_is_fatal() {
        let fetcher = StubFetcher::failing();
        let result = resolver(fetcher).resolve(&config(Selection::All)).await;
        assert!(matches!(result, Err(Error::Network { .. })));
    }

    #[tokio::test]
    async fn test_all_selection_empty_index_yields_empty_list() {
        let fetcher = StubFetcher::serving("<html>no sessions yet</html>");
        let ids = resolver(fetcher)
            .resolve(&config(Selection::All))
            .await
            .unwrap();
        assert!(ids.is_empty());
    }
}
