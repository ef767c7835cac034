//! Article page downloads.

use crate::error::FetchFailure;
use crate::retry::TransientRetryPolicy;
use crate::scrapers::PageSource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

/// Fetches raw article HTML through the shared retry policy.
///
/// There is no cache: the coordinator de-duplicates URLs, so every article
/// is requested at most once per run.
#[derive(Debug)]
pub struct ArticleFetcher<'a, S> {
    source: &'a S,
    policy: TransientRetryPolicy,
}

impl<'a, S: PageSource> ArticleFetcher<'a, S> {
    pub fn new(source: &'a S, policy: TransientRetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Fetch a single article page.
    ///
    /// # Errors
    ///
    /// Returns the policy's [`FetchFailure`] (fatal, exhausted or cancelled).
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<String, FetchFailure> {
        let html = self
            .policy
            .run(cancel, || self.source.fetch_text(url))
            .await?;
        debug!(bytes = html.len(), "Fetched article");
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttemptError;
    use crate::scrapers::testing::{FakeSource, Reply};
    use std::time::Duration;

    fn policy() -> TransientRetryPolicy {
        TransientRetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2), 2.0, 0.0)
    }

    #[tokio::test]
    async fn test_fetch_returns_html() {
        let url = Url::parse("https://archive.test/a/").unwrap();
        let source = FakeSource::new().page(url.as_str(), "<h1>x</h1>");
        let html = ArticleFetcher::new(&source, policy())
            .fetch(&url, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(html, "<h1>x</h1>");
        assert_eq!(source.calls(url.as_str()), 1);
    }

    #[tokio::test]
    async fn test_fetch_server_errors_exhaust() {
        let url = Url::parse("https://archive.test/b/").unwrap();
        let source = FakeSource::new().fail(url.as_str(), AttemptError::Status(500));
        let err = ArticleFetcher::new(&source, policy())
            .fetch(&url, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchFailure::Exhausted { attempts: 3, .. }));
        assert_eq!(source.calls(url.as_str()), 3);
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_fatal() {
        let url = Url::parse("https://archive.test/missing/").unwrap();
        let source = FakeSource::new();
        let err = ArticleFetcher::new(&source, policy())
            .fetch(&url, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, FetchFailure::Fatal(AttemptError::Status(404)));
        assert_eq!(source.calls(url.as_str()), 1);
    }

    #[tokio::test]
    async fn test_fetch_recovers_from_reset() {
        let url = Url::parse("https://archive.test/c/").unwrap();
        let source = FakeSource::new().script(
            url.as_str(),
            vec![
                Reply::Fail(AttemptError::Connect("reset by peer".into())),
                Reply::Page("<p>ok</p>".into()),
            ],
        );
        let html = ArticleFetcher::new(&source, policy())
            .fetch(&url, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(html, "<p>ok</p>");
        assert_eq!(source.calls(url.as_str()), 2);
    }
}
