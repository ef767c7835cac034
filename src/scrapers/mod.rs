//! Archive scrapers for the UNAM Global monthly archive.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Listing**: paginate a month's archive and discover article URLs
//!    ([`listing`])
//! 2. **Fetching**: download each article page ([`article`])
//!
//! Both phases talk to the network only through the [`PageSource`] trait and
//! wrap every call in the shared [`TransientRetryPolicy`](crate::retry::TransientRetryPolicy).

pub mod article;
pub mod listing;

use crate::error::{AttemptError, HarvestError};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

/// Desktop browser identity sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const MAX_REDIRECTS: usize = 10;

/// Trait for retrieving the text of one page.
///
/// A single call is a single attempt; retrying is the caller's business.
pub trait PageSource {
    /// Fetch `url` and return its body.
    ///
    /// Non-2xx responses are reported as [`AttemptError::Status`].
    async fn fetch_text(&self, url: &Url) -> Result<String, AttemptError>;
}

/// [`PageSource`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    /// Build a client that sends `user_agent` on every request.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Configuration`] if the user agent is not a
    /// valid header value or the TLS backend cannot be initialised.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, HarvestError> {
        let client = client_builder(user_agent, timeout)?
            .build()
            .map_err(|e| HarvestError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn client_builder(user_agent: &str, timeout: Duration) -> Result<reqwest::ClientBuilder, HarvestError> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(user_agent).map_err(|e| {
        HarvestError::Configuration(format!("invalid user agent {user_agent:?}: {e}"))
    })?;
    headers.insert(USER_AGENT, agent);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-MX,es;q=0.9,en;q=0.5"));

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS)))
}

impl PageSource for HttpPageSource {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_text(&self, url: &Url) -> Result<String, AttemptError> {
        let t0 = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(%status, elapsed_ms = t0.elapsed().as_millis(), "non-success status");
            return Err(AttemptError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        debug!(bytes = body.len(), elapsed_ms = t0.elapsed().as_millis(), "fetched page");
        Ok(body)
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted in-memory [`PageSource`] for offline tests.

    use super::PageSource;
    use crate::error::AttemptError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    #[derive(Debug, Clone)]
    pub enum Reply {
        Page(String),
        /// Answer with the page after sleeping.
        Delayed(Duration, String),
        Fail(AttemptError),
        /// Trip the token, then never answer.
        CancelAndHang(CancellationToken),
    }

    /// Replies are consumed in order; the last one repeats. Unscripted URLs
    /// answer HTTP 404.
    #[derive(Debug, Default)]
    pub struct FakeSource {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
        calls: Mutex<HashMap<String, u32>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    /// Keeps the in-flight gauge right even when a request future is dropped.
    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FakeSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(self, url: &str, html: impl Into<String>) -> Self {
            self.script(url, vec![Reply::Page(html.into())])
        }

        pub fn fail(self, url: &str, error: AttemptError) -> Self {
            self.script(url, vec![Reply::Fail(error)])
        }

        pub fn script(self, url: &str, replies: Vec<Reply>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .insert(url.to_string(), replies.into());
            self
        }

        pub fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> u32 {
            self.calls.lock().unwrap().values().sum()
        }

        /// Highest number of requests that were awaiting an answer at once.
        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }
    }

    impl PageSource for FakeSource {
        async fn fetch_text(&self, url: &Url) -> Result<String, AttemptError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            *self
                .calls
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default() += 1;

            let reply = {
                let mut replies = self.replies.lock().unwrap();
                match replies.get_mut(url.as_str()) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                }
            };

            match reply {
                Some(Reply::Page(html)) => Ok(html),
                Some(Reply::Delayed(delay, html)) => {
                    tokio::time::sleep(delay).await;
                    Ok(html)
                }
                Some(Reply::Fail(e)) => Err(e),
                Some(Reply::CancelAndHang(token)) => {
                    token.cancel();
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(AttemptError::Timeout)
                }
                None => Err(AttemptError::Status(404)),
            }
        }
    }
}
