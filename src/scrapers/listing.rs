//! Monthly archive listing pagination.
//!
//! The archive publishes one paginated listing per month:
//!
//! ```text
//! {base}/2020/03/          page 1
//! {base}/2020/03/page/2/   page 2
//! ```
//!
//! Pages are fetched strictly in order because a page's existence is only
//! known from the "next page" link on the previous one. A 404 after the first
//! page is the archive's way of saying there are no more pages.

use crate::error::{AttemptError, FetchFailure};
use crate::models::{ArticleReference, ListingSummary, PartialListing, TimeUnit};
use crate::parser::{element_text, non_empty_text};
use crate::retry::TransientRetryPolicy;
use crate::scrapers::PageSource;
use futures::stream::{self, Stream, StreamExt};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static LINKS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        ".entry-title a[href]",
        "a[rel~=\"bookmark\"][href]",
        "h2 a[href]",
        "h3 a[href]",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});
static AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".author").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static CATEGORIES: Lazy<Selector> = Lazy::new(|| Selector::parse(".cat-links a").unwrap());
static EXCERPT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".entry-summary, .entry-content").unwrap());
static NEXT_PAGE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.next.page-numbers, .nav-previous a[href], link[rel=\"next\"]").unwrap()
});

/// One parsed listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub page: u32,
    pub references: Vec<ArticleReference>,
    pub has_next: bool,
}

/// Everything discovered for one month.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Unique references in discovery order.
    pub references: Vec<ArticleReference>,
    pub pages_fetched: u32,
    pub partial: Option<PartialListing>,
}

/// Paginates a month's archive listing through the retry policy.
#[derive(Debug)]
pub struct ListingFetcher<'a, S> {
    source: &'a S,
    policy: TransientRetryPolicy,
    base_url: Url,
    max_pages: u32,
}

impl<'a, S: PageSource> ListingFetcher<'a, S> {
    pub fn new(source: &'a S, policy: TransientRetryPolicy, base_url: Url, max_pages: u32) -> Self {
        Self {
            source,
            policy,
            base_url,
            max_pages,
        }
    }

    /// URL of the given 1-based listing page for `unit`.
    pub fn page_url(&self, unit: TimeUnit, page: u32) -> Result<Url, AttemptError> {
        let path = if page <= 1 {
            format!("{:04}/{:02}/", unit.year(), unit.month())
        } else {
            format!("{:04}/{:02}/page/{page}/", unit.year(), unit.month())
        };
        self.base_url
            .join(&path)
            .map_err(|e| AttemptError::InvalidUrl(format!("{}{path}: {e}", self.base_url)))
    }

    /// Lazily fetch listing pages in order.
    ///
    /// The stream ends after the last page, or after yielding a single
    /// [`PartialListing`] describing the first page that could not be
    /// retrieved (including hitting the page limit while more pages were
    /// announced).
    pub fn pages<'s>(
        &'s self,
        unit: TimeUnit,
        cancel: &'s CancellationToken,
    ) -> impl Stream<Item = Result<ListingPage, PartialListing>> + 's {
        stream::unfold(Some(1u32), move |next| async move {
            let page = next?;
            if page > self.max_pages {
                warn!(%unit, max_pages = self.max_pages, "listing page limit reached");
                let stop = PartialListing {
                    page,
                    reason: format!("page limit of {} reached", self.max_pages),
                };
                return Some((Err(stop), None));
            }

            let url = match self.page_url(unit, page) {
                Ok(url) => url,
                Err(e) => {
                    let stop = PartialListing {
                        page,
                        reason: e.to_string(),
                    };
                    return Some((Err(stop), None));
                }
            };

            debug!(%unit, page, %url, "fetching listing page");
            match self.policy.run(cancel, || self.source.fetch_text(&url)).await {
                Ok(html) => {
                    let parsed = parse_listing_page(&html, &url, page);
                    let next = parsed.has_next.then_some(page + 1);
                    Some((Ok(parsed), next))
                }
                Err(FetchFailure::Fatal(e)) if e.is_not_found() => {
                    debug!(%unit, page, "listing page not found; no further pages");
                    None
                }
                Err(failure) => {
                    error!(%unit, page, error = %failure, "listing page unavailable");
                    let stop = PartialListing {
                        page,
                        reason: failure.to_string(),
                    };
                    Some((Err(stop), None))
                }
            }
        })
    }

    /// Drain [`pages`](Self::pages) into a de-duplicated [`Listing`].
    ///
    /// A URL seen on an earlier page wins over later repeats.
    #[instrument(level = "info", skip_all, fields(%unit))]
    pub async fn collect(&self, unit: TimeUnit, cancel: &CancellationToken) -> Listing {
        let mut listing = Listing::default();
        let mut seen = HashSet::new();
        let mut duplicates = 0usize;

        let pages = self.pages(unit, cancel);
        futures::pin_mut!(pages);
        while let Some(item) = pages.next().await {
            match item {
                Ok(page) => {
                    listing.pages_fetched += 1;
                    for reference in page.references {
                        if seen.insert(reference.url.to_string()) {
                            listing.references.push(reference);
                        } else {
                            duplicates += 1;
                        }
                    }
                }
                Err(stop) => listing.partial = Some(stop),
            }
        }

        info!(
            pages = listing.pages_fetched,
            count = listing.references.len(),
            duplicates,
            partial = listing.partial.is_some(),
            "Indexed archive listing"
        );
        listing
    }
}

/// Extract article references and the next-page signal from listing HTML.
pub fn parse_listing_page(html: &str, page_url: &Url, page: u32) -> ListingPage {
    let document = Html::parse_document(html);
    let mut references = Vec::new();

    for article in document.select(&ARTICLE) {
        let Some(url) = article_link(article, page_url) else {
            debug!(page, "listing entry without a usable link");
            continue;
        };
        references.push(ArticleReference {
            url,
            listing_summary: Some(listing_summary(article)),
        });
    }

    let has_next = document.select(&NEXT_PAGE).next().is_some();
    ListingPage {
        page,
        references,
        has_next,
    }
}

fn article_link(article: ElementRef<'_>, page_url: &Url) -> Option<Url> {
    LINKS.iter().find_map(|selector| {
        article
            .select(selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| page_url.join(href.trim()).ok())
            .find(|url| matches!(url.scheme(), "http" | "https"))
    })
}

fn listing_summary(article: ElementRef<'_>) -> ListingSummary {
    let title = LINKS
        .iter()
        .find_map(|s| article.select(s).next())
        .and_then(non_empty_text);
    let date_text = article.select(&DATE).next().and_then(|time| {
        time.value()
            .attr("datetime")
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .or_else(|| non_empty_text(time))
    });
    ListingSummary {
        title,
        author: article.select(&AUTHOR).next().and_then(non_empty_text),
        date_text,
        categories: article
            .select(&CATEGORIES)
            .map(element_text)
            .filter(|c| !c.is_empty())
            .collect(),
        excerpt: article.select(&EXCERPT).next().and_then(non_empty_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::{FakeSource, Reply};
    use std::time::Duration;

    const BASE: &str = "https://archive.test/";

    fn fetcher(source: &FakeSource, max_pages: u32) -> ListingFetcher<'_, FakeSource> {
        let policy = TransientRetryPolicy::new(
            3,
            Duration::from_millis(1),
            Duration::from_millis(2),
            2.0,
            0.0,
        );
        ListingFetcher::new(source, policy, Url::parse(BASE).unwrap(), max_pages)
    }

    fn listing_html(slugs: &[&str], has_next: bool) -> String {
        let mut html = String::from("<html><body><main>");
        for slug in slugs {
            html.push_str(&format!(
                r#"<article>
                    <h2 class="entry-title"><a href="/2020/03/{slug}/" rel="bookmark">Title {slug}</a></h2>
                    <span class="author vcard">Autor {slug}</span>
                    <time class="entry-date" datetime="2020-03-12T10:00:00-06:00">12 marzo, 2020</time>
                    <span class="cat-links"><a href="/c/salud">Salud</a>, <a href="/c/ciencia">Ciencia</a></span>
                    <div class="entry-summary"><p>Resumen {slug}</p></div>
                </article>"#
            ));
        }
        if has_next {
            html.push_str(r#"<div class="nav-previous"><a href="page/2/">Entradas anteriores</a></div>"#);
        }
        html.push_str("</main></body></html>");
        html
    }

    fn unit(year: i32, month: u32) -> TimeUnit {
        TimeUnit::new(year, month).unwrap()
    }

    #[test]
    fn test_page_urls() {
        let source = FakeSource::new();
        let f = fetcher(&source, 10);
        assert_eq!(
            f.page_url(unit(2020, 3), 1).unwrap().as_str(),
            "https://archive.test/2020/03/"
        );
        assert_eq!(
            f.page_url(unit(2020, 3), 4).unwrap().as_str(),
            "https://archive.test/2020/03/page/4/"
        );
    }

    #[test]
    fn test_parse_listing_page_extracts_references_and_summary() {
        let url = Url::parse("https://archive.test/2020/03/").unwrap();
        let page = parse_listing_page(&listing_html(&["a", "b"], true), &url, 1);

        assert!(page.has_next);
        assert_eq!(page.references.len(), 2);
        assert_eq!(
            page.references[0].url.as_str(),
            "https://archive.test/2020/03/a/"
        );
        let summary = page.references[1].listing_summary.as_ref().unwrap();
        assert_eq!(summary.title.as_deref(), Some("Title b"));
        assert_eq!(summary.author.as_deref(), Some("Autor b"));
        assert_eq!(summary.date_text.as_deref(), Some("2020-03-12T10:00:00-06:00"));
        assert_eq!(summary.categories, vec!["Salud", "Ciencia"]);
        assert_eq!(summary.excerpt.as_deref(), Some("Resumen b"));
    }

    #[test]
    fn test_parse_listing_page_without_next_link() {
        let url = Url::parse("https://archive.test/2020/03/").unwrap();
        let page = parse_listing_page(&listing_html(&["a"], false), &url, 1);
        assert!(!page.has_next);
    }

    #[test]
    fn test_entries_without_links_are_skipped() {
        let url = Url::parse("https://archive.test/2020/03/").unwrap();
        let html = r#"<article><h2>No link here</h2></article>
                      <article><h2 class="entry-title"><a href="mailto:x@y.z">mail</a></h2></article>"#;
        let page = parse_listing_page(html, &url, 1);
        assert!(page.references.is_empty());
    }

    #[tokio::test]
    async fn test_collect_follows_pagination() {
        let source = FakeSource::new()
            .page("https://archive.test/2020/03/", listing_html(&["a", "b"], true))
            .page("https://archive.test/2020/03/page/2/", listing_html(&["c"], false));
        let listing = fetcher(&source, 10)
            .collect(unit(2020, 3), &CancellationToken::new())
            .await;

        let urls: Vec<_> = listing.references.iter().map(|r| r.url.path()).collect();
        assert_eq!(urls, vec!["/2020/03/a/", "/2020/03/b/", "/2020/03/c/"]);
        assert_eq!(listing.pages_fetched, 2);
        assert!(listing.partial.is_none());
    }

    #[tokio::test]
    async fn test_collect_dedups_urls_across_pages() {
        let source = FakeSource::new()
            .page("https://archive.test/2020/03/", listing_html(&["a", "b"], true))
            .page("https://archive.test/2020/03/page/2/", listing_html(&["b", "c"], false));
        let listing = fetcher(&source, 10)
            .collect(unit(2020, 3), &CancellationToken::new())
            .await;
        let urls: Vec<_> = listing.references.iter().map(|r| r.url.path()).collect();
        assert_eq!(urls, vec!["/2020/03/a/", "/2020/03/b/", "/2020/03/c/"]);
    }

    #[tokio::test]
    async fn test_missing_later_page_ends_cleanly() {
        let source = FakeSource::new()
            .page("https://archive.test/2020/03/", listing_html(&["a"], true));
        let listing = fetcher(&source, 10)
            .collect(unit(2020, 3), &CancellationToken::new())
            .await;
        assert_eq!(listing.references.len(), 1);
        assert!(listing.partial.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_page_is_partial_listing() {
        let source = FakeSource::new()
            .page("https://archive.test/2022/01/", listing_html(&["a", "b"], true))
            .fail("https://archive.test/2022/01/page/2/", AttemptError::Status(503));
        let listing = fetcher(&source, 10)
            .collect(unit(2022, 1), &CancellationToken::new())
            .await;

        assert_eq!(listing.references.len(), 2);
        let partial = listing.partial.unwrap();
        assert_eq!(partial.page, 2);
        assert!(partial.reason.contains("exhausted"));
        assert_eq!(source.calls("https://archive.test/2022/01/page/2/"), 3);
    }

    #[tokio::test]
    async fn test_page_limit_is_partial_listing() {
        let source = FakeSource::new()
            .page("https://archive.test/2020/03/", listing_html(&["a"], true))
            .page("https://archive.test/2020/03/page/2/", listing_html(&["b"], true));
        let listing = fetcher(&source, 2)
            .collect(unit(2020, 3), &CancellationToken::new())
            .await;
        assert_eq!(listing.references.len(), 2);
        assert_eq!(listing.partial.unwrap().page, 3);
        assert_eq!(source.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_page_error_is_retried() {
        let source = FakeSource::new().script(
            "https://archive.test/2020/03/",
            vec![
                Reply::Fail(AttemptError::Timeout),
                Reply::Page(listing_html(&["a"], false)),
            ],
        );
        let listing = fetcher(&source, 10)
            .collect(unit(2020, 3), &CancellationToken::new())
            .await;
        assert_eq!(listing.references.len(), 1);
        assert!(listing.partial.is_none());
    }
}
