//! Run coordination.
//!
//! Months are processed strictly in chronological order. Each one moves
//! through `ListingInProgress -> ArticlesInProgress -> Writing -> Done`, or
//! ends `Skipped` when its listing yields nothing. Article failures are
//! counted in the [`UnitReport`] and never abort the month; only storage
//! failures leave this module as errors.
//!
//! Within a month, up to `concurrency` article fetches are in flight at once.
//! Completions are re-sequenced by discovery index before the corpus is
//! written, so the file order never depends on network timing.

use crate::config::RunConfig;
use crate::error::{FetchFailure, HarvestError, ParseFailure};
use crate::models::{ArticleRecord, ArticleReference, RunReport, TimeUnit, UnitReport, UnitStatus};
use crate::outputs::corpus::CorpusWriter;
use crate::parser::parse_article;
use crate::retry::TransientRetryPolicy;
use crate::scrapers::PageSource;
use crate::scrapers::article::ArticleFetcher;
use crate::scrapers::listing::ListingFetcher;
use crate::time_range::TimeRange;
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// What happened to one discovered article.
#[derive(Debug)]
enum ArticleOutcome {
    Parsed(ArticleRecord),
    FetchFailed(FetchFailure),
    ParseFailed(ParseFailure),
    /// Never completed because the run was cancelled.
    Cancelled,
}

/// Drives a whole run over a [`TimeRange`].
#[derive(Debug)]
pub struct RunCoordinator<'a, S> {
    source: &'a S,
    writer: CorpusWriter,
    policy: TransientRetryPolicy,
    base_url: Url,
    max_pages: u32,
    concurrency: usize,
    month_delay: Duration,
    previous: Option<RunReport>,
}

impl<'a, S: PageSource> RunCoordinator<'a, S> {
    /// Build a coordinator from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Configuration`] if the base URL is unusable.
    pub fn new(config: &RunConfig, source: &'a S) -> Result<Self, HarvestError> {
        Ok(Self {
            source,
            writer: CorpusWriter::new(&config.output_dir),
            policy: config.retry_policy(),
            base_url: config.base_url()?,
            max_pages: config.max_pages,
            concurrency: config.concurrency.max(1),
            month_delay: config.month_delay(),
            previous: None,
        })
    }

    /// Enable resume mode against the report of a previous run.
    pub fn resume_from(mut self, previous: Option<RunReport>) -> Self {
        self.previous = previous;
        self
    }

    /// Process every unit in `range`.
    ///
    /// Stops after the unit during which `cancel` fired; later units get
    /// neither a corpus file nor a report entry.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Storage`] if a corpus file cannot be written.
    #[instrument(level = "info", skip_all, fields(start = %range.start(), end = %range.end()))]
    pub async fn run(
        &self,
        range: &TimeRange,
        cancel: &CancellationToken,
    ) -> Result<RunReport, HarvestError> {
        let t0 = Instant::now();
        let mut report = RunReport::default();
        info!(
            months = range.len(),
            concurrency = self.concurrency,
            max_pages = self.max_pages,
            max_attempts = self.policy.max_attempts(),
            "Run starting"
        );

        let mut fetched_before = false;
        for unit in range {
            if cancel.is_cancelled() {
                warn!(%unit, "Run cancelled; remaining units not started");
                report.cancelled = true;
                break;
            }

            if let Some(done) = self.completed_previously(unit) {
                info!(%unit, parsed = done.articles_parsed, "Skipping unit completed by a previous run");
                report.units.push(done.clone());
                continue;
            }

            if fetched_before && !self.month_delay.is_zero() {
                debug!(%unit, delay = ?self.month_delay, "Pausing between units");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(%unit, "Run cancelled during pause; remaining units not started");
                        report.cancelled = true;
                        break;
                    }
                    _ = sleep(self.month_delay) => {}
                }
            }
            fetched_before = true;

            let unit_report = self.process_unit(unit, cancel).await?;
            let interrupted = unit_report.status == UnitStatus::Interrupted;
            report.units.push(unit_report);
            if interrupted {
                report.cancelled = true;
                break;
            }
        }

        info!(
            units = report.units.len(),
            parsed = report.total_parsed(),
            words = report.total_words(),
            failures = report.total_failures(),
            deficient = report.deficient_units().len(),
            cancelled = report.cancelled,
            elapsed_ms = t0.elapsed().as_millis(),
            "Run finished"
        );
        Ok(report)
    }

    fn completed_previously(&self, unit: TimeUnit) -> Option<&UnitReport> {
        self.previous
            .as_ref()?
            .unit(unit)
            .filter(|r| !r.needs_rerun() && self.writer.exists(unit))
    }

    /// Run one unit through listing, articles and writing.
    #[instrument(level = "info", skip_all, fields(%unit, month = unit.month_name()))]
    async fn process_unit(
        &self,
        unit: TimeUnit,
        cancel: &CancellationToken,
    ) -> Result<UnitReport, HarvestError> {
        let t0 = Instant::now();
        let mut report = UnitReport::new(unit);

        report.status = UnitStatus::ListingInProgress;
        let listing = ListingFetcher::new(self.source, self.policy, self.base_url.clone(), self.max_pages)
            .collect(unit, cancel)
            .await;
        report.listing_pages = listing.pages_fetched;
        report.articles_discovered = listing.references.len();
        report.partial_listing = listing.partial;

        if listing.references.is_empty() {
            if cancel.is_cancelled() {
                report.status = UnitStatus::Interrupted;
                warn!("Cancelled before any article was discovered; corpus file left untouched");
                return Ok(report);
            }
            report.status = UnitStatus::Skipped;
            self.writer.write(&self.writer.build(unit, Vec::new()))?;
            info!("No articles listed for unit");
            return Ok(report);
        }

        report.status = UnitStatus::ArticlesInProgress;
        let records = self.process_articles(&listing.references, cancel, &mut report).await;

        if cancel.is_cancelled() && records.is_empty() {
            report.status = UnitStatus::Interrupted;
            warn!("Cancelled before any article completed; corpus file left untouched");
            return Ok(report);
        }

        report.status = UnitStatus::Writing;
        self.writer.write(&self.writer.build(unit, records))?;

        report.status = if cancel.is_cancelled() {
            UnitStatus::Interrupted
        } else {
            UnitStatus::Done
        };
        info!(
            status = ?report.status,
            pages = report.listing_pages,
            discovered = report.articles_discovered,
            fetched = report.articles_fetched,
            parsed = report.articles_parsed,
            words = report.words,
            failures = report.failures,
            cancelled = report.articles_cancelled,
            partial = report.partial_listing.is_some(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Unit finished"
        );
        Ok(report)
    }

    /// Fetch and parse every reference, returning records in discovery order.
    async fn process_articles(
        &self,
        references: &[ArticleReference],
        cancel: &CancellationToken,
        report: &mut UnitReport,
    ) -> Vec<ArticleRecord> {
        let fetcher = ArticleFetcher::new(self.source, self.policy);
        let fetcher = &fetcher;

        let mut outcomes: Vec<(usize, ArticleOutcome)> = stream::iter(references.iter().enumerate())
            .map(move |(i, reference)| async move {
                (i, process_article(fetcher, reference, cancel).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(i, _)| *i);

        let mut records = Vec::with_capacity(outcomes.len());
        for (i, outcome) in outcomes {
            let url = references[i].url.as_str();
            match outcome {
                ArticleOutcome::Parsed(record) => {
                    report.articles_fetched += 1;
                    report.articles_parsed += 1;
                    report.words += record.body.split_whitespace().count();
                    records.push(record);
                }
                ArticleOutcome::ParseFailed(e) => {
                    report.articles_fetched += 1;
                    report.record_parse_failure();
                    warn!(index = i, url, error = %e, "Dropping unparsable article");
                }
                ArticleOutcome::FetchFailed(e) => {
                    report.record_fetch_failure();
                    warn!(index = i, url, error = %e, "Dropping unreachable article");
                }
                ArticleOutcome::Cancelled => report.articles_cancelled += 1,
            }
        }
        records
    }
}

async fn process_article<S: PageSource>(
    fetcher: &ArticleFetcher<'_, S>,
    reference: &ArticleReference,
    cancel: &CancellationToken,
) -> ArticleOutcome {
    if cancel.is_cancelled() {
        return ArticleOutcome::Cancelled;
    }
    let html = match fetcher.fetch(&reference.url, cancel).await {
        Ok(html) => html,
        Err(e) if e.is_cancelled() => return ArticleOutcome::Cancelled,
        Err(e) => return ArticleOutcome::FetchFailed(e),
    };
    match parse_article(&html, &reference.url, reference.listing_summary.as_ref()) {
        Ok(record) => {
            debug!(url = %reference.url, title = %record.title, "Parsed article");
            ArticleOutcome::Parsed(record)
        }
        Err(e) => {
            debug!(
                url = %reference.url,
                error = %e,
                html_preview = %truncate_for_log(&html, 200),
                "Article page did not parse"
            );
            ArticleOutcome::ParseFailed(e)
        }
    }
}
