//! # UNAM News Corpus
//!
//! Harvests the monthly archive of the UNAM Global news site into one plain
//! text corpus file per month, for downstream text analysis.
//!
//! ## Usage
//!
//! ```sh
//! unam_news_corpus --start 2020-01 --end 2020-12 -o ./data/text
//! ```
//!
//! ## Architecture
//!
//! Months are processed one after another, oldest first:
//! 1. **Listing**: paginate the month's archive and collect article URLs
//! 2. **Fetching**: download article pages, a few at a time, with retries
//! 3. **Parsing**: extract title, author, date, categories and body
//! 4. **Output**: write `{month}_{year}.txt`, then `run_report.json` at the end
//!
//! Ctrl-C stops the run gracefully: records already parsed for the current
//! month are written, later months are left untouched.

use clap::Parser;
use std::error::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod models;
mod outputs;
mod parser;
mod pipeline;
mod retry;
mod scrapers;
mod time_range;
mod utils;

use cli::Cli;
use config::RunConfig;
use models::UnitStatus;
use outputs::json;
use pipeline::RunCoordinator;
use scrapers::HttpPageSource;
use utils::{ensure_writable_dir, relay_interrupts};

/// Exit status conventionally used after SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

async fn relay_then_exit(cancel: CancellationToken) {
    if relay_interrupts(tokio::signal::ctrl_c, cancel).await {
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "unam_news_corpus starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = match RunConfig::load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration; nothing was fetched");
            return Err(e.into());
        }
    };
    let range = config.range()?;

    // Early check: the output directory must be usable before any fetch
    if let Err(e) = ensure_writable_dir(&config.output_dir).await {
        error!(
            path = %config.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let source = HttpPageSource::new(&config.user_agent, config.request_timeout())?;

    // --- Ctrl-C: stop retrying and flush the current month; twice quits ---
    let cancel = CancellationToken::new();
    tokio::spawn(relay_then_exit(cancel.clone()));

    let previous = if config.resume {
        let previous = json::load_report(&config.output_dir).await?;
        info!(found = previous.is_some(), "Resume mode");
        previous
    } else {
        None
    };

    info!(months = range.len(), start = %range.start(), end = %range.end(), "Starting harvest");
    let report = RunCoordinator::new(&config, &source)?
        .resume_from(previous)
        .run(&range, &cancel)
        .await?;

    json::write_report(&report, &config.output_dir)?;

    // ---- Summary ----
    for unit in &report.units {
        let line = format!(
            "{} {}: discovered {}, fetched {}, parsed {}, dropped {}, words {}",
            unit.unit.month_name(),
            unit.unit.year(),
            unit.articles_discovered,
            unit.articles_fetched,
            unit.articles_parsed,
            unit.failures,
            unit.words
        );
        match unit.status {
            UnitStatus::Done | UnitStatus::Skipped if !unit.needs_rerun() => info!("{line}"),
            _ => warn!(status = ?unit.status, partial = unit.partial_listing.is_some(), "{line}"),
        }
    }

    let deficient = report.deficient_units();
    if !deficient.is_empty() {
        let list = deficient.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        warn!(count = deficient.len(), months = %list, "Months to rerun");
    }

    let elapsed = start_time.elapsed();
    info!(
        months = report.units.len(),
        parsed = report.total_parsed(),
        failures = report.total_failures(),
        words = report.total_words(),
        success_rate = %format!("{:.1}%", report.success_rate()),
        cancelled = report.cancelled,
        elapsed_secs = elapsed.as_secs(),
        elapsed_ms = elapsed.as_millis(),
        "Harvest complete"
    );

    Ok(())
}
