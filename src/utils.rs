//! Utility functions for text normalization, log formatting and file system
//! checks.

use crate::error::HarvestError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::future::Future;
use std::io;
use std::path::Path;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse every whitespace run (including non-breaking spaces and line
/// breaks) to a single space and trim both ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a character
/// boundary) with an ellipsis and the number of dropped bytes appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a scratch file.
///
/// # Errors
///
/// Returns [`HarvestError::Storage`] if the directory cannot be created or
/// written to. This is fatal for a run.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), HarvestError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| HarvestError::storage(path, e))?;
    let scratch_path = path.join("..__write_check__");
    stdfs::File::create(&scratch_path).map_err(|e| HarvestError::storage(&scratch_path, e))?;
    let _ = stdfs::remove_file(&scratch_path);
    info!("Output directory is writable");
    Ok(())
}

/// Turn interrupt signals into cancellation.
///
/// The first signal cancels `cancel` so the run can flush and stop. Returns
/// `true` when a second signal arrives, meaning the caller should exit
/// without waiting; `false` if the signal stream fails.
pub async fn relay_interrupts<S, Fut>(mut signal: S, cancel: CancellationToken) -> bool
where
    S: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal().await {
        warn!(error = %e, "Cannot listen for interrupts");
        return false;
    }
    warn!("Interrupt received; finishing the current month (interrupt again to quit now)");
    cancel.cancel();

    if signal().await.is_err() {
        return false;
    }
    error!("Second interrupt received; exiting without flushing");
    true
}
