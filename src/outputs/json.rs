//! JSON run report.
//!
//! The report of the latest run is kept next to the corpus files as
//! `run_report.json`. Downstream tooling reads it to find deficient months,
//! and `--resume` reads it to decide which months can be skipped.

use super::write_atomic;
use crate::error::HarvestError;
use crate::models::RunReport;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

pub const REPORT_FILE_NAME: &str = "run_report.json";

/// Write the [`RunReport`] to `{output_dir}/run_report.json`.
///
/// # Errors
///
/// Returns an error if serialization or the atomic write fails.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<PathBuf, HarvestError> {
    let json = serde_json::to_string_pretty(report)?;
    let path = output_dir.join(REPORT_FILE_NAME);
    write_atomic(&path, json.as_bytes()).map_err(|e| HarvestError::storage(&path, e))?;
    info!(path = %path.display(), units = report.units.len(), "Wrote run report");
    Ok(path)
}

/// Load the previous run's report, if there is one.
///
/// A report that exists but cannot be parsed is ignored with a warning, so a
/// damaged report only costs a full rerun.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn load_report(output_dir: &Path) -> Result<Option<RunReport>, HarvestError> {
    let path = output_dir.join(REPORT_FILE_NAME);
    let text = match fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HarvestError::storage(&path, e)),
    };
    match serde_json::from_str(&text) {
        Ok(report) => Ok(Some(report)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable run report");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PartialListing, TimeUnit, UnitReport, UnitStatus};

    #[tokio::test]
    async fn test_report_survives_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit_report = UnitReport::new(TimeUnit::new(2022, 1).unwrap());
        unit_report.status = UnitStatus::Done;
        unit_report.articles_discovered = 2;
        unit_report.partial_listing = Some(PartialListing {
            page: 2,
            reason: "retries exhausted".into(),
        });
        let report = RunReport {
            units: vec![unit_report],
            cancelled: false,
        };

        write_report(&report, dir.path()).unwrap();
        let loaded = load_report(dir.path()).await.unwrap();
        assert_eq!(loaded, Some(report));

        let raw = std::fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
        assert!(raw.contains("\"unit\": \"2022-01\""));
        assert!(raw.contains("\"status\": \"done\""));
    }

    #[tokio::test]
    async fn test_missing_report_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_report(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_garbled_report_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(REPORT_FILE_NAME), "{ not json").unwrap();
        assert_eq!(load_report(dir.path()).await.unwrap(), None);
    }
}
