//! Data models shared by the harvesting stages.
//!
//! - [`TimeUnit`]: one (month, year) processing granule and corpus-file key
//! - [`ArticleReference`]: an article link discovered on a listing page
//! - [`ArticleRecord`]: a parsed article, ready for the corpus
//! - [`MonthCorpus`]: the ordered records of one month
//! - [`RunReport`] / [`UnitReport`]: per-unit counters for a run

use crate::error::HarvestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Spanish month names, indexed by `month - 1`.
pub const MONTH_NAMES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// A single (year, month) unit of work.
///
/// Field order matters: the derived ordering compares `year` first, then
/// `month`, which is chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeUnit {
    year: i32,
    month: u32,
}

impl TimeUnit {
    /// Build a unit, rejecting months outside `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self, HarvestError> {
        if !(1..=12).contains(&month) {
            return Err(HarvestError::Configuration(format!(
                "month must be between 1 and 12, got {month}"
            )));
        }
        if !(1..=9999).contains(&year) {
            return Err(HarvestError::Configuration(format!(
                "year must be between 1 and 9999, got {year}"
            )));
        }
        Ok(Self { year, month })
    }

    /// Build a unit in a const context. Out-of-range values fail the
    /// build when the result initialises a `const`.
    pub const fn from_const(year: i32, month: u32) -> Self {
        assert!(month >= 1 && month <= 12, "month out of range");
        assert!(year >= 1 && year <= 9999, "year out of range");
        Self { year, month }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following month, rolling over into January of the next year.
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    /// Deterministic corpus file name, e.g. `3_2020.txt`.
    pub fn corpus_file_name(&self) -> String {
        format!("{}_{}.txt", self.month, self.year)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for TimeUnit {
    type Err = HarvestError;

    /// Parses `YYYY-MM` (a single-digit month is accepted).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HarvestError::Configuration(format!("expected YYYY-MM, got {s:?}"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for TimeUnit {
    type Error = HarvestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeUnit> for String {
    fn from(unit: TimeUnit) -> Self {
        unit.to_string()
    }
}

/// Metadata shown next to an article link on a listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingSummary {
    pub title: Option<String>,
    pub author: Option<String>,
    pub date_text: Option<String>,
    pub categories: Vec<String>,
    pub excerpt: Option<String>,
}

/// An article discovered while paginating a month's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleReference {
    pub url: Url,
    pub listing_summary: Option<ListingSummary>,
}

/// A fully parsed article.
///
/// `title` and `body` are never empty; the parser refuses to build a record
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub author: Option<String>,
    /// Canonical `<day> de <mes> de <year>` form, or `None` when the page
    /// date could not be understood.
    pub published_date: Option<String>,
    pub categories: Vec<String>,
    pub body: String,
    pub source_url: String,
}

/// The ordered records of one month, written once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthCorpus {
    pub unit: TimeUnit,
    pub records: Vec<ArticleRecord>,
}

/// Where a unit ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    ListingInProgress,
    ArticlesInProgress,
    Writing,
    Done,
    /// The listing yielded no references.
    Skipped,
    /// Cancellation arrived mid-unit; completed records were flushed.
    Interrupted,
}

/// Why a listing stopped before its natural end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialListing {
    /// The first page that could not be retrieved.
    pub page: u32,
    pub reason: String,
}

/// Counters for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit: TimeUnit,
    pub status: UnitStatus,
    pub listing_pages: u32,
    pub articles_discovered: usize,
    pub articles_fetched: usize,
    pub articles_parsed: usize,
    pub failures: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    /// Articles never attempted because the run was cancelled.
    pub articles_cancelled: usize,
    pub partial_listing: Option<PartialListing>,
    /// Body words across the records written for this unit.
    #[serde(default)]
    pub words: usize,
}

impl UnitReport {
    pub fn new(unit: TimeUnit) -> Self {
        Self {
            unit,
            status: UnitStatus::Pending,
            listing_pages: 0,
            articles_discovered: 0,
            articles_fetched: 0,
            articles_parsed: 0,
            failures: 0,
            fetch_failures: 0,
            parse_failures: 0,
            articles_cancelled: 0,
            partial_listing: None,
            words: 0,
        }
    }

    pub fn record_fetch_failure(&mut self) {
        self.fetch_failures += 1;
        self.failures += 1;
    }

    pub fn record_parse_failure(&mut self) {
        self.parse_failures += 1;
        self.failures += 1;
    }

    /// Whether a later run should process this unit again.
    pub fn needs_rerun(&self) -> bool {
        self.partial_listing.is_some()
            || self.failures > 0
            || self.articles_cancelled > 0
            || !matches!(self.status, UnitStatus::Done | UnitStatus::Skipped)
    }
}

/// Accumulated outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub units: Vec<UnitReport>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn unit(&self, unit: TimeUnit) -> Option<&UnitReport> {
        self.units.iter().find(|r| r.unit == unit)
    }

    /// Units that a later run should target.
    pub fn deficient_units(&self) -> Vec<TimeUnit> {
        self.units
            .iter()
            .filter(|r| r.needs_rerun())
            .map(|r| r.unit)
            .collect()
    }

    pub fn total_parsed(&self) -> usize {
        self.units.iter().map(|r| r.articles_parsed).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.units.iter().map(|r| r.failures).sum()
    }

    pub fn total_words(&self) -> usize {
        self.units.iter().map(|r| r.words).sum()
    }

    /// Percentage of reported units that need no rerun.
    pub fn success_rate(&self) -> f64 {
        if self.units.is_empty() {
            return 0.0;
        }
        let complete = self.units.iter().filter(|r| !r.needs_rerun()).count();
        complete as f64 * 100.0 / self.units.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit_ordering_is_chronological() {
        let a = TimeUnit::new(2020, 12).unwrap();
        let b = TimeUnit::new(2021, 1).unwrap();
        let c = TimeUnit::new(2021, 2).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_time_unit_rejects_bad_month() {
        assert!(TimeUnit::new(2020, 0).is_err());
        assert!(TimeUnit::new(2020, 13).is_err());
    }

    #[test]
    fn test_time_unit_succ_rolls_over() {
        let dec = TimeUnit::new(2020, 12).unwrap();
        assert_eq!(dec.succ(), TimeUnit::new(2021, 1).unwrap());
        let mar = TimeUnit::new(2020, 3).unwrap();
        assert_eq!(mar.succ(), TimeUnit::new(2020, 4).unwrap());
    }

    #[test]
    fn test_time_unit_parse_and_display() {
        let unit: TimeUnit = "2021-7".parse().unwrap();
        assert_eq!(unit.to_string(), "2021-07");
        assert_eq!(unit.month_name(), "julio");
        assert_eq!(unit.corpus_file_name(), "7_2021.txt");
        assert!("2021".parse::<TimeUnit>().is_err());
        assert!("abcd-01".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_time_unit_serde_as_string() {
        let unit = TimeUnit::new(2022, 1).unwrap();
        let json = serde_json::to_string(&unit).unwrap();
        assert_eq!(json, "\"2022-01\"");
        let back: TimeUnit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unit);
        assert!(serde_json::from_str::<TimeUnit>("\"2022-13\"").is_err());
    }

    #[test]
    fn test_const_unit_matches_checked_constructor() {
        const UNIT: TimeUnit = TimeUnit::from_const(2023, 12);
        assert_eq!(UNIT, TimeUnit::new(2023, 12).unwrap());
    }

    #[test]
    fn test_report_without_words_field_still_loads() {
        let json = r#"{"unit":"2020-03","status":"done","listing_pages":1,
            "articles_discovered":1,"articles_fetched":1,"articles_parsed":1,
            "failures":0,"fetch_failures":0,"parse_failures":0,
            "articles_cancelled":0,"partial_listing":null}"#;
        let report: UnitReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.words, 0);
        assert!(!report.needs_rerun());
    }

    #[test]
    fn test_run_report_totals_and_empty_success_rate() {
        assert_eq!(RunReport::default().success_rate(), 0.0);
        let mut a = UnitReport::new(TimeUnit::new(2020, 1).unwrap());
        a.words = 120;
        let mut b = UnitReport::new(TimeUnit::new(2020, 2).unwrap());
        b.words = 30;
        let run = RunReport {
            units: vec![a, b],
            cancelled: false,
        };
        assert_eq!(run.total_words(), 150);
    }

    #[test]
    fn test_unit_report_needs_rerun() {
        let unit = TimeUnit::new(2020, 3).unwrap();
        let mut report = UnitReport::new(unit);
        assert!(report.needs_rerun());

        report.status = UnitStatus::Done;
        assert!(!report.needs_rerun());

        report.record_parse_failure();
        assert_eq!(report.failures, 1);
        assert!(report.needs_rerun());

        let mut skipped = UnitReport::new(unit);
        skipped.status = UnitStatus::Skipped;
        assert!(!skipped.needs_rerun());
    }

    #[test]
    fn test_run_report_deficient_units() {
        let ok_unit = TimeUnit::new(2020, 1).unwrap();
        let bad_unit = TimeUnit::new(2020, 2).unwrap();
        let mut ok = UnitReport::new(ok_unit);
        ok.status = UnitStatus::Done;
        ok.articles_parsed = 4;
        let mut bad = UnitReport::new(bad_unit);
        bad.status = UnitStatus::Done;
        bad.partial_listing = Some(PartialListing {
            page: 2,
            reason: "exhausted".into(),
        });

        let run = RunReport {
            units: vec![ok, bad],
            cancelled: false,
        };
        assert_eq!(run.deficient_units(), vec![bad_unit]);
        assert_eq!(run.total_parsed(), 4);
        assert_eq!(run.success_rate(), 50.0);
        assert!(run.unit(ok_unit).is_some());
    }
}
