//! Error types for the harvesting pipeline.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! - [`HarvestError`]: fatal to the whole run (bad configuration, unusable
//!   output directory). Only these ever leave the pipeline.
//! - [`AttemptError`]: the outcome of a single network attempt, classified as
//!   retryable or fatal.
//! - [`FetchFailure`]: what a fetch looks like after the retry policy has
//!   finished with it. Recorded in the run report, never raised.
//! - [`ParseFailure`]: an article page that could not be turned into a record.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run before or outside of per-unit processing.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The run configuration is invalid (inverted range, zero limits, bad URL).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`RunConfig`](crate::config::RunConfig).
    #[error("failed to parse config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The output location could not be created or written.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run report could not be serialized or deserialized.
    #[error("run report error: {0}")]
    Report(#[from] serde_json::Error),
}

impl HarvestError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single network attempt.
///
/// The retry classification lives here so that every caller agrees on it:
/// connection problems, timeouts, HTTP 429 and HTTP 5xx are retryable;
/// everything else is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// The request or the response body timed out.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was reset.
    #[error("connection error: {0}")]
    Connect(String),

    /// The server answered with a non-success status.
    #[error("HTTP {0}")]
    Status(u16),

    /// The URL could not be built or was rejected before sending.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The response body was cut off while being read.
    #[error("unreadable response body: {0}")]
    Body(String),

    /// The redirect chain looped or exceeded the client's limit.
    #[error("redirect error: {0}")]
    Redirect(String),

    /// The response arrived but could not be decoded.
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl AttemptError {
    /// Returns `true` if the policy should try again after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) | Self::Body(_) => true,
            Self::Status(code) => *code == 429 || (500..=599).contains(code),
            Self::InvalidUrl(_) | Self::Redirect(_) | Self::Decode(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status(404))
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_builder() {
            Self::InvalidUrl(e.to_string())
        } else if e.is_redirect() {
            Self::Redirect(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_body() {
            Self::Body(e.to_string())
        } else {
            Self::Connect(e.to_string())
        }
    }
}

/// Terminal outcome of a fetch that did not produce a page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// A non-retryable error, reported on the first occurrence.
    #[error("fatal fetch failure: {0}")]
    Fatal(AttemptError),

    /// Every allowed attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: AttemptError },

    /// The run was cancelled before the fetch could succeed.
    #[error("cancelled")]
    Cancelled { last: Option<AttemptError> },
}

impl FetchFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// An article page that cannot yield a valid record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("no recognizable title")]
    MissingTitle,

    #[error("no article body")]
    MissingBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AttemptError::Timeout.is_retryable());
        assert!(AttemptError::Connect("reset".into()).is_retryable());
        assert!(AttemptError::Status(429).is_retryable());
        assert!(AttemptError::Status(500).is_retryable());
        assert!(AttemptError::Status(503).is_retryable());
        assert!(AttemptError::Body("connection closed mid-body".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!AttemptError::Status(404).is_retryable());
        assert!(!AttemptError::Status(403).is_retryable());
        assert!(!AttemptError::Status(400).is_retryable());
        assert!(!AttemptError::InvalidUrl("nope".into()).is_retryable());
        assert!(!AttemptError::Redirect("too many redirects".into()).is_retryable());
        assert!(!AttemptError::Decode("invalid utf-8".into()).is_retryable());
    }

    #[test]
    fn test_fetch_failure_display() {
        let f = FetchFailure::Exhausted {
            attempts: 3,
            last: AttemptError::Status(502),
        };
        assert_eq!(f.to_string(), "retries exhausted after 3 attempts: HTTP 502");
        assert!(!f.is_cancelled());
        assert!(FetchFailure::Cancelled { last: None }.is_cancelled());
    }

    #[test]
    fn test_harvest_error_display() {
        let e = HarvestError::Configuration("end precedes start".into());
        assert_eq!(e.to_string(), "configuration error: end precedes start");
    }
}
