//! Run configuration.
//!
//! Values are resolved in three layers, later layers winning:
//!
//! 1. Built-in defaults (January 2020 through December 2023, UNAM Global)
//! 2. An optional YAML file passed with `--config`
//! 3. Command-line flags and their environment variables
//!
//! The merged configuration is validated once, before any network access.
//!
//! # Example file
//!
//! ```yaml
//! start: "2020-01"
//! end: "2020-06"
//! output_dir: data/text
//! concurrency: 4
//! retry:
//!   max_attempts: 3
//!   base_delay_ms: 1000
//! ```

use crate::cli::Cli;
use crate::error::HarvestError;
use crate::models::TimeUnit;
use crate::retry::TransientRetryPolicy;
use crate::scrapers::DEFAULT_USER_AGENT;
use crate::time_range::TimeRange;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://unamglobal.unam.mx/";
const DEFAULT_START: TimeUnit = TimeUnit::from_const(2020, 1);
const DEFAULT_END: TimeUnit = TimeUnit::from_const(2023, 12);

/// Backoff parameters for [`TransientRetryPolicy`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

/// Fully merged run configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub start: TimeUnit,
    pub end: TimeUnit,
    pub output_dir: PathBuf,
    pub base_url: String,
    /// Maximum article fetches in flight within one month.
    pub concurrency: usize,
    /// Listing pages fetched per month before giving up on pagination.
    pub max_pages: u32,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetrySettings,
    /// Pause between months that hit the network.
    pub month_delay_ms: u64,
    /// Skip months whose corpus file exists and was complete last run.
    pub resume: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_START,
            end: DEFAULT_END,
            output_dir: PathBuf::from("data/text"),
            base_url: DEFAULT_BASE_URL.to_string(),
            concurrency: 4,
            max_pages: 50,
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetrySettings::default(),
            month_delay_ms: 1_000,
            resume: false,
        }
    }
}

impl RunConfig {
    /// Resolve the configuration for a CLI invocation and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::ConfigRead`] or [`HarvestError::ConfigFile`] if
    /// the YAML file cannot be read or parsed, and
    /// [`HarvestError::Configuration`] if the merged values are invalid.
    pub fn load(cli: &Cli) -> Result<Self, HarvestError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        info!(
            start = %config.start,
            end = %config.end,
            output_dir = %config.output_dir.display(),
            concurrency = config.concurrency,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, HarvestError> {
        let text = std::fs::read_to_string(path).map_err(|source| HarvestError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| HarvestError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Read configuration file");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(start) = cli.start {
            self.start = start;
        }
        if let Some(end) = cli.end {
            self.end = end;
        }
        if let Some(dir) = &cli.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(url) = &cli.base_url {
            self.base_url = url.clone();
        }
        if let Some(n) = cli.concurrency {
            self.concurrency = n;
        }
        if let Some(n) = cli.max_pages {
            self.max_pages = n;
        }
        if let Some(secs) = cli.timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(agent) = &cli.user_agent {
            self.user_agent = agent.clone();
        }
        if let Some(n) = cli.max_attempts {
            self.retry.max_attempts = n;
        }
        if let Some(ms) = cli.base_delay_ms {
            self.retry.base_delay_ms = ms;
        }
        if let Some(ms) = cli.max_delay_ms {
            self.retry.max_delay_ms = ms;
        }
        if let Some(ms) = cli.month_delay_ms {
            self.month_delay_ms = ms;
        }
        if cli.resume {
            self.resume = true;
        }
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), HarvestError> {
        let invalid = |msg: String| Err(HarvestError::Configuration(msg));

        self.range()?;
        self.base_url()?;
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1".into());
        }
        if self.max_pages == 0 {
            return invalid("max_pages must be at least 1".into());
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be at least 1".into());
        }
        if HeaderValue::from_str(&self.user_agent).is_err() || self.user_agent.trim().is_empty() {
            return invalid(format!("invalid user agent {:?}", self.user_agent));
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".into());
        }
        if !(retry.multiplier.is_finite() && retry.multiplier >= 1.0) {
            return invalid(format!("retry.multiplier must be >= 1, got {}", retry.multiplier));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return invalid(format!("retry.jitter must be within [0, 1], got {}", retry.jitter));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return invalid(format!(
                "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
                retry.max_delay_ms, retry.base_delay_ms
            ));
        }
        Ok(())
    }

    pub fn range(&self) -> Result<TimeRange, HarvestError> {
        TimeRange::new(self.start, self.end)
    }

    /// Archive root, always with a trailing slash so relative joins keep
    /// any path prefix.
    pub fn base_url(&self) -> Result<Url, HarvestError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| {
            HarvestError::Configuration(format!("invalid base URL {:?}: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HarvestError::Configuration(format!(
                "base URL must be http or https, got {:?}",
                self.base_url
            )));
        }
        Ok(url)
    }

    pub fn retry_policy(&self) -> TransientRetryPolicy {
        TransientRetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.multiplier,
            self.retry.jitter,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn month_delay(&self) -> Duration {
        Duration::from_millis(self.month_delay_ms)
    }
}
