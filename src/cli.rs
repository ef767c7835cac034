//! Command-line interface definitions.
//!
//! Every option is optional: anything left unset falls back to the YAML file
//! given with `--config`, then to the built-in defaults (see
//! [`RunConfig`](crate::config::RunConfig)).

use crate::models::TimeUnit;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the corpus harvester.
///
/// # Examples
///
/// ```sh
/// # Default range (2020-01 through 2023-12) into ./data/text
/// unam_news_corpus
///
/// # One quarter, two concurrent article fetches
/// unam_news_corpus --start 2021-01 --end 2021-03 -j 2 -o ./corpus
///
/// # Pick up where an interrupted run stopped
/// unam_news_corpus --resume
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML configuration file
    #[arg(short, long, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// First month to harvest (YYYY-MM)
    #[arg(short, long)]
    pub start: Option<TimeUnit>,

    /// Last month to harvest, inclusive (YYYY-MM)
    #[arg(short, long)]
    pub end: Option<TimeUnit>,

    /// Directory receiving one corpus file per month
    #[arg(short, long, env = "HARVEST_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Root URL of the monthly archive
    #[arg(long, env = "HARVEST_BASE_URL")]
    pub base_url: Option<String>,

    /// Maximum concurrent article fetches within one month
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Maximum listing pages per month
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// User-Agent header sent with every request
    #[arg(long, env = "HARVEST_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Total attempts per request, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Initial retry backoff in milliseconds
    #[arg(long)]
    pub base_delay_ms: Option<u64>,

    /// Upper bound for retry backoff in milliseconds
    #[arg(long)]
    pub max_delay_ms: Option<u64>,

    /// Pause between months in milliseconds
    #[arg(long)]
    pub month_delay_ms: Option<u64>,

    /// Skip months already harvested completely by a previous run
    #[arg(long)]
    pub resume: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "unam_news_corpus",
            "--start",
            "2020-03",
            "--end",
            "2020-05",
            "--output-dir",
            "./corpus",
        ]);

        assert_eq!(cli.start, Some(TimeUnit::new(2020, 3).unwrap()));
        assert_eq!(cli.end, Some(TimeUnit::new(2020, 5).unwrap()));
        assert_eq!(cli.output_dir, Some(PathBuf::from("./corpus")));
        assert!(!cli.resume);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "unam_news_corpus",
            "-s",
            "2021-07",
            "-e",
            "2021-07",
            "-j",
            "8",
            "-o",
            "/tmp/corpus",
        ]);

        assert_eq!(cli.concurrency, Some(8));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/corpus")));
    }

    #[test]
    fn test_cli_rejects_malformed_month() {
        assert!(Cli::try_parse_from(["unam_news_corpus", "--start", "2020-13"]).is_err());
        assert!(Cli::try_parse_from(["unam_news_corpus", "--end", "march"]).is_err());
    }
}
