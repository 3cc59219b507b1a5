use std::fmt;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log output format (filter with RUST_LOG).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run ingest, normalize and aggregate in order under one data directory.
    Run(RunArgs),
    /// Bronze: fetch raw discovery/detail/credit records from the catalog API.
    Ingest(IngestArgs),
    /// Silver: merge raw records into one row per series.
    Normalize(NormalizeArgs),
    /// Gold: derive analytic tables from the Silver table.
    Aggregate(AggregateArgs),
    /// Filter the Gold dashboard table and print summary metrics.
    Report(ReportArgs),
}

#[derive(Clone, Args)]
pub struct FetchArgs {
    /// Catalog API key.
    #[arg(long, env = "TMDB_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Catalog API base URL.
    #[arg(
        long,
        env = "TMDB_API_BASE_URL",
        default_value = crate::config::DEFAULT_API_BASE_URL
    )]
    pub api_base_url: String,

    /// Attempts per request before giving up.
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Pause after every successful request (rate limit politeness).
    #[arg(long, default_value_t = 500)]
    pub success_delay_ms: u64,

    /// Wait used for HTTP 429 when the response has no usable Retry-After.
    #[arg(long, default_value_t = 5)]
    pub default_retry_after_secs: u64,

    /// Transport timeout per request.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl fmt::Debug for FetchArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchArgs")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("max_attempts", &self.max_attempts)
            .field("success_delay_ms", &self.success_delay_ms)
            .field("default_retry_after_secs", &self.default_retry_after_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Args)]
pub struct DiscoverArgs {
    /// Genre label to look up in the genre list.
    #[arg(long, default_value = "드라마")]
    pub genre_name: String,

    /// Language used when fetching the genre list.
    #[arg(long, default_value = "ko-KR")]
    pub genre_language: String,

    /// Original language filter for discovery.
    #[arg(long, default_value = "ko")]
    pub original_language: String,

    /// Display language for discovery and detail records.
    #[arg(long, default_value = "pt-BR")]
    pub language: String,

    /// First air date range start (inclusive).
    #[arg(long, default_value = "2020-01-01")]
    pub start_date: NaiveDate,

    /// First air date range end (inclusive).
    #[arg(long, default_value = "2025-05-30")]
    pub end_date: NaiveDate,

    /// Maximum discovery pages to fetch (the API serves at most 500).
    #[arg(long, default_value_t = 5)]
    pub max_pages: u32,
}

#[derive(Debug, Clone, Args)]
pub struct NormalizeOptions {
    /// Region whose flatrate streaming providers are kept.
    #[arg(long, default_value = "BR")]
    pub watch_region: String,

    /// Number of leading cast members kept per series.
    #[arg(long, default_value_t = 10)]
    pub cast_limit: usize,
}

#[derive(Debug, Clone, Args)]
pub struct AggregateOptions {
    /// Minimum vote count for the top-per-year ranking.
    #[arg(long, default_value_t = 50)]
    pub vote_threshold: i64,

    /// Entries kept per release year in the ranking.
    #[arg(long, default_value_t = 5)]
    pub top_n: usize,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Output directory for raw JSON records.
    #[arg(long, default_value = "data/bronze/raw_kdramas")]
    pub out: String,

    #[command(flatten)]
    pub fetch: FetchArgs,

    #[command(flatten)]
    pub discover: DiscoverArgs,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Raw record directory (created by `ingest`).
    #[arg(long, default_value = "data/bronze/raw_kdramas")]
    pub bronze: String,

    /// Output path for the Silver table.
    #[arg(long, default_value = "data/silver/kdramas_silver.parquet")]
    pub out: String,

    #[command(flatten)]
    pub options: NormalizeOptions,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    /// Input path to the Silver table (created by `normalize`).
    #[arg(long, default_value = "data/silver/kdramas_silver.parquet")]
    pub silver: String,

    /// Output directory for Gold tables.
    #[arg(long, default_value = "data/gold")]
    pub out: String,

    #[command(flatten)]
    pub options: AggregateOptions,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Data directory holding bronze/, silver/ and gold/.
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    #[command(flatten)]
    pub fetch: FetchArgs,

    #[command(flatten)]
    pub discover: DiscoverArgs,

    #[command(flatten)]
    pub normalize: NormalizeOptions,

    #[command(flatten)]
    pub aggregate: AggregateOptions,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Input path to the Gold dashboard table.
    #[arg(long, default_value = "data/gold/kdramas_dashboard.parquet")]
    pub dashboard: String,

    /// Earliest release year to include.
    #[arg(long)]
    pub from_year: Option<i32>,

    /// Latest release year to include.
    #[arg(long)]
    pub to_year: Option<i32>,

    /// Keep series tagged with any of these genres (repeatable).
    #[arg(long = "genre")]
    pub genres: Vec<String>,

    /// Rows in the most-popular table.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}
