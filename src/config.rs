//! TOML configuration parsing.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. See `config/ark.example.toml` for a complete file.
//!
//! ```toml
//! [db]
//! path = "./data/theark.sqlite"
//!
//! [arxiv]
//! requests_per_second = 0.33
//! page_size = 100
//!
//! [crawler]
//! categories = ["cs.AI", "cs.LG"]
//! fetch_interval_secs = 600
//! ```

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::explorer::parse_categories;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Settings for talking to the arXiv export API.
#[derive(Debug, Deserialize, Clone)]
pub struct ArxivConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_abs_base_url")]
    pub abs_base_url: String,
    #[serde(default = "default_pdf_base_url")]
    pub pdf_base_url: String,
    /// arXiv asks clients to stay at or below one request every three seconds.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Additional attempts after the first failed request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Results requested per API page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            abs_base_url: default_abs_base_url(),
            pdf_base_url: default_pdf_base_url(),
            requests_per_second: default_requests_per_second(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            page_size: default_page_size(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}
fn default_abs_base_url() -> String {
    "https://arxiv.org/abs".to_string()
}
fn default_pdf_base_url() -> String {
    "https://arxiv.org/pdf".to_string()
}
fn default_requests_per_second() -> f64 {
    0.33
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("theark-arxiv-crawler/{}", env!("CARGO_PKG_VERSION"))
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    2000
}
fn default_page_size() -> u32 {
    100
}

/// Background crawl behaviour.
#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    /// Seconds between recent-paper monitoring passes.
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
    /// Seconds between historical date-category steps.
    #[serde(default = "default_historical_delay_secs")]
    pub historical_delay_secs: u64,
    /// Oldest day the historical crawl walks back to (inclusive).
    #[serde(default = "default_historical_end_date")]
    pub historical_end_date: String,
    #[serde(default = "default_error_retry_delay_secs")]
    pub error_retry_delay_secs: u64,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default = "default_true")]
    pub enable_recent: bool,
    #[serde(default = "default_true")]
    pub enable_historical: bool,
    /// Start the background loop when `ark serve` boots.
    #[serde(default)]
    pub auto_start: bool,
    /// Summarize each newly stored paper right away.
    #[serde(default)]
    pub summarize_immediately: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            fetch_interval_secs: default_fetch_interval_secs(),
            historical_delay_secs: default_historical_delay_secs(),
            historical_end_date: default_historical_end_date(),
            error_retry_delay_secs: default_error_retry_delay_secs(),
            max_consecutive_errors: default_max_consecutive_errors(),
            enable_recent: true,
            enable_historical: true,
            auto_start: false,
            summarize_immediately: false,
        }
    }
}

impl CrawlerConfig {
    pub fn historical_end(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.historical_end_date, "%Y-%m-%d").with_context(|| {
            format!(
                "crawler.historical_end_date must be YYYY-MM-DD, got '{}'",
                self.historical_end_date
            )
        })
    }
}

fn default_categories() -> Vec<String> {
    ["cs.AI", "cs.CL", "cs.CV", "cs.DC", "cs.IR", "cs.LG", "cs.MA"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_fetch_interval_secs() -> u64 {
    600
}
fn default_historical_delay_secs() -> u64 {
    10
}
fn default_historical_end_date() -> String {
    "2015-01-01".to_string()
}
fn default_error_retry_delay_secs() -> u64 {
    60
}
fn default_max_consecutive_errors() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_interests")]
    pub interests: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_llm_base_url(),
            language: default_language(),
            interests: default_interests(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl SummarizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_language() -> String {
    "English".to_string()
}
fn default_interests() -> String {
    "Machine Learning,Deep Learning".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults with the database at `./data/theark.sqlite`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/theark.sqlite"),
            },
            arxiv: ArxivConfig::default(),
            crawler: CrawlerConfig::default(),
            summarizer: SummarizerConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // arXiv
    crate::rate_limit::min_interval_for(config.arxiv.requests_per_second)
        .context("invalid arxiv.requests_per_second")?;
    if config.arxiv.page_size == 0 || config.arxiv.page_size > 2000 {
        bail!("arxiv.page_size must be in 1..=2000");
    }
    if config.arxiv.timeout_secs == 0 {
        bail!("arxiv.timeout_secs must be > 0");
    }

    // Crawler
    if config.crawler.categories.is_empty() {
        bail!("crawler.categories must not be empty");
    }
    parse_categories(&config.crawler.categories.join(","))?;
    config.crawler.historical_end()?;
    if config.crawler.max_consecutive_errors == 0 {
        bail!("crawler.max_consecutive_errors must be >= 1");
    }

    // Summarizer
    match config.summarizer.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.summarizer.model.is_none() {
                bail!("summarizer.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown summarizer provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Logging
    crate::logging::default_filter(&config.logging.level).context("invalid logging.level")?;

    Ok(())
}
