//! HTTP client for the arXiv export API.
//!
//! Every request goes through the shared [`RateLimiter`] first. Transient
//! failures (HTTP 429, 5xx, timeouts, connection errors) are retried with
//! exponential backoff; anything else is returned on the first attempt.
//!
//! # Retry schedule
//!
//! With the default `retry_base_delay_ms = 2000` and `max_retries = 3`:
//!
//! | Attempt | Delay before it |
//! |---------|-----------------|
//! | 1 | none |
//! | 2 | 2 s |
//! | 3 | 4 s |
//! | 4 | 8 s |
//!
//! A `Retry-After` header on a 429 or 503 replaces the computed delay when
//! it is shorter than [`MAX_RETRY_AFTER`].

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use crate::arxiv_id::extract_arxiv_id;
use crate::arxiv_parser::{parse_feed_with_links, ArxivFeed};
use crate::config::ArxivConfig;
use crate::error::ArxivError;
use crate::models::ArxivPaper;
use crate::rate_limit::RateLimiter;

/// Longest server-requested wait we are willing to honour.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);
const MAX_BACKOFF_EXPONENT: u32 = 6;

pub struct ArxivClient {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    api_base_url: String,
    abs_base_url: String,
    pdf_base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig) -> anyhow::Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.requests_per_second)?);
        Self::with_limiter(config, limiter)
    }

    /// Build a client that shares an existing limiter.
    pub fn with_limiter(config: &ArxivConfig, limiter: Arc<RateLimiter>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            limiter,
            api_base_url: config.api_base_url.clone(),
            abs_base_url: config.abs_base_url.clone(),
            pdf_base_url: config.pdf_base_url.clone(),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch metadata for one paper by id or URL.
    pub async fn get_paper(&self, identifier: &str) -> Result<ArxivPaper, ArxivError> {
        let arxiv_id = extract_arxiv_id(identifier)?;
        let url = format!(
            "{}?id_list={}&start=0&max_results=1",
            self.api_base_url, arxiv_id
        );

        let feed = match self.fetch_feed(&url).await {
            Ok(feed) => feed,
            Err(ArxivError::NotFound(_)) => return Err(ArxivError::NotFound(arxiv_id)),
            Err(e) => return Err(e),
        };

        feed.papers
            .into_iter()
            .next()
            .ok_or(ArxivError::NotFound(arxiv_id))
    }

    /// Run a `search_query`, newest submissions first.
    ///
    /// The URL is assembled by hand: arXiv reads `+` in the query as a
    /// separator, and form-encoding it would turn it into `%2B`.
    pub async fn search(
        &self,
        query: &str,
        start: u64,
        max_results: u32,
    ) -> Result<ArxivFeed, ArxivError> {
        let url = format!(
            "{}?search_query={}&start={}&max_results={}&sortBy=submittedDate&sortOrder=descending",
            self.api_base_url,
            query.trim().replace(' ', "+"),
            start,
            max_results
        );
        self.fetch_feed(&url).await
    }

    async fn fetch_feed(&self, url: &str) -> Result<ArxivFeed, ArxivError> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.wait().await;

            match self.fetch_once(url).await {
                Ok(feed) => return Ok(feed),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = e
                        .retry_after()
                        .filter(|d| *d < MAX_RETRY_AFTER)
                        .unwrap_or_else(|| self.backoff(attempt));
                    tracing::warn!(
                        url,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "arXiv request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<ArxivFeed, ArxivError> {
        tracing::debug!(url, "GET arXiv");
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return parse_feed_with_links(&body, &self.abs_base_url, &self.pdf_base_url);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();

        Err(match status {
            StatusCode::NOT_FOUND => ArxivError::NotFound(url.to_string()),
            StatusCode::TOO_MANY_REQUESTS => ArxivError::RateLimited {
                status: status.as_u16(),
                retry_after,
            },
            StatusCode::SERVICE_UNAVAILABLE if retry_after.is_some() => ArxivError::RateLimited {
                status: status.as_u16(),
                retry_after,
            },
            _ => ArxivError::Api {
                status: status.as_u16(),
                message: truncate(&body, 200),
            },
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay * (1u32 << attempt.min(MAX_BACKOFF_EXPONENT))
    }
}

/// `search_query` covering one UTC day of submissions in one category.
pub fn date_category_query(category: &str, date: NaiveDate) -> String {
    let day = date.format("%Y%m%d");
    format!("submittedDate:[{day}0000+TO+{day}2359]+AND+cat:{category}")
}

/// Seconds form of `Retry-After`. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
