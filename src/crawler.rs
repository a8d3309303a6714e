//! Crawl operations shared by the CLI, the HTTP API and the background tasks.
//!
//! A [`Crawler`] owns one [`ArxivClient`] (and therefore one rate limiter),
//! so every crawl it runs, including concurrent ones from different tasks,
//! shares the same request budget.
//!
//! # Event log
//!
//! Each paper-level action is appended to `crawl_events`:
//!
//! | Event | When |
//! |-------|------|
//! | `FOUND` | an on-demand crawl was requested |
//! | `DUPLICATE` | the paper was already stored |
//! | `STORED` | a new paper row was written |
//! | `NOT_FOUND` | arXiv has no such paper |
//! | `FAILED` | fetching or storing failed |
//! | `SUMMARIZED` / `SUMMARY_FAILED` | summarization outcome |

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::arxiv_client::{date_category_query, ArxivClient};
use crate::arxiv_id::extract_arxiv_id;
use crate::config::Config;
use crate::error::ArxivError;
use crate::models::{ArxivPaper, CrawlCycleResult, Paper, SummaryStatus};
use crate::progress::{CrawlProgressEvent, CrawlProgressReporter, NoProgress};
use crate::store::{self, StoreOutcome};
use crate::summarizer::{create_summarizer, Summarizer};

/// Running totals since the crawler was created.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    pub papers_crawled: u64,
    pub papers_stored: u64,
    pub papers_duplicate: u64,
    pub papers_failed: u64,
    pub last_crawl_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlerStatus {
    pub stats: CrawlStats,
    pub categories: Vec<String>,
    pub requests_per_second: f64,
    pub page_size: u32,
    pub summarizer_model: Option<String>,
}

pub struct Crawler {
    pool: SqlitePool,
    client: Arc<ArxivClient>,
    summarizer: Arc<dyn Summarizer>,
    config: Arc<Config>,
    reporter: Arc<dyn CrawlProgressReporter>,
    stats: Mutex<CrawlStats>,
}

impl Crawler {
    /// Build the client and summarizer described by `config`.
    pub fn new(pool: SqlitePool, config: Arc<Config>) -> Result<Self> {
        let client = Arc::new(ArxivClient::new(&config.arxiv)?);
        let summarizer: Arc<dyn Summarizer> = Arc::from(create_summarizer(&config.summarizer)?);
        Ok(Self::with_parts(pool, config, client, summarizer))
    }

    pub fn with_parts(
        pool: SqlitePool,
        config: Arc<Config>,
        client: Arc<ArxivClient>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            pool,
            client,
            summarizer,
            config,
            reporter: Arc::new(NoProgress),
            stats: Mutex::new(CrawlStats::default()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn CrawlProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch and store one paper by id or URL.
    ///
    /// Returns the stored row without touching the network when the paper
    /// is already present, and `Ok(None)` when arXiv does not know the id.
    pub async fn crawl_single_paper(&self, identifier: &str) -> Result<Option<Paper>> {
        let arxiv_id = extract_arxiv_id(identifier)?;
        store::log_event(&self.pool, Some(&arxiv_id), "FOUND", Some(identifier.trim())).await?;

        if let Some(existing) = store::get_paper_by_arxiv_id(&self.pool, &arxiv_id).await? {
            tracing::debug!(arxiv_id = %arxiv_id, "paper already stored");
            store::log_event(&self.pool, Some(&arxiv_id), "DUPLICATE", None).await?;
            self.bump(|s| s.papers_duplicate += 1).await;
            return Ok(Some(existing));
        }

        let fetched = match self.client.get_paper(&arxiv_id).await {
            Ok(paper) => paper,
            Err(ArxivError::NotFound(_)) => {
                tracing::info!(arxiv_id = %arxiv_id, "paper not found on arXiv");
                store::log_event(&self.pool, Some(&arxiv_id), "NOT_FOUND", None).await?;
                self.bump(|s| s.papers_failed += 1).await;
                return Ok(None);
            }
            Err(e) => {
                tracing::error!(arxiv_id = %arxiv_id, error = %e, "failed to fetch paper");
                store::log_event(&self.pool, Some(&arxiv_id), "FAILED", Some(&e.to_string()))
                    .await?;
                self.bump(|s| s.papers_failed += 1).await;
                return Err(e.into());
            }
        };

        let category = fetched.primary_category.clone();
        let outcome = match self.store_paper(&fetched, &category).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.bump(|s| s.papers_failed += 1).await;
                return Err(e);
            }
        };
        self.bump(|s| s.papers_crawled += 1).await;

        store::get_paper(&self.pool, outcome.paper_id()).await
    }

    /// Crawl several identifiers one after another. Failures are logged
    /// and skipped.
    pub async fn crawl_papers_batch(&self, identifiers: &[String]) -> Vec<Paper> {
        let mut papers = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            match self.crawl_single_paper(identifier).await {
                Ok(Some(paper)) => papers.push(paper),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(identifier = %identifier, error = %e, "skipping paper");
                }
            }
        }
        papers
    }

    /// Fetch every paper submitted to `category` on `date`.
    ///
    /// Result pages are requested until a short or empty page arrives, or
    /// until `opensearch:totalResults` is reached. Papers that fail to store
    /// are recorded in `failed_papers` and counted, not propagated; a failed
    /// page request aborts the whole crawl.
    pub async fn crawl_date_category(
        &self,
        category: &str,
        date: NaiveDate,
    ) -> Result<CrawlCycleResult> {
        self.crawl_pages(category, date, 0, false).await
    }

    /// Resumable crawl of one category-day.
    ///
    /// Starts from the saved index for `(category, date)` and saves the
    /// index after every paper, so an interrupted run continues with the
    /// first unprocessed paper.
    pub async fn crawl_recent_category(
        &self,
        category: &str,
        date: NaiveDate,
    ) -> Result<CrawlCycleResult> {
        let progress = store::load_crawl_progress(&self.pool, category, date).await?;
        if progress.index > 0 {
            tracing::info!(category, %date, index = progress.index, "resuming category crawl");
        }
        self.crawl_pages(category, date, progress.index, true).await
    }

    async fn crawl_pages(
        &self,
        category: &str,
        date: NaiveDate,
        start_index: u64,
        track_progress: bool,
    ) -> Result<CrawlCycleResult> {
        let query = date_category_query(category, date);
        let page_size = self.config.arxiv.page_size;
        let date_str = date.format("%Y-%m-%d").to_string();

        let mut result = CrawlCycleResult {
            category: category.to_string(),
            date: date_str.clone(),
            ..CrawlCycleResult::default()
        };
        let mut index = start_index;

        loop {
            self.reporter.report(CrawlProgressEvent::Fetching {
                category: category.to_string(),
                date: date_str.clone(),
                start: index,
            });

            let feed = self.client.search(&query, index, page_size).await?;
            let page_len = feed.papers.len() as u64;
            let total = feed.total_results;

            if page_len == 0 {
                break;
            }

            for paper in &feed.papers {
                result.papers_found += 1;
                match self.store_paper(paper, category).await {
                    Ok(_) => result.papers_stored += 1,
                    Err(e) => {
                        // store_paper has already written the failed_papers row
                        result.papers_failed += 1;
                        tracing::warn!(arxiv_id = %paper.arxiv_id, error = %e, "failed to store paper");
                    }
                }

                index += 1;
                if track_progress {
                    store::save_crawl_progress(&self.pool, category, date, index).await?;
                }
                self.reporter.report(CrawlProgressEvent::Storing {
                    category: category.to_string(),
                    date: date_str.clone(),
                    n: index,
                    total: total.unwrap_or(index),
                });
            }

            if page_len < u64::from(page_size) || total.is_some_and(|t| index >= t) {
                break;
            }
        }

        if track_progress {
            store::finish_crawl_progress(&self.pool, category, date, index).await?;
        }

        self.bump(|s| {
            s.papers_crawled += result.papers_stored;
            s.papers_failed += result.papers_failed;
        })
        .await;

        tracing::info!(
            category,
            date = %date_str,
            found = result.papers_found,
            stored = result.papers_stored,
            failed = result.papers_failed,
            "category crawl finished"
        );
        Ok(result)
    }

    /// Insert (or recognise) one paper and run the follow-ups for new rows.
    async fn store_paper(&self, paper: &ArxivPaper, category: &str) -> Result<StoreOutcome> {
        let outcome = match store::insert_paper(&self.pool, paper).await {
            Ok(outcome) => outcome,
            Err(e) => {
                store::record_failed_paper(&self.pool, &paper.arxiv_id, category, &format!("{:#}", e))
                    .await?;
                store::log_event(&self.pool, Some(&paper.arxiv_id), "FAILED", Some(&e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        match outcome {
            StoreOutcome::Inserted(paper_id) => {
                tracing::debug!(arxiv_id = %paper.arxiv_id, paper_id, "stored paper");
                store::log_event(
                    &self.pool,
                    Some(&paper.arxiv_id),
                    "STORED",
                    Some(&format!("paper_id={}", paper_id)),
                )
                .await?;
                store::clear_failed_paper(&self.pool, &paper.arxiv_id).await?;
                self.bump(|s| s.papers_stored += 1).await;

                if self.config.crawler.summarize_immediately && self.summarizer.is_enabled() {
                    // The paper row is already committed.
                    if let Err(e) = self.summarize_paper(paper_id).await {
                        tracing::warn!(arxiv_id = %paper.arxiv_id, error = %e, "could not summarize stored paper");
                    }
                }
            }
            StoreOutcome::Duplicate(_) => {
                self.bump(|s| s.papers_duplicate += 1).await;
            }
        }
        Ok(outcome)
    }

    /// Summarize a stored paper. A summarizer failure marks the paper
    /// `failed` and returns `Ok(false)`; database errors are returned.
    pub async fn summarize_paper(&self, paper_id: i64) -> Result<bool> {
        let paper = match store::get_paper(&self.pool, paper_id).await? {
            Some(p) => p,
            None => anyhow::bail!("paper not found: {}", paper_id),
        };

        store::set_summary_status(&self.pool, paper_id, SummaryStatus::Processing).await?;
        match self.summarizer.summarize(&paper).await {
            Ok(summary) => {
                store::insert_summary(
                    &self.pool,
                    paper_id,
                    &summary,
                    &self.config.summarizer.language,
                    &self.config.summarizer.interests,
                    self.summarizer.model_name(),
                )
                .await?;
                store::log_event(&self.pool, Some(&paper.arxiv_id), "SUMMARIZED", None).await?;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(arxiv_id = %paper.arxiv_id, error = %e, "summarization failed");
                store::set_summary_status(&self.pool, paper_id, SummaryStatus::Failed).await?;
                store::log_event(
                    &self.pool,
                    Some(&paper.arxiv_id),
                    "SUMMARY_FAILED",
                    Some(&e.to_string()),
                )
                .await?;
                Ok(false)
            }
        }
    }

    pub async fn stats(&self) -> CrawlStats {
        self.stats.lock().await.clone()
    }

    pub async fn status(&self) -> CrawlerStatus {
        CrawlerStatus {
            stats: self.stats().await,
            categories: self.config.crawler.categories.clone(),
            requests_per_second: self.config.arxiv.requests_per_second,
            page_size: self.config.arxiv.page_size,
            summarizer_model: self.summarizer.model_name().map(str::to_string),
        }
    }

    async fn bump(&self, f: impl FnOnce(&mut CrawlStats)) {
        let mut stats = self.stats.lock().await;
        f(&mut stats);
        stats.last_crawl_time = Some(store::now_iso());
    }
}
