//! Backward crawl through the archive.
//!
//! The historical crawler visits one `(date, category)` pair per step,
//! starting at yesterday and walking back one day at a time until
//! `crawler.historical_end_date`. Within a day it goes through the
//! configured categories in order.
//!
//! The cursor lives in the single-row `crawl_state` table and is written
//! after every step. Finished pairs are recorded in `crawl_completions`
//! (failed ones too, with their error message) and skipped on later passes,
//! so restarting the process or reordering categories never repeats work.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::crawler::Crawler;
use crate::explorer::reference_date;
use crate::models::{CrawlCycleResult, CrawlerProgress};
use crate::scheduler::{PeriodicTask, TaskFlow};
use crate::store::{self, HistoricalCursor};

/// Result of one [`HistoricalCrawlManager::run_crawl_cycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Crawled(CrawlCycleResult),
    /// The crawl failed; the pair was recorded with this error.
    Failed {
        category: String,
        date: NaiveDate,
        error: String,
    },
    /// The cursor has passed the end date.
    Finished,
}

pub struct HistoricalCrawlManager {
    crawler: Arc<Crawler>,
    categories: Vec<String>,
    end_date: NaiveDate,
    cursor: Mutex<HistoricalCursor>,
}

impl HistoricalCrawlManager {
    /// Resume from the stored cursor, or start at yesterday.
    pub async fn load(crawler: Arc<Crawler>) -> Result<Self> {
        Self::load_from(crawler, reference_date()).await
    }

    pub async fn load_from(crawler: Arc<Crawler>, start_date: NaiveDate) -> Result<Self> {
        let categories = crawler.config().crawler.categories.clone();
        let end_date = crawler.config().crawler.historical_end()?;
        let mut cursor = store::load_historical_cursor(crawler.pool(), start_date).await?;

        // Category list may have shrunk since the cursor was written.
        if cursor.category_index >= categories.len() {
            cursor = step(cursor, categories.len());
        }

        tracing::info!(
            date = %cursor.date,
            category_index = cursor.category_index,
            end_date = %end_date,
            "historical crawl cursor loaded"
        );

        Ok(Self {
            crawler,
            categories,
            end_date,
            cursor: Mutex::new(cursor),
        })
    }

    pub async fn cursor(&self) -> HistoricalCursor {
        *self.cursor.lock().await
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// The pair under the cursor, or `None` once past the end date.
    pub async fn next_date_category(&self) -> Option<(NaiveDate, String)> {
        let cursor = self.cursor.lock().await;
        self.pair_at(&cursor)
    }

    fn pair_at(&self, cursor: &HistoricalCursor) -> Option<(NaiveDate, String)> {
        if cursor.date < self.end_date {
            return None;
        }
        self.categories
            .get(cursor.category_index)
            .map(|c| (cursor.date, c.clone()))
    }

    /// Move to the next category, wrapping to the first category of the
    /// previous day, and persist the new cursor.
    pub async fn advance(&self) -> Result<HistoricalCursor> {
        let mut cursor = self.cursor.lock().await;
        let next = step(*cursor, self.categories.len());
        store::save_historical_cursor(self.crawler.pool(), next).await?;
        *cursor = next;
        Ok(next)
    }

    /// Crawl the next pair that has not been completed yet.
    pub async fn run_crawl_cycle(&self) -> Result<CycleOutcome> {
        let completed = store::completed_pairs(self.crawler.pool(), &self.categories).await?;

        let (date, category) = loop {
            let pair = {
                let cursor = self.cursor.lock().await;
                self.pair_at(&cursor)
            };
            match pair {
                None => {
                    tracing::info!(end_date = %self.end_date, "historical crawl reached end date");
                    return Ok(CycleOutcome::Finished);
                }
                Some((date, category)) if completed.contains(&(category.clone(), date)) => {
                    tracing::debug!(%date, category = %category, "already completed, skipping");
                    self.advance().await?;
                }
                Some(pair) => break pair,
            }
        };

        tracing::info!(%date, category = %category, "historical crawl step");
        let outcome = match self.crawler.crawl_date_category(&category, date).await {
            Ok(result) => {
                store::mark_completed(
                    self.crawler.pool(),
                    &category,
                    date,
                    result.papers_found,
                    result.papers_stored,
                    None,
                )
                .await?;
                CycleOutcome::Crawled(result)
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::warn!(%date, category = %category, error = %error, "historical crawl step failed");
                store::mark_completed(self.crawler.pool(), &category, date, 0, 0, Some(&error))
                    .await?;
                CycleOutcome::Failed {
                    category,
                    date,
                    error,
                }
            }
        };

        self.advance().await?;
        Ok(outcome)
    }

    pub async fn progress(&self) -> Result<CrawlerProgress> {
        store::crawler_progress(self.crawler.pool()).await
    }
}

fn step(cursor: HistoricalCursor, category_count: usize) -> HistoricalCursor {
    if cursor.category_index + 1 < category_count {
        HistoricalCursor {
            date: cursor.date,
            category_index: cursor.category_index + 1,
        }
    } else {
        HistoricalCursor {
            date: cursor.date - ChronoDuration::days(1),
            category_index: 0,
        }
    }
}

/// One historical step per execution.
pub struct HistoricalTask {
    manager: Arc<HistoricalCrawlManager>,
}

impl HistoricalTask {
    pub fn new(manager: Arc<HistoricalCrawlManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl PeriodicTask for HistoricalTask {
    fn name(&self) -> &str {
        "historical-crawl"
    }

    /// A failed step is already recorded; it is still reported as an error
    /// so a persistent outage trips the manager's error limit.
    async fn execute(&self) -> Result<TaskFlow> {
        match self.manager.run_crawl_cycle().await? {
            CycleOutcome::Finished => Ok(TaskFlow::Finished),
            CycleOutcome::Crawled(_) => Ok(TaskFlow::Continue),
            CycleOutcome::Failed {
                category,
                date,
                error,
            } => Err(anyhow!("{} {}: {}", category, date, error)),
        }
    }
}
