//! Recent-papers monitor.
//!
//! Each run crawls yesterday's (UTC) submissions for every configured
//! category. arXiv lists a day's papers only once the day is over, so
//! yesterday is the freshest day that can be fetched completely. Progress
//! is saved per paper, so a run cut short resumes at the next paper.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::crawler::Crawler;
use crate::scheduler::{PeriodicTask, TaskFlow};

fn category_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[a-z-]+\.[A-Z][A-Za-z-]*|[a-z]+(?:-[a-z]+)*)$")
            .expect("valid category regex")
    })
}

/// Parse `"cs.AI, cs.LG"` into validated category codes, dropping repeats.
pub fn parse_categories(input: &str) -> Result<Vec<String>> {
    let mut categories: Vec<String> = Vec::new();
    for raw in input.split(',') {
        let cat = raw.trim();
        if cat.is_empty() {
            continue;
        }
        if !category_re().is_match(cat) {
            bail!(
                "invalid arXiv category '{}': expected e.g. cs.AI or hep-th",
                cat
            );
        }
        if !categories.iter().any(|c| c == cat) {
            categories.push(cat.to_string());
        }
    }
    if categories.is_empty() {
        bail!("no categories given");
    }
    Ok(categories)
}

/// The most recent complete UTC day.
pub fn reference_date() -> NaiveDate {
    (Utc::now() - ChronoDuration::days(1)).date_naive()
}

/// Totals from one pass over all categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentRunSummary {
    pub date: Option<NaiveDate>,
    pub categories: usize,
    pub processed: u64,
    pub stored: u64,
    pub failed: u64,
}

pub struct RecentPapersTask {
    crawler: Arc<Crawler>,
    categories: Vec<String>,
}

impl RecentPapersTask {
    pub fn new(crawler: Arc<Crawler>) -> Self {
        let categories = crawler.config().crawler.categories.clone();
        Self {
            crawler,
            categories,
        }
    }

    /// Crawl every category for `date`. A category whose page requests
    /// fail is logged and counted; the other categories still run. The
    /// pass fails only when every category failed.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<RecentRunSummary> {
        let mut summary = RecentRunSummary {
            date: Some(date),
            categories: self.categories.len(),
            ..RecentRunSummary::default()
        };
        let mut last_error = None;
        let mut failed_categories = 0usize;

        for category in &self.categories {
            match self.crawler.crawl_recent_category(category, date).await {
                Ok(result) => {
                    summary.processed += result.papers_found;
                    summary.stored += result.papers_stored;
                    summary.failed += result.papers_failed;
                }
                Err(e) => {
                    tracing::warn!(category = %category, %date, error = %format!("{:#}", e), "recent crawl failed");
                    failed_categories += 1;
                    last_error = Some(e);
                }
            }
        }

        if failed_categories == self.categories.len() {
            if let Some(e) = last_error {
                return Err(e.context(format!("all {} categories failed", failed_categories)));
            }
        }

        tracing::info!(
            %date,
            processed = summary.processed,
            stored = summary.stored,
            failed = summary.failed,
            "recent papers pass finished"
        );
        Ok(summary)
    }
}

#[async_trait]
impl PeriodicTask for RecentPapersTask {
    fn name(&self) -> &str {
        "recent-papers"
    }

    async fn execute(&self) -> Result<TaskFlow> {
        self.run_for_date(reference_date()).await?;
        Ok(TaskFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_dedups_categories() {
        let cats = parse_categories(" cs.AI, cs.LG,,cs.AI ,hep-th,math.AG").unwrap();
        assert_eq!(cats, vec!["cs.AI", "cs.LG", "hep-th", "math.AG"]);
    }

    #[test]
    fn rejects_bad_categories() {
        assert!(parse_categories("").is_err());
        assert!(parse_categories(" , ").is_err());
        assert!(parse_categories("cs.ai").is_err());
        assert!(parse_categories("CS.AI").is_err());
        assert!(parse_categories("cs.AI;cs.LG").is_err());
        assert!(parse_categories("AI").is_err());
    }

    #[test]
    fn reference_date_is_yesterday() {
        let today = Utc::now().date_naive();
        assert_eq!(reference_date(), today - ChronoDuration::days(1));
    }
}
