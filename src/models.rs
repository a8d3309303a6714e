//! Core data models used throughout TheArk.
//!
//! [`ArxivPaper`] is what the feed parser produces; [`Paper`] is the stored
//! row. The remaining types carry crawl bookkeeping between the crawler,
//! the store and the HTTP API.

use serde::{Deserialize, Serialize};

/// Paper metadata parsed from one `<entry>` of an arXiv Atom feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArxivPaper {
    pub arxiv_id: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub primary_category: String,
    pub published_at: String,
    pub updated_at: String,
    pub url_abs: String,
    pub url_pdf: String,
    pub doi: Option<String>,
    pub comment: Option<String>,
    pub journal_ref: Option<String>,
}

/// A paper stored in SQLite.
#[derive(Debug, Clone, Serialize)]
pub struct Paper {
    pub paper_id: i64,
    pub arxiv_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub primary_category: String,
    /// Comma-separated.
    pub categories: String,
    /// Semicolon-separated.
    pub authors: String,
    pub url_abs: String,
    pub url_pdf: Option<String>,
    pub doi: Option<String>,
    pub comment: Option<String>,
    pub journal_ref: Option<String>,
    pub published_at: String,
    pub updated_at: String,
    pub summary_status: SummaryStatus,
    pub created_at: String,
}

/// Where a paper is in the summarization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Batched,
    Processing,
    Done,
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Batched => "batched",
            SummaryStatus::Processing => "processing",
            SummaryStatus::Done => "done",
            SummaryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => SummaryStatus::Processing,
            "done" => SummaryStatus::Done,
            "failed" => SummaryStatus::Failed,
            _ => SummaryStatus::Batched,
        }
    }
}

/// Structured summary returned by a [`Summarizer`](crate::summarizer::Summarizer).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredSummary {
    #[serde(default)]
    pub tldr: String,
    #[serde(default)]
    pub motivation: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub conclusion: String,
    /// `Must`, `High`, `Medium`, `Low`, `Irrelevant`, or a number.
    #[serde(default)]
    pub relevance: String,
}

/// A stored summary row.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub summary_id: i64,
    pub paper_id: i64,
    pub version: i64,
    pub overview: String,
    pub motivation: String,
    pub method: String,
    pub result: String,
    pub conclusion: String,
    pub language: String,
    pub interests: String,
    pub relevance: i64,
    pub model: Option<String>,
    pub updated_at: String,
}

/// Outcome of crawling one date-category pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlCycleResult {
    pub category: String,
    pub date: String,
    pub papers_found: u64,
    pub papers_stored: u64,
    pub papers_failed: u64,
}

/// Audit log entry.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlEvent {
    pub event_id: i64,
    pub arxiv_id: Option<String>,
    pub event_type: String,
    pub detail: Option<String>,
    pub created_at: String,
}

/// Aggregate numbers for `ark stats` and `GET /v1/statistics`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStatistics {
    pub total_papers: i64,
    pub papers_with_summary: i64,
    pub papers_without_summary: i64,
    pub summary_coverage_percentage: f64,
    pub completed_date_categories: i64,
    pub failed_date_categories: i64,
    pub total_papers_found: i64,
    pub total_papers_stored: i64,
    pub failed_papers: i64,
    pub last_updated: String,
}

/// Aggregate progress of the historical crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlerProgress {
    pub total_papers_found: i64,
    pub total_papers_stored: i64,
    pub completed_date_categories: i64,
    pub failed_date_categories: i64,
}
