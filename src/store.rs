//! SQLite repository for papers, summaries and crawl bookkeeping.
//!
//! All functions take a borrowed pool so the crawler, the HTTP handlers and
//! the CLI can share one. Timestamps are stored as `%Y-%m-%dT%H:%M:%SZ`
//! text and calendar days as `%Y-%m-%d`.
//!
//! Deduplication of papers relies on the `UNIQUE(arxiv_id)` index and
//! `INSERT ... ON CONFLICT DO NOTHING`; two crawls racing on the same id
//! both succeed and only one row is written.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::models::{
    ArxivPaper, CrawlEvent, CrawlStatistics, CrawlerProgress, Paper, StructuredSummary, Summary,
    SummaryStatus,
};
use crate::summarizer::relevance_score;

pub const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn format_day(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_FORMAT).with_context(|| format!("bad stored date: {}", s))
}

// ============ Papers ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted(i64),
    Duplicate(i64),
}

impl StoreOutcome {
    pub fn paper_id(&self) -> i64 {
        match self {
            StoreOutcome::Inserted(id) | StoreOutcome::Duplicate(id) => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StoreOutcome::Inserted(_))
    }
}

pub async fn insert_paper(pool: &SqlitePool, paper: &ArxivPaper) -> Result<StoreOutcome> {
    let result = sqlx::query(
        r#"
        INSERT INTO papers (arxiv_id, title, abstract, primary_category, categories, authors,
                            url_abs, url_pdf, doi, comment, journal_ref,
                            published_at, updated_at, summary_status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'batched', ?)
        ON CONFLICT(arxiv_id) DO NOTHING
        "#,
    )
    .bind(&paper.arxiv_id)
    .bind(&paper.title)
    .bind(&paper.abstract_text)
    .bind(&paper.primary_category)
    .bind(paper.categories.join(","))
    .bind(paper.authors.join(";"))
    .bind(&paper.url_abs)
    .bind(&paper.url_pdf)
    .bind(&paper.doi)
    .bind(&paper.comment)
    .bind(&paper.journal_ref)
    .bind(&paper.published_at)
    .bind(&paper.updated_at)
    .bind(now_iso())
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert paper {}", paper.arxiv_id))?;

    if result.rows_affected() == 1 {
        return Ok(StoreOutcome::Inserted(result.last_insert_rowid()));
    }

    let existing: i64 = sqlx::query_scalar("SELECT paper_id FROM papers WHERE arxiv_id = ?")
        .bind(&paper.arxiv_id)
        .fetch_one(pool)
        .await?;
    Ok(StoreOutcome::Duplicate(existing))
}

const PAPER_COLUMNS: &str = "paper_id, arxiv_id, title, abstract, primary_category, categories, \
     authors, url_abs, url_pdf, doi, comment, journal_ref, published_at, updated_at, \
     summary_status, created_at";

fn paper_from_row(row: &SqliteRow) -> Paper {
    let status: String = row.get("summary_status");
    Paper {
        paper_id: row.get("paper_id"),
        arxiv_id: row.get("arxiv_id"),
        title: row.get("title"),
        abstract_text: row.get("abstract"),
        primary_category: row.get("primary_category"),
        categories: row.get("categories"),
        authors: row.get("authors"),
        url_abs: row.get("url_abs"),
        url_pdf: row.get("url_pdf"),
        doi: row.get("doi"),
        comment: row.get("comment"),
        journal_ref: row.get("journal_ref"),
        published_at: row.get("published_at"),
        updated_at: row.get("updated_at"),
        summary_status: SummaryStatus::parse(&status),
        created_at: row.get("created_at"),
    }
}

pub async fn get_paper(pool: &SqlitePool, paper_id: i64) -> Result<Option<Paper>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM papers WHERE paper_id = ?",
        PAPER_COLUMNS
    ))
    .bind(paper_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(paper_from_row))
}

pub async fn get_paper_by_arxiv_id(pool: &SqlitePool, arxiv_id: &str) -> Result<Option<Paper>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM papers WHERE arxiv_id = ?",
        PAPER_COLUMNS
    ))
    .bind(arxiv_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(paper_from_row))
}

#[derive(Debug, Clone)]
pub struct PaperFilter {
    /// Matches the primary category or any listed category.
    pub category: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for PaperFilter {
    fn default() -> Self {
        Self {
            category: None,
            limit: 20,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperPage {
    pub papers: Vec<Paper>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

const CATEGORY_MATCH: &str =
    "(?1 IS NULL OR primary_category = ?1 OR (',' || categories || ',') LIKE ('%,' || ?1 || ',%'))";

/// Newest `published_at` first.
pub async fn list_papers(pool: &SqlitePool, filter: &PaperFilter) -> Result<PaperPage> {
    let limit = filter.limit.clamp(1, 500);
    let offset = filter.offset.max(0);

    let rows = sqlx::query(&format!(
        "SELECT {} FROM papers WHERE {} ORDER BY published_at DESC, paper_id DESC LIMIT ?2 OFFSET ?3",
        PAPER_COLUMNS, CATEGORY_MATCH
    ))
    .bind(&filter.category)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM papers WHERE {}",
        CATEGORY_MATCH
    ))
    .bind(&filter.category)
    .fetch_one(pool)
    .await?;

    Ok(PaperPage {
        papers: rows.iter().map(paper_from_row).collect(),
        total,
        limit,
        offset,
    })
}

pub async fn count_papers(pool: &SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM papers")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

// ============ Daily progress ============

/// Position of the recent-papers monitor within one category's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryProgress {
    pub date: NaiveDate,
    pub index: u64,
}

/// Progress for `category` on `date`. A missing row, or a row for another
/// day, starts from index 0.
pub async fn load_crawl_progress(
    pool: &SqlitePool,
    category: &str,
    date: NaiveDate,
) -> Result<CategoryProgress> {
    let row = sqlx::query(
        "SELECT last_crawled_date, last_crawled_index FROM crawl_progress WHERE category = ?",
    )
    .bind(category)
    .fetch_optional(pool)
    .await?;

    let index = match row {
        Some(row) => {
            let stored: String = row.get("last_crawled_date");
            let index: i64 = row.get("last_crawled_index");
            if stored == format_day(date) {
                index.max(0) as u64
            } else {
                0
            }
        }
        None => 0,
    };

    Ok(CategoryProgress { date, index })
}

pub async fn save_crawl_progress(
    pool: &SqlitePool,
    category: &str,
    date: NaiveDate,
    index: u64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO crawl_progress (category, last_crawled_date, last_crawled_index, is_active, updated_at)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT(category) DO UPDATE SET
            last_crawled_date = excluded.last_crawled_date,
            last_crawled_index = excluded.last_crawled_index,
            is_active = 1,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(category)
    .bind(format_day(date))
    .bind(index as i64)
    .bind(now_iso())
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark the category-day as exhausted. The saved index stays so a later
/// pass over the same day only asks for papers past it.
pub async fn finish_crawl_progress(
    pool: &SqlitePool,
    category: &str,
    date: NaiveDate,
    index: u64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO crawl_progress (category, last_crawled_date, last_crawled_index, is_active, updated_at)
        VALUES (?, ?, ?, 0, ?)
        ON CONFLICT(category) DO UPDATE SET
            last_crawled_date = excluded.last_crawled_date,
            last_crawled_index = excluded.last_crawled_index,
            is_active = 0,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(category)
    .bind(format_day(date))
    .bind(index as i64)
    .bind(now_iso())
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryProgressRow {
    pub category: String,
    pub last_crawled_date: String,
    pub last_crawled_index: i64,
    pub is_active: bool,
    pub updated_at: String,
}

pub async fn list_crawl_progress(pool: &SqlitePool) -> Result<Vec<CategoryProgressRow>> {
    let rows = sqlx::query(
        "SELECT category, last_crawled_date, last_crawled_index, is_active, updated_at \
         FROM crawl_progress ORDER BY category",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CategoryProgressRow {
            category: row.get("category"),
            last_crawled_date: row.get("last_crawled_date"),
            last_crawled_index: row.get("last_crawled_index"),
            is_active: row.get::<i64, _>("is_active") != 0,
            updated_at: row.get("updated_at"),
        })
        .collect())
}

// ============ Failed papers ============

/// First failure inserts with `retry_count = 0`; repeats bump the count.
pub async fn record_failed_paper(
    pool: &SqlitePool,
    arxiv_id: &str,
    category: &str,
    message: &str,
) -> Result<()> {
    let now = now_iso();
    sqlx::query(
        r#"
        INSERT INTO failed_papers (arxiv_id, category, error_message, retry_count, created_at, updated_at)
        VALUES (?, ?, ?, 0, ?, ?)
        ON CONFLICT(arxiv_id) DO UPDATE SET
            error_message = excluded.error_message,
            retry_count = failed_papers.retry_count + 1,
            last_retry_at = excluded.updated_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(arxiv_id)
    .bind(category)
    .bind(message)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_failed_paper(pool: &SqlitePool, arxiv_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM failed_papers WHERE arxiv_id = ?")
        .bind(arxiv_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPaper {
    pub arxiv_id: String,
    pub category: String,
    pub error_message: String,
    pub retry_count: i64,
    pub last_retry_at: Option<String>,
}

pub async fn failed_papers(pool: &SqlitePool, limit: i64) -> Result<Vec<FailedPaper>> {
    let rows = sqlx::query(
        "SELECT arxiv_id, category, error_message, retry_count, last_retry_at \
         FROM failed_papers ORDER BY updated_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| FailedPaper {
            arxiv_id: row.get("arxiv_id"),
            category: row.get("category"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            last_retry_at: row.get("last_retry_at"),
        })
        .collect())
}

// ============ Completions ============

pub async fn mark_completed(
    pool: &SqlitePool,
    category: &str,
    date: NaiveDate,
    papers_found: u64,
    papers_stored: u64,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO crawl_completions (category, date, papers_found, papers_stored, error_message, completed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(category, date) DO UPDATE SET
            papers_found = excluded.papers_found,
            papers_stored = excluded.papers_stored,
            error_message = excluded.error_message,
            completed_at = excluded.completed_at
        "#,
    )
    .bind(category)
    .bind(format_day(date))
    .bind(papers_found as i64)
    .bind(papers_stored as i64)
    .bind(error_message)
    .bind(now_iso())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn is_completed(pool: &SqlitePool, category: &str, date: NaiveDate) -> Result<bool> {
    let n: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM crawl_completions \
         WHERE category = ? AND date = ? AND error_message IS NULL",
    )
    .bind(category)
    .bind(format_day(date))
    .fetch_one(pool)
    .await?;
    Ok(n > 0)
}

/// Successfully completed `(category, date)` pairs restricted to
/// `categories`. Pairs whose last attempt failed are left out.
pub async fn completed_pairs(
    pool: &SqlitePool,
    categories: &[String],
) -> Result<HashSet<(String, NaiveDate)>> {
    let rows = sqlx::query(
        "SELECT category, date FROM crawl_completions WHERE error_message IS NULL",
    )
    .fetch_all(pool)
    .await?;

    let mut pairs = HashSet::new();
    for row in rows {
        let category: String = row.get("category");
        if !categories.contains(&category) {
            continue;
        }
        let date: String = row.get("date");
        pairs.insert((category, parse_day(&date)?));
    }
    Ok(pairs)
}

pub async fn crawler_progress(pool: &SqlitePool) -> Result<CrawlerProgress> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(papers_found), 0) AS found,
            COALESCE(SUM(papers_stored), 0) AS stored,
            COALESCE(SUM(CASE WHEN error_message IS NULL THEN 1 ELSE 0 END), 0) AS completed,
            COALESCE(SUM(CASE WHEN error_message IS NOT NULL THEN 1 ELSE 0 END), 0) AS failed
        FROM crawl_completions
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(CrawlerProgress {
        total_papers_found: row.get("found"),
        total_papers_stored: row.get("stored"),
        completed_date_categories: row.get("completed"),
        failed_date_categories: row.get("failed"),
    })
}

// ============ Historical cursor ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoricalCursor {
    pub date: NaiveDate,
    pub category_index: usize,
}

/// The stored cursor, or `default_date` at index 0 when none was saved.
pub async fn load_historical_cursor(
    pool: &SqlitePool,
    default_date: NaiveDate,
) -> Result<HistoricalCursor> {
    let row = sqlx::query(
        "SELECT historical_date, historical_category_index FROM crawl_state WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let date: String = row.get("historical_date");
            let index: i64 = row.get("historical_category_index");
            Ok(HistoricalCursor {
                date: parse_day(&date)?,
                category_index: index.max(0) as usize,
            })
        }
        None => Ok(HistoricalCursor {
            date: default_date,
            category_index: 0,
        }),
    }
}

pub async fn save_historical_cursor(pool: &SqlitePool, cursor: HistoricalCursor) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO crawl_state (id, historical_date, historical_category_index, updated_at)
        VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            historical_date = excluded.historical_date,
            historical_category_index = excluded.historical_category_index,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(format_day(cursor.date))
    .bind(cursor.category_index as i64)
    .bind(now_iso())
    .execute(pool)
    .await?;
    Ok(())
}

// ============ Events ============

pub async fn log_event(
    pool: &SqlitePool,
    arxiv_id: Option<&str>,
    event_type: &str,
    detail: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO crawl_events (arxiv_id, event_type, detail, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(arxiv_id)
    .bind(event_type)
    .bind(detail)
    .bind(now_iso())
    .execute(pool)
    .await?;
    Ok(())
}

/// Newest first.
pub async fn recent_events(pool: &SqlitePool, limit: i64) -> Result<Vec<CrawlEvent>> {
    let rows = sqlx::query(
        "SELECT event_id, arxiv_id, event_type, detail, created_at \
         FROM crawl_events ORDER BY event_id DESC LIMIT ?",
    )
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CrawlEvent {
            event_id: row.get("event_id"),
            arxiv_id: row.get("arxiv_id"),
            event_type: row.get("event_type"),
            detail: row.get("detail"),
            created_at: row.get("created_at"),
        })
        .collect())
}

// ============ Summaries ============

/// Store a new summary version and mark the paper `done`.
pub async fn insert_summary(
    pool: &SqlitePool,
    paper_id: i64,
    summary: &StructuredSummary,
    language: &str,
    interests: &str,
    model: Option<&str>,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let version: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM summaries WHERE paper_id = ?",
    )
    .bind(paper_id)
    .fetch_one(&mut *tx)
    .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO summaries (paper_id, version, overview, motivation, method, result,
                               conclusion, language, interests, relevance, model, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(paper_id)
    .bind(version)
    .bind(&summary.tldr)
    .bind(&summary.motivation)
    .bind(&summary.method)
    .bind(&summary.result)
    .bind(&summary.conclusion)
    .bind(language)
    .bind(interests)
    .bind(relevance_score(&summary.relevance))
    .bind(model)
    .bind(now_iso())
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE papers SET summary_status = ? WHERE paper_id = ?")
        .bind(SummaryStatus::Done.as_str())
        .bind(paper_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.last_insert_rowid())
}

pub async fn latest_summary(pool: &SqlitePool, paper_id: i64) -> Result<Option<Summary>> {
    let row = sqlx::query(
        r#"
        SELECT summary_id, paper_id, version, overview, motivation, method, result, conclusion,
               language, interests, relevance, model, updated_at
        FROM summaries WHERE paper_id = ?
        ORDER BY version DESC LIMIT 1
        "#,
    )
    .bind(paper_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Summary {
        summary_id: row.get("summary_id"),
        paper_id: row.get("paper_id"),
        version: row.get("version"),
        overview: row.get("overview"),
        motivation: row.get("motivation"),
        method: row.get("method"),
        result: row.get("result"),
        conclusion: row.get("conclusion"),
        language: row.get("language"),
        interests: row.get("interests"),
        relevance: row.get("relevance"),
        model: row.get("model"),
        updated_at: row.get("updated_at"),
    }))
}

pub async fn set_summary_status(
    pool: &SqlitePool,
    paper_id: i64,
    status: SummaryStatus,
) -> Result<()> {
    sqlx::query("UPDATE papers SET summary_status = ? WHERE paper_id = ?")
        .bind(status.as_str())
        .bind(paper_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ============ Statistics ============

pub async fn crawl_statistics(pool: &SqlitePool) -> Result<CrawlStatistics> {
    let total_papers = count_papers(pool).await?;
    let papers_with_summary: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT paper_id) FROM summaries")
            .fetch_one(pool)
            .await?;
    let failed_papers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM failed_papers")
        .fetch_one(pool)
        .await?;
    let progress = crawler_progress(pool).await?;

    let summary_coverage_percentage = if total_papers > 0 {
        let pct = papers_with_summary as f64 * 100.0 / total_papers as f64;
        (pct * 100.0).round() / 100.0
    } else {
        0.0
    };

    Ok(CrawlStatistics {
        total_papers,
        papers_with_summary,
        papers_without_summary: total_papers - papers_with_summary,
        summary_coverage_percentage,
        completed_date_categories: progress.completed_date_categories,
        failed_date_categories: progress.failed_date_categories,
        total_papers_found: progress.total_papers_found,
        total_papers_stored: progress.total_papers_stored,
        failed_papers,
        last_updated: now_iso(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    fn paper(id: &str, category: &str, published: &str) -> ArxivPaper {
        ArxivPaper {
            arxiv_id: id.to_string(),
            title: format!("Paper {}", id),
            abstract_text: "Abstract.".to_string(),
            authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
            categories: vec![category.to_string(), "stat.ML".to_string()],
            primary_category: category.to_string(),
            published_at: published.to_string(),
            updated_at: published.to_string(),
            url_abs: format!("https://arxiv.org/abs/{}", id),
            url_pdf: format!("https://arxiv.org/pdf/{}", id),
            doi: None,
            comment: None,
            journal_ref: None,
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DAY_FORMAT).unwrap()
    }

    #[tokio::test]
    async fn insert_deduplicates_by_arxiv_id() {
        let pool = pool().await;
        let p = paper("2401.00001", "cs.AI", "2024-01-01T00:00:00Z");

        let first = insert_paper(&pool, &p).await.unwrap();
        let second = insert_paper(&pool, &p).await.unwrap();
        assert!(first.is_new());
        assert_eq!(second, StoreOutcome::Duplicate(first.paper_id()));
        assert_eq!(count_papers(&pool).await.unwrap(), 1);

        let stored = get_paper_by_arxiv_id(&pool, "2401.00001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.paper_id, first.paper_id());
        assert_eq!(stored.authors, "Ada Lovelace;Alan Turing");
        assert_eq!(stored.categories, "cs.AI,stat.ML");
        assert_eq!(stored.summary_status, SummaryStatus::Batched);
    }

    #[tokio::test]
    async fn list_filters_by_any_category_newest_first() {
        let pool = pool().await;
        insert_paper(&pool, &paper("2401.00001", "cs.AI", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        insert_paper(&pool, &paper("2401.00002", "cs.CL", "2024-01-03T00:00:00Z"))
            .await
            .unwrap();
        insert_paper(&pool, &paper("2401.00003", "cs.AI", "2024-01-02T00:00:00Z"))
            .await
            .unwrap();

        let page = list_papers(
            &pool,
            &PaperFilter {
                category: Some("cs.AI".to_string()),
                ..PaperFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 2);
        let ids: Vec<_> = page.papers.iter().map(|p| p.arxiv_id.as_str()).collect();
        assert_eq!(ids, vec!["2401.00003", "2401.00001"]);

        // Secondary categories match too; "stat.M" must not.
        let all = list_papers(
            &pool,
            &PaperFilter {
                category: Some("stat.ML".to_string()),
                ..PaperFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(all.total, 3);
        let none = list_papers(
            &pool,
            &PaperFilter {
                category: Some("stat.M".to_string()),
                ..PaperFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(none.total, 0);

        let paged = list_papers(
            &pool,
            &PaperFilter {
                category: None,
                limit: 1,
                offset: 1,
            },
        )
        .await
        .unwrap();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.papers[0].arxiv_id, "2401.00003");
    }

    #[tokio::test]
    async fn progress_resets_on_new_day() {
        let pool = pool().await;
        let d1 = day("2024-05-01");
        let d2 = day("2024-05-02");

        assert_eq!(load_crawl_progress(&pool, "cs.AI", d1).await.unwrap().index, 0);
        save_crawl_progress(&pool, "cs.AI", d1, 42).await.unwrap();
        assert_eq!(load_crawl_progress(&pool, "cs.AI", d1).await.unwrap().index, 42);
        assert_eq!(load_crawl_progress(&pool, "cs.AI", d2).await.unwrap().index, 0);
        assert_eq!(load_crawl_progress(&pool, "cs.CL", d1).await.unwrap().index, 0);

        let rows = list_crawl_progress(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_crawled_date, "2024-05-01");
        assert!(rows[0].is_active);

        finish_crawl_progress(&pool, "cs.AI", d1, 50).await.unwrap();
        let rows = list_crawl_progress(&pool).await.unwrap();
        assert!(!rows[0].is_active);
        assert_eq!(rows[0].last_crawled_index, 50);
        assert_eq!(load_crawl_progress(&pool, "cs.AI", d1).await.unwrap().index, 50);
    }

    #[tokio::test]
    async fn failed_papers_count_retries() {
        let pool = pool().await;
        record_failed_paper(&pool, "2401.00009", "cs.AI", "boom").await.unwrap();
        record_failed_paper(&pool, "2401.00009", "cs.AI", "boom again")
            .await
            .unwrap();

        let failed = failed_papers(&pool, 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].retry_count, 1);
        assert_eq!(failed[0].error_message, "boom again");
        assert!(failed[0].last_retry_at.is_some());

        clear_failed_paper(&pool, "2401.00009").await.unwrap();
        assert!(failed_papers(&pool, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completions_and_progress_totals() {
        let pool = pool().await;
        let d = day("2023-12-31");
        mark_completed(&pool, "cs.AI", d, 10, 8, None).await.unwrap();
        mark_completed(&pool, "cs.CL", d, 0, 0, Some("HTTP 500"))
            .await
            .unwrap();
        mark_completed(&pool, "cs.AI", d, 12, 12, None).await.unwrap();

        assert!(is_completed(&pool, "cs.AI", d).await.unwrap());
        assert!(!is_completed(&pool, "cs.LG", d).await.unwrap());
        // A failed attempt does not count as done.
        assert!(!is_completed(&pool, "cs.CL", d).await.unwrap());

        let both = ["cs.AI".to_string(), "cs.CL".to_string()];
        assert_eq!(completed_pairs(&pool, &both).await.unwrap().len(), 1);

        let pairs = completed_pairs(&pool, &["cs.AI".to_string()]).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs.contains(&("cs.AI".to_string(), d)));

        let progress = crawler_progress(&pool).await.unwrap();
        assert_eq!(
            progress,
            CrawlerProgress {
                total_papers_found: 12,
                total_papers_stored: 12,
                completed_date_categories: 1,
                failed_date_categories: 1,
            }
        );
    }

    #[tokio::test]
    async fn historical_cursor_roundtrip() {
        let pool = pool().await;
        let default = day("2024-06-01");
        let cursor = load_historical_cursor(&pool, default).await.unwrap();
        assert_eq!(cursor.date, default);
        assert_eq!(cursor.category_index, 0);

        let saved = HistoricalCursor {
            date: day("2024-05-20"),
            category_index: 3,
        };
        save_historical_cursor(&pool, saved).await.unwrap();
        assert_eq!(load_historical_cursor(&pool, default).await.unwrap(), saved);
    }

    #[tokio::test]
    async fn summaries_are_versioned() {
        let pool = pool().await;
        let id = insert_paper(&pool, &paper("2401.00001", "cs.AI", "2024-01-01T00:00:00Z"))
            .await
            .unwrap()
            .paper_id();

        let s = StructuredSummary {
            tldr: "Short.".into(),
            relevance: "High".into(),
            ..StructuredSummary::default()
        };
        insert_summary(&pool, id, &s, "English", "ML", Some("gpt-4o-mini"))
            .await
            .unwrap();
        insert_summary(&pool, id, &s, "English", "ML", None).await.unwrap();

        let latest = latest_summary(&pool, id).await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.relevance, 8);
        assert_eq!(latest.overview, "Short.");

        let paper = get_paper(&pool, id).await.unwrap().unwrap();
        assert_eq!(paper.summary_status, SummaryStatus::Done);

        let stats = crawl_statistics(&pool).await.unwrap();
        assert_eq!(stats.total_papers, 1);
        assert_eq!(stats.papers_with_summary, 1);
        assert_eq!(stats.summary_coverage_percentage, 100.0);
    }

    #[tokio::test]
    async fn events_newest_first() {
        let pool = pool().await;
        log_event(&pool, Some("2401.00001"), "FOUND", None).await.unwrap();
        log_event(&pool, Some("2401.00001"), "STORED", Some("paper_id=1"))
            .await
            .unwrap();
        let events = recent_events(&pool, 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "STORED");
        assert_eq!(events[1].event_type, "FOUND");
        assert_eq!(recent_events(&pool, 1).await.unwrap().len(), 1);
    }
}
