use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Papers, deduplicated by arXiv id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS papers (
            paper_id INTEGER PRIMARY KEY AUTOINCREMENT,
            arxiv_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            abstract TEXT NOT NULL,
            primary_category TEXT NOT NULL,
            categories TEXT NOT NULL,
            authors TEXT NOT NULL,
            url_abs TEXT NOT NULL,
            url_pdf TEXT,
            doi TEXT,
            comment TEXT,
            journal_ref TEXT,
            published_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            summary_status TEXT NOT NULL DEFAULT 'batched',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            summary_id INTEGER PRIMARY KEY AUTOINCREMENT,
            paper_id INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            overview TEXT NOT NULL,
            motivation TEXT NOT NULL,
            method TEXT NOT NULL,
            result TEXT NOT NULL,
            conclusion TEXT NOT NULL,
            language TEXT NOT NULL,
            interests TEXT NOT NULL,
            relevance INTEGER NOT NULL,
            model TEXT,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (paper_id) REFERENCES papers(paper_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-category progress of the daily monitor
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawl_progress (
            category TEXT PRIMARY KEY,
            last_crawled_date TEXT NOT NULL,
            last_crawled_index INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Finished date-category pairs of the historical crawl
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawl_completions (
            completion_id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            date TEXT NOT NULL,
            papers_found INTEGER NOT NULL DEFAULT 0,
            papers_stored INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            completed_at TEXT NOT NULL,
            UNIQUE(category, date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS failed_papers (
            failed_id INTEGER PRIMARY KEY AUTOINCREMENT,
            arxiv_id TEXT NOT NULL UNIQUE,
            category TEXT NOT NULL,
            error_message TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_retry_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single-row cursor of the historical crawl
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawl_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            historical_date TEXT NOT NULL,
            historical_category_index INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawl_events (
            event_id INTEGER PRIMARY KEY AUTOINCREMENT,
            arxiv_id TEXT,
            event_type TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_papers_primary_category ON papers(primary_category)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_papers_published_at ON papers(published_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_papers_summary_status ON papers(summary_status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_summaries_paper_id ON summaries(paper_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_crawl_events_created_at ON crawl_events(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
