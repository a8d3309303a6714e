//! CLI command bodies for `ark`.
//!
//! Each `run_*` function opens the database, does its work through the
//! library modules and prints a human-readable report on stdout.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::arxiv_client::{date_category_query, ArxivClient};
use crate::arxiv_id::extract_arxiv_id;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::db;
use crate::explorer::{parse_categories, reference_date, RecentPapersTask};
use crate::historical::{CycleOutcome, HistoricalCrawlManager};
use crate::migrate;
use crate::models::Paper;
use crate::progress::ProgressMode;
use crate::service::CrawlService;
use crate::store::{self, PaperFilter};

async fn open_pool(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config).await?;
    migrate::create_schema(&pool).await?;
    Ok(pool)
}

fn build_crawler(config: &Config, pool: &SqlitePool, progress: ProgressMode) -> Result<Arc<Crawler>> {
    let crawler = Crawler::new(pool.clone(), Arc::new(config.clone()))?
        .with_reporter(Arc::from(progress.reporter()));
    Ok(Arc::new(crawler))
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}': expected YYYY-MM-DD", s))
}

// ============ ark crawl paper ============

pub async fn run_crawl_papers(
    config: &Config,
    identifiers: &[String],
    progress: ProgressMode,
) -> Result<()> {
    if identifiers.is_empty() {
        bail!("no identifiers given");
    }
    let pool = open_pool(config).await?;
    let crawler = build_crawler(config, &pool, progress)?;

    let mut stored = 0usize;
    for identifier in identifiers {
        match crawler.crawl_single_paper(identifier).await {
            Ok(Some(paper)) => {
                stored += 1;
                println!("{}  {}", paper.arxiv_id, paper.title);
            }
            Ok(None) => println!("{}  not found on arXiv", identifier),
            Err(e) => println!("{}  error: {:#}", identifier, e),
        }
    }

    println!();
    println!("{} / {} papers available", stored, identifiers.len());
    pool.close().await;
    Ok(())
}

// ============ ark crawl date ============

pub async fn run_crawl_date(
    config: &Config,
    category: &str,
    date: &str,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    let category = parse_categories(category)?
        .into_iter()
        .next()
        .context("no category given")?;
    let date = parse_date(date)?;

    if dry_run {
        let client = ArxivClient::new(&config.arxiv)?;
        let feed = client
            .search(&date_category_query(&category, date), 0, 1)
            .await?;
        println!(
            "{} {}: {} papers listed (dry run, nothing stored)",
            category,
            date,
            feed.total_results.unwrap_or(feed.papers.len() as u64)
        );
        return Ok(());
    }

    let pool = open_pool(config).await?;
    let crawler = build_crawler(config, &pool, progress)?;

    match crawler.crawl_date_category(&category, date).await {
        Ok(result) => {
            store::mark_completed(
                &pool,
                &category,
                date,
                result.papers_found,
                result.papers_stored,
                None,
            )
            .await?;
            println!(
                "{} {}: {} found, {} stored, {} failed",
                category, date, result.papers_found, result.papers_stored, result.papers_failed
            );
        }
        Err(e) => {
            store::mark_completed(&pool, &category, date, 0, 0, Some(&format!("{:#}", e)))
                .await?;
            pool.close().await;
            return Err(e);
        }
    }

    pool.close().await;
    Ok(())
}

// ============ ark crawl recent ============

pub async fn run_crawl_recent(
    config: &Config,
    date: Option<&str>,
    progress: ProgressMode,
) -> Result<()> {
    let date = match date {
        Some(d) => parse_date(d)?,
        None => reference_date(),
    };
    let pool = open_pool(config).await?;
    let crawler = build_crawler(config, &pool, progress)?;

    let summary = RecentPapersTask::new(crawler).run_for_date(date).await?;
    println!(
        "{}: {} categories, {} processed, {} stored, {} failed",
        date, summary.categories, summary.processed, summary.stored, summary.failed
    );

    pool.close().await;
    Ok(())
}

// ============ ark crawl historical ============

pub async fn run_crawl_historical(
    config: &Config,
    steps: usize,
    progress: ProgressMode,
) -> Result<()> {
    let pool = open_pool(config).await?;
    let crawler = build_crawler(config, &pool, progress)?;
    let manager = HistoricalCrawlManager::load(crawler).await?;

    for _ in 0..steps {
        match manager.run_crawl_cycle().await? {
            CycleOutcome::Crawled(r) => println!(
                "{} {}: {} found, {} stored",
                r.category, r.date, r.papers_found, r.papers_stored
            ),
            CycleOutcome::Failed {
                category,
                date,
                error,
            } => println!("{} {}: failed: {}", category, date, error),
            CycleOutcome::Finished => {
                println!("Historical crawl reached {}", config.crawler.historical_end_date);
                break;
            }
        }
    }

    let cursor = manager.cursor().await;
    let p = manager.progress().await?;
    println!();
    println!(
        "cursor: {} (category #{}); {} date-categories done, {} failed, {} papers stored",
        cursor.date,
        cursor.category_index,
        p.completed_date_categories,
        p.failed_date_categories,
        p.total_papers_stored
    );

    pool.close().await;
    Ok(())
}

// ============ ark run ============

/// Run the background loops until Ctrl-C.
pub async fn run_background(config: &Config) -> Result<()> {
    let pool = open_pool(config).await?;
    let crawler = build_crawler(config, &pool, ProgressMode::Off)?;
    let service = CrawlService::new(crawler).await?;

    service.start().await?;
    println!("Background crawl running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    println!("Stopping...");
    service.shutdown().await?;
    let p = service.progress().await?;
    println!(
        "{} date-categories done, {} papers stored",
        p.completed_date_categories, p.total_papers_stored
    );

    pool.close().await;
    Ok(())
}

// ============ ark papers / show / events ============

pub async fn run_papers(config: &Config, category: Option<String>, limit: i64) -> Result<()> {
    let pool = open_pool(config).await?;
    let page = store::list_papers(
        &pool,
        &PaperFilter {
            category,
            limit,
            offset: 0,
        },
    )
    .await?;

    if page.papers.is_empty() {
        println!("No papers stored.");
    } else {
        println!(
            "{:>6}  {:<16} {:<10} {:<10} TITLE",
            "ID", "ARXIV", "PUBLISHED", "CATEGORY"
        );
        for p in &page.papers {
            println!(
                "{:>6}  {:<16} {:<10} {:<10} {}",
                p.paper_id,
                p.arxiv_id,
                p.published_at.get(..10).unwrap_or(&p.published_at),
                p.primary_category,
                truncate_title(&p.title, 70)
            );
        }
        println!();
        println!("{} of {} papers", page.papers.len(), page.total);
    }

    pool.close().await;
    Ok(())
}

pub async fn run_show(config: &Config, identifier: &str) -> Result<()> {
    let pool = open_pool(config).await?;
    let paper = match identifier.parse::<i64>() {
        Ok(id) => store::get_paper(&pool, id).await?,
        Err(_) => store::get_paper_by_arxiv_id(&pool, &extract_arxiv_id(identifier)?).await?,
    };

    let Some(paper) = paper else {
        pool.close().await;
        bail!("paper not found: {}", identifier);
    };
    print_paper(&paper);

    if let Some(s) = store::latest_summary(&pool, paper.paper_id).await? {
        println!();
        println!("--- Summary (v{}, relevance {}/10) ---", s.version, s.relevance);
        println!("tldr:        {}", s.overview);
        println!("motivation:  {}", s.motivation);
        println!("method:      {}", s.method);
        println!("result:      {}", s.result);
        println!("conclusion:  {}", s.conclusion);
    }

    pool.close().await;
    Ok(())
}

fn print_paper(p: &Paper) {
    println!("--- Paper ---");
    println!("paper_id:    {}", p.paper_id);
    println!("arxiv_id:    {}", p.arxiv_id);
    println!("title:       {}", p.title);
    println!("authors:     {}", p.authors.replace(';', ", "));
    println!("categories:  {}", p.categories);
    println!("published:   {}", p.published_at);
    println!("updated:     {}", p.updated_at);
    println!("abs:         {}", p.url_abs);
    if let Some(ref pdf) = p.url_pdf {
        println!("pdf:         {}", pdf);
    }
    if let Some(ref doi) = p.doi {
        println!("doi:         {}", doi);
    }
    if let Some(ref journal) = p.journal_ref {
        println!("journal:     {}", journal);
    }
    println!("summary:     {}", p.summary_status.as_str());
    println!();
    println!("{}", p.abstract_text);
}

pub async fn run_events(config: &Config, limit: i64) -> Result<()> {
    let pool = open_pool(config).await?;
    let events = store::recent_events(&pool, limit).await?;

    if events.is_empty() {
        println!("No crawl events.");
    }
    for e in events.iter().rev() {
        println!(
            "{}  {:<16} {:<18} {}",
            e.created_at,
            e.event_type,
            e.arxiv_id.as_deref().unwrap_or("-"),
            e.detail.as_deref().unwrap_or("")
        );
    }

    pool.close().await;
    Ok(())
}

fn truncate_title(title: &str, max_chars: usize) -> String {
    match title.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &title[..idx]),
        None => title.to_string(),
    }
}
