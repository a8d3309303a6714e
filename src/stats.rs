//! Database statistics and crawl health overview.
//!
//! `ark stats` prints paper counts, summary coverage, historical crawl
//! totals and per-category daily progress, so an operator can tell at a
//! glance whether the background loop is keeping up.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::store;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::create_schema(&pool).await?;

    let stats = store::crawl_statistics(&pool).await?;
    let progress_rows = store::list_crawl_progress(&pool).await?;
    let cursor = store::load_historical_cursor(&pool, crate::explorer::reference_date()).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("TheArk Database Stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Papers:      {}", stats.total_papers);
    println!(
        "  Summarized:  {} / {} ({:.1}%)",
        stats.papers_with_summary, stats.total_papers, stats.summary_coverage_percentage
    );
    println!("  Failed:      {} papers", stats.failed_papers);
    println!();
    println!("  Historical crawl:");
    println!(
        "    cursor:     {} (category #{})",
        cursor.date, cursor.category_index
    );
    println!(
        "    completed:  {} date-categories ({} failed)",
        stats.completed_date_categories, stats.failed_date_categories
    );
    println!(
        "    papers:     {} found, {} stored",
        stats.total_papers_found, stats.total_papers_stored
    );

    if !progress_rows.is_empty() {
        println!();
        println!("  Daily monitor:");
        println!(
            "  {:<12} {:<12} {:>8}   {}",
            "CATEGORY", "DATE", "INDEX", "UPDATED"
        );
        println!("  {}", "-".repeat(56));
        for row in &progress_rows {
            println!(
                "  {:<12} {:<12} {:>8}   {}",
                row.category,
                row.last_crawled_date,
                row.last_crawled_index,
                format_ts_relative(&row.updated_at)
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" for recent stored timestamps, the raw value otherwise.
fn format_ts_relative(iso: &str) -> String {
    let ts = match chrono::DateTime::parse_from_rfc3339(iso) {
        Ok(dt) => dt.timestamp(),
        Err(_) => return iso.to_string(),
    };
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        iso.to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        iso.to_string()
    }
}
