//! Historical crawl cursor, completions and the background service.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use theark::historical::{CycleOutcome, HistoricalCrawlManager, HistoricalTask};
use theark::scheduler::{PeriodicTaskManager, TaskStatus};
use theark::service::CrawlService;
use theark::store::{self, HistoricalCursor};

async fn with_end_date(end: &'static str) -> Harness {
    Harness::start_with(|c| c.crawler.historical_end_date = end.to_string()).await
}

#[tokio::test]
async fn walks_categories_then_days_back_to_end_date() {
    let h = with_end_date("2024-04-30").await;
    mount_page(&h.server, "cs.AI", 0, 1, &["2405.00001"]).await;
    mount_page(&h.server, "cs.LG", 0, 1, &["2405.00002"]).await;

    let manager = HistoricalCrawlManager::load_from(h.crawler.clone(), day("2024-05-01"))
        .await
        .unwrap();
    assert_eq!(
        manager.next_date_category().await,
        Some((day("2024-05-01"), "cs.AI".to_string()))
    );

    let mut visited = Vec::new();
    loop {
        match manager.run_crawl_cycle().await.unwrap() {
            CycleOutcome::Crawled(r) => visited.push((r.date, r.category)),
            CycleOutcome::Failed { error, .. } => panic!("unexpected failure: {}", error),
            CycleOutcome::Finished => break,
        }
    }
    assert_eq!(
        visited,
        vec![
            ("2024-05-01".to_string(), "cs.AI".to_string()),
            ("2024-05-01".to_string(), "cs.LG".to_string()),
            ("2024-04-30".to_string(), "cs.AI".to_string()),
            ("2024-04-30".to_string(), "cs.LG".to_string()),
        ]
    );
    assert_eq!(manager.next_date_category().await, None);

    let progress = manager.progress().await.unwrap();
    assert_eq!(progress.completed_date_categories, 4);
    assert_eq!(progress.failed_date_categories, 0);
    assert_eq!(progress.total_papers_found, 4);
    assert_eq!(store::count_papers(&h.pool).await.unwrap(), 2);
}

#[tokio::test]
async fn cursor_survives_a_restart() {
    let h = with_end_date("2024-01-01").await;
    mount_page(&h.server, "cs.AI", 0, 0, &[]).await;

    let first = HistoricalCrawlManager::load_from(h.crawler.clone(), day("2024-05-01"))
        .await
        .unwrap();
    first.run_crawl_cycle().await.unwrap();
    assert_eq!(
        first.cursor().await,
        HistoricalCursor {
            date: day("2024-05-01"),
            category_index: 1,
        }
    );

    // The start date is ignored once a cursor is stored.
    let second = HistoricalCrawlManager::load_from(h.crawler.clone(), day("2024-06-01"))
        .await
        .unwrap();
    assert_eq!(second.cursor().await, first.cursor().await);
}

#[tokio::test]
async fn completed_pairs_are_skipped() {
    let h = with_end_date("2024-01-01").await;
    mount_page(&h.server, "cs.LG", 0, 1, &["2405.00002"]).await;
    store::mark_completed(&h.pool, "cs.AI", day("2024-05-01"), 5, 5, None)
        .await
        .unwrap();

    let manager = HistoricalCrawlManager::load_from(h.crawler.clone(), day("2024-05-01"))
        .await
        .unwrap();
    match manager.run_crawl_cycle().await.unwrap() {
        CycleOutcome::Crawled(r) => assert_eq!(r.category, "cs.LG"),
        other => panic!("expected a crawl, got {:?}", other),
    }
    assert!(h
        .requests()
        .await
        .iter()
        .all(|r| !r.url.query().unwrap_or_default().contains("cat:cs.AI")));
}

#[tokio::test]
async fn failed_step_is_recorded_and_retried_later() {
    let h = with_end_date("2024-01-01").await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad query"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    mount_page(&h.server, "cs.AI", 0, 1, &["2405.00001"]).await;

    let manager = HistoricalCrawlManager::load_from(h.crawler.clone(), day("2024-05-01"))
        .await
        .unwrap();
    match manager.run_crawl_cycle().await.unwrap() {
        CycleOutcome::Failed { category, date, .. } => {
            assert_eq!(category, "cs.AI");
            assert_eq!(date, day("2024-05-01"));
        }
        other => panic!("expected a failure, got {:?}", other),
    }

    assert_eq!(manager.cursor().await.category_index, 1);
    assert!(!store::is_completed(&h.pool, "cs.AI", day("2024-05-01"))
        .await
        .unwrap());
    assert_eq!(
        manager.progress().await.unwrap().failed_date_categories,
        1
    );

    // Rewind; the failed pair is crawled again instead of skipped.
    store::save_historical_cursor(
        &h.pool,
        HistoricalCursor {
            date: day("2024-05-01"),
            category_index: 0,
        },
    )
    .await
    .unwrap();
    let restarted = HistoricalCrawlManager::load(h.crawler.clone()).await.unwrap();
    match restarted.run_crawl_cycle().await.unwrap() {
        CycleOutcome::Crawled(r) => {
            assert_eq!(r.category, "cs.AI");
            assert_eq!(r.papers_stored, 1);
        }
        other => panic!("expected a crawl, got {:?}", other),
    }

    let progress = restarted.progress().await.unwrap();
    assert_eq!(progress.completed_date_categories, 1);
    assert_eq!(progress.failed_date_categories, 0);
}

#[tokio::test]
async fn recorded_failure_does_not_block_a_pair() {
    let h = with_end_date("2024-01-01").await;
    mount_page(&h.server, "cs.AI", 0, 1, &["2405.00001"]).await;
    store::mark_completed(
        &h.pool,
        "cs.AI",
        day("2024-05-01"),
        0,
        0,
        Some("HTTP 503 outage"),
    )
    .await
    .unwrap();

    let manager = HistoricalCrawlManager::load_from(h.crawler.clone(), day("2024-05-01"))
        .await
        .unwrap();
    match manager.run_crawl_cycle().await.unwrap() {
        CycleOutcome::Crawled(r) => assert_eq!(r.category, "cs.AI"),
        other => panic!("expected a crawl, got {:?}", other),
    }
    assert!(store::is_completed(&h.pool, "cs.AI", day("2024-05-01"))
        .await
        .unwrap());
}

#[tokio::test]
async fn repeated_failures_halt_the_loop() {
    let h = with_end_date("2024-01-01").await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(400))
        .mount(&h.server)
        .await;

    let manager = Arc::new(
        HistoricalCrawlManager::load_from(h.crawler.clone(), day("2024-05-01"))
            .await
            .unwrap(),
    );
    let tasks = PeriodicTaskManager::new(
        Arc::new(HistoricalTask::new(manager.clone())),
        Duration::ZERO,
        Duration::from_millis(5),
        3,
    );
    assert!(tasks.start_periodic().await.unwrap());

    tokio::time::timeout(Duration::from_secs(10), async {
        while tasks.is_running().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("loop halts");

    let status = tasks.status().await;
    assert_eq!(status.status, TaskStatus::Error);
    assert_eq!(status.stats.consecutive_errors, 3);
    assert_eq!(manager.progress().await.unwrap().failed_date_categories, 3);
}

#[tokio::test]
async fn service_start_and_stop() {
    let h = Harness::start_with(|c| {
        c.crawler.enable_recent = false;
        c.crawler.historical_delay_secs = 3600;
        c.crawler.historical_end_date = "2024-01-01".to_string();
    })
    .await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(atom(feed(0, 0, &[])))
        .mount(&h.server)
        .await;

    let service = CrawlService::new(h.crawler.clone()).await.unwrap();
    assert!(!service.is_running().await);

    assert!(!service.start().await.unwrap().was_already_running);
    assert!(service.start().await.unwrap().was_already_running);

    let status = service.status().await;
    assert!(status.is_running);
    assert!(status.recent.is_none());
    assert_eq!(status.categories, vec!["cs.AI", "cs.LG"]);

    assert!(service.stop().await.unwrap());
    assert!(!service.is_running().await);
    assert!(!service.stop().await.unwrap());

    let kinds: Vec<String> = store::recent_events(&h.pool, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(kinds, vec!["CRAWLER_STOPPED", "CRAWLER_STARTED"]);
}
