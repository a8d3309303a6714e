//! Crawl control: the recent-papers monitor and the historical crawler
//! behind one start/stop switch.

use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::crawler::{Crawler, CrawlerStatus};
use crate::explorer::RecentPapersTask;
use crate::historical::{HistoricalCrawlManager, HistoricalTask};
use crate::models::CrawlerProgress;
use crate::scheduler::{PeriodicTaskManager, TaskManagerStatus, TaskStatus};
use crate::store;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StartOutcome {
    pub was_already_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlerStatusResponse {
    /// The service has been started and not stopped since.
    pub is_running: bool,
    /// At least one loop is executing right now (not halted, finished or paused).
    pub is_active: bool,
    /// Historical cursor date.
    pub current_date: Option<String>,
    pub current_category_index: Option<usize>,
    pub categories: Vec<String>,
    pub recent: Option<TaskManagerStatus>,
    pub historical: Option<TaskManagerStatus>,
    pub crawler: CrawlerStatus,
}

pub struct CrawlService {
    crawler: Arc<Crawler>,
    recent: Option<PeriodicTaskManager>,
    historical: Option<(Arc<HistoricalCrawlManager>, PeriodicTaskManager)>,
    started: AtomicBool,
}

impl CrawlService {
    pub async fn new(crawler: Arc<Crawler>) -> Result<Self> {
        let cfg = crawler.config().crawler.clone();
        let retry_delay = Duration::from_secs(cfg.error_retry_delay_secs);

        let recent = cfg.enable_recent.then(|| {
            PeriodicTaskManager::new(
                Arc::new(RecentPapersTask::new(crawler.clone())),
                Duration::from_secs(cfg.fetch_interval_secs),
                retry_delay,
                cfg.max_consecutive_errors,
            )
        });

        let historical = if cfg.enable_historical {
            let manager = Arc::new(HistoricalCrawlManager::load(crawler.clone()).await?);
            let task_manager = PeriodicTaskManager::new(
                Arc::new(HistoricalTask::new(manager.clone())),
                Duration::from_secs(cfg.historical_delay_secs),
                retry_delay,
                cfg.max_consecutive_errors,
            );
            Some((manager, task_manager))
        } else {
            None
        };

        Ok(Self {
            crawler,
            recent,
            historical,
            started: AtomicBool::new(false),
        })
    }

    pub fn crawler(&self) -> &Arc<Crawler> {
        &self.crawler
    }

    fn managers(&self) -> impl Iterator<Item = &PeriodicTaskManager> + '_ {
        self.recent
            .iter()
            .chain(self.historical.iter().map(|(_, m)| m))
    }

    /// Start every enabled loop. Loops that are already running are left alone.
    pub async fn start(&self) -> Result<StartOutcome> {
        let was_already_running = self.is_running().await;
        for manager in self.managers() {
            manager.start_periodic().await?;
        }
        self.started.store(true, Ordering::SeqCst);
        if !was_already_running {
            store::log_event(self.crawler.pool(), None, "CRAWLER_STARTED", None).await?;
        }
        Ok(StartOutcome {
            was_already_running,
        })
    }

    /// Returns `false` if nothing was running.
    pub async fn stop(&self) -> Result<bool> {
        let mut stopped_any = false;
        for manager in self.managers() {
            stopped_any |= manager.stop_periodic().await;
        }
        let was_started = self.started.swap(false, Ordering::SeqCst);
        if was_started || stopped_any {
            store::log_event(self.crawler.pool(), None, "CRAWLER_STOPPED", None).await?;
        }
        Ok(was_started || stopped_any)
    }

    pub async fn shutdown(&self) -> Result<()> {
        for manager in self.managers() {
            manager.shutdown().await?;
        }
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        if self.started.load(Ordering::SeqCst) {
            return true;
        }
        for manager in self.managers() {
            if manager.is_running().await {
                return true;
            }
        }
        false
    }

    pub async fn status(&self) -> CrawlerStatusResponse {
        let recent = match &self.recent {
            Some(m) => Some(m.status().await),
            None => None,
        };
        let (historical, cursor) = match &self.historical {
            Some((hm, m)) => (Some(m.status().await), Some(hm.cursor().await)),
            None => (None, None),
        };

        let is_active = recent
            .iter()
            .chain(historical.iter())
            .any(|s| s.periodic_running && s.status == TaskStatus::Running);

        CrawlerStatusResponse {
            is_running: self.is_running().await,
            is_active,
            current_date: cursor.map(|c| c.date.format("%Y-%m-%d").to_string()),
            current_category_index: cursor.map(|c| c.category_index),
            categories: self.crawler.config().crawler.categories.clone(),
            recent,
            historical,
            crawler: self.crawler.status().await,
        }
    }

    pub async fn progress(&self) -> Result<CrawlerProgress> {
        store::crawler_progress(self.crawler.pool()).await
    }
}
