//! Periodic task execution.
//!
//! [`PeriodicTaskManager`] drives one [`PeriodicTask`] on a background tokio
//! task: execute, wait `interval`, repeat. Failures are retried after
//! `retry_delay`; after `max_consecutive_errors` failures in a row the loop
//! halts with [`TaskStatus::Error`]. Every wait is cancellable through a
//! [`CancellationToken`], so stopping never has to sit out a full interval.
//!
//! ```text
//!            start_periodic()
//!  Idle ──────────────────────▶ Running ──stop_periodic()──▶ Paused
//!   ▲                            │   │
//!   └──── TaskFlow::Finished ────┘   └── too many errors ──▶ Error
//!
//!  shutdown() from any state ──▶ Stopped
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::now_iso;

/// What the loop should do after a successful execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlow {
    Continue,
    /// Nothing left to do; the loop exits and the manager goes idle.
    Finished,
}

#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn execute(&self) -> Result<TaskFlow>;

    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    async fn on_stop(&self) -> Result<()> {
        Ok(())
    }

    async fn on_error(&self, _error: &anyhow::Error) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Idle,
    Running,
    Paused,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStats {
    pub executions: u64,
    pub errors: u64,
    pub consecutive_errors: u32,
    pub last_execution_time: Option<String>,
    pub last_error_time: Option<String>,
    pub last_error: Option<String>,
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskManagerStatus {
    pub name: String,
    pub status: TaskStatus,
    pub periodic_running: bool,
    pub stats: TaskStats,
    pub interval_secs: f64,
    pub retry_delay_secs: f64,
    pub max_consecutive_errors: u32,
}

struct Shared {
    status: TaskStatus,
    stats: TaskStats,
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct PeriodicTaskManager {
    task: Arc<dyn PeriodicTask>,
    interval: Duration,
    retry_delay: Duration,
    max_consecutive_errors: u32,
    shared: Arc<Mutex<Shared>>,
    running: Mutex<Option<Running>>,
}

impl PeriodicTaskManager {
    pub fn new(
        task: Arc<dyn PeriodicTask>,
        interval: Duration,
        retry_delay: Duration,
        max_consecutive_errors: u32,
    ) -> Self {
        Self {
            task,
            interval,
            retry_delay,
            max_consecutive_errors: max_consecutive_errors.max(1),
            shared: Arc::new(Mutex::new(Shared {
                status: TaskStatus::Idle,
                stats: TaskStats::default(),
            })),
            running: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Spawn the loop. Returns `Ok(false)` if it is already running.
    pub async fn start_periodic(&self) -> Result<bool> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.as_ref() {
            if !r.handle.is_finished() {
                tracing::debug!(task = self.task.name(), "periodic task already running");
                return Ok(false);
            }
        }

        if let Err(e) = self.task.on_start().await {
            let mut shared = self.shared.lock().await;
            shared.status = TaskStatus::Error;
            shared.stats.last_error = Some(format!("{:#}", e));
            shared.stats.last_error_time = Some(now_iso());
            return Err(e);
        }

        {
            let mut shared = self.shared.lock().await;
            shared.status = TaskStatus::Running;
            shared.stats.consecutive_errors = 0;
            shared.stats.started_at = Some(now_iso());
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.task.clone(),
            self.shared.clone(),
            token.clone(),
            self.interval,
            self.retry_delay,
            self.max_consecutive_errors,
        ));
        *running = Some(Running { token, handle });

        tracing::info!(
            task = self.task.name(),
            interval_secs = self.interval.as_secs_f64(),
            "periodic task started"
        );
        Ok(true)
    }

    /// Cancel the loop and wait for it to exit. Returns `false` when no loop
    /// was running.
    pub async fn stop_periodic(&self) -> bool {
        let Some(r) = self.running.lock().await.take() else {
            return false;
        };

        r.token.cancel();
        if let Err(e) = r.handle.await {
            tracing::error!(task = self.task.name(), error = %e, "periodic task panicked");
        }

        let mut shared = self.shared.lock().await;
        if shared.status == TaskStatus::Running {
            shared.status = TaskStatus::Paused;
        }
        tracing::info!(task = self.task.name(), "periodic task stopped");
        true
    }

    /// Stop the loop and run the task's `on_stop` hook.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop_periodic().await;
        let result = self.task.on_stop().await;
        self.shared.lock().await.status = TaskStatus::Stopped;
        result
    }

    /// Run the task once on the caller's task, updating stats.
    pub async fn execute_once(&self) -> Result<TaskFlow> {
        execute_recorded(self.task.as_ref(), &self.shared).await
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub async fn status(&self) -> TaskManagerStatus {
        let periodic_running = self.is_running().await;
        let shared = self.shared.lock().await;
        TaskManagerStatus {
            name: self.task.name().to_string(),
            status: shared.status,
            periodic_running,
            stats: shared.stats.clone(),
            interval_secs: self.interval.as_secs_f64(),
            retry_delay_secs: self.retry_delay.as_secs_f64(),
            max_consecutive_errors: self.max_consecutive_errors,
        }
    }
}

async fn execute_recorded(task: &dyn PeriodicTask, shared: &Mutex<Shared>) -> Result<TaskFlow> {
    let result = task.execute().await;

    let mut shared = shared.lock().await;
    shared.stats.executions += 1;
    match &result {
        Ok(_) => {
            shared.stats.consecutive_errors = 0;
            shared.stats.last_execution_time = Some(now_iso());
        }
        Err(e) => {
            shared.stats.errors += 1;
            shared.stats.consecutive_errors += 1;
            shared.stats.last_error = Some(format!("{:#}", e));
            shared.stats.last_error_time = Some(now_iso());
        }
    }
    result
}

async fn run_loop(
    task: Arc<dyn PeriodicTask>,
    shared: Arc<Mutex<Shared>>,
    token: CancellationToken,
    interval: Duration,
    retry_delay: Duration,
    max_consecutive_errors: u32,
) {
    loop {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = execute_recorded(task.as_ref(), &shared) => outcome,
        };

        let wait = match outcome {
            Ok(TaskFlow::Continue) => interval,
            Ok(TaskFlow::Finished) => {
                tracing::info!(task = task.name(), "periodic task finished");
                shared.lock().await.status = TaskStatus::Idle;
                break;
            }
            Err(e) => {
                task.on_error(&e).await;
                let consecutive = shared.lock().await.stats.consecutive_errors;
                if consecutive >= max_consecutive_errors {
                    tracing::error!(
                        task = task.name(),
                        consecutive,
                        error = %format!("{:#}", e),
                        "periodic task halted after repeated errors"
                    );
                    shared.lock().await.status = TaskStatus::Error;
                    break;
                }
                tracing::warn!(
                    task = task.name(),
                    consecutive,
                    retry_in_secs = retry_delay.as_secs_f64(),
                    error = %format!("{:#}", e),
                    "periodic task failed"
                );
                retry_delay
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
