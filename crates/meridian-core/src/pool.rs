//! A fixed set of task processors sharing one shutdown signal.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::Engines;
use crate::error::AppError;
use crate::job::WorkerConfig;
use crate::job_queue::WorkQueue;
use crate::processor::{TaskProcessor, TracingWorkerReporter, WorkerEvent, WorkerReporter};
use crate::traits::{BrowserAutomation, RecordStore};

/// Live view of one worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub is_running: bool,
    pub current_task: Option<Uuid>,
    pub processed_count: u64,
    pub failed_count: u64,
}

/// Aggregate over every worker in the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub total_workers: usize,
    pub active_workers: usize,
    pub total_processed: u64,
    pub total_failed: u64,
}

/// Shared, cheaply cloned worker status table.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    workers: Arc<Mutex<BTreeMap<String, WorkerStatus>>>,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, worker_id: &str, apply: impl FnOnce(&mut WorkerStatus)) {
        let Ok(mut workers) = self.workers.lock() else {
            return;
        };
        let status = workers
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerStatus {
                worker_id: worker_id.to_string(),
                ..WorkerStatus::default()
            });
        apply(status);
    }

    pub fn workers(&self) -> Vec<WorkerStatus> {
        self.workers
            .lock()
            .map(|w| w.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> PoolSummary {
        let workers = self.workers();
        PoolSummary {
            total_workers: workers.len(),
            active_workers: workers.iter().filter(|w| w.is_running).count(),
            total_processed: workers.iter().map(|w| w.processed_count).sum(),
            total_failed: workers.iter().map(|w| w.failed_count).sum(),
        }
    }

    /// Reporter that keeps this table current and logs through `tracing`.
    pub fn reporter(&self, worker_id: impl Into<String>) -> StatsReporter {
        StatsReporter {
            worker_id: worker_id.into(),
            stats: self.clone(),
        }
    }
}

/// Feeds [`WorkerEvent`]s into a [`PoolStats`] table.
pub struct StatsReporter {
    worker_id: String,
    stats: PoolStats,
}

impl WorkerReporter for StatsReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let id = self.worker_id.as_str();
        match &event {
            WorkerEvent::Started { .. } => self.stats.update(id, |s| s.is_running = true),
            WorkerEvent::TaskStarted { task_id, .. } => {
                let task_id = *task_id;
                self.stats.update(id, |s| s.current_task = Some(task_id));
            }
            WorkerEvent::TaskCompleted { .. } => self.stats.update(id, |s| {
                s.current_task = None;
                s.processed_count += 1;
            }),
            WorkerEvent::TaskFailed { .. } => self.stats.update(id, |s| {
                s.current_task = None;
                s.failed_count += 1;
            }),
            WorkerEvent::TaskReleased { .. } => self.stats.update(id, |s| s.current_task = None),
            WorkerEvent::Stopped { .. } => self.stats.update(id, |s| {
                s.is_running = false;
                s.current_task = None;
            }),
            WorkerEvent::QueueError { .. } | WorkerEvent::ShuttingDown { .. } => {}
        }
        TracingWorkerReporter.report(event);
    }
}

/// Runs `size` processors until [`WorkerPool::shutdown`].
pub struct WorkerPool {
    cancel_token: CancellationToken,
    stats: PoolStats,
    handles: Vec<JoinHandle<Result<(), AppError>>>,
}

impl WorkerPool {
    /// Spawn the processors. Worker ids are `<base>-<n>`.
    pub fn start<B, Q, S>(
        size: usize,
        browser: B,
        queue: Q,
        store: S,
        engines: Arc<Engines>,
        config: WorkerConfig,
    ) -> Self
    where
        B: BrowserAutomation,
        Q: WorkQueue,
        S: RecordStore,
    {
        let cancel_token = CancellationToken::new();
        let stats = PoolStats::new();
        let base_id = config.worker_id.clone();

        let handles = (1..=size.max(1))
            .map(|n| {
                let worker_id = format!("{base_id}-{n}");
                let processor = TaskProcessor::new(
                    browser.clone(),
                    queue.clone(),
                    store.clone(),
                    engines.clone(),
                    config.clone().with_worker_id(worker_id.clone()),
                );
                let reporter = stats.reporter(worker_id);
                let token = cancel_token.clone();
                tokio::spawn(async move { processor.run(token, &reporter).await })
            })
            .collect();

        tracing::info!(workers = size.max(1), "Worker pool started");
        Self {
            cancel_token,
            stats,
            handles,
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Signal every processor and wait for them to release their tasks.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        for handle in self.handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Worker exited with error"),
                Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            }
        }
        tracing::info!("Worker pool stopped");
    }
}
