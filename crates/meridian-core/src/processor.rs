use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::Engines;
use crate::error::AppError;
use crate::job::{EngineType, QueueItem, TaskStatus, WorkerConfig};
use crate::job_queue::WorkQueue;
use crate::lifecycle::check_job_completion;
use crate::models::RecordOwner;
use crate::traits::{BrowserAutomation, BrowserSession, RecordStore, UpsertOutcome};

/// Events emitted by a task processor for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
        lanes: &'a [String],
    },
    TaskStarted {
        task_id: Uuid,
        job_id: Uuid,
        lane: &'a str,
        query: &'a str,
    },
    TaskCompleted {
        task_id: Uuid,
        inserted: usize,
        duplicates: usize,
    },
    TaskFailed {
        task_id: Uuid,
        error: &'a str,
        retry_count: u32,
        will_retry: bool,
    },
    /// Put back untouched because the worker is shutting down.
    TaskReleased {
        task_id: Uuid,
        lane: &'a str,
    },
    QueueError {
        lane: &'a str,
        error: &'a str,
    },
    ShuttingDown {
        worker_id: &'a str,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id, lanes } => {
                tracing::info!(%worker_id, ?lanes, "Worker started");
            }
            WorkerEvent::TaskStarted {
                task_id,
                job_id,
                lane,
                query,
            } => {
                tracing::info!(%task_id, %job_id, %lane, %query, "Processing task");
            }
            WorkerEvent::TaskCompleted {
                task_id,
                inserted,
                duplicates,
            } => {
                tracing::info!(%task_id, inserted, duplicates, "Task completed");
            }
            WorkerEvent::TaskFailed {
                task_id,
                error,
                retry_count,
                will_retry,
            } => {
                tracing::warn!(%task_id, %error, retry_count, %will_retry, "Task failed");
            }
            WorkerEvent::TaskReleased { task_id, lane } => {
                tracing::info!(%task_id, %lane, "Task released for another worker");
            }
            WorkerEvent::QueueError { lane, error } => {
                tracing::error!(%lane, %error, "Failed to dequeue");
            }
            WorkerEvent::ShuttingDown { worker_id } => {
                tracing::info!(%worker_id, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Counters of one successful attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptStats {
    pub success: bool,
    pub items_processed: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub write_errors: usize,
}

enum Attempt {
    Finished(AttemptStats),
    Failed(AppError),
}

/// Pulls tasks off the engine lanes and runs them, one at a time.
pub struct TaskProcessor<B, Q, S>
where
    B: BrowserAutomation,
    Q: WorkQueue,
    S: RecordStore,
{
    browser: B,
    queue: Q,
    store: S,
    engines: Arc<Engines>,
    config: WorkerConfig,
}

impl<B, Q, S> TaskProcessor<B, Q, S>
where
    B: BrowserAutomation,
    Q: WorkQueue,
    S: RecordStore,
{
    pub fn new(browser: B, queue: Q, store: S, engines: Arc<Engines>, config: WorkerConfig) -> Self {
        Self {
            browser,
            queue,
            store,
            engines,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Run the processor loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        let lanes = &self.config.lanes;
        if lanes.is_empty() {
            return Err(AppError::ConfigError(format!(
                "Worker {} has no lanes to serve",
                self.config.worker_id
            )));
        }

        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
            lanes,
        });

        let mut next_lane = 0;
        while !cancel_token.is_cancelled() {
            let mut idle = true;
            for offset in 0..lanes.len() {
                if cancel_token.is_cancelled() {
                    break;
                }
                let index = (next_lane + offset) % lanes.len();
                let lane = &lanes[index];

                match self.queue.dequeue(lane, self.config.dequeue_timeout).await {
                    Ok(Some(item)) => {
                        // Start the next round after this lane so no lane starves.
                        next_lane = (index + 1) % lanes.len();
                        idle = false;
                        self.process(lane, item, &cancel_token, reporter).await;
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let error = e.to_string();
                        reporter.report(WorkerEvent::QueueError {
                            lane,
                            error: &error,
                        });
                    }
                }
            }

            if idle {
                tokio::select! {
                    () = tokio::time::sleep(self.config.idle_interval) => {}
                    () = cancel_token.cancelled() => break,
                }
            }
        }

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });
        Ok(())
    }

    /// Drive one dequeued item to its next state.
    pub async fn process<WR: WorkerReporter>(
        &self,
        lane: &str,
        item: QueueItem,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) {
        let engine = match item.engine_type() {
            Ok(engine) => engine,
            Err(e) => {
                self.fail(lane, item, e, reporter).await;
                return;
            }
        };

        let query = item.search.query();
        reporter.report(WorkerEvent::TaskStarted {
            task_id: item.task_id,
            job_id: item.job_id,
            lane,
            query: &query,
        });
        self.set_status(item.task_id, TaskStatus::Ongoing).await;

        let attempt = self.attempt(engine, &item, cancel_token).await;

        match attempt {
            // An engine stopped by cancellation still reports its partial harvest as a success.
            Attempt::Finished(stats) if stats.success => {
                reporter.report(WorkerEvent::TaskCompleted {
                    task_id: item.task_id,
                    inserted: stats.inserted,
                    duplicates: stats.duplicates,
                });
                self.set_status(item.task_id, TaskStatus::Done).await;
                self.check_completion(item.job_id).await;
            }
            // Interrupted before producing a result: hand the task to another worker.
            _ if cancel_token.is_cancelled() => self.release(lane, &item, reporter).await,
            Attempt::Finished(_) => {
                let error = AppError::BrowserError("extraction did not complete".into());
                self.fail(lane, item, error, reporter).await;
            }
            Attempt::Failed(error) => self.fail(lane, item, error, reporter).await,
        }
    }

    /// Run the attempt on its own task so a panic inside the browser stack
    /// fails this task instead of killing the worker.
    async fn attempt(
        &self,
        engine: EngineType,
        item: &QueueItem,
        cancel_token: &CancellationToken,
    ) -> Attempt {
        let slot: SessionSlot<B::Session> = Arc::default();
        let handle = tokio::spawn(run_attempt(
            self.browser.clone(),
            self.store.clone(),
            self.engines.clone(),
            engine,
            item.clone(),
            cancel_token.clone(),
            slot.clone(),
        ));
        match handle.await {
            Ok(Ok(stats)) => Attempt::Finished(stats),
            Ok(Err(e)) => Attempt::Failed(e),
            Err(join_error) => {
                close_session(&slot, item.task_id).await;
                Attempt::Failed(AppError::BrowserError(format!(
                    "extraction task aborted: {join_error}"
                )))
            }
        }
    }

    async fn fail<WR: WorkerReporter>(
        &self,
        lane: &str,
        mut item: QueueItem,
        error: AppError,
        reporter: &WR,
    ) {
        let retry_count = item.record_failure();
        let retry_config = &self.config.retry_config;
        let will_retry = !error.is_task_fatal() && retry_config.can_retry(retry_count);
        let message = error.to_string();

        reporter.report(WorkerEvent::TaskFailed {
            task_id: item.task_id,
            error: &message,
            retry_count,
            will_retry,
        });

        if will_retry {
            let delay = retry_config.delay_for_attempt(retry_count);
            self.set_status(item.task_id, TaskStatus::Pending).await;
            match self.queue.requeue(lane, &item, delay).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::error!(task_id = %item.task_id, error = %e, "Failed to requeue task");
                }
            }
        }

        self.set_status(item.task_id, TaskStatus::Failed).await;
        self.check_completion(item.job_id).await;
    }

    async fn release<WR: WorkerReporter>(&self, lane: &str, item: &QueueItem, reporter: &WR) {
        reporter.report(WorkerEvent::TaskReleased {
            task_id: item.task_id,
            lane,
        });
        if let Err(e) = self.queue.requeue(lane, item, Duration::ZERO).await {
            tracing::error!(task_id = %item.task_id, error = %e, "Failed to release task");
        }
        self.set_status(item.task_id, TaskStatus::Pending).await;
    }

    async fn set_status(&self, task_id: Uuid, status: TaskStatus) {
        if let Err(e) = self.store.set_task_status(task_id, status).await {
            tracing::error!(%task_id, %status, error = %e, "Failed to update task status");
        }
    }

    async fn check_completion(&self, job_id: Uuid) {
        if let Err(e) = check_job_completion(&self.store, job_id).await {
            tracing::error!(%job_id, error = %e, "Failed to check job completion");
        }
    }
}

/// Session of a running attempt, left behind for the processor to close if
/// the attempt panics.
type SessionSlot<S> = Arc<Mutex<Option<Arc<S>>>>;

async fn close_session<S: BrowserSession>(slot: &SessionSlot<S>, task_id: Uuid) {
    let Some(session) = slot.lock().ok().and_then(|mut held| held.take()) else {
        return;
    };
    match Arc::try_unwrap(session) {
        Ok(session) => {
            if let Err(e) = session.close().await {
                tracing::warn!(%task_id, error = %e, "Failed to close browser session");
            }
        }
        Err(_) => tracing::warn!(%task_id, "Browser session still borrowed, left open"),
    }
}

/// Open a session, run the engine, close the session, persist the records.
///
/// The attempt fails when the engine does, or when not a single record could
/// be written and at least one write errored.
async fn run_attempt<B: BrowserAutomation, S: RecordStore>(
    browser: B,
    store: S,
    engines: Arc<Engines>,
    engine: EngineType,
    item: QueueItem,
    cancel_token: CancellationToken,
    slot: SessionSlot<B::Session>,
) -> Result<AttemptStats, AppError> {
    let session = Arc::new(browser.new_session().await?);
    if let Ok(mut held) = slot.lock() {
        *held = Some(session.clone());
    }
    let scraped = engines
        .scrape(engine, &item.search, session.as_ref(), &cancel_token)
        .await;
    drop(session);
    close_session(&slot, item.task_id).await;
    let outcome = scraped?;

    let owner = RecordOwner::from(&item);
    let mut stats = AttemptStats {
        success: outcome.success,
        items_processed: outcome.items_processed,
        ..AttemptStats::default()
    };
    for record in &outcome.records {
        match store.upsert_record(record, &owner).await {
            Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
            Ok(UpsertOutcome::Duplicate) => stats.duplicates += 1,
            Err(e) => {
                tracing::warn!(task_id = %item.task_id, name = %record.name, error = %e, "Failed to store record");
                stats.write_errors += 1;
            }
        }
    }

    if stats.inserted == 0 && stats.write_errors > 0 {
        return Err(AppError::DatabaseError(format!(
            "none of {} records could be stored",
            outcome.records.len()
        )));
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, RetryConfig};
    use crate::job_queue::MemoryQueue;
    use crate::lifecycle::submit_job;
    use crate::pacing::Pacing;
    use crate::selectors::SiteProfile;
    use crate::testutil::{
        FakeBrowser, FakeSite, MockRecordStore, MockReporter, make_listing, make_submission,
    };

    fn config() -> WorkerConfig {
        WorkerConfig::default()
            .with_worker_id("test-worker")
            .with_dequeue_timeout(Duration::from_millis(5))
            .with_idle_interval(Duration::from_millis(5))
            .with_retry_config(
                RetryConfig::default()
                    .with_max_retries(3)
                    .with_delays(vec![Duration::from_millis(1)]),
            )
    }

    fn engines() -> Arc<Engines> {
        Arc::new(Engines::new(
            SiteProfile::default(),
            Pacing::instant(),
            Default::default(),
        ))
    }

    /// Run a processor until `job_id` is done, then stop it.
    async fn run_until_done(
        processor: TaskProcessor<FakeBrowser, MemoryQueue, MockRecordStore>,
        store: &MockRecordStore,
        job_id: Uuid,
        reporter: Arc<MockReporter>,
    ) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let worker = tokio::spawn(async move { processor.run(token, reporter.as_ref()).await });

        tokio::time::timeout(Duration::from_secs(10), async {
            while store.get_job_status(job_id).await.unwrap() != Some(JobStatus::Done) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not complete in time");

        cancel.cancel();
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn job_runs_to_done() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let browser = FakeBrowser::new(FakeSite::new(make_listing(5)));
        let job = submit_job(&queue, &store, make_submission("tile", 3))
            .await
            .unwrap();

        let processor =
            TaskProcessor::new(browser.clone(), queue.clone(), store.clone(), engines(), config());
        let reporter = Arc::new(MockReporter::new());
        run_until_done(processor, &store, job.id, reporter.clone()).await;

        for task in &job.tasks {
            assert_eq!(store.task_status(task.id), Some(TaskStatus::Done));
            assert_eq!(
                store.status_history(task.id),
                vec![TaskStatus::Ongoing, TaskStatus::Done]
            );
        }
        // Every part hit the same five phones; the unique constraint keeps one copy.
        assert_eq!(store.records().len(), 5);
        assert_eq!(reporter.count("TaskCompleted"), 3);
        assert_eq!(browser.sessions_opened(), 3);
        assert_eq!(browser.sessions_closed(), 3);
    }

    #[tokio::test]
    async fn records_carry_their_owner() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let browser = FakeBrowser::new(FakeSite::new(make_listing(2)));
        let job = submit_job(&queue, &store, make_submission("hybrid", 1))
            .await
            .unwrap();

        let processor = TaskProcessor::new(browser, queue, store.clone(), engines(), config());
        run_until_done(processor, &store, job.id, Arc::new(MockReporter::new())).await;

        let owners = store.owners();
        assert_eq!(owners.len(), 2);
        assert!(owners.iter().all(|o| o.job_id == job.id && o.task_id == job.tasks[0].id));
        assert!(store.records().iter().all(|r| r.decision.is_some()));
    }

    #[tokio::test]
    async fn repeated_failures_exhaust_retries() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let browser = FakeBrowser::new(FakeSite::new(make_listing(3)).with_navigation_failure());
        let job = submit_job(&queue, &store, make_submission("card", 1))
            .await
            .unwrap();
        let task_id = job.tasks[0].id;

        let processor =
            TaskProcessor::new(browser.clone(), queue.clone(), store.clone(), engines(), config());
        let reporter = Arc::new(MockReporter::new());
        run_until_done(processor, &store, job.id, reporter.clone()).await;

        assert_eq!(store.task_status(task_id), Some(TaskStatus::Failed));
        assert_eq!(reporter.count("TaskFailed"), 3);
        assert_eq!(reporter.failures(), vec![(1, true), (2, true), (3, false)]);
        assert_eq!(browser.sessions_opened(), 3);
        assert_eq!(
            store.status_history(task_id),
            vec![
                TaskStatus::Ongoing,
                TaskStatus::Pending,
                TaskStatus::Ongoing,
                TaskStatus::Pending,
                TaskStatus::Ongoing,
                TaskStatus::Failed,
            ]
        );
        let lengths = queue.lane_lengths().await.unwrap();
        assert!(lengths.values().all(|n| *n == 0));
    }

    #[tokio::test]
    async fn retry_backoff_and_count_are_applied() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let browser = FakeBrowser::new(FakeSite::new(make_listing(1))).with_failing_sessions(1);
        let job = submit_job(&queue, &store, make_submission("tile", 1))
            .await
            .unwrap();
        let lane = EngineType::Tile.lane();
        let item = queue
            .dequeue(lane, Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();

        let retry = RetryConfig::default().with_delays(vec![Duration::from_millis(200)]);
        let processor = TaskProcessor::new(
            browser,
            queue.clone(),
            store.clone(),
            engines(),
            config().with_retry_config(retry),
        );
        let reporter = MockReporter::new();
        processor
            .process(lane, item, &CancellationToken::new(), &reporter)
            .await;

        assert_eq!(store.task_status(job.tasks[0].id), Some(TaskStatus::Pending));
        // Still backing off.
        assert!(
            queue
                .dequeue(lane, Duration::from_millis(10))
                .await
                .unwrap()
                .is_none()
        );
        let retried = queue
            .dequeue(lane, Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.task_id, job.tasks[0].id);
    }

    #[tokio::test]
    async fn unknown_engine_fails_without_retry() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let job = make_submission("tile", 1).into_job().unwrap();
        store.register_job(&job).await.unwrap();
        let mut item = job.queue_items().remove(0);
        item.engine = "teleport".into();

        let processor = TaskProcessor::new(
            FakeBrowser::new(FakeSite::new(make_listing(1))),
            queue.clone(),
            store.clone(),
            engines(),
            config(),
        );
        let reporter = MockReporter::new();
        processor
            .process(EngineType::Tile.lane(), item, &CancellationToken::new(), &reporter)
            .await;

        assert_eq!(store.task_status(job.tasks[0].id), Some(TaskStatus::Failed));
        assert_eq!(store.get_job_status(job.id).await.unwrap(), Some(JobStatus::Done));
        assert_eq!(reporter.count("TaskStarted"), 0);
        let lengths = queue.lane_lengths().await.unwrap();
        assert!(lengths.values().all(|n| *n == 0));
    }

    #[tokio::test]
    async fn panicking_attempt_is_retried() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let browser = FakeBrowser::new(FakeSite::new(make_listing(2))).with_panicking_sessions(1);
        let job = submit_job(&queue, &store, make_submission("tile", 1))
            .await
            .unwrap();

        let processor = TaskProcessor::new(browser, queue, store.clone(), engines(), config());
        let reporter = Arc::new(MockReporter::new());
        run_until_done(processor, &store, job.id, reporter.clone()).await;

        assert_eq!(store.task_status(job.tasks[0].id), Some(TaskStatus::Done));
        assert_eq!(reporter.count("TaskFailed"), 1);
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn panic_mid_extraction_still_closes_the_session() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let browser = FakeBrowser::new(FakeSite::new(make_listing(2))).with_panicking_searches(1);
        let job = submit_job(&queue, &store, make_submission("tile", 1))
            .await
            .unwrap();

        let processor =
            TaskProcessor::new(browser.clone(), queue, store.clone(), engines(), config());
        let reporter = Arc::new(MockReporter::new());
        run_until_done(processor, &store, job.id, reporter.clone()).await;

        assert_eq!(store.task_status(job.tasks[0].id), Some(TaskStatus::Done));
        assert_eq!(reporter.count("TaskFailed"), 1);
        assert_eq!(browser.sessions_opened(), 2);
        assert_eq!(browser.sessions_closed(), 2);
    }

    #[tokio::test]
    async fn unstorable_records_fail_the_attempt() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::with_failing_upserts();
        let job = submit_job(&queue, &store, make_submission("tile", 1))
            .await
            .unwrap();

        let processor = TaskProcessor::new(
            FakeBrowser::new(FakeSite::new(make_listing(2))),
            queue,
            store.clone(),
            engines(),
            config(),
        );
        let reporter = Arc::new(MockReporter::new());
        run_until_done(processor, &store, job.id, reporter.clone()).await;

        assert_eq!(store.task_status(job.tasks[0].id), Some(TaskStatus::Failed));
        assert_eq!(reporter.count("TaskFailed"), 3);
    }

    #[tokio::test]
    async fn cancelled_run_with_records_completes() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let browser = FakeBrowser::new(FakeSite::new(make_listing(10)).cancel_after_clicks(2));
        let job = submit_job(&queue, &store, make_submission("card", 1))
            .await
            .unwrap();
        let lane = EngineType::Card.lane();
        let item = queue
            .dequeue(lane, Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();

        let processor =
            TaskProcessor::new(browser.clone(), queue.clone(), store.clone(), engines(), config());
        let reporter = MockReporter::new();
        processor
            .process(lane, item, &browser.cancel_token(), &reporter)
            .await;

        assert_eq!(reporter.count("TaskCompleted"), 1);
        assert_eq!(reporter.count("TaskReleased"), 0);
        assert_eq!(store.task_status(job.tasks[0].id), Some(TaskStatus::Done));
        assert_eq!(store.get_job_status(job.id).await.unwrap(), Some(JobStatus::Done));
        let records = store.records();
        assert!(!records.is_empty());
        assert!(records.len() < 10);
        assert!(
            queue
                .dequeue(lane, Duration::from_millis(5))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn shutdown_before_a_result_releases_task_without_counting_a_retry() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let browser = FakeBrowser::new(FakeSite::new(make_listing(3)));
        let job = submit_job(&queue, &store, make_submission("hybrid", 1))
            .await
            .unwrap();
        let lane = EngineType::Hybrid.lane();
        let item = queue
            .dequeue(lane, Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();

        let processor =
            TaskProcessor::new(browser.clone(), queue.clone(), store.clone(), engines(), config());
        let reporter = MockReporter::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        processor.process(lane, item, &cancel, &reporter).await;

        assert_eq!(reporter.count("TaskReleased"), 1);
        assert_eq!(reporter.count("TaskFailed"), 0);
        assert_eq!(store.task_status(job.tasks[0].id), Some(TaskStatus::Pending));
        assert!(store.records().is_empty());
        assert_eq!(browser.sessions_closed(), 1);
        let released = queue
            .dequeue(lane, Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(released.retry_count, 0);
    }

    #[tokio::test]
    async fn run_without_lanes_is_a_config_error() {
        let processor = TaskProcessor::new(
            FakeBrowser::new(FakeSite::new(Vec::new())),
            MemoryQueue::new(),
            MockRecordStore::new(),
            engines(),
            config().with_lanes(Vec::new()),
        );
        let err = processor
            .run(CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
