//! Job submission and completion tracking.

use uuid::Uuid;

use crate::error::AppError;
use crate::job::{Job, JobStatus, JobSubmission, JobSummary, TaskStatus};
use crate::job_queue::WorkQueue;
use crate::traits::RecordStore;

/// Validate a submission, record it, and put one item per part on its engine's lane.
///
/// If the queue rejects an item, that task and every one after it are marked
/// failed, so the job still reaches `done` once the queued tasks finish.
pub async fn submit_job<Q: WorkQueue, S: RecordStore>(
    queue: &Q,
    store: &S,
    submission: JobSubmission,
) -> Result<Job, AppError> {
    let job = submission.into_job()?;
    store.register_job(&job).await?;

    let lane = job.engine.lane();
    let items = job.queue_items();
    for (index, item) in items.iter().enumerate() {
        if let Err(e) = queue.enqueue(lane, item).await {
            tracing::error!(
                job_id = %job.id,
                %lane,
                unqueued = items.len() - index,
                error = %e,
                "Enqueue failed, failing the remaining tasks"
            );
            for rest in &items[index..] {
                if let Err(e) = store.set_task_status(rest.task_id, TaskStatus::Failed).await {
                    tracing::error!(task_id = %rest.task_id, error = %e, "Failed to mark task failed");
                }
            }
            if let Err(e) = check_job_completion(store, job.id).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to check job completion");
            }
            return Err(e);
        }
    }

    tracing::info!(
        job_id = %job.id,
        engine = %job.engine,
        tasks = job.tasks.len(),
        %lane,
        "Job submitted"
    );
    Ok(job)
}

/// Mark the job done once every task is done or failed.
///
/// Safe to call after every terminal transition: re-marking a done job is a
/// no-op write. Returns whether the job is complete.
pub async fn check_job_completion<S: RecordStore>(
    store: &S,
    job_id: Uuid,
) -> Result<bool, AppError> {
    let summary = job_summary(store, job_id).await?;
    if !summary.is_complete() {
        return Ok(false);
    }

    if store.get_job_status(job_id).await? != Some(JobStatus::Done) {
        store.set_job_status(job_id, JobStatus::Done).await?;
        tracing::info!(
            %job_id,
            done = summary.done,
            failed = summary.failed,
            "Job complete"
        );
    }
    Ok(true)
}

pub async fn job_summary<S: RecordStore>(store: &S, job_id: Uuid) -> Result<JobSummary, AppError> {
    let statuses = store.get_task_statuses(job_id).await?;
    Ok(JobSummary::from_statuses(&statuses))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::job::EngineType;
    use crate::job_queue::MemoryQueue;
    use crate::testutil::{FlakyQueue, MockRecordStore, make_submission};

    #[tokio::test]
    async fn submission_fans_out_to_engine_lane() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();

        let job = submit_job(&queue, &store, make_submission("card", 3))
            .await
            .unwrap();

        let lengths = queue.lane_lengths().await.unwrap();
        assert_eq!(lengths[EngineType::Card.lane()], 3);
        assert_eq!(lengths[EngineType::Tile.lane()], 0);
        assert_eq!(
            store.get_task_statuses(job.id).await.unwrap(),
            vec![TaskStatus::Pending; 3]
        );
        assert_eq!(
            store.get_job_status(job.id).await.unwrap(),
            Some(JobStatus::Pending)
        );

        let first = queue
            .dequeue(EngineType::Card.lane(), Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.task_id, job.tasks[0].id);
        assert_eq!(first.engine, "card");
    }

    #[tokio::test]
    async fn invalid_submission_enqueues_nothing() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();

        let err = submit_job(&queue, &store, make_submission("teleport", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let lengths = queue.lane_lengths().await.unwrap();
        assert!(lengths.values().all(|n| *n == 0));
    }

    #[tokio::test]
    async fn enqueue_failure_fails_unqueued_tasks() {
        let queue = FlakyQueue::accepting(1);
        let store = MockRecordStore::new();
        let submission = make_submission("tile", 3);
        let job_id = submission.job_id;

        let err = submit_job(&queue, &store, submission).await.unwrap_err();
        assert!(matches!(err, AppError::QueueError(_)));

        assert_eq!(
            store.get_task_statuses(job_id).await.unwrap(),
            vec![TaskStatus::Pending, TaskStatus::Failed, TaskStatus::Failed]
        );
        assert_eq!(queue.lane_lengths().await.unwrap()[EngineType::Tile.lane()], 1);
        assert_eq!(
            store.get_job_status(job_id).await.unwrap(),
            Some(JobStatus::Pending)
        );

        // The one queued task finishing completes the job.
        let item = queue
            .dequeue(EngineType::Tile.lane(), Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        store.set_task_status(item.task_id, TaskStatus::Done).await.unwrap();
        assert!(check_job_completion(&store, job_id).await.unwrap());
    }

    #[tokio::test]
    async fn queue_down_on_first_item_completes_job_as_failed() {
        let queue = FlakyQueue::accepting(0);
        let store = MockRecordStore::new();
        let submission = make_submission("card", 2);
        let job_id = submission.job_id;

        submit_job(&queue, &store, submission).await.unwrap_err();

        assert_eq!(
            store.get_task_statuses(job_id).await.unwrap(),
            vec![TaskStatus::Failed; 2]
        );
        assert_eq!(
            store.get_job_status(job_id).await.unwrap(),
            Some(JobStatus::Done)
        );
    }

    #[tokio::test]
    async fn completion_requires_every_task_terminal() {
        let queue = MemoryQueue::new();
        let store = MockRecordStore::new();
        let job = submit_job(&queue, &store, make_submission("tile", 2))
            .await
            .unwrap();

        store
            .set_task_status(job.tasks[0].id, TaskStatus::Done)
            .await
            .unwrap();
        assert!(!check_job_completion(&store, job.id).await.unwrap());

        store
            .set_task_status(job.tasks[1].id, TaskStatus::Failed)
            .await
            .unwrap();
        assert!(check_job_completion(&store, job.id).await.unwrap());
        assert!(check_job_completion(&store, job.id).await.unwrap());

        assert_eq!(
            store.get_job_status(job.id).await.unwrap(),
            Some(JobStatus::Done)
        );
        assert_eq!(store.job_status_writes(job.id), 1);

        let summary = job_summary(&store, job.id).await.unwrap();
        assert_eq!(summary.done, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn unknown_job_is_never_complete() {
        let store = MockRecordStore::new();
        assert!(!check_job_completion(&store, Uuid::new_v4()).await.unwrap());
    }
}
