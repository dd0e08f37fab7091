use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::AppError;
use crate::job::{EngineType, QueueItem};

/// Named FIFO lanes handing tasks from submitters to workers.
///
/// Implementations must make `dequeue` atomic: a given item is observed by at
/// most one consumer.
pub trait WorkQueue: Send + Sync + Clone + 'static {
    /// Append to the tail of `lane`.
    fn enqueue(
        &self,
        lane: &str,
        item: &QueueItem,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Remove and return the head of `lane`, or `None` once `timeout` elapses.
    fn dequeue(
        &self,
        lane: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<QueueItem>, AppError>> + Send;

    /// Put a retried item back on `lane`, invisible to consumers until `delay`
    /// has passed. The caller has already incremented `retry_count`.
    fn requeue(
        &self,
        lane: &str,
        item: &QueueItem,
        delay: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Current depth per lane, including items still waiting out a backoff.
    fn lane_lengths(&self) -> impl Future<Output = Result<BTreeMap<String, u64>, AppError>> + Send;

    /// Empty one lane, returning how many items were dropped.
    fn clear(&self, lane: &str) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Empty every lane.
    fn clear_all(&self) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Report every engine lane, even the ones that have never been used.
pub fn with_engine_lanes(mut lengths: BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    for engine in EngineType::ALL {
        lengths.entry(engine.lane().to_string()).or_insert(0);
    }
    lengths
}

// ---------------------------------------------------------------------------
// In-memory queue
// ---------------------------------------------------------------------------

struct Entry {
    item: QueueItem,
    available_at: Instant,
}

#[derive(Default)]
struct Lanes {
    lanes: Mutex<HashMap<String, VecDeque<Entry>>>,
    wakeup: Notify,
}

/// Process-local [`WorkQueue`] used by tests and single-process deployments.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Lanes>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, VecDeque<Entry>>>, AppError> {
        self.inner
            .lanes
            .lock()
            .map_err(|_| AppError::QueueError("queue lock poisoned".into()))
    }

    fn push(&self, lane: &str, item: &QueueItem, available_at: Instant) -> Result<(), AppError> {
        self.lock()?
            .entry(lane.to_string())
            .or_default()
            .push_back(Entry {
                item: item.clone(),
                available_at,
            });
        self.inner.wakeup.notify_waiters();
        Ok(())
    }

    /// Pop the first visible entry, or report when the next one becomes visible.
    fn try_pop(&self, lane: &str) -> Result<Result<QueueItem, Option<Instant>>, AppError> {
        let now = Instant::now();
        let mut lanes = self.lock()?;
        let Some(entries) = lanes.get_mut(lane) else {
            return Ok(Err(None));
        };
        if let Some(pos) = entries.iter().position(|e| e.available_at <= now) {
            if let Some(entry) = entries.remove(pos) {
                return Ok(Ok(entry.item));
            }
        }
        Ok(Err(entries.iter().map(|e| e.available_at).min()))
    }
}

impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, lane: &str, item: &QueueItem) -> Result<(), AppError> {
        self.push(lane, item, Instant::now())
    }

    async fn dequeue(&self, lane: &str, timeout: Duration) -> Result<Option<QueueItem>, AppError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_visible = match self.try_pop(lane)? {
                Ok(item) => return Ok(Some(item)),
                Err(next) => next,
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }
            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn requeue(&self, lane: &str, item: &QueueItem, delay: Duration) -> Result<(), AppError> {
        self.push(lane, item, Instant::now() + delay)
    }

    async fn lane_lengths(&self) -> Result<BTreeMap<String, u64>, AppError> {
        let lanes = self.lock()?;
        let lengths = lanes
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len() as u64))
            .collect();
        Ok(with_engine_lanes(lengths))
    }

    async fn clear(&self, lane: &str) -> Result<u64, AppError> {
        let mut lanes = self.lock()?;
        Ok(lanes.remove(lane).map_or(0, |entries| entries.len() as u64))
    }

    async fn clear_all(&self) -> Result<u64, AppError> {
        let mut lanes = self.lock()?;
        let dropped = lanes.values().map(|entries| entries.len() as u64).sum();
        lanes.clear();
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_queue_item;

    const LANE: &str = "maps_tile";

    #[tokio::test]
    async fn dequeue_preserves_fifo_order() {
        let queue = MemoryQueue::new();
        let first = make_queue_item("tile");
        let second = make_queue_item("tile");
        queue.enqueue(LANE, &first).await.unwrap();
        queue.enqueue(LANE, &second).await.unwrap();

        let got = queue.dequeue(LANE, Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(got.task_id, first.task_id);
        let got = queue.dequeue(LANE, Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(got.task_id, second.task_id);
        assert!(queue.dequeue(LANE, Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dequeue_times_out_on_empty_lane() {
        let queue = MemoryQueue::new();
        let start = Instant::now();
        let got = queue.dequeue(LANE, Duration::from_secs(1)).await.unwrap();
        assert!(got.is_none());
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_dequeue_wakes_on_enqueue() {
        let queue = MemoryQueue::new();
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(LANE, Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let item = make_queue_item("tile");
        queue.enqueue(LANE, &item).await.unwrap();

        let got = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(got.task_id, item.task_id);
    }

    #[tokio::test(start_paused = true)]
    async fn requeued_item_is_invisible_until_delay_passes() {
        let queue = MemoryQueue::new();
        let mut item = make_queue_item("tile");
        item.record_failure();
        queue
            .requeue(LANE, &item, Duration::from_secs(10))
            .await
            .unwrap();

        assert!(queue.dequeue(LANE, Duration::ZERO).await.unwrap().is_none());
        assert_eq!(queue.lane_lengths().await.unwrap()[LANE], 1);

        let got = queue
            .dequeue(LANE, Duration::from_secs(11))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_retry_does_not_block_fresh_items() {
        let queue = MemoryQueue::new();
        let retried = make_queue_item("tile");
        let fresh = make_queue_item("tile");
        queue
            .requeue(LANE, &retried, Duration::from_secs(60))
            .await
            .unwrap();
        queue.enqueue(LANE, &fresh).await.unwrap();

        let got = queue.dequeue(LANE, Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(got.task_id, fresh.task_id);
    }

    #[tokio::test]
    async fn concurrent_consumers_never_share_an_item() {
        let queue = MemoryQueue::new();
        for _ in 0..50 {
            queue.enqueue(LANE, &make_queue_item("tile")).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(item) = queue.dequeue(LANE, Duration::ZERO).await.unwrap() {
                    seen.push(item.task_id);
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 50);
        assert_eq!(unique.len(), 50);
    }

    #[tokio::test]
    async fn lane_lengths_and_clear() {
        let queue = MemoryQueue::new();
        queue.enqueue(LANE, &make_queue_item("tile")).await.unwrap();
        queue.enqueue(LANE, &make_queue_item("tile")).await.unwrap();
        queue
            .enqueue("maps_card", &make_queue_item("card"))
            .await
            .unwrap();

        let lengths = queue.lane_lengths().await.unwrap();
        assert_eq!(lengths[LANE], 2);
        assert_eq!(lengths["maps_card"], 1);
        assert_eq!(lengths["maps_hybrid"], 0);

        assert_eq!(queue.clear(LANE).await.unwrap(), 2);
        assert_eq!(queue.lane_lengths().await.unwrap()[LANE], 0);
        assert_eq!(queue.clear_all().await.unwrap(), 1);
        assert!(queue.lane_lengths().await.unwrap().values().all(|&n| n == 0));
    }
}
