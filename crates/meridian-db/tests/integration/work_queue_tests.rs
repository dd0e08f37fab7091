use std::collections::HashSet;
use std::time::Duration;

use meridian_core::job_queue::WorkQueue;
use meridian_core::testutil::make_queue_item;

use crate::integration::common::setup_test_db;

const LANE: &str = "maps_tile";

#[tokio::test]
async fn dequeue_is_fifo_per_lane() {
    let (db, _container) = setup_test_db().await;
    let queue = db.work_queue();

    let first = make_queue_item("tile");
    let second = make_queue_item("tile");
    queue.enqueue(LANE, &first).await.unwrap();
    queue.enqueue(LANE, &second).await.unwrap();
    queue.enqueue("maps_card", &make_queue_item("card")).await.unwrap();

    let a = queue.dequeue(LANE, Duration::from_millis(100)).await.unwrap();
    let b = queue.dequeue(LANE, Duration::from_millis(100)).await.unwrap();
    let c = queue.dequeue(LANE, Duration::from_millis(100)).await.unwrap();

    assert_eq!(a, Some(first));
    assert_eq!(b, Some(second));
    assert_eq!(c, None);
}

#[tokio::test]
async fn empty_lane_dequeue_waits_for_timeout() {
    let (db, _container) = setup_test_db().await;
    let queue = db.work_queue().with_poll_interval(Duration::from_millis(20));

    let started = std::time::Instant::now();
    let item = queue.dequeue(LANE, Duration::from_millis(150)).await.unwrap();

    assert!(item.is_none());
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn waiting_dequeue_picks_up_late_item() {
    let (db, _container) = setup_test_db().await;
    let queue = db.work_queue().with_poll_interval(Duration::from_millis(20));
    let producer = queue.clone();
    let item = make_queue_item("tile");
    let expected = item.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        producer.enqueue(LANE, &item).await.unwrap();
    });

    let got = queue.dequeue(LANE, Duration::from_secs(5)).await.unwrap();
    assert_eq!(got, Some(expected));
}

#[tokio::test]
async fn requeued_item_stays_hidden_during_backoff() {
    let (db, _container) = setup_test_db().await;
    let queue = db.work_queue().with_poll_interval(Duration::from_millis(20));

    let mut item = make_queue_item("tile");
    item.record_failure();
    queue.requeue(LANE, &item, Duration::from_millis(500)).await.unwrap();

    // Counted but not claimable yet.
    assert_eq!(queue.lane_lengths().await.unwrap()[LANE], 1);
    assert!(queue.dequeue(LANE, Duration::ZERO).await.unwrap().is_none());

    let got = queue
        .dequeue(LANE, Duration::from_secs(5))
        .await
        .unwrap()
        .expect("visible after the backoff");
    assert_eq!(got.retry_count, 1);
    assert_eq!(got.task_id, item.task_id);
}

#[tokio::test]
async fn backoff_does_not_block_fresh_items() {
    let (db, _container) = setup_test_db().await;
    let queue = db.work_queue();

    let retried = make_queue_item("tile");
    let fresh = make_queue_item("tile");
    queue.requeue(LANE, &retried, Duration::from_secs(60)).await.unwrap();
    queue.enqueue(LANE, &fresh).await.unwrap();

    let got = queue.dequeue(LANE, Duration::from_millis(100)).await.unwrap();
    assert_eq!(got.map(|i| i.task_id), Some(fresh.task_id));
}

#[tokio::test]
async fn concurrent_consumers_never_share_an_item() {
    let (db, _container) = setup_test_db().await;
    let queue = db.work_queue().with_poll_interval(Duration::from_millis(10));

    let mut expected = HashSet::new();
    for _ in 0..20 {
        let item = make_queue_item("tile");
        expected.insert(item.task_id);
        queue.enqueue(LANE, &item).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(item) = queue.dequeue(LANE, Duration::from_millis(50)).await.unwrap() {
                seen.push(item.task_id);
            }
            seen
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        claimed.extend(handle.await.unwrap());
    }
    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 20);
    assert_eq!(unique, expected);
}

#[tokio::test]
async fn lane_lengths_report_every_engine_lane() {
    let (db, _container) = setup_test_db().await;
    let queue = db.work_queue();

    queue.enqueue(LANE, &make_queue_item("tile")).await.unwrap();
    queue.enqueue(LANE, &make_queue_item("tile")).await.unwrap();
    queue.enqueue("maps_hybrid", &make_queue_item("hybrid")).await.unwrap();

    let lengths = queue.lane_lengths().await.unwrap();
    assert_eq!(lengths["maps_tile"], 2);
    assert_eq!(lengths["maps_card"], 0);
    assert_eq!(lengths["maps_hybrid"], 1);
}

#[tokio::test]
async fn clear_empties_one_lane_or_all() {
    let (db, _container) = setup_test_db().await;
    let queue = db.work_queue();

    queue.enqueue(LANE, &make_queue_item("tile")).await.unwrap();
    queue.enqueue("maps_card", &make_queue_item("card")).await.unwrap();
    queue.enqueue("maps_card", &make_queue_item("card")).await.unwrap();

    assert_eq!(queue.clear(LANE).await.unwrap(), 1);
    assert_eq!(queue.lane_lengths().await.unwrap()["maps_card"], 2);

    assert_eq!(queue.clear_all().await.unwrap(), 2);
    assert!(queue.lane_lengths().await.unwrap().values().all(|n| *n == 0));
}
