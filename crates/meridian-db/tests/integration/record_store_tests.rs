use meridian_core::job::{Job, JobStatus, TaskStatus};
use meridian_core::AppError;
use meridian_core::models::{ExtractionRecord, FieldPresence, RawFields, RecordOwner, Strategy};
use meridian_core::strategy::decide;
use meridian_core::testutil::make_submission;
use meridian_core::traits::{RecordStore, UpsertOutcome};

use crate::integration::common::setup_test_db;

fn job(parts: usize) -> Job {
    make_submission("hybrid", parts).into_job().unwrap()
}

fn owner(job: &Job, task: usize) -> RecordOwner {
    RecordOwner {
        profile_id: job.profile_id,
        job_id: job.id,
        task_id: job.tasks[task].id,
        search: job.tasks[task].search.clone(),
    }
}

fn record(name: &str, phone: Option<&str>) -> ExtractionRecord {
    ExtractionRecord::new(
        RawFields {
            name: name.to_string(),
            phone: phone.map(str::to_string),
            website: Some("https://acme.test".into()),
            rating: Some(4.5),
            review_count: 12,
            ..RawFields::default()
        },
        Strategy::Tile,
    )
}

#[tokio::test]
async fn registered_job_starts_pending() {
    let (db, _container) = setup_test_db().await;
    let store = db.record_store();
    let job = job(3);

    store.register_job(&job).await.unwrap();

    assert_eq!(store.get_job_status(job.id).await.unwrap(), Some(JobStatus::Pending));
    assert_eq!(
        store.get_task_statuses(job.id).await.unwrap(),
        vec![TaskStatus::Pending; 3]
    );
}

#[tokio::test]
async fn registering_same_job_twice_is_rejected() {
    let (db, _container) = setup_test_db().await;
    let store = db.record_store();
    let job = job(1);

    store.register_job(&job).await.unwrap();
    let err = store.register_job(&job).await.unwrap_err();

    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn task_statuses_keep_submission_order() {
    let (db, _container) = setup_test_db().await;
    let store = db.record_store();
    let job = job(3);
    store.register_job(&job).await.unwrap();

    store.set_task_status(job.tasks[2].id, TaskStatus::Failed).await.unwrap();
    store.set_task_status(job.tasks[0].id, TaskStatus::Done).await.unwrap();

    assert_eq!(
        store.get_task_statuses(job.id).await.unwrap(),
        vec![TaskStatus::Done, TaskStatus::Pending, TaskStatus::Failed]
    );
}

#[tokio::test]
async fn first_pickup_marks_job_ongoing() {
    let (db, _container) = setup_test_db().await;
    let store = db.record_store();
    let job = job(2);
    store.register_job(&job).await.unwrap();

    store.set_task_status(job.tasks[0].id, TaskStatus::Ongoing).await.unwrap();
    assert_eq!(store.get_job_status(job.id).await.unwrap(), Some(JobStatus::Ongoing));

    store.set_job_status(job.id, JobStatus::Done).await.unwrap();
    // A late status write never reopens a finished job.
    store.set_task_status(job.tasks[1].id, TaskStatus::Done).await.unwrap();
    assert_eq!(store.get_job_status(job.id).await.unwrap(), Some(JobStatus::Done));
}

#[tokio::test]
async fn unknown_task_and_job_are_not_found() {
    let (db, _container) = setup_test_db().await;
    let store = db.record_store();

    let err = store
        .set_task_status(uuid::Uuid::new_v4(), TaskStatus::Done)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = store
        .set_job_status(uuid::Uuid::new_v4(), JobStatus::Done)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(store.get_job_status(uuid::Uuid::new_v4()).await.unwrap(), None);
    assert!(store.get_task_statuses(uuid::Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn phone_numbers_are_unique() {
    let (db, _container) = setup_test_db().await;
    let store = db.record_store();
    let job = job(2);
    store.register_job(&job).await.unwrap();

    let first = store
        .upsert_record(&record("Acme Plumbing", Some("5550100")), &owner(&job, 0))
        .await
        .unwrap();
    let again = store
        .upsert_record(&record("Acme Plumbing NYC", Some("5550100")), &owner(&job, 1))
        .await
        .unwrap();

    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(again, UpsertOutcome::Duplicate);
    assert_eq!(db.record_store().count_records(job.id).await.unwrap(), 1);
}

#[tokio::test]
async fn records_without_phone_are_all_kept() {
    let (db, _container) = setup_test_db().await;
    let store = db.record_store();
    let job = job(1);
    store.register_job(&job).await.unwrap();

    for name in ["North", "South", "East"] {
        let outcome = store
            .upsert_record(&record(name, None), &owner(&job, 0))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
    }
    // Empty phone text counts as no phone.
    let outcome = store
        .upsert_record(&record("West", Some("")), &owner(&job, 0))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);

    assert_eq!(store.count_records(job.id).await.unwrap(), 4);
}

#[tokio::test]
async fn record_is_stored_with_owner_and_decision() {
    let (db, _container) = setup_test_db().await;
    let store = db.record_store();
    let job = job(1);
    store.register_job(&job).await.unwrap();

    let decision = decide(
        FieldPresence {
            name: 5,
            phone: 4,
            ..FieldPresence::default()
        },
        5,
    );
    let record = record("Acme Plumbing", Some("5550100")).with_decision(&decision);
    store.upsert_record(&record, &owner(&job, 0)).await.unwrap();

    let (keyword, postcode, strategy, email_status, outreach, stored_decision): (
        String,
        String,
        String,
        String,
        serde_json::Value,
        serde_json::Value,
    ) = sqlx::query_as(
        r#"
        SELECT keyword, postcode, strategy, email_status, outreach, decision
        FROM records WHERE job_id = $1
        "#,
    )
    .bind(job.id)
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert_eq!(keyword, "plumber");
    assert_eq!(postcode, job.tasks[0].search.postcode);
    assert_eq!(strategy, "tile");
    assert_eq!(email_status, "pending");
    assert_eq!(outreach["status"], "idle");
    assert_eq!(stored_decision["strategy"], "tile");
    assert_eq!(stored_decision["sample_size"], 5);
}
