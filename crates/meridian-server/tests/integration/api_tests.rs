use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use meridian_core::job::TaskStatus;
use meridian_core::traits::RecordStore;
use meridian_core::{WorkerEvent, WorkerReporter};

use crate::integration::common::{TEST_ADMIN_TOKEN, TestApp, setup_test_app, setup_test_app_no_auth};

fn authed(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn submission(engine: &str, parts: usize) -> serde_json::Value {
    let parts: Vec<_> = (0..parts)
        .map(|i| {
            serde_json::json!({
                "part_id": Uuid::new_v4(),
                "keyword": "plumber",
                "postcode": format!("1000{i}"),
                "city": "New York",
                "state": "NY",
                "country": "USA"
            })
        })
        .collect();
    serde_json::json!({
        "job_id": Uuid::new_v4(),
        "profile_id": Uuid::new_v4(),
        "engine": engine,
        "parts": parts
    })
}

async fn post_job(app: &TestApp, body: &serde_json::Value) -> Response {
    app.router
        .clone()
        .oneshot(
            authed("POST", "/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(app: &TestApp, uri: &str) -> Response {
    app.router
        .clone()
        .oneshot(authed("GET", uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/v1/queues").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_token_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(
            Request::get("/v1/queues")
                .header("authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_admin_token_returns_403() {
    let app = setup_test_app_no_auth().await;

    let response = get(&app, "/v1/queues").await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = json_body(response).await;
    assert_eq!(json["error"], "forbidden");
}

#[tokio::test]
async fn submitted_job_is_queued_on_engine_lane() {
    let app = setup_test_app().await;
    let body = submission("card", 2);

    let response = post_job(&app, &body).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["lane"], "maps_card");
    assert_eq!(json["tasks"], 2);

    let job_id = body["job_id"].as_str().unwrap();
    let response = get(&app, &format!("/v1/jobs/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["total"], 2);
    assert_eq!(json["pending"], 2);

    let json = json_body(get(&app, "/v1/queues").await).await;
    assert_eq!(json["lanes"]["maps_card"], 2);
    assert_eq!(json["lanes"]["maps_tile"], 0);
    assert_eq!(json["total"], 2);
}

#[tokio::test]
async fn legacy_engine_name_maps_to_hybrid_lane() {
    let app = setup_test_app().await;

    let response = post_job(&app, &submission("google_maps", 1)).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["lane"], "maps_hybrid");
}

#[tokio::test]
async fn invalid_submissions_return_400() {
    let app = setup_test_app().await;

    let response = post_job(&app, &submission("yellow_pages", 1)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "validation_error");

    let response = post_job(&app, &submission("tile", 0)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut duplicated = submission("tile", 2);
    let first = duplicated["parts"][0]["part_id"].clone();
    duplicated["parts"][1]["part_id"] = first;
    let response = post_job(&app, &duplicated).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing reached the queue.
    let json = json_body(get(&app, "/v1/queues").await).await;
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let app = setup_test_app().await;

    let response = get(&app, &format!("/v1/jobs/{}", Uuid::new_v4())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn job_progress_reflects_task_statuses() {
    let app = setup_test_app().await;
    let body = submission("tile", 3);
    post_job(&app, &body).await;

    let store = app.db.record_store();
    let part = |i: usize| body["parts"][i]["part_id"].as_str().unwrap().parse::<Uuid>().unwrap();
    store.set_task_status(part(0), TaskStatus::Done).await.unwrap();
    store.set_task_status(part(1), TaskStatus::Ongoing).await.unwrap();

    let job_id = body["job_id"].as_str().unwrap();
    let json = json_body(get(&app, &format!("/v1/jobs/{job_id}")).await).await;

    assert_eq!(json["status"], "ongoing");
    assert_eq!(json["done"], 1);
    assert_eq!(json["ongoing"], 1);
    assert_eq!(json["pending"], 1);
    assert_eq!(json["failed"], 0);
}

#[tokio::test]
async fn workers_endpoint_reports_pool_status() {
    let app = setup_test_app().await;
    let lanes = vec!["maps_tile".to_string()];
    let task_id = Uuid::new_v4();

    let reporter = app.stats.reporter("worker-1");
    reporter.report(WorkerEvent::Started {
        worker_id: "worker-1",
        lanes: &lanes,
    });
    reporter.report(WorkerEvent::TaskStarted {
        task_id,
        job_id: Uuid::new_v4(),
        lane: "maps_tile",
        query: "plumber in 10001 NY",
    });

    let json = json_body(get(&app, "/v1/workers").await).await;
    assert_eq!(json["total_workers"], 1);
    assert_eq!(json["active_workers"], 1);
    assert_eq!(json["workers"][0]["worker_id"], "worker-1");
    assert_eq!(json["workers"][0]["current_task"], task_id.to_string());

    reporter.report(WorkerEvent::TaskCompleted {
        task_id,
        inserted: 12,
        duplicates: 1,
    });
    let json = json_body(get(&app, "/v1/workers").await).await;
    assert_eq!(json["total_processed"], 1);
    assert!(json["workers"][0]["current_task"].is_null());
}

#[tokio::test]
async fn delete_queues_empties_every_lane() {
    let app = setup_test_app().await;
    post_job(&app, &submission("tile", 2)).await;
    post_job(&app, &submission("hybrid", 1)).await;

    let response = app
        .router
        .clone()
        .oneshot(authed("DELETE", "/v1/queues").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["cleared"], 3);

    let json = json_body(get(&app, "/v1/queues").await).await;
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn openapi_document_is_public() {
    let app = setup_test_app_no_auth().await;

    let response = app
        .router
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["info"]["title"], "Meridian API");
    assert!(json["paths"]["/v1/jobs"].is_object());
}
