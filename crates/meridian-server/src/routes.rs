use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use meridian_core::error::AppError;
use meridian_core::job_queue::WorkQueue;
use meridian_core::traits::RecordStore;
use meridian_core::{PoolSummary, job_summary, submit_job};

use crate::auth::require_admin_token;
use crate::dto::{
    ClearQueuesResponse, HealthResponse, JobResponse, QueuesResponse, SubmitJobRequest,
    SubmitJobResponse, WorkersResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/jobs", post(submit))
        .route("/v1/jobs/{id}", get(get_job))
        .route("/v1/workers", get(list_workers))
        .route("/v1/queues", get(queue_lengths).delete(clear_queues))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 202, description = "Job accepted and queued", body = SubmitJobResponse),
        (status = 400, description = "Invalid submission", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = submit_job(&state.queue, &state.store, body.into()).await?;
    Ok((StatusCode::ACCEPTED, axum::Json(SubmitJobResponse::from(&job))))
}

#[utoipa::path(
    get,
    path = "/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Task counts and job status", body = JobResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = job_summary(&state.store, id).await?;
    if summary.total == 0 {
        return Err(AppError::NotFound(format!("Job {id}")).into());
    }

    let status = state
        .store
        .get_job_status(id)
        .await?
        .unwrap_or_else(|| summary.status());
    Ok(axum::Json(JobResponse::new(id, status, summary)))
}

// ---------------------------------------------------------------------------
// Workers & queues
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/workers",
    responses(
        (status = 200, description = "Worker pool status", body = WorkersResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "workers"
)]
pub async fn list_workers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = match &state.workers {
        Some(stats) => WorkersResponse::new(stats.summary(), stats.workers()),
        None => WorkersResponse::new(PoolSummary::default(), Vec::new()),
    };
    axum::Json(response)
}

#[utoipa::path(
    get,
    path = "/v1/queues",
    responses(
        (status = 200, description = "Items waiting per lane", body = QueuesResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "queues"
)]
pub async fn queue_lengths(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let lanes = state.queue.lane_lengths().await?;
    let total = lanes.values().sum();
    Ok(axum::Json(QueuesResponse { lanes, total }))
}

#[utoipa::path(
    delete,
    path = "/v1/queues",
    responses(
        (status = 200, description = "Every lane emptied", body = ClearQueuesResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "queues"
)]
pub async fn clear_queues(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let cleared = state.queue.clear_all().await?;
    Ok(axum::Json(ClearQueuesResponse { cleared }))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(HealthResponse {
                status: "healthy",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(HealthResponse {
                    status: "unhealthy",
                    database: "error",
                }),
            )
        }
    }
}
