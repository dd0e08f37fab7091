use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use meridian_core::job::{Job, JobStatus, JobSubmission, JobSummary, PartSubmission, SearchParams};
use meridian_core::{PoolSummary, WorkerStatus};

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PartRequest {
    pub part_id: Uuid,
    pub keyword: String,
    pub postcode: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SubmitJobRequest {
    pub job_id: Uuid,
    pub profile_id: Uuid,
    /// `tile`, `card` or `hybrid`.
    pub engine: String,
    pub created_at: Option<DateTime<Utc>>,
    pub parts: Vec<PartRequest>,
}

impl From<SubmitJobRequest> for JobSubmission {
    fn from(body: SubmitJobRequest) -> Self {
        Self {
            job_id: body.job_id,
            profile_id: body.profile_id,
            engine: body.engine,
            created_at: body.created_at,
            parts: body
                .parts
                .into_iter()
                .map(|part| PartSubmission {
                    part_id: part.part_id,
                    search: SearchParams {
                        keyword: part.keyword,
                        postcode: part.postcode,
                        city: part.city,
                        state: part.state,
                        country: part.country,
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub engine: String,
    pub lane: String,
    pub tasks: usize,
    pub status: String,
}

impl From<&Job> for SubmitJobResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            engine: job.engine.to_string(),
            lane: job.engine.lane().to_string(),
            tasks: job.tasks.len(),
            status: JobStatus::Pending.to_string(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub status: String,
    pub total: usize,
    pub pending: usize,
    pub ongoing: usize,
    pub done: usize,
    pub failed: usize,
}

impl JobResponse {
    pub fn new(job_id: Uuid, status: JobStatus, summary: JobSummary) -> Self {
        Self {
            job_id,
            status: status.to_string(),
            total: summary.total,
            pending: summary.pending,
            ongoing: summary.ongoing,
            done: summary.done,
            failed: summary.failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Workers & queues
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WorkerResponse {
    pub worker_id: String,
    pub is_running: bool,
    pub current_task: Option<Uuid>,
    pub processed_count: u64,
    pub failed_count: u64,
}

impl From<WorkerStatus> for WorkerResponse {
    fn from(status: WorkerStatus) -> Self {
        Self {
            worker_id: status.worker_id,
            is_running: status.is_running,
            current_task: status.current_task,
            processed_count: status.processed_count,
            failed_count: status.failed_count,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WorkersResponse {
    pub total_workers: usize,
    pub active_workers: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub workers: Vec<WorkerResponse>,
}

impl WorkersResponse {
    pub fn new(summary: PoolSummary, workers: Vec<WorkerStatus>) -> Self {
        Self {
            total_workers: summary.total_workers,
            active_workers: summary.active_workers,
            total_processed: summary.total_processed,
            total_failed: summary.total_failed,
            workers: workers.into_iter().map(WorkerResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QueuesResponse {
    pub lanes: BTreeMap<String, u64>,
    pub total: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ClearQueuesResponse {
    pub cleared: u64,
}

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
