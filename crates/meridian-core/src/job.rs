use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Status of a single task (job part).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Ongoing,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ongoing => "ongoing",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "ongoing" => Ok(TaskStatus::Ongoing),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// Status of a job, derived from its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Ongoing,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Ongoing => "ongoing",
            JobStatus::Done => "done",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "ongoing" => Ok(JobStatus::Ongoing),
            "done" => Ok(JobStatus::Done),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Which extraction algorithm a task asks for. Each engine type owns one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Tile,
    Card,
    Hybrid,
}

impl EngineType {
    pub const ALL: [EngineType; 3] = [EngineType::Tile, EngineType::Card, EngineType::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Tile => "tile",
            EngineType::Card => "card",
            EngineType::Hybrid => "hybrid",
        }
    }

    /// Name of the queue lane serving this engine type.
    pub fn lane(&self) -> &'static str {
        match self {
            EngineType::Tile => "maps_tile",
            EngineType::Card => "maps_card",
            EngineType::Hybrid => "maps_hybrid",
        }
    }

    /// All lane names, in round-robin order.
    pub fn all_lanes() -> Vec<String> {
        Self::ALL.iter().map(|e| e.lane().to_string()).collect()
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tile" => Ok(EngineType::Tile),
            "card" => Ok(EngineType::Card),
            // Legacy submitters name the adaptive engine after the site.
            "hybrid" | "google_maps" => Ok(EngineType::Hybrid),
            _ => Err(AppError::UnknownEngine(s.to_string())),
        }
    }
}

/// Search parameters of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub keyword: String,
    pub postcode: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
}

impl SearchParams {
    /// Query text typed into the search box.
    ///
    /// US searches are scoped by state, everything else by city.
    pub fn query(&self) -> String {
        let area = if self.country.eq_ignore_ascii_case("usa") {
            &self.state
        } else {
            &self.city
        };
        format!("{} in {} {}", self.keyword, self.postcode, area)
            .trim_end()
            .to_string()
    }
}

/// Serialized envelope placed on the work queue, one per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub job_id: Uuid,
    pub profile_id: Uuid,
    pub task_id: Uuid,
    /// Kept as raw text so unknown engine types surface at processing time.
    pub engine: String,
    pub search: SearchParams,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

impl QueueItem {
    pub fn engine_type(&self) -> Result<EngineType, AppError> {
        self.engine.parse()
    }

    /// Count one failed attempt and return the new retry count.
    pub fn record_failure(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }
}

/// A unit of extraction work (one search query).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub job_id: Uuid,
    pub engine: EngineType,
    pub search: SearchParams,
    pub retry_count: u32,
    pub status: TaskStatus,
}

/// A set of tasks submitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub engine: EngineType,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl Job {
    /// Queue envelopes for every task, in submission order.
    pub fn queue_items(&self) -> Vec<QueueItem> {
        self.tasks
            .iter()
            .map(|task| QueueItem {
                job_id: self.id,
                profile_id: self.profile_id,
                task_id: task.id,
                engine: self.engine.as_str().to_string(),
                search: task.search.clone(),
                created_at: self.created_at,
                retry_count: 0,
            })
            .collect()
    }
}

/// One part of an incoming submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartSubmission {
    pub part_id: Uuid,
    #[serde(flatten)]
    pub search: SearchParams,
}

/// Incoming job as received from the submission surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub job_id: Uuid,
    pub profile_id: Uuid,
    pub engine: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub parts: Vec<PartSubmission>,
}

impl JobSubmission {
    /// Validate and decompose into a [`Job`] with every task pending.
    pub fn into_job(self) -> Result<Job, AppError> {
        let engine = self
            .engine
            .parse::<EngineType>()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        if self.parts.is_empty() {
            return Err(AppError::ValidationError(format!(
                "Job {} has no parts",
                self.job_id
            )));
        }

        let mut seen = HashSet::new();
        for part in &self.parts {
            if !seen.insert(part.part_id) {
                return Err(AppError::ValidationError(format!(
                    "Duplicate part id {} in job {}",
                    part.part_id, self.job_id
                )));
            }
            if part.search.keyword.trim().is_empty() {
                return Err(AppError::ValidationError(format!(
                    "Part {} has an empty keyword",
                    part.part_id
                )));
            }
        }

        let tasks = self
            .parts
            .into_iter()
            .map(|part| Task {
                id: part.part_id,
                job_id: self.job_id,
                engine,
                search: part.search,
                retry_count: 0,
                status: TaskStatus::Pending,
            })
            .collect();

        Ok(Job {
            id: self.job_id,
            profile_id: self.profile_id,
            engine,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            tasks,
        })
    }
}

/// Per-job task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: usize,
    pub pending: usize,
    pub ongoing: usize,
    pub done: usize,
    pub failed: usize,
}

impl JobSummary {
    pub fn from_statuses(statuses: &[TaskStatus]) -> Self {
        let mut summary = Self {
            total: statuses.len(),
            ..Self::default()
        };
        for status in statuses {
            match status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Ongoing => summary.ongoing += 1,
                TaskStatus::Done => summary.done += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// True when the job has tasks and all of them are done or failed.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.done + self.failed == self.total
    }

    pub fn status(&self) -> JobStatus {
        if self.is_complete() {
            JobStatus::Done
        } else if self.pending == self.total {
            JobStatus::Pending
        } else {
            JobStatus::Ongoing
        }
    }
}

/// Retry ceiling plus the backoff table.
///
/// Default schedule: 10s, 30s, 60s (capped at the last entry).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delays: Vec<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Backoff before the given retry (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.delays.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempt.saturating_sub(1) as usize).min(self.delays.len() - 1);
        self.delays[idx]
    }

    /// Whether a task that has failed `retry_count` times goes back on its lane.
    pub fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Parse a comma-separated list of seconds, e.g. `"10,30,60"`.
    pub fn parse_delays(raw: &str) -> Result<Vec<Duration>, AppError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                    AppError::ConfigError(format!("Invalid retry delay '{s}': expected seconds"))
                })
            })
            .collect()
    }
}

/// Configuration for a single task processor.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub lanes: Vec<String>,
    pub dequeue_timeout: Duration,
    pub idle_interval: Duration,
    pub retry_config: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            lanes: EngineType::all_lanes(),
            dequeue_timeout: Duration::from_secs(1),
            idle_interval: Duration::from_secs(1),
            retry_config: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_lanes(mut self, lanes: Vec<String>) -> Self {
        self.lanes = lanes;
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }
}
