pub mod dom;
pub mod engine;
pub mod error;
pub mod job;
pub mod job_queue;
pub mod lifecycle;
pub mod models;
pub mod normalize;
pub mod pacing;
pub mod pool;
pub mod processor;
pub mod search;
pub mod selectors;
pub mod strategy;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use engine::{EngineLimits, Engines, ExtractionEngine, ScrapeOutcome};
pub use error::AppError;
pub use job::{
    EngineType, Job, JobStatus, JobSubmission, JobSummary, QueueItem, RetryConfig, SearchParams,
    TaskStatus, WorkerConfig,
};
pub use job_queue::{MemoryQueue, WorkQueue};
pub use lifecycle::{check_job_completion, job_summary, submit_job};
pub use models::{ExtractionRecord, RecordOwner, Strategy, StrategyDecision, compute_hash};
pub use pacing::Pacing;
pub use pool::{PoolStats, PoolSummary, WorkerPool, WorkerStatus};
pub use processor::{TaskProcessor, TracingWorkerReporter, WorkerEvent, WorkerReporter};
pub use selectors::SiteProfile;
pub use traits::{BrowserAutomation, BrowserSession, RecordStore, UpsertOutcome};
