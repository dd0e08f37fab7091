use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::job::{Job, JobStatus, TaskStatus};
use crate::models::{ExtractionRecord, RecordOwner};

// ---------------------------------------------------------------------------
// Browser automation
// ---------------------------------------------------------------------------

/// How far to scroll a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollTo {
    By(i64),
    End,
}

/// Scroll offsets of a container after a scroll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollPosition {
    pub top: i64,
    pub height: i64,
}

/// Launches isolated browser sessions. One session serves exactly one task.
pub trait BrowserAutomation: Send + Sync + Clone + 'static {
    type Session: BrowserSession;

    fn new_session(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// Page-level primitives the engines are written against.
///
/// Every call may fail with [`AppError::ElementNotFound`],
/// [`AppError::StaleElement`], [`AppError::Timeout`] or
/// [`AppError::BrowserError`]. Lookups that match nothing return `None` or an
/// empty list rather than an error.
pub trait BrowserSession: Send + Sync + 'static {
    type Element: Clone + Send + Sync;

    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    fn reload(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn current_url(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    fn find(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Option<Self::Element>, AppError>> + Send;

    fn find_all(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Self::Element>, AppError>> + Send;

    fn find_within(
        &self,
        scope: &Self::Element,
        selector: &str,
    ) -> impl Future<Output = Result<Option<Self::Element>, AppError>> + Send;

    fn find_all_within(
        &self,
        scope: &Self::Element,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Self::Element>, AppError>> + Send;

    fn click(&self, element: &Self::Element) -> impl Future<Output = Result<(), AppError>> + Send;

    fn send_keys(
        &self,
        element: &Self::Element,
        text: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Press a named key (`"Enter"`, `"Escape"`) with `element` focused.
    fn press_key(
        &self,
        element: &Self::Element,
        key: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn scroll_container(
        &self,
        container: &Self::Element,
        scroll: ScrollTo,
    ) -> impl Future<Output = Result<ScrollPosition, AppError>> + Send;

    fn scroll_into_view(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn read_text(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    fn inner_html(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Distance from the top of the viewport, used to visit entries in on-screen order.
    fn bounding_top(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<f64, AppError>> + Send;

    /// Run a script body; `args` are visible to it as `arguments`.
    fn evaluate_script(
        &self,
        script: &str,
        args: &[serde_json::Value],
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;

    fn close(self) -> impl Future<Output = Result<(), AppError>> + Send;
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

/// Result of writing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A uniqueness constraint (phone number) already held this record.
    Duplicate,
}

/// Persists records and task/job lifecycle state.
pub trait RecordStore: Send + Sync + Clone + 'static {
    /// Record a freshly submitted job with every task `pending`.
    fn register_job(&self, job: &Job) -> impl Future<Output = Result<(), AppError>> + Send;

    fn upsert_record(
        &self,
        record: &ExtractionRecord,
        owner: &RecordOwner,
    ) -> impl Future<Output = Result<UpsertOutcome, AppError>> + Send;

    fn set_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_task_statuses(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Vec<TaskStatus>, AppError>> + Send;

    fn set_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_job_status(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<JobStatus>, AppError>> + Send;
}
