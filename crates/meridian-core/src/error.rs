use thiserror::Error;

/// Application-wide error types for Meridian.
#[derive(Error, Debug)]
pub enum AppError {
    /// No element matched the selector.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// A previously located element is no longer attached to the page.
    #[error("Stale element reference: {0}")]
    StaleElement(String),

    /// A wait or automation call timed out.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// Generic browser automation failure (session crash, protocol error).
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// The page could not be loaded or the search could not be issued.
    #[error("Navigation error: {0}")]
    NavigationError(String),

    /// A queue item named an engine type nobody implements.
    #[error("Unknown engine type: {0}")]
    UnknownEngine(String),

    /// Input was rejected before any work was scheduled.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Work queue operation failed.
    #[error("Queue error: {0}")]
    QueueError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying in place
    /// (re-reading a field, re-locating an element).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StaleElement(_) | AppError::Timeout(_) | AppError::ElementNotFound(_)
        )
    }

    /// Returns true if retrying the whole task can never succeed.
    pub fn is_task_fatal(&self) -> bool {
        matches!(
            self,
            AppError::UnknownEngine(_) | AppError::ValidationError(_)
        )
    }
}
