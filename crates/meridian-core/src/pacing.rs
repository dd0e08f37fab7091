//! Human-like pacing between page interactions.
//!
//! Every explicit delay is a random pick from a [`DelayRange`] and doubles as
//! a cancellation checkpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use meridian_core::pacing::{DelayRange, Pacing};
//!
//! let pacing = Pacing::default()
//!     .with_scroll(DelayRange::new(Duration::from_secs(2), Duration::from_secs(3)));
//! assert!(pacing.scroll.sample() >= Duration::from_secs(2));
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Uniform delay in `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        Self::new(Duration::from_secs_f64(min), Duration::from_secs_f64(max))
    }

    /// Pick a delay inside the range.
    pub fn sample(&self) -> Duration {
        let spread = self.max.saturating_sub(self.min);
        if spread.is_zero() {
            return self.min;
        }
        let jitter_ms = rand_jitter_ms(spread.as_millis() as u64);
        self.min + Duration::from_millis(jitter_ms)
    }
}

/// Delays and readiness timeouts used while driving the page.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Before typing the query and before submitting it.
    pub search: DelayRange,
    /// After clicking an entry, before reading its detail view.
    pub click: DelayRange,
    /// After closing a detail view.
    pub close: DelayRange,
    /// After each scroll of the results container.
    pub scroll: DelayRange,
    /// Poll interval of every readiness wait.
    pub poll_interval: Duration,
    pub search_box_timeout: Duration,
    pub results_timeout: Duration,
    pub detail_timeout: Duration,
    /// Pause before retrying a read that failed transiently.
    pub transient_retry_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            search: DelayRange::from_secs_f64(0.3, 0.7),
            click: DelayRange::from_secs_f64(0.5, 1.0),
            close: DelayRange::from_secs_f64(0.3, 0.6),
            scroll: DelayRange::from_secs_f64(1.0, 1.5),
            poll_interval: Duration::from_millis(250),
            search_box_timeout: Duration::from_secs(15),
            results_timeout: Duration::from_secs(20),
            detail_timeout: Duration::from_secs(12),
            transient_retry_delay: Duration::from_millis(500),
        }
    }
}

impl Pacing {
    /// No delays at all; readiness waits still poll with short timeouts.
    pub fn instant() -> Self {
        Self {
            search: DelayRange::ZERO,
            click: DelayRange::ZERO,
            close: DelayRange::ZERO,
            scroll: DelayRange::ZERO,
            poll_interval: Duration::from_millis(1),
            search_box_timeout: Duration::from_millis(20),
            results_timeout: Duration::from_millis(20),
            detail_timeout: Duration::from_millis(20),
            transient_retry_delay: Duration::ZERO,
        }
    }

    pub fn with_search(mut self, range: DelayRange) -> Self {
        self.search = range;
        self
    }

    pub fn with_click(mut self, range: DelayRange) -> Self {
        self.click = range;
        self
    }

    pub fn with_scroll(mut self, range: DelayRange) -> Self {
        self.scroll = range;
        self
    }

    pub fn with_results_timeout(mut self, timeout: Duration) -> Self {
        self.results_timeout = timeout;
        self
    }
}

/// Sleep for a sample of `range`. Returns `false` if cancelled first.
pub async fn pause(range: DelayRange, cancel: &CancellationToken) -> bool {
    sleep_or_cancel(range.sample(), cancel).await
}

/// Sleep for `duration`. Returns `false` if cancelled first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

// ---------------------------------------------------------------------------
// Jitter: xorshift64 seeded from the high-resolution clock.
// ---------------------------------------------------------------------------

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
