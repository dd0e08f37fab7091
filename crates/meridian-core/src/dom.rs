//! Probe helpers layered over [`BrowserSession`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::pacing::sleep_or_cancel;
use crate::selectors::Probe;
use crate::traits::BrowserSession;

/// Read one probe inside `scope` (or the whole page). Empty values count as absent.
pub async fn read_probe<S: BrowserSession>(
    session: &S,
    scope: Option<&S::Element>,
    raw: &str,
) -> Result<Option<String>, AppError> {
    let probe = Probe::parse(raw);
    let element = match scope {
        Some(scope) => session.find_within(scope, probe.css).await?,
        None => session.find(probe.css).await?,
    };
    let Some(element) = element else {
        return Ok(None);
    };
    let value = match probe.attribute {
        Some(attribute) => session.read_attribute(&element, attribute).await?,
        None => Some(session.read_text(&element).await?),
    };
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// First non-empty value across an ordered probe list.
///
/// A probe that times out or loses its element falls through to the next one.
/// Stale references are returned to the caller so it can retry the whole read.
pub async fn read_first<S: BrowserSession>(
    session: &S,
    scope: Option<&S::Element>,
    probes: &[String],
) -> Result<Option<String>, AppError> {
    for raw in probes {
        match read_probe(session, scope, raw).await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => continue,
            Err(AppError::ElementNotFound(_) | AppError::Timeout(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Best-effort presence check that never fails.
pub async fn probe_present<S: BrowserSession>(
    session: &S,
    scope: Option<&S::Element>,
    probes: &[String],
) -> bool {
    matches!(read_first(session, scope, probes).await, Ok(Some(_)))
}

/// Value of a probe list, or `None` when every attempt failed.
pub async fn read_lenient<S: BrowserSession>(
    session: &S,
    scope: Option<&S::Element>,
    probes: &[String],
) -> Option<String> {
    read_first(session, scope, probes).await.ok().flatten()
}

/// First selector in the list that matches an element.
pub async fn find_first<S: BrowserSession>(
    session: &S,
    selectors: &[String],
) -> Result<Option<S::Element>, AppError> {
    for selector in selectors {
        match session.find(selector).await {
            Ok(Some(element)) => return Ok(Some(element)),
            Ok(None) | Err(AppError::ElementNotFound(_) | AppError::StaleElement(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// All matches of the first selector that matches anything.
pub async fn find_all_first<S: BrowserSession>(
    session: &S,
    selectors: &[String],
) -> Result<Vec<S::Element>, AppError> {
    for selector in selectors {
        let found = session.find_all(selector).await?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// Poll until one of `selectors` matches, `timeout` passes, or `cancel` fires.
pub async fn wait_for_any<S: BrowserSession>(
    session: &S,
    selectors: &[String],
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<Option<S::Element>, AppError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(element) = find_first(session, selectors).await? {
            return Ok(Some(element));
        }
        if Instant::now() >= deadline || !sleep_or_cancel(poll_interval, cancel).await {
            return Ok(None);
        }
    }
}

/// Run `op` again while it fails with a transient error, up to `attempts` times in total.
pub async fn with_retry<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::debug!(error = %e, attempt, "Transient browser error, retrying");
                attempt += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            other => return other,
        }
    }
}

/// [`find_all_first`] with transient failures retried in place.
pub async fn list_entries<S: BrowserSession>(
    session: &S,
    selectors: &[String],
    attempts: u32,
    delay: Duration,
) -> Result<Vec<S::Element>, AppError> {
    with_retry(attempts, delay, move || find_all_first(session, selectors)).await
}

/// Whether the container's text shows any end-of-list marker.
pub async fn has_end_marker<S: BrowserSession>(
    session: &S,
    container: &S::Element,
    markers: &[String],
) -> bool {
    match session.read_text(container).await {
        Ok(text) => markers.iter().any(|marker| text.contains(marker.as_str())),
        Err(_) => false,
    }
}
