//! Issuing a query and waiting for the result listing.

use tokio_util::sync::CancellationToken;

use crate::dom::{find_all_first, find_first, wait_for_any};
use crate::error::AppError;
use crate::pacing::{Pacing, pause};
use crate::selectors::SiteProfile;
use crate::traits::BrowserSession;

/// State of the page after [`open_search`].
#[derive(Debug)]
pub enum SearchOutcome<E> {
    /// The listing is on screen; holds the scrollable results container.
    Ready(E),
    /// The site answered but showed no entries within the wait.
    NoResults,
    Cancelled,
}

/// Make sure the session shows the listing for `query`.
///
/// A session that already shows a populated listing is reused as-is, so a
/// strategy probe followed by extraction navigates only once. Failing to load
/// the page or to find the search box is task-fatal.
pub async fn open_search<S: BrowserSession>(
    session: &S,
    profile: &SiteProfile,
    pacing: &Pacing,
    query: &str,
    cancel: &CancellationToken,
) -> Result<SearchOutcome<S::Element>, AppError> {
    if cancel.is_cancelled() {
        return Ok(SearchOutcome::Cancelled);
    }

    if let Some(container) = find_first(session, &profile.results_container).await? {
        if !find_all_first(session, &profile.entry).await?.is_empty() {
            tracing::debug!(%query, "Reusing loaded listing");
            return Ok(SearchOutcome::Ready(container));
        }
    }

    session
        .navigate(&profile.search_url)
        .await
        .map_err(|e| AppError::NavigationError(format!("{}: {e}", profile.search_url)))?;
    dismiss_banners(session, profile, pacing, cancel).await;

    if cancel.is_cancelled() {
        return Ok(SearchOutcome::Cancelled);
    }

    let search_box = wait_for_any(
        session,
        &profile.search_box,
        pacing.search_box_timeout,
        pacing.poll_interval,
        cancel,
    )
    .await?
    .ok_or_else(|| AppError::NavigationError("search box did not appear".into()))?;

    if !pause(pacing.search, cancel).await {
        return Ok(SearchOutcome::Cancelled);
    }
    session.send_keys(&search_box, query).await?;
    if !pause(pacing.search, cancel).await {
        return Ok(SearchOutcome::Cancelled);
    }
    session.press_key(&search_box, "Enter").await?;
    tracing::info!(%query, "Search submitted");

    let container = wait_for_any(
        session,
        &profile.results_container,
        pacing.results_timeout,
        pacing.poll_interval,
        cancel,
    )
    .await?;
    if cancel.is_cancelled() {
        return Ok(SearchOutcome::Cancelled);
    }
    let Some(container) = container else {
        tracing::info!(%query, "No results container");
        return Ok(SearchOutcome::NoResults);
    };

    let first_entry = wait_for_any(
        session,
        &profile.entry,
        pacing.results_timeout,
        pacing.poll_interval,
        cancel,
    )
    .await?;
    if cancel.is_cancelled() {
        return Ok(SearchOutcome::Cancelled);
    }
    match first_entry {
        Some(_) => Ok(SearchOutcome::Ready(container)),
        None => Ok(SearchOutcome::NoResults),
    }
}

/// Click away a cookie/consent banner if one is showing. Never fails.
pub async fn dismiss_banners<S: BrowserSession>(
    session: &S,
    profile: &SiteProfile,
    pacing: &Pacing,
    cancel: &CancellationToken,
) {
    for selector in &profile.consent_buttons {
        let Ok(Some(button)) = session.find(selector).await else {
            continue;
        };
        match session.click(&button).await {
            Ok(()) => {
                tracing::debug!(%selector, "Dismissed consent banner");
                pause(pacing.click, cancel).await;
                return;
            }
            Err(e) => tracing::debug!(%selector, error = %e, "Consent button not clickable"),
        }
    }
}
