use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{EngineLimits, ExtractionEngine, ResultSet, ScrapeOutcome};
use crate::dom::{
    find_first, has_end_marker, list_entries, read_first, read_lenient, wait_for_any, with_retry,
};
use crate::error::AppError;
use crate::job::SearchParams;
use crate::models::{ExtractionRecord, RawFields, Strategy, compute_hash};
use crate::normalize::{
    coordinates_from_url, non_empty_text, parse_phone, parse_rating, parse_review_count,
    plausible_address, usable_website,
};
use crate::pacing::{Pacing, pause};
use crate::search::{SearchOutcome, open_search};
use crate::selectors::SiteProfile;
use crate::traits::{BrowserSession, ScrollTo};

/// Detail-view phones shorter than this are fragments, not numbers.
const MIN_DETAIL_PHONE_DIGITS: usize = 5;

/// Opens each entry's detail view and reads it there.
///
/// Slow but thorough. Entries are visited one at a time in on-screen order and
/// remembered by a stable identifier, so re-renders and reloads never cause a
/// second visit.
#[derive(Clone)]
pub struct CardEngine {
    profile: Arc<SiteProfile>,
    pacing: Pacing,
    limits: EngineLimits,
}

/// Loop state of one run.
#[derive(Default)]
struct Progress {
    visited: HashSet<String>,
    results: ResultSet,
    processed: usize,
    scroll_attempts: u32,
    stalled_scrolls: u32,
}

enum Visit {
    Record(ExtractionRecord),
    /// Opened and read, but nothing worth keeping.
    Empty,
    /// The entry could not be opened.
    Missed,
}

impl CardEngine {
    pub fn new(profile: Arc<SiteProfile>, pacing: Pacing, limits: EngineLimits) -> Self {
        Self {
            profile,
            pacing,
            limits,
        }
    }

    /// `name|attr..` from stable attributes, else `name|hash(markup)`.
    async fn entry_id<S: BrowserSession>(&self, session: &S, entry: &S::Element) -> String {
        let name = read_lenient(session, Some(entry), &self.profile.entry_fields.name)
            .await
            .unwrap_or_default();
        let mut parts = vec![name];
        for attribute in &self.profile.entry_id_attributes {
            if let Ok(Some(value)) = session.read_attribute(entry, attribute).await {
                if !value.is_empty() {
                    parts.push(value);
                }
            }
        }
        if parts.len() == 1 {
            let html = session.inner_html(entry).await.unwrap_or_default();
            let prefix: String = html.chars().take(100).collect();
            parts.push(compute_hash(&prefix)[..16].to_string());
        }
        parts.join("|")
    }

    /// Loaded entries not yet visited, top of the screen first.
    async fn unvisited<S: BrowserSession>(
        &self,
        session: &S,
        visited: &HashSet<String>,
    ) -> Result<Vec<(S::Element, String)>, AppError> {
        let entries = list_entries(
            session,
            &self.profile.entry,
            self.limits.max_transient_retries,
            self.pacing.transient_retry_delay,
        )
        .await?;
        let mut pending = Vec::new();
        for entry in entries {
            let id = self.entry_id(session, &entry).await;
            if visited.contains(&id) {
                continue;
            }
            let top = session.bounding_top(&entry).await.unwrap_or(f64::MAX);
            pending.push((top, entry, id));
        }
        pending.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(pending
            .into_iter()
            .map(|(_, entry, id)| (entry, id))
            .collect())
    }

    async fn detail_open<S: BrowserSession>(&self, session: &S) -> bool {
        matches!(find_first(session, &self.profile.detail.name).await, Ok(Some(_)))
    }

    async fn click_first<S: BrowserSession>(&self, session: &S, selectors: &[String]) -> bool {
        for selector in selectors {
            if let Ok(Some(button)) = session.find(selector).await {
                if session.click(&button).await.is_ok() {
                    return true;
                }
            }
        }
        false
    }

    /// Close whatever detail view is showing. Returns false if it will not go away.
    async fn ensure_detail_closed<S: BrowserSession>(
        &self,
        session: &S,
        cancel: &CancellationToken,
    ) -> bool {
        for attempt in 0..self.limits.max_close_attempts {
            if !self.detail_open(session).await {
                return true;
            }
            self.click_first(session, &self.profile.detail.close_buttons)
                .await;
            if attempt > 0 && self.detail_open(session).await {
                if !self
                    .click_first(session, &self.profile.detail.back_buttons)
                    .await
                {
                    if let Ok(Some(name)) = find_first(session, &self.profile.detail.name).await {
                        let _ = session.press_key(&name, "Escape").await;
                    }
                }
            }
            pause(self.pacing.close, cancel).await;
        }
        !self.detail_open(session).await
    }

    /// Reload the page and wait for the listing to come back.
    async fn recover<S: BrowserSession>(
        &self,
        session: &S,
        cancel: &CancellationToken,
    ) -> Result<Option<S::Element>, AppError> {
        tracing::warn!("Detail view stuck open, reloading the listing");
        session.reload().await?;
        let entry = wait_for_any(
            session,
            &self.profile.entry,
            self.pacing.results_timeout,
            self.pacing.poll_interval,
            cancel,
        )
        .await?;
        if entry.is_none() {
            return Ok(None);
        }
        find_first(session, &self.profile.results_container).await
    }

    /// Scroll one step. Returns whether the container actually moved.
    async fn scroll_step<S: BrowserSession>(
        &self,
        session: &S,
        container: &S::Element,
        cancel: &CancellationToken,
    ) -> bool {
        let before = session
            .scroll_container(container, ScrollTo::By(0))
            .await
            .map(|p| p.top);
        let after = session
            .scroll_container(container, ScrollTo::By(self.limits.card_scroll_step))
            .await
            .map(|p| p.top);
        pause(self.pacing.scroll, cancel).await;
        match (before, after) {
            (Ok(before), Ok(after)) => after - before >= self.limits.min_scroll_progress,
            (_, Err(e)) | (Err(e), _) => {
                tracing::debug!(error = %e, "Scroll failed");
                false
            }
        }
    }

    async fn visit<S: BrowserSession>(
        &self,
        session: &S,
        entry: &S::Element,
        listing_name: Option<String>,
        cancel: &CancellationToken,
    ) -> Visit {
        let _ = session.scroll_into_view(entry).await;
        if let Err(e) = session.click(entry).await {
            tracing::debug!(error = %e, "Entry not clickable");
            return Visit::Missed;
        }
        if !pause(self.pacing.click, cancel).await {
            return Visit::Missed;
        }

        let opened = wait_for_any(
            session,
            &self.profile.detail.name,
            self.pacing.detail_timeout,
            self.pacing.poll_interval,
            cancel,
        )
        .await;
        if !matches!(opened, Ok(Some(_))) {
            tracing::debug!(name = ?listing_name, "Detail view did not open");
            return Visit::Missed;
        }

        let engine = self;
        let read = with_retry(
            self.limits.max_transient_retries,
            self.pacing.transient_retry_delay,
            move || engine.read_detail(session),
        )
        .await;
        match read {
            Ok(mut fields) => {
                if fields.name.is_empty() {
                    fields.name = listing_name.unwrap_or_default();
                }
                if fields.name.is_empty() {
                    return Visit::Empty;
                }
                Visit::Record(ExtractionRecord::new(fields, Strategy::Card))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read detail view");
                Visit::Empty
            }
        }
    }

    async fn read_detail<S: BrowserSession>(
        &self,
        session: &S,
    ) -> Result<RawFields, AppError> {
        let detail = &self.profile.detail;

        let name = read_first(session, None, &detail.name)
            .await?
            .and_then(|raw| non_empty_text(&raw))
            .unwrap_or_default();
        let phone = read_first(session, None, &detail.phone)
            .await?
            .and_then(|raw| parse_phone(&raw, MIN_DETAIL_PHONE_DIGITS));
        let address = read_first(session, None, &detail.address)
            .await?
            .and_then(|raw| non_empty_text(&raw))
            .filter(|address| plausible_address(address));
        let website = read_first(session, None, &detail.website)
            .await?
            .and_then(|href| usable_website(&href, &self.profile.excluded_website_hosts));
        let rating = read_first(session, None, &detail.rating)
            .await?
            .and_then(|raw| parse_rating(&raw));
        let review_count = read_first(session, None, &detail.reviews)
            .await?
            .map(|raw| parse_review_count(&raw))
            .unwrap_or(0);
        let coordinates = session
            .current_url()
            .await
            .ok()
            .and_then(|url| coordinates_from_url(&url));

        Ok(RawFields {
            name,
            address,
            rating,
            review_count,
            website,
            phone,
            coordinates,
        })
    }
}

impl ExtractionEngine for CardEngine {
    async fn scrape<S: BrowserSession>(
        &self,
        search: &SearchParams,
        session: &S,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, AppError> {
        let query = search.query();
        let mut container =
            match open_search(session, &self.profile, &self.pacing, &query, cancel).await? {
                SearchOutcome::Ready(container) => container,
                SearchOutcome::NoResults => return Ok(ScrapeOutcome::empty()),
                SearchOutcome::Cancelled => return Ok(ScrapeOutcome::aborted()),
            };

        let mut progress = Progress::default();
        while progress.processed < self.limits.result_limit
            && progress.scroll_attempts < self.limits.max_scroll_attempts
        {
            if cancel.is_cancelled() {
                tracing::info!(%query, processed = progress.processed, "Cancelled, keeping partial results");
                break;
            }

            if !self.ensure_detail_closed(session, cancel).await {
                match self.recover(session, cancel).await {
                    Ok(Some(fresh)) => container = fresh,
                    Ok(None) => {
                        tracing::warn!(%query, "Listing did not come back after reload");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(%query, error = %e, "Reload failed");
                        break;
                    }
                }
            }

            let pending = match self.unvisited(session, &progress.visited).await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::warn!(%query, error = %e, "Listing could not be re-read, keeping partial results");
                    break;
                }
            };
            let Some((entry, id)) = pending.into_iter().next() else {
                if has_end_marker(session, &container, &self.profile.end_markers).await {
                    tracing::debug!(%query, "End of listing");
                    break;
                }
                if self.scroll_step(session, &container, cancel).await {
                    progress.stalled_scrolls += 1;
                    if progress.stalled_scrolls >= 3 {
                        progress.scroll_attempts += 1;
                    }
                } else {
                    progress.scroll_attempts += 1;
                }
                continue;
            };

            progress.visited.insert(id);
            let listing_name = read_lenient(session, Some(&entry), &self.profile.entry_fields.name)
                .await
                .and_then(|raw| non_empty_text(&raw));
            if listing_name
                .as_deref()
                .is_some_and(|name| progress.results.has_name(name))
            {
                tracing::debug!(%query, name = ?listing_name, "Already harvested, skipped");
                continue;
            }

            match self.visit(session, &entry, listing_name, cancel).await {
                Visit::Record(record) => {
                    progress.processed += 1;
                    progress.scroll_attempts = 0;
                    progress.stalled_scrolls = 0;
                    if !progress.results.insert_by_name_then_phone(record) {
                        tracing::debug!(%query, "Duplicate detail view, skipped");
                    }
                }
                Visit::Empty => progress.processed += 1,
                Visit::Missed => {}
            }
        }

        self.ensure_detail_closed(session, cancel).await;
        tracing::info!(
            %query,
            processed = progress.processed,
            records = progress.results.len(),
            "Card extraction finished"
        );
        Ok(ScrapeOutcome::finished(
            progress.results.into_records(),
            progress.processed,
        ))
    }
}
