use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{EngineLimits, ExtractionEngine, ResultSet, ScrapeOutcome};
use crate::dom::{has_end_marker, list_entries, read_first, with_retry};
use crate::error::AppError;
use crate::job::SearchParams;
use crate::models::{Coordinates, ExtractionRecord, RawFields, Strategy};
use crate::normalize::{
    coordinates_from_json, coordinates_from_pair, coordinates_from_url, non_empty_text,
    normalize_text, parse_phone, parse_rating, parse_review_count, usable_website,
};
use crate::pacing::{Pacing, pause};
use crate::search::{SearchOutcome, open_search};
use crate::selectors::SiteProfile;
use crate::traits::{BrowserSession, ScrollTo};

/// Reads every field straight off the listing without opening entries.
///
/// Fast, but only as good as what the listing shows. Records are
/// deduplicated by phone.
#[derive(Clone)]
pub struct TileEngine {
    profile: Arc<SiteProfile>,
    pacing: Pacing,
    limits: EngineLimits,
}

impl TileEngine {
    pub fn new(profile: Arc<SiteProfile>, pacing: Pacing, limits: EngineLimits) -> Self {
        Self {
            profile,
            pacing,
            limits,
        }
    }

    async fn list<S: BrowserSession>(&self, session: &S) -> Result<Vec<S::Element>, AppError> {
        list_entries(
            session,
            &self.profile.entry,
            self.limits.max_transient_retries,
            self.pacing.transient_retry_delay,
        )
        .await
    }

    /// Scroll to the bottom until enough entries are loaded or the listing stops growing.
    ///
    /// A listing that cannot be re-read after a scroll keeps what was loaded before it.
    async fn load_entries<S: BrowserSession>(
        &self,
        session: &S,
        container: &S::Element,
        cancel: &CancellationToken,
    ) -> Result<Vec<S::Element>, AppError> {
        let mut entries = self.list(session).await?;
        let mut stalled = 0;

        while entries.len() < self.limits.result_limit && stalled < self.limits.max_scroll_attempts
        {
            if cancel.is_cancelled() {
                break;
            }
            if has_end_marker(session, container, &self.profile.end_markers).await {
                tracing::debug!(loaded = entries.len(), "End of listing");
                break;
            }
            if let Err(e) = session.scroll_container(container, ScrollTo::End).await {
                tracing::warn!(error = %e, "Scrolling the listing failed");
                break;
            }
            if !pause(self.pacing.scroll, cancel).await {
                break;
            }

            let loaded = match self.list(session).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(error = %e, loaded = entries.len(), "Listing could not be re-read");
                    break;
                }
            };
            if loaded.len() > entries.len() {
                stalled = 0;
            } else {
                stalled += 1;
            }
            entries = loaded;
        }

        Ok(entries)
    }

    async fn read_entry<S: BrowserSession>(
        &self,
        session: &S,
        entry: &S::Element,
    ) -> Result<Option<ExtractionRecord>, AppError> {
        let fields = &self.profile.entry_fields;
        let scope = Some(entry);

        let Some(name) = read_first(session, scope, &fields.name)
            .await?
            .and_then(|raw| non_empty_text(&raw))
        else {
            return Ok(None);
        };

        let phone_text = read_first(session, scope, &fields.phone)
            .await?
            .map(|raw| normalize_text(&raw));
        let phone = phone_text.as_deref().and_then(|raw| parse_phone(raw, 1));

        // The listing sometimes renders the phone in the address slot.
        let address = read_first(session, scope, &fields.address)
            .await?
            .and_then(|raw| non_empty_text(&raw))
            .filter(|address| phone_text.as_deref() != Some(address.as_str()));

        let rating = read_first(session, scope, &fields.rating)
            .await?
            .and_then(|raw| parse_rating(&raw));
        let review_count = read_first(session, scope, &fields.reviews)
            .await?
            .map(|raw| parse_review_count(&raw))
            .unwrap_or(0);
        let website = read_first(session, scope, &fields.website)
            .await?
            .and_then(|href| usable_website(&href, &self.profile.excluded_website_hosts));
        let coordinates = self.coordinates(session, entry, &name).await;

        Ok(Some(ExtractionRecord::new(
            RawFields {
                name,
                address,
                rating,
                review_count,
                website,
                phone,
                coordinates,
            },
            Strategy::Tile,
        )))
    }

    /// Entry attributes first, then link URLs, then the page script.
    async fn coordinates<S: BrowserSession>(
        &self,
        session: &S,
        entry: &S::Element,
        name: &str,
    ) -> Option<Coordinates> {
        let lat = session
            .read_attribute(entry, &self.profile.latitude_attribute)
            .await
            .ok()
            .flatten();
        let lng = session
            .read_attribute(entry, &self.profile.longitude_attribute)
            .await
            .ok()
            .flatten();
        if let (Some(lat), Some(lng)) = (lat, lng) {
            if let Some(found) = coordinates_from_pair(&lat, &lng) {
                return Some(found);
            }
        }

        for selector in &self.profile.entry_fields.links {
            let Ok(links) = session.find_all_within(entry, selector).await else {
                continue;
            };
            for link in links {
                if let Ok(Some(href)) = session.read_attribute(&link, "href").await {
                    if let Some(found) = coordinates_from_url(&href) {
                        return Some(found);
                    }
                }
            }
        }

        if self.profile.coordinate_script.trim().is_empty() {
            return None;
        }
        session
            .evaluate_script(
                &self.profile.coordinate_script,
                &[serde_json::Value::String(name.to_string())],
            )
            .await
            .ok()
            .and_then(|value| coordinates_from_json(&value))
    }
}

impl ExtractionEngine for TileEngine {
    async fn scrape<S: BrowserSession>(
        &self,
        search: &SearchParams,
        session: &S,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, AppError> {
        let query = search.query();
        let container =
            match open_search(session, &self.profile, &self.pacing, &query, cancel).await? {
                SearchOutcome::Ready(container) => container,
                SearchOutcome::NoResults => return Ok(ScrapeOutcome::empty()),
                SearchOutcome::Cancelled => return Ok(ScrapeOutcome::aborted()),
            };

        let entries = self.load_entries(session, &container, cancel).await?;
        tracing::info!(%query, loaded = entries.len(), "Listing loaded");

        let mut results = ResultSet::default();
        let mut processed = 0;
        for entry in entries.iter().take(self.limits.result_limit) {
            if cancel.is_cancelled() {
                tracing::info!(%query, processed, "Cancelled, keeping partial results");
                break;
            }
            processed += 1;

            let engine = self;
            let read = with_retry(
                self.limits.max_transient_retries,
                self.pacing.transient_retry_delay,
                move || engine.read_entry(session, entry),
            )
            .await;
            match read {
                Ok(Some(record)) => {
                    if !results.insert_by_phone(record) {
                        tracing::debug!(%query, "Duplicate phone on listing, skipped");
                    }
                }
                Ok(None) => tracing::debug!(%query, "Entry without a name, skipped"),
                Err(e) => tracing::warn!(%query, error = %e, "Failed to read entry"),
            }
        }

        tracing::info!(%query, processed, records = results.len(), "Tile extraction finished");
        Ok(ScrapeOutcome::finished(results.into_records(), processed))
    }
}
