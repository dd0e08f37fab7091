//! Sampling-based choice between the Tile and Card engines.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dom::{find_all_first, probe_present};
use crate::error::AppError;
use crate::models::{FieldPresence, Strategy, StrategyDecision};
use crate::pacing::Pacing;
use crate::search::{SearchOutcome, open_search};
use crate::selectors::SiteProfile;
use crate::traits::BrowserSession;

/// Entries inspected per decision.
pub const SAMPLE_SIZE: usize = 5;

/// Phone presence (percent) at or above which listing data is trusted.
pub const PHONE_THRESHOLD: f64 = 60.0;

/// Field weights of the completeness score, in percent. They sum to 100.
pub const WEIGHT_PHONE: f64 = 40.0;
pub const WEIGHT_NAME: f64 = 20.0;
pub const WEIGHT_ADDRESS: f64 = 15.0;
pub const WEIGHT_WEBSITE: f64 = 15.0;
pub const WEIGHT_RATING: f64 = 5.0;
pub const WEIGHT_REVIEWS: f64 = 5.0;

fn percentage(count: u32, sample_size: usize) -> f64 {
    if sample_size == 0 {
        return 0.0;
    }
    f64::from(count) * 100.0 / sample_size as f64
}

/// Weighted completeness in `[0, 1]`.
pub fn completeness_score(presence: &FieldPresence, sample_size: usize) -> f64 {
    let weighted = WEIGHT_PHONE * percentage(presence.phone, sample_size)
        + WEIGHT_NAME * percentage(presence.name, sample_size)
        + WEIGHT_ADDRESS * percentage(presence.address, sample_size)
        + WEIGHT_WEBSITE * percentage(presence.website, sample_size)
        + WEIGHT_RATING * percentage(presence.rating, sample_size)
        + WEIGHT_REVIEWS * percentage(presence.reviews, sample_size);
    weighted / 100.0 / 100.0
}

/// Phone presence alone gates the decision.
pub fn strategy_for_phone_presence(phone_percentage: f64) -> Strategy {
    if phone_percentage >= PHONE_THRESHOLD {
        Strategy::Tile
    } else {
        Strategy::Card
    }
}

/// Turn sampled presence counts into a decision.
pub fn decide(presence: FieldPresence, sample_size: usize) -> StrategyDecision {
    let phone_percentage = percentage(presence.phone, sample_size);
    let strategy = strategy_for_phone_presence(phone_percentage);
    let rationale = match strategy {
        Strategy::Tile => format!(
            "High phone availability ({phone_percentage:.1}%) - using tile strategy"
        ),
        Strategy::Card => format!(
            "Low phone availability ({phone_percentage:.1}%) - using card strategy"
        ),
    };
    StrategyDecision {
        sample_size,
        presence,
        completeness_score: completeness_score(&presence, sample_size),
        phone_percentage,
        strategy,
        rationale,
    }
}

/// Card decision with no statistics behind it.
pub fn card_fallback(rationale: impl Into<String>) -> StrategyDecision {
    StrategyDecision {
        sample_size: 0,
        presence: FieldPresence::default(),
        completeness_score: 0.0,
        phone_percentage: 0.0,
        strategy: Strategy::Card,
        rationale: rationale.into(),
    }
}

/// Runs a live search and samples the first few entries.
#[derive(Clone)]
pub struct StrategySelector {
    profile: Arc<SiteProfile>,
    pacing: Pacing,
    sample_size: usize,
}

impl StrategySelector {
    pub fn new(profile: Arc<SiteProfile>, pacing: Pacing) -> Self {
        Self {
            profile,
            pacing,
            sample_size: SAMPLE_SIZE,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Decide for `query`. Never fails: any error yields a Card decision.
    ///
    /// Returns `None` only when cancelled before a decision could be made.
    pub async fn select<S: BrowserSession>(
        &self,
        session: &S,
        query: &str,
        cancel: &CancellationToken,
    ) -> Option<StrategyDecision> {
        match self.sample(session, query, cancel).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(%query, error = %e, "Strategy detection failed");
                Some(card_fallback(format!(
                    "Strategy detection failed: {e} - defaulting to card strategy"
                )))
            }
        }
    }

    async fn sample<S: BrowserSession>(
        &self,
        session: &S,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<StrategyDecision>, AppError> {
        match open_search(session, &self.profile, &self.pacing, query, cancel).await? {
            SearchOutcome::Cancelled => return Ok(None),
            SearchOutcome::NoResults => {
                return Ok(Some(card_fallback(
                    "No search results found - defaulting to card strategy",
                )));
            }
            SearchOutcome::Ready(_) => {}
        }

        let entries = find_all_first(session, &self.profile.entry).await?;
        let sample: Vec<_> = entries.into_iter().take(self.sample_size).collect();
        if sample.is_empty() {
            return Ok(Some(card_fallback(
                "No search results found - defaulting to card strategy",
            )));
        }

        let fields = &self.profile.entry_fields;
        let mut presence = FieldPresence::default();
        for entry in &sample {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let scope = Some(entry);
            presence.name += u32::from(probe_present(session, scope, &fields.name).await);
            presence.phone += u32::from(probe_present(session, scope, &fields.phone).await);
            presence.address += u32::from(probe_present(session, scope, &fields.address).await);
            presence.website += u32::from(probe_present(session, scope, &fields.website).await);
            presence.rating += u32::from(probe_present(session, scope, &fields.rating).await);
            presence.reviews += u32::from(probe_present(session, scope, &fields.reviews).await);
        }

        let decision = decide(presence, sample.len());
        tracing::info!(
            %query,
            strategy = %decision.strategy,
            phone_pct = decision.phone_percentage,
            score = decision.completeness_score,
            "Strategy selected"
        );
        Ok(Some(decision))
    }
}
