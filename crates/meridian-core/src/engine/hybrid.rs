use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{CardEngine, ExtractionEngine, ScrapeOutcome, TileEngine};
use crate::error::AppError;
use crate::job::SearchParams;
use crate::models::Strategy;
use crate::pacing::Pacing;
use crate::selectors::SiteProfile;
use crate::strategy::StrategySelector;
use crate::traits::BrowserSession;

/// Samples the listing, then hands off to Tile or Card.
///
/// The decision is made per task and stamped onto every record it yields.
#[derive(Clone)]
pub struct HybridEngine {
    selector: StrategySelector,
    tile: TileEngine,
    card: CardEngine,
}

impl HybridEngine {
    pub fn new(
        profile: Arc<SiteProfile>,
        pacing: Pacing,
        tile: TileEngine,
        card: CardEngine,
    ) -> Self {
        Self {
            selector: StrategySelector::new(profile, pacing),
            tile,
            card,
        }
    }

    pub fn with_selector(mut self, selector: StrategySelector) -> Self {
        self.selector = selector;
        self
    }
}

impl ExtractionEngine for HybridEngine {
    async fn scrape<S: BrowserSession>(
        &self,
        search: &SearchParams,
        session: &S,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, AppError> {
        let query = search.query();
        let Some(decision) = self.selector.select(session, &query, cancel).await else {
            tracing::info!(%query, "Cancelled before a strategy was chosen");
            return Ok(ScrapeOutcome::aborted());
        };
        tracing::info!(%query, strategy = %decision.strategy, rationale = %decision.rationale, "Dispatching");

        let mut outcome = match decision.strategy {
            Strategy::Tile => self.tile.scrape(search, session, cancel).await?,
            Strategy::Card => self.card.scrape(search, session, cancel).await?,
        };
        outcome.records = outcome
            .records
            .into_iter()
            .map(|record| record.with_decision(&decision))
            .collect();
        Ok(outcome)
    }
}
