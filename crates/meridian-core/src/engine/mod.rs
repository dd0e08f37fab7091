//! Extraction engines: Tile, Card and the adaptive Hybrid.
//!
//! Every engine drives a single [`BrowserSession`] through one search and
//! returns the records it harvested. Element-level trouble (stale nodes,
//! missing fields) is absorbed inside the engine; only failures that make the
//! whole task pointless, such as the site not loading, come back as `Err`.

mod card;
mod hybrid;
mod tile;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::job::{EngineType, SearchParams};
use crate::models::ExtractionRecord;
use crate::pacing::Pacing;
use crate::selectors::SiteProfile;
use crate::traits::BrowserSession;

pub use card::CardEngine;
pub use hybrid::HybridEngine;
pub use tile::TileEngine;

/// Bounds that keep a single task from running forever.
#[derive(Debug, Clone)]
pub struct EngineLimits {
    /// Most entries one task will harvest.
    pub result_limit: usize,
    /// Consecutive unproductive scrolls before the listing counts as exhausted.
    pub max_scroll_attempts: u32,
    /// Tries of one read or listing query before a transient error is given up on.
    pub max_transient_retries: u32,
    /// Close attempts before the page is reloaded.
    pub max_close_attempts: u32,
    /// Pixels a scroll must move to count as progress.
    pub min_scroll_progress: i64,
    /// Pixels per Card-engine scroll step.
    pub card_scroll_step: i64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            result_limit: 120,
            max_scroll_attempts: 10,
            max_transient_retries: 3,
            max_close_attempts: 3,
            min_scroll_progress: 50,
            card_scroll_step: 300,
        }
    }
}

impl EngineLimits {
    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit;
        self
    }

    pub fn with_max_scroll_attempts(mut self, attempts: u32) -> Self {
        self.max_scroll_attempts = attempts;
        self
    }
}

/// What one engine run produced.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOutcome {
    pub records: Vec<ExtractionRecord>,
    /// Entries the engine looked at, kept or not.
    pub items_processed: usize,
    /// False when the run could not produce a meaningful result.
    pub success: bool,
}

impl ScrapeOutcome {
    pub fn finished(records: Vec<ExtractionRecord>, items_processed: usize) -> Self {
        Self {
            records,
            items_processed,
            success: true,
        }
    }

    /// The site answered with nothing to harvest.
    pub fn empty() -> Self {
        Self::finished(Vec::new(), 0)
    }

    /// Stopped before the listing was even read.
    pub fn aborted() -> Self {
        Self::default()
    }
}

/// One extraction algorithm.
pub trait ExtractionEngine: Send + Sync {
    fn scrape<S: BrowserSession>(
        &self,
        search: &SearchParams,
        session: &S,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ScrapeOutcome, AppError>> + Send;
}

/// The engine set a processor dispatches to.
#[derive(Clone)]
pub struct Engines {
    pub tile: TileEngine,
    pub card: CardEngine,
    pub hybrid: HybridEngine,
}

impl Engines {
    pub fn new(profile: SiteProfile, pacing: Pacing, limits: EngineLimits) -> Self {
        let profile = Arc::new(profile);
        let tile = TileEngine::new(profile.clone(), pacing.clone(), limits.clone());
        let card = CardEngine::new(profile.clone(), pacing.clone(), limits);
        let hybrid = HybridEngine::new(profile, pacing, tile.clone(), card.clone());
        Self { tile, card, hybrid }
    }

    pub async fn scrape<S: BrowserSession>(
        &self,
        engine: EngineType,
        search: &SearchParams,
        session: &S,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, AppError> {
        match engine {
            EngineType::Tile => self.tile.scrape(search, session, cancel).await,
            EngineType::Card => self.card.scrape(search, session, cancel).await,
            EngineType::Hybrid => self.hybrid.scrape(search, session, cancel).await,
        }
    }
}

impl Default for Engines {
    fn default() -> Self {
        Self::new(SiteProfile::default(), Pacing::default(), EngineLimits::default())
    }
}

// ---------------------------------------------------------------------------
// Per-task result set
// ---------------------------------------------------------------------------

/// Records of one task, deduplicated as they arrive. First seen wins.
#[derive(Debug, Default)]
pub(crate) struct ResultSet {
    records: Vec<ExtractionRecord>,
    phones: HashSet<String>,
    names: HashSet<String>,
}

impl ResultSet {
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn has_name(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    /// Keep `record` unless its phone was already seen.
    pub(crate) fn insert_by_phone(&mut self, record: ExtractionRecord) -> bool {
        if let Some(phone) = record.phone_key() {
            if !self.phones.insert(phone.to_string()) {
                return false;
            }
        }
        self.names.insert(record.name.to_lowercase());
        self.records.push(record);
        true
    }

    /// Keep `record` unless its name, then its phone, was already seen.
    pub(crate) fn insert_by_name_then_phone(&mut self, record: ExtractionRecord) -> bool {
        if self.has_name(&record.name) {
            return false;
        }
        self.insert_by_phone(record)
    }

    pub(crate) fn into_records(self) -> Vec<ExtractionRecord> {
        self.records
    }
}
