use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::job::{QueueItem, SearchParams};

/// Extraction algorithm actually used for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Read every field straight off the listing.
    Tile,
    /// Open each entry's detail view.
    Card,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Tile => "tile",
            Strategy::Card => "card",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How many sampled entries exposed each field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPresence {
    pub name: u32,
    pub phone: u32,
    pub address: u32,
    pub website: u32,
    pub rating: u32,
    pub reviews: u32,
}

/// Outcome of strategy selection for one task, attached to every record it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub sample_size: usize,
    pub presence: FieldPresence,
    /// Weighted completeness in `[0, 1]`.
    pub completeness_score: f64,
    pub phone_percentage: f64,
    pub strategy: Strategy,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    /// A website is known; email discovery can run later.
    Pending,
    NoWebsite,
}

// ---------------------------------------------------------------------------
// Outreach placeholder
// ---------------------------------------------------------------------------

/// Lifecycle structure downstream outreach tooling fills in. Always starts idle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outreach {
    pub status: String,
    pub campaign_type: Option<String>,
    pub contact_info: ContactInfo,
    pub alignment: Alignment,
    pub call: CallTrack,
    pub email: EmailTrack,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub phone_numbers: Vec<String>,
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alignment {
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTrack {
    pub is_active: bool,
    pub next_scheduled_call_at: Option<DateTime<Utc>>,
    pub overall_attempt_number: u32,
    pub retries_made_for_current_overall_attempt: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTrack {
    pub is_active: bool,
    pub next_scheduled_email_at: Option<DateTime<Utc>>,
    pub emails_sent_count: u32,
}

impl Default for Outreach {
    fn default() -> Self {
        Self {
            status: "idle".to_string(),
            campaign_type: None,
            contact_info: ContactInfo::default(),
            alignment: Alignment {
                status: "unknown".to_string(),
            },
            call: CallTrack::default(),
            email: EmailTrack::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One business harvested from the listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub name: String,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub website: Option<String>,
    /// Digits only; the dedup key within a task.
    pub phone: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub strategy: Strategy,
    pub email_status: EmailStatus,
    pub outreach: Outreach,
    pub decision: Option<StrategyDecision>,
    pub scraped_at: DateTime<Utc>,
}

/// Fields read off the page before a record is finalised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub name: String,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl ExtractionRecord {
    pub fn new(fields: RawFields, strategy: Strategy) -> Self {
        let email_status = if fields.website.is_some() {
            EmailStatus::Pending
        } else {
            EmailStatus::NoWebsite
        };
        Self {
            name: fields.name,
            address: fields.address,
            rating: fields.rating,
            review_count: fields.review_count,
            website: fields.website,
            phone: fields.phone,
            coordinates: fields.coordinates,
            strategy,
            email_status,
            outreach: Outreach::default(),
            decision: None,
            scraped_at: Utc::now(),
        }
    }

    /// Stamp the strategy decision that led to this record.
    pub fn with_decision(mut self, decision: &StrategyDecision) -> Self {
        self.strategy = decision.strategy;
        self.decision = Some(decision.clone());
        self
    }

    /// Non-empty phone, if any.
    pub fn phone_key(&self) -> Option<&str> {
        self.phone.as_deref().filter(|p| !p.is_empty())
    }
}

/// Job metadata a record is written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOwner {
    pub profile_id: Uuid,
    pub job_id: Uuid,
    pub task_id: Uuid,
    pub search: SearchParams,
}

impl From<&QueueItem> for RecordOwner {
    fn from(item: &QueueItem) -> Self {
        Self {
            profile_id: item.profile_id,
            job_id: item.job_id,
            task_id: item.task_id,
            search: item.search.clone(),
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
