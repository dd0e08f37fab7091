//! Shared test doubles: a scripted map site, an in-memory record store and a
//! recording reporter.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{
    Job, JobStatus, JobSubmission, PartSubmission, QueueItem, SearchParams, TaskStatus,
};
use crate::job_queue::{MemoryQueue, WorkQueue};
use crate::models::{ExtractionRecord, RecordOwner};
use crate::traits::{
    BrowserAutomation, BrowserSession, RecordStore, ScrollPosition, ScrollTo, UpsertOutcome,
};

const ENTRY_HEIGHT: i64 = 100;
const VIEWPORT_HEIGHT: i64 = 500;
const SEARCH_URL: &str = "https://www.google.com/maps";

// ---------------------------------------------------------------------------
// FakeSite
// ---------------------------------------------------------------------------

/// One business on the fake listing.
#[derive(Debug, Clone)]
pub struct FakeEntry {
    pub name: String,
    /// Display text, e.g. `"(555) 010-0001"`. Always shown in the detail view.
    pub phone: Option<String>,
    /// Whether the listing entry shows the phone too.
    pub phone_on_listing: bool,
    pub address: Option<String>,
    pub website: Option<String>,
    pub rating: Option<String>,
    pub reviews: Option<String>,
    pub cid: Option<String>,
    pub lat_lng: Option<(f64, f64)>,
    /// Phone reads that fail as stale before one succeeds.
    pub stale_reads: u32,
}

impl FakeEntry {
    fn place_url(&self) -> Option<String> {
        self.lat_lng.map(|(lat, lng)| {
            format!(
                "{SEARCH_URL}/place/{}/@{lat:.6},{lng:.6},17z",
                self.name.replace(' ', "+")
            )
        })
    }
}

/// Scripted behavior of the site every fake session talks to.
#[derive(Debug, Clone)]
pub struct FakeSite {
    entries: Vec<FakeEntry>,
    page_size: usize,
    end_marker: bool,
    consent_banner: bool,
    navigation_fails: bool,
    stuck_closes: u32,
    cancel_after_clicks: Option<usize>,
    listing_timeouts: Option<(usize, usize)>,
    cancel: CancellationToken,
}

impl FakeSite {
    pub fn new(entries: Vec<FakeEntry>) -> Self {
        Self {
            entries,
            page_size: 20,
            end_marker: true,
            consent_banner: false,
            navigation_fails: false,
            stuck_closes: 0,
            cancel_after_clicks: None,
            listing_timeouts: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Entries rendered up front and per load-more.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn without_end_marker(mut self) -> Self {
        self.end_marker = false;
        self
    }

    pub fn with_consent_banner(mut self) -> Self {
        self.consent_banner = true;
        self
    }

    pub fn with_navigation_failure(mut self) -> Self {
        self.navigation_fails = true;
        self
    }

    /// The first `closes` close/back clicks after each page load do nothing.
    pub fn with_stuck_detail(mut self, closes: u32) -> Self {
        self.stuck_closes = closes;
        self
    }

    /// After `after` successful listing queries, the next `count` ones time out.
    pub fn with_listing_timeouts(mut self, after: usize, count: usize) -> Self {
        self.listing_timeouts = Some((after, count));
        self
    }

    /// Fire [`FakeBrowser::cancel_token`] on the n-th entry click.
    pub fn cancel_after_clicks(mut self, clicks: usize) -> Self {
        self.cancel_after_clicks = Some(clicks);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeField {
    Name,
    Phone,
    Address,
    Website,
    Rating,
    Reviews,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeElement {
    ConsentButton,
    SearchBox,
    Container,
    Entry(usize),
    EntryField(usize, FakeField),
    EntryLink(usize),
    DetailName(usize),
    DetailField(usize, FakeField),
    CloseButton,
    BackButton,
}

// ---------------------------------------------------------------------------
// FakeBrowser
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BrowserLog {
    queries: Vec<String>,
    navigations: usize,
    reloads: usize,
    clicks: usize,
    consent_dismissed: bool,
    sessions_opened: usize,
    sessions_closed: usize,
    listing_queries: usize,
    failing_sessions: u32,
    panicking_sessions: u32,
    panicking_searches: u32,
}

/// Browser whose sessions all render the same [`FakeSite`].
#[derive(Clone)]
pub struct FakeBrowser {
    site: Arc<FakeSite>,
    log: Arc<Mutex<BrowserLog>>,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            log: Arc::new(Mutex::new(BrowserLog::default())),
        }
    }

    /// The next `count` sessions fail to launch.
    pub fn with_failing_sessions(self, count: u32) -> Self {
        self.log.lock().unwrap().failing_sessions = count;
        self
    }

    /// The next `count` session launches panic.
    pub fn with_panicking_sessions(self, count: u32) -> Self {
        self.log.lock().unwrap().panicking_sessions = count;
        self
    }

    /// The next `count` submitted searches panic inside an open session.
    pub fn with_panicking_searches(self, count: u32) -> Self {
        self.log.lock().unwrap().panicking_searches = count;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.site.cancel.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.log.lock().unwrap().queries.clone()
    }

    pub fn navigations(&self) -> usize {
        self.log.lock().unwrap().navigations
    }

    pub fn reloads(&self) -> usize {
        self.log.lock().unwrap().reloads
    }

    pub fn clicks(&self) -> usize {
        self.log.lock().unwrap().clicks
    }

    pub fn consent_dismissed(&self) -> bool {
        self.log.lock().unwrap().consent_dismissed
    }

    pub fn sessions_opened(&self) -> usize {
        self.log.lock().unwrap().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.log.lock().unwrap().sessions_closed
    }
}

impl BrowserAutomation for FakeBrowser {
    type Session = FakeSession;

    async fn new_session(&self) -> Result<FakeSession, AppError> {
        let panic_now = {
            let mut log = self.log.lock().unwrap();
            log.sessions_opened += 1;
            if log.failing_sessions > 0 {
                log.failing_sessions -= 1;
                return Err(AppError::BrowserError("browser failed to launch".into()));
            }
            if log.panicking_sessions > 0 {
                log.panicking_sessions -= 1;
                true
            } else {
                false
            }
        };
        if panic_now {
            panic!("browser process crashed");
        }

        let stale = self
            .site
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.stale_reads > 0)
            .map(|(i, e)| (i, e.stale_reads))
            .collect();
        Ok(FakeSession {
            site: self.site.clone(),
            log: self.log.clone(),
            page: Mutex::new(PageState {
                stale,
                ..PageState::default()
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeSession
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PageState {
    navigated: bool,
    consent_visible: bool,
    typed: String,
    searched: bool,
    loaded: usize,
    scroll_top: i64,
    detail: Option<usize>,
    stuck_remaining: u32,
    stale: HashMap<usize, u32>,
}

/// One tab on the fake site.
pub struct FakeSession {
    site: Arc<FakeSite>,
    log: Arc<Mutex<BrowserLog>>,
    page: Mutex<PageState>,
}

impl FakeSession {
    fn entry(&self, index: usize) -> Option<&FakeEntry> {
        self.site.entries.get(index)
    }

    fn field(&self, index: usize, field: FakeField, on_listing: bool) -> Option<String> {
        let entry = self.entry(index)?;
        match field {
            FakeField::Name => Some(entry.name.clone()).filter(|n| !n.is_empty()),
            FakeField::Phone if on_listing && !entry.phone_on_listing => None,
            FakeField::Phone => entry.phone.clone(),
            FakeField::Address => entry.address.clone(),
            FakeField::Website => entry.website.clone(),
            FakeField::Rating => entry.rating.clone(),
            FakeField::Reviews => entry.reviews.clone(),
        }
    }

    fn check_entry(&self, page: &PageState, index: usize) -> Result<(), AppError> {
        if index < page.loaded {
            Ok(())
        } else {
            Err(AppError::StaleElement(format!("entry {index} detached")))
        }
    }

    fn check_detail(&self, page: &PageState, index: usize) -> Result<(), AppError> {
        if page.detail == Some(index) {
            Ok(())
        } else {
            Err(AppError::StaleElement("detail view closed".into()))
        }
    }

    fn detail_field(&self, page: &PageState, field: FakeField) -> Option<FakeElement> {
        let index = page.detail?;
        self.field(index, field, false)
            .map(|_| FakeElement::DetailField(index, field))
    }

    fn read_field(
        &self,
        page: &mut PageState,
        index: usize,
        field: FakeField,
        on_listing: bool,
    ) -> Result<String, AppError> {
        if field == FakeField::Phone {
            if let Some(left) = page.stale.get_mut(&index).filter(|left| **left > 0) {
                *left -= 1;
                return Err(AppError::StaleElement("phone node re-rendered".into()));
            }
        }
        Ok(self.field(index, field, on_listing).unwrap_or_default())
    }

    fn close_detail(&self, page: &mut PageState) {
        if page.stuck_remaining > 0 {
            page.stuck_remaining -= 1;
        } else {
            page.detail = None;
        }
    }

    fn load_first_page(&self, page: &mut PageState) {
        page.loaded = self.site.page_size.min(self.site.entries.len());
        page.scroll_top = 0;
        page.detail = None;
        page.stuck_remaining = self.site.stuck_closes;
    }
}

impl BrowserSession for FakeSession {
    type Element = FakeElement;

    async fn navigate(&self, _url: &str) -> Result<(), AppError> {
        self.log.lock().unwrap().navigations += 1;
        if self.site.navigation_fails {
            return Err(AppError::BrowserError("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        let mut page = self.page.lock().unwrap();
        page.navigated = true;
        page.searched = false;
        page.loaded = 0;
        page.detail = None;
        page.consent_visible = self.site.consent_banner;
        Ok(())
    }

    async fn reload(&self) -> Result<(), AppError> {
        self.log.lock().unwrap().reloads += 1;
        let mut page = self.page.lock().unwrap();
        if page.searched {
            self.load_first_page(&mut page);
        }
        page.stuck_remaining = 0;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AppError> {
        let page = self.page.lock().unwrap();
        let url = page
            .detail
            .and_then(|i| self.entry(i))
            .and_then(FakeEntry::place_url)
            .unwrap_or_else(|| format!("{SEARCH_URL}/search/{}", page.typed.replace(' ', "+")));
        Ok(url)
    }

    async fn find(&self, selector: &str) -> Result<Option<FakeElement>, AppError> {
        let page = self.page.lock().unwrap();
        let found = match selector {
            "button[aria-label='Reject all']" => {
                page.consent_visible.then_some(FakeElement::ConsentButton)
            }
            "#searchboxinput" => page.navigated.then_some(FakeElement::SearchBox),
            "div[role='feed']" => page.searched.then_some(FakeElement::Container),
            "div.Nv2PK" => (page.searched && page.loaded > 0).then_some(FakeElement::Entry(0)),
            "h1.DUwDvf" => page.detail.map(FakeElement::DetailName),
            "button[data-item-id='phone:tel'] div.Io6YTe" => {
                self.detail_field(&page, FakeField::Phone)
            }
            "button[data-item-id='address'] div.Io6YTe" => {
                self.detail_field(&page, FakeField::Address)
            }
            "a[data-item-id='authority']" => self.detail_field(&page, FakeField::Website),
            "div.F7nice span span" => self.detail_field(&page, FakeField::Rating),
            "div.F7nice span:nth-child(2) span span" => {
                self.detail_field(&page, FakeField::Reviews)
            }
            "button[aria-label='Close']" => page.detail.map(|_| FakeElement::CloseButton),
            "button[aria-label='Back']" => page.detail.map(|_| FakeElement::BackButton),
            _ => None,
        };
        Ok(found)
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<FakeElement>, AppError> {
        if selector == "div.Nv2PK" {
            {
                let mut log = self.log.lock().unwrap();
                log.listing_queries += 1;
                if let Some((after, count)) = self.site.listing_timeouts {
                    let n = log.listing_queries;
                    if n > after && n <= after.saturating_add(count) {
                        return Err(AppError::Timeout(15));
                    }
                }
            }
            let page = self.page.lock().unwrap();
            if !page.searched {
                return Ok(Vec::new());
            }
            return Ok((0..page.loaded).map(FakeElement::Entry).collect());
        }
        Ok(self.find(selector).await?.into_iter().collect())
    }

    async fn find_within(
        &self,
        scope: &FakeElement,
        selector: &str,
    ) -> Result<Option<FakeElement>, AppError> {
        let FakeElement::Entry(index) = *scope else {
            return Ok(None);
        };
        self.check_entry(&self.page.lock().unwrap(), index)?;
        let field = match selector {
            "div.qBF1Pd" => FakeField::Name,
            "span.UsdlK" => FakeField::Phone,
            "div.W4Efsd div.W4Efsd span:nth-of-type(2) span:nth-of-type(2)" => FakeField::Address,
            "span.MW4etd" => FakeField::Rating,
            "span.UY7F9" => FakeField::Reviews,
            "a.lcr4fd" => FakeField::Website,
            _ => return Ok(None),
        };
        Ok(self
            .field(index, field, true)
            .map(|_| FakeElement::EntryField(index, field)))
    }

    async fn find_all_within(
        &self,
        scope: &FakeElement,
        selector: &str,
    ) -> Result<Vec<FakeElement>, AppError> {
        match (scope, selector) {
            (FakeElement::Entry(index), "a") => {
                let has_link = self.entry(*index).is_some_and(|e| e.lat_lng.is_some());
                Ok(has_link
                    .then_some(FakeElement::EntryLink(*index))
                    .into_iter()
                    .collect())
            }
            _ => Ok(self.find_within(scope, selector).await?.into_iter().collect()),
        }
    }

    async fn click(&self, element: &FakeElement) -> Result<(), AppError> {
        let mut page = self.page.lock().unwrap();
        match *element {
            FakeElement::ConsentButton => {
                page.consent_visible = false;
                self.log.lock().unwrap().consent_dismissed = true;
            }
            FakeElement::Entry(index) => {
                self.check_entry(&page, index)?;
                page.detail = Some(index);
                let clicks = {
                    let mut log = self.log.lock().unwrap();
                    log.clicks += 1;
                    log.clicks
                };
                if self.site.cancel_after_clicks.is_some_and(|n| clicks >= n) {
                    self.site.cancel.cancel();
                }
            }
            FakeElement::CloseButton | FakeElement::BackButton => self.close_detail(&mut page),
            _ => {}
        }
        Ok(())
    }

    async fn send_keys(&self, element: &FakeElement, text: &str) -> Result<(), AppError> {
        if *element == FakeElement::SearchBox {
            self.page.lock().unwrap().typed = text.to_string();
        }
        Ok(())
    }

    async fn press_key(&self, element: &FakeElement, key: &str) -> Result<(), AppError> {
        if key == "Enter" {
            let panic_now = {
                let mut log = self.log.lock().unwrap();
                let armed = log.panicking_searches > 0;
                log.panicking_searches = log.panicking_searches.saturating_sub(1);
                armed
            };
            if panic_now {
                panic!("renderer crashed");
            }
        }
        let mut page = self.page.lock().unwrap();
        match (element, key) {
            (FakeElement::SearchBox, "Enter") => {
                page.searched = true;
                self.load_first_page(&mut page);
                self.log.lock().unwrap().queries.push(page.typed.clone());
            }
            (_, "Escape") => self.close_detail(&mut page),
            _ => {}
        }
        Ok(())
    }

    async fn scroll_container(
        &self,
        container: &FakeElement,
        scroll: ScrollTo,
    ) -> Result<ScrollPosition, AppError> {
        if *container != FakeElement::Container {
            return Err(AppError::ElementNotFound("not scrollable".into()));
        }
        let mut page = self.page.lock().unwrap();
        let max_top = |loaded: usize| (loaded as i64 * ENTRY_HEIGHT - VIEWPORT_HEIGHT).max(0);

        let wants_more = match scroll {
            ScrollTo::End => {
                page.scroll_top = max_top(page.loaded);
                true
            }
            ScrollTo::By(delta) => {
                page.scroll_top = (page.scroll_top + delta).clamp(0, max_top(page.loaded));
                delta > 0
            }
        };
        let total = self.site.entries.len();
        if wants_more && page.scroll_top == max_top(page.loaded) && page.loaded < total {
            page.loaded = (page.loaded + self.site.page_size).min(total);
        }

        Ok(ScrollPosition {
            top: page.scroll_top,
            height: page.loaded as i64 * ENTRY_HEIGHT,
        })
    }

    async fn scroll_into_view(&self, _element: &FakeElement) -> Result<(), AppError> {
        Ok(())
    }

    async fn read_text(&self, element: &FakeElement) -> Result<String, AppError> {
        let mut page = self.page.lock().unwrap();
        match *element {
            FakeElement::ConsentButton => Ok("Reject all".into()),
            FakeElement::Container => {
                let complete = page.loaded == self.site.entries.len();
                if self.site.end_marker && complete {
                    Ok("Results\nYou've reached the end of the list.".into())
                } else {
                    Ok("Results".into())
                }
            }
            FakeElement::Entry(index) => {
                self.check_entry(&page, index)?;
                self.read_field(&mut page, index, FakeField::Name, true)
            }
            FakeElement::EntryField(index, field) => {
                self.check_entry(&page, index)?;
                self.read_field(&mut page, index, field, true)
            }
            FakeElement::DetailName(index) => {
                self.check_detail(&page, index)?;
                self.read_field(&mut page, index, FakeField::Name, false)
            }
            FakeElement::DetailField(index, field) => {
                self.check_detail(&page, index)?;
                self.read_field(&mut page, index, field, false)
            }
            _ => Ok(String::new()),
        }
    }

    async fn read_attribute(
        &self,
        element: &FakeElement,
        name: &str,
    ) -> Result<Option<String>, AppError> {
        let value = match (element, name) {
            (FakeElement::Entry(index), "data-cid") => self.entry(*index).and_then(|e| e.cid.clone()),
            (FakeElement::EntryField(index, FakeField::Website), "href")
            | (FakeElement::DetailField(index, FakeField::Website), "href") => {
                self.entry(*index).and_then(|e| e.website.clone())
            }
            (FakeElement::EntryLink(index), "href") => {
                self.entry(*index).and_then(FakeEntry::place_url)
            }
            _ => None,
        };
        Ok(value)
    }

    async fn inner_html(&self, element: &FakeElement) -> Result<String, AppError> {
        match element {
            FakeElement::Entry(index) => Ok(format!(
                "<div class=\"Nv2PK\">{}</div>",
                self.entry(*index).map(|e| e.name.as_str()).unwrap_or_default()
            )),
            _ => Ok(String::new()),
        }
    }

    async fn bounding_top(&self, element: &FakeElement) -> Result<f64, AppError> {
        let page = self.page.lock().unwrap();
        match *element {
            FakeElement::Entry(index) => {
                self.check_entry(&page, index)?;
                Ok((index as i64 * ENTRY_HEIGHT - page.scroll_top) as f64)
            }
            _ => Ok(0.0),
        }
    }

    async fn evaluate_script(
        &self,
        _script: &str,
        _args: &[serde_json::Value],
    ) -> Result<serde_json::Value, AppError> {
        Ok(serde_json::Value::Null)
    }

    async fn close(self) -> Result<(), AppError> {
        self.log.lock().unwrap().sessions_closed += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockRecordStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    jobs: HashMap<Uuid, JobStatus>,
    job_status_writes: Vec<(Uuid, JobStatus)>,
    tasks: HashMap<Uuid, (Uuid, TaskStatus)>,
    task_order: Vec<Uuid>,
    history: Vec<(Uuid, TaskStatus)>,
    records: Vec<(ExtractionRecord, RecordOwner)>,
    phones: HashSet<String>,
    fail_upserts: bool,
}

/// In-memory record store with a unique phone constraint.
#[derive(Clone, Default)]
pub struct MockRecordStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upsert fails with a database error.
    pub fn with_failing_upserts() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().fail_upserts = true;
        store
    }

    pub fn records(&self) -> Vec<ExtractionRecord> {
        let state = self.state.lock().unwrap();
        state.records.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn owners(&self) -> Vec<RecordOwner> {
        let state = self.state.lock().unwrap();
        state.records.iter().map(|(_, o)| o.clone()).collect()
    }

    pub fn task_status(&self, task_id: Uuid) -> Option<TaskStatus> {
        let state = self.state.lock().unwrap();
        state.tasks.get(&task_id).map(|(_, status)| *status)
    }

    /// Every status written for `task_id`, oldest first.
    pub fn status_history(&self, task_id: Uuid) -> Vec<TaskStatus> {
        let state = self.state.lock().unwrap();
        state
            .history
            .iter()
            .filter(|(id, _)| *id == task_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn job_status_writes(&self, job_id: Uuid) -> usize {
        let state = self.state.lock().unwrap();
        state
            .job_status_writes
            .iter()
            .filter(|(id, _)| *id == job_id)
            .count()
    }
}

impl RecordStore for MockRecordStore {
    async fn register_job(&self, job: &Job) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.jobs.insert(job.id, JobStatus::Pending);
        for task in &job.tasks {
            state.tasks.insert(task.id, (job.id, TaskStatus::Pending));
            state.task_order.push(task.id);
        }
        Ok(())
    }

    async fn upsert_record(
        &self,
        record: &ExtractionRecord,
        owner: &RecordOwner,
    ) -> Result<UpsertOutcome, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_upserts {
            return Err(AppError::DatabaseError("connection reset by peer".into()));
        }
        if let Some(phone) = record.phone_key() {
            if !state.phones.insert(phone.to_string()) {
                return Ok(UpsertOutcome::Duplicate);
            }
        }
        state.records.push((record.clone(), owner.clone()));
        Ok(UpsertOutcome::Inserted)
    }

    async fn set_task_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.tasks.get_mut(&task_id) else {
            return Err(AppError::NotFound(format!("Task {task_id}")));
        };
        entry.1 = status;
        state.history.push((task_id, status));
        Ok(())
    }

    async fn get_task_statuses(&self, job_id: Uuid) -> Result<Vec<TaskStatus>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .task_order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|(job, _)| *job == job_id)
            .map(|(_, status)| *status)
            .collect())
    }

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.jobs.insert(job_id, status);
        state.job_status_writes.push((job_id, status));
        Ok(())
    }

    async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobStatus>, AppError> {
        Ok(self.state.lock().unwrap().jobs.get(&job_id).copied())
    }
}

// ---------------------------------------------------------------------------
// FlakyQueue
// ---------------------------------------------------------------------------

/// In-memory queue that accepts a fixed number of enqueues, then rejects the rest.
#[derive(Clone)]
pub struct FlakyQueue {
    inner: MemoryQueue,
    accepted: Arc<AtomicUsize>,
    capacity: usize,
}

impl FlakyQueue {
    pub fn accepting(capacity: usize) -> Self {
        Self {
            inner: MemoryQueue::new(),
            accepted: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }
}

impl WorkQueue for FlakyQueue {
    async fn enqueue(&self, lane: &str, item: &QueueItem) -> Result<(), AppError> {
        if self.accepted.fetch_add(1, Ordering::SeqCst) >= self.capacity {
            return Err(AppError::QueueError("connection refused".into()));
        }
        self.inner.enqueue(lane, item).await
    }

    async fn dequeue(&self, lane: &str, timeout: Duration) -> Result<Option<QueueItem>, AppError> {
        self.inner.dequeue(lane, timeout).await
    }

    async fn requeue(&self, lane: &str, item: &QueueItem, delay: Duration) -> Result<(), AppError> {
        self.inner.requeue(lane, item, delay).await
    }

    async fn lane_lengths(&self) -> Result<BTreeMap<String, u64>, AppError> {
        self.inner.lane_lengths().await
    }

    async fn clear(&self, lane: &str) -> Result<u64, AppError> {
        self.inner.clear(lane).await
    }

    async fn clear_all(&self) -> Result<u64, AppError> {
        self.inner.clear_all().await
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Worker reporter that records event labels, plus the retry details of
/// every `TaskFailed`.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
    pub failures: Arc<Mutex<Vec<(u32, bool)>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == label)
            .count()
    }

    /// `(retry_count, will_retry)` of each reported failure, oldest first.
    pub fn failures(&self) -> Vec<(u32, bool)> {
        self.failures.lock().unwrap().clone()
    }
}

impl crate::processor::WorkerReporter for MockReporter {
    fn report(&self, event: crate::processor::WorkerEvent<'_>) {
        use crate::processor::WorkerEvent;
        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::TaskStarted { .. } => "TaskStarted",
            WorkerEvent::TaskCompleted { .. } => "TaskCompleted",
            WorkerEvent::TaskFailed {
                retry_count,
                will_retry,
                ..
            } => {
                self.failures
                    .lock()
                    .unwrap()
                    .push((*retry_count, *will_retry));
                "TaskFailed"
            }
            WorkerEvent::TaskReleased { .. } => "TaskReleased",
            WorkerEvent::QueueError { .. } => "QueueError",
            WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// `n` complete businesses named `Business 1..=n`, each with a unique phone.
pub fn make_listing(n: usize) -> Vec<FakeEntry> {
    (1..=n)
        .map(|i| FakeEntry {
            name: format!("Business {i}"),
            phone: Some(format!("(555) 010-{i:04}")),
            phone_on_listing: true,
            address: Some(format!("{i} Main St")),
            website: Some(format!("https://business{i}.test")),
            rating: Some(format!("4.{}", i % 10)),
            reviews: Some(format!("({})", i * 3)),
            cid: Some(format!("{i}")),
            lat_lng: Some((40.0 + i as f64 * 0.001, -74.0)),
            stale_reads: 0,
        })
        .collect()
}

pub fn make_search() -> SearchParams {
    SearchParams {
        keyword: "plumber".into(),
        postcode: "10001".into(),
        city: "New York".into(),
        state: "NY".into(),
        country: "USA".into(),
    }
}

pub fn make_queue_item(engine: &str) -> QueueItem {
    QueueItem {
        job_id: Uuid::new_v4(),
        profile_id: Uuid::new_v4(),
        task_id: Uuid::new_v4(),
        engine: engine.to_string(),
        search: make_search(),
        created_at: Utc::now(),
        retry_count: 0,
    }
}

/// Submission with `parts` distinct postcodes.
pub fn make_submission(engine: &str, parts: usize) -> JobSubmission {
    JobSubmission {
        job_id: Uuid::new_v4(),
        profile_id: Uuid::new_v4(),
        engine: engine.to_string(),
        created_at: None,
        parts: (0..parts)
            .map(|i| PartSubmission {
                part_id: Uuid::new_v4(),
                search: SearchParams {
                    postcode: format!("1000{i}"),
                    ..make_search()
                },
            })
            .collect(),
    }
}
