use meridian_core::PoolStats;
use meridian_db::{Database, PgRecordStore, PgWorkQueue};

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub store: PgRecordStore,
    pub queue: PgWorkQueue,
    /// Status table of the in-process worker pool, if one is running.
    pub workers: Option<PoolStats>,
    /// Bearer token for `/v1` routes (None = those routes answer 403).
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(db: Database, admin_token: Option<String>) -> Self {
        Self {
            store: db.record_store(),
            queue: db.work_queue(),
            db,
            workers: None,
            admin_token: admin_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn with_workers(mut self, stats: PoolStats) -> Self {
        self.workers = Some(stats);
        self
    }
}
