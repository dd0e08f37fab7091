//! Worker pool runtime shared by `meridian-server` and `meridian work`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args};

use meridian_browser::{BrowserSettings, ChromiumBrowser};
use meridian_core::error::AppError;
use meridian_core::job::{EngineType, RetryConfig, WorkerConfig};
use meridian_core::{EngineLimits, Engines, Pacing, SiteProfile, WorkerPool};
use meridian_db::Database;

/// Worker options, each with an environment fallback.
#[derive(Debug, Clone, Args)]
pub struct WorkerOptions {
    /// Number of concurrent workers (one browser tab each)
    #[arg(long, env = "MERIDIAN_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Attempts per task before it is marked failed
    #[arg(long, env = "MERIDIAN_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Backoff before each retry, in seconds
    #[arg(long, env = "MERIDIAN_RETRY_DELAYS", default_value = "10,30,60")]
    pub retry_delays: String,

    /// JSON file overriding the built-in site selectors
    #[arg(long, env = "MERIDIAN_SITE_PROFILE")]
    pub site_profile: Option<PathBuf>,

    /// Lanes to serve (repeatable); defaults to every engine lane
    #[arg(long = "lane")]
    pub lanes: Vec<String>,

    /// Run Chromium without a window
    #[arg(long, env = "MERIDIAN_HEADLESS", default_value_t = true, action = ArgAction::Set)]
    pub headless: bool,

    /// Chromium executable (auto-detected when unset)
    #[arg(long, env = "CHROME_BIN")]
    pub chrome_bin: Option<PathBuf>,
}

impl WorkerOptions {
    pub fn retry_config(&self) -> Result<RetryConfig, AppError> {
        let delays = RetryConfig::parse_delays(&self.retry_delays)?;
        Ok(RetryConfig::default()
            .with_max_retries(self.max_retries)
            .with_delays(delays))
    }

    pub fn worker_config(&self) -> Result<WorkerConfig, AppError> {
        let lanes = if self.lanes.is_empty() {
            EngineType::all_lanes()
        } else {
            self.lanes.clone()
        };
        Ok(WorkerConfig::default()
            .with_worker_id(format!("worker-{}", std::process::id()))
            .with_lanes(lanes)
            .with_retry_config(self.retry_config()?))
    }

    pub fn engines(&self) -> Result<Engines, AppError> {
        let profile = match &self.site_profile {
            Some(path) => SiteProfile::from_file(path)?,
            None => SiteProfile::default(),
        };
        Ok(Engines::new(profile, Pacing::default(), EngineLimits::default()))
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        let settings = BrowserSettings::default().with_headless(self.headless);
        match &self.chrome_bin {
            Some(path) => settings.with_chrome_bin(path.clone()),
            None => settings,
        }
    }

    /// Launch Chromium and start the pool against the database's store and queue.
    pub async fn start_pool(&self, db: &Database) -> Result<WorkerPool, AppError> {
        if self.workers == 0 {
            return Err(AppError::ConfigError("MERIDIAN_WORKERS must be at least 1".into()));
        }
        let config = self.worker_config()?;
        let engines = Arc::new(self.engines()?);
        let browser = ChromiumBrowser::launch(self.browser_settings()).await?;

        tracing::info!(
            workers = self.workers,
            lanes = ?config.lanes,
            max_retries = self.max_retries,
            "Starting workers"
        );
        Ok(WorkerPool::start(
            self.workers,
            browser,
            db.work_queue(),
            db.record_store(),
            engines,
            config,
        ))
    }
}
