//! Trigger interface
//!
//! `start_or_resume` is what an API layer calls: it validates the trigger,
//! refuses a second run for a novel that is still being ingested, and spawns
//! the run in the background. The caller only learns whether the trigger was
//! accepted; outcomes surface through logs.

use crate::config::Config;
use crate::crawler::{ChapterExtractor, ChromiumLauncher, Pacer};
use crate::ingest::coordinator::{CoordinatorSettings, IngestRequest, IngestionCoordinator};
use crate::ingest::report::IngestReport;
use crate::ingest::worker::CrawlWorker;
use crate::storage::{NovelStore, SqliteNovelStore};
use crate::translate::{OpenAiCompatClient, Translator};
use crate::{IngestError, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

/// Answer to a trigger
#[derive(Debug)]
pub enum Trigger {
    /// The run was started; the handle resolves when it ends
    Accepted(JoinHandle<Option<IngestReport>>),
    /// The run was refused, with the reason
    Rejected(String),
}

impl Trigger {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Removes a slug from the in-flight set when its run ends, however it ends
struct InFlightGuard {
    in_flight: InFlight,
    slug: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.slug);
        }
    }
}

/// Fire-and-forget front end over the coordinator
pub struct IngestionService<S> {
    coordinator: Arc<IngestionCoordinator<S>>,
    worker: CrawlWorker,
    in_flight: InFlight,
}

impl IngestionService<SqliteNovelStore> {
    /// Wires the production pipeline from configuration
    ///
    /// Opens the SQLite store, starts the crawl worker with a Chromium
    /// launcher, and builds the LLM client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = SqliteNovelStore::new(Path::new(&config.storage.database_path))?;

        let extractor = ChapterExtractor::new(&config.source)?;
        let launcher = ChromiumLauncher::new(
            config.browser.clone(),
            &config.crawler,
            config.source.content_selector.clone(),
        );
        let worker = CrawlWorker::spawn(
            Arc::new(launcher),
            extractor,
            Pacer::from_config(&config.crawler),
        )?;

        let client = OpenAiCompatClient::from_config(&config.translator)?;

        let coordinator = IngestionCoordinator::new(
            Arc::new(Mutex::new(store)),
            worker.handle(),
            Translator::new(Arc::new(client)),
            CoordinatorSettings::from_config(config),
        );

        Ok(Self::new(coordinator, worker))
    }
}

impl<S: NovelStore + 'static> IngestionService<S> {
    pub fn new(coordinator: IngestionCoordinator<S>, worker: CrawlWorker) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            worker,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn coordinator(&self) -> &IngestionCoordinator<S> {
        &self.coordinator
    }

    /// Starts or resumes ingestion of `slug` in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_or_resume(
        &self,
        slug: &str,
        start_url: Option<&str>,
        title: Option<&str>,
    ) -> Trigger {
        let slug = slug.trim();
        if slug.is_empty() {
            return Trigger::Rejected("slug is empty".to_string());
        }

        let start_url = start_url.map(str::trim).filter(|u| !u.is_empty());
        if let Some(url) = start_url {
            match Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(_) => {
                    return Trigger::Rejected(format!("start URL '{}' is not http(s)", url));
                }
                Err(e) => return Trigger::Rejected(format!("invalid start URL '{}': {}", url, e)),
            }
        }

        let guard = {
            let Ok(mut set) = self.in_flight.lock() else {
                return Trigger::Rejected("in-flight registry unavailable".to_string());
            };
            if !set.insert(slug.to_string()) {
                warn!("Rejected trigger for '{}': a run is already in progress", slug);
                return Trigger::Rejected(format!("ingestion of '{}' is already running", slug));
            }
            InFlightGuard {
                in_flight: self.in_flight.clone(),
                slug: slug.to_string(),
            }
        };

        let request = IngestRequest {
            slug: slug.to_string(),
            start_url: start_url.map(str::to_string),
            title: title.map(str::to_string).filter(|t| !t.trim().is_empty()),
        };
        let coordinator = self.coordinator.clone();

        info!("Accepted ingestion trigger for '{}'", slug);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            match coordinator.run(&request).await {
                Ok(report) => Some(report),
                Err(
                    e @ (IngestError::MissingResumeState { .. }
                    | IngestError::NovelNotFound { .. }),
                ) => {
                    warn!("Ingestion of '{}' not started: {}", request.slug, e);
                    None
                }
                Err(e) => {
                    error!("Ingestion of '{}' failed: {}", request.slug, e);
                    None
                }
            }
        });

        Trigger::Accepted(handle)
    }

    /// Stops the crawl worker once queued jobs finish
    ///
    /// Blocks; call from outside the runtime or via `spawn_blocking`.
    pub fn shutdown(self) {
        self.worker.shutdown();
    }
}
