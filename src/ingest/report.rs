//! Per-run ingestion report
//!
//! Triggers are fire-and-forget, so everything a run did or failed to do is
//! collected here and logged when it finishes.

use crate::crawler::CrawlOutcome;
use crate::ingest::resume::ResumePoint;
use crate::IngestError;
use tracing::{info, warn};

/// Summary of the crawl phase of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub staged: Vec<u32>,
    pub collisions: usize,
    pub outcome: CrawlStatus,
}

/// Crawl outcome without the error payload, which lives in `incidents`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    Exhausted,
    BudgetReached,
    Aborted,
    /// The crawl did not run (worker or launch failure)
    Skipped,
}

impl From<&CrawlOutcome> for CrawlStatus {
    fn from(outcome: &CrawlOutcome) -> Self {
        match outcome {
            CrawlOutcome::Exhausted => Self::Exhausted,
            CrawlOutcome::BudgetReached => Self::BudgetReached,
            CrawlOutcome::Aborted(_) => Self::Aborted,
        }
    }
}

/// Everything one ingestion run did
#[derive(Debug)]
pub struct IngestReport {
    pub slug: String,
    pub start: Option<ResumePoint>,
    pub crawl: Option<CrawlSummary>,

    /// Chapters committed with their translation
    pub ingested: Vec<u32>,
    /// Chapters already present in the novel store
    pub skipped: Vec<u32>,
    /// Chapters whose source URL was patched in either store
    pub healed: Vec<u32>,
    /// Chapters that could not be committed this run
    pub failed: Vec<u32>,
    /// Committed chapters whose translation was degraded
    pub degraded: Vec<u32>,

    /// Every non-fatal error encountered, in order
    pub incidents: Vec<IngestError>,
}

impl IngestReport {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            start: None,
            crawl: None,
            ingested: Vec::new(),
            skipped: Vec::new(),
            healed: Vec::new(),
            failed: Vec::new(),
            degraded: Vec::new(),
            incidents: Vec::new(),
        }
    }

    /// True when nothing needed operator attention
    pub fn is_clean(&self) -> bool {
        self.incidents.is_empty() && self.failed.is_empty()
    }

    /// Logs the run summary
    pub fn log_summary(&self) {
        if let Some(crawl) = &self.crawl {
            info!(
                "[{}] crawl {:?}: {} chapter(s) staged, {} collision(s)",
                self.slug,
                crawl.outcome,
                crawl.staged.len(),
                crawl.collisions
            );
        }

        info!(
            "[{}] ingestion: {} ingested, {} skipped, {} healed, {} failed, {} degraded",
            self.slug,
            self.ingested.len(),
            self.skipped.len(),
            self.healed.len(),
            self.failed.len(),
            self.degraded.len()
        );

        if !self.failed.is_empty() {
            warn!(
                "[{}] chapters left for the next run: {:?}",
                self.slug, self.failed
            );
        }
        for incident in &self.incidents {
            warn!("[{}] {}", self.slug, incident);
        }
    }
}
