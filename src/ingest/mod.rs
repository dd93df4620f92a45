//! Ingestion pipeline
//!
//! Ties the crawler, the staging store, the translation stage and the novel
//! store together:
//! - resume resolution before each crawl
//! - a dedicated crawl worker thread
//! - the per-run coordinator and its report
//! - the fire-and-forget trigger service

mod coordinator;
mod report;
mod resume;
mod service;
mod worker;

pub use coordinator::{CoordinatorSettings, IngestRequest, IngestionCoordinator};
pub use report::{CrawlStatus, CrawlSummary, IngestReport};
pub use resume::{
    choose_resume_point, verify_resume_point, Candidate, ResumeOrigin, ResumePoint, ResumeResolver,
};
pub use service::{IngestionService, Trigger};
pub use worker::{CrawlHandle, CrawlJob, CrawlJobResult, CrawlWorker};
