//! Crawler module for fetching and staging chapters
//!
//! This module contains the crawl side of the pipeline:
//! - browser-driven page loading with challenge waits
//! - chapter extraction and cleaning
//! - chapter numbering from titles
//! - randomized pacing between pages
//! - the crawl loop that stages each page

mod driver;
mod fetcher;
mod parser;
mod scheduler;
mod sequencer;

pub use driver::{CrawlDriver, CrawlOutcome, CrawlReport, CrawlRequest};
pub use fetcher::{
    wait_for_content, BrowserSession, ChromiumLauncher, ContentCheck, PageFetcher, PageLoader,
    SessionLauncher, WaitPolicy,
};
pub use parser::{ChapterExtractor, SourcePage, UNKNOWN_TITLE};
pub use scheduler::Pacer;
pub use sequencer::{declared_chapter_number, derive_chapter_number};
