//! Crawl driver
//!
//! Walks the "next chapter" chain from a start URL, staging every page in the
//! intermediate store under its derived chapter number:
//!
//! ```text
//! HAS_URL -> FETCH -> SEQUENCE -> SAVE -> ADVANCE -> HAS_URL | DONE
//!              |
//!              +-- failure -> DONE (aborted)
//! ```
//!
//! The driver borrows its fetcher; closing the browser session is the
//! caller's job so it happens exactly once regardless of how the loop ended.

use crate::crawler::fetcher::PageFetcher;
use crate::crawler::scheduler::Pacer;
use crate::crawler::sequencer::derive_chapter_number;
use crate::storage::{IntermediateChapter, IntermediateStore, SaveOutcome};
use crate::{IngestError, Result};
use tracing::{error, info, warn};

/// Parameters for one crawl session
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub start_url: String,

    /// Pages to fetch this session; zero or negative means no limit
    pub max_chapters: i64,

    /// Number assigned to the first page if its title declares none
    pub start_counter: u32,
}

/// Why a crawl session ended
#[derive(Debug)]
pub enum CrawlOutcome {
    /// The last page had no next-chapter link
    Exhausted,
    /// The per-session chapter budget was used up
    BudgetReached,
    /// A fetch failed; pages staged before it are kept
    Aborted(IngestError),
}

/// Summary of one crawl session
#[derive(Debug)]
pub struct CrawlReport {
    /// Chapter numbers staged, in crawl order
    pub saved: Vec<u32>,

    /// Number and URL of the last page staged
    pub last: Option<(u32, String)>,

    /// Saves that displaced a different page with the same number
    pub collisions: usize,

    pub outcome: CrawlOutcome,
}

enum Step {
    HasUrl(String),
    Done(CrawlOutcome),
}

/// Drives one crawl session over a borrowed fetcher and staging store
pub struct CrawlDriver<'a> {
    fetcher: &'a mut PageFetcher,
    store: &'a IntermediateStore,
    pacer: &'a Pacer,
}

impl<'a> CrawlDriver<'a> {
    pub fn new(fetcher: &'a mut PageFetcher, store: &'a IntermediateStore, pacer: &'a Pacer) -> Self {
        Self {
            fetcher,
            store,
            pacer,
        }
    }

    /// Runs the session to completion
    ///
    /// Fetch failures end the session with [`CrawlOutcome::Aborted`]; only a
    /// failure to write the staging store is returned as an error.
    pub async fn run(&mut self, request: &CrawlRequest) -> Result<CrawlReport> {
        let budget = (request.max_chapters > 0).then_some(request.max_chapters as u64);
        info!(
            "Crawl starting at {} (counter {}, budget {})",
            request.start_url,
            request.start_counter,
            budget.map_or_else(|| "unlimited".to_string(), |b| b.to_string())
        );

        let mut counter = request.start_counter;
        let mut fetched: u64 = 0;
        let mut saved = Vec::new();
        let mut last: Option<(u32, String)> = None;
        let mut collisions = 0;
        let mut step = Step::HasUrl(request.start_url.clone());

        let outcome = loop {
            let url = match step {
                Step::Done(outcome) => break outcome,
                Step::HasUrl(url) => url,
            };

            if fetched > 0 {
                self.pacer.pause().await;
            }

            // FETCH
            let page = match self.fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(e) => {
                    error!("Crawl aborted at {}: {}", url, e);
                    step = Step::Done(CrawlOutcome::Aborted(e.at(&url)));
                    continue;
                }
            };
            fetched += 1;

            // SEQUENCE
            let number = derive_chapter_number(&page.title, counter);
            if let Some((previous, _)) = &last {
                if number <= *previous {
                    warn!(
                        "Chapter number did not advance: {} follows {} ({})",
                        number, previous, url
                    );
                }
            }

            // SAVE
            let record = IntermediateChapter {
                source_url: page.source_url,
                title: page.title,
                content: page.body,
                chapter_num: number,
            };
            if let SaveOutcome::Replaced { .. } = self.store.save(&record)? {
                collisions += 1;
            }
            info!("Saved chapter {}: {}", number, record.title);

            // ADVANCE
            counter = number.saturating_add(1);
            saved.push(number);
            last = Some((number, record.source_url));

            step = if budget.is_some_and(|b| fetched >= b) {
                Step::Done(CrawlOutcome::BudgetReached)
            } else {
                match page.next_url {
                    Some(next) => Step::HasUrl(next),
                    None => Step::Done(CrawlOutcome::Exhausted),
                }
            };
        };

        match &outcome {
            CrawlOutcome::Exhausted => info!("No next chapter link, crawl complete"),
            CrawlOutcome::BudgetReached => info!("Chapter budget reached"),
            CrawlOutcome::Aborted(_) => {}
        }
        info!("Crawl session staged {} chapter(s)", saved.len());

        Ok(CrawlReport {
            saved,
            last,
            collisions,
            outcome,
        })
    }
}
