//! Resume resolution
//!
//! Works out where a crawl session should start. An explicit URL always
//! wins. Otherwise the furthest chapter known to the novel store is compared
//! with the furthest staged chapter:
//! - store number >= staged number: resume from the store (committed truth)
//! - otherwise: resume from the staging store (newer, uncommitted progress)
//!
//! The chosen page is then re-fetched once so its title, not a counted
//! position, decides the starting number.

use crate::crawler::{declared_chapter_number, PageFetcher};
use crate::storage::{lock_store, ChapterRecord, IntermediateStore, NovelStore, SharedStore};
use crate::{IngestError, Result};
use std::fmt;
use tracing::{debug, info, warn};

/// Where a resume point came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOrigin {
    Explicit,
    Persisted,
    Intermediate,
}

impl fmt::Display for ResumeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit URL"),
            Self::Persisted => write!(f, "novel store"),
            Self::Intermediate => write!(f, "staging store"),
        }
    }
}

/// URL and starting counter handed to the crawl driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub url: String,
    pub chapter_num: u32,
    pub origin: ResumeOrigin,
    /// Set once the number has been confirmed from the page title
    pub verified: bool,
}

/// Furthest known chapter in one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub chapter_num: u32,
    pub url: String,
}

/// Picks between the persisted and staged candidates
///
/// Ties go to the persisted candidate.
pub fn choose_resume_point(
    persisted: Option<Candidate>,
    intermediate: Option<Candidate>,
) -> Option<ResumePoint> {
    let (candidate, origin) = match (persisted, intermediate) {
        (Some(p), Some(i)) if p.chapter_num >= i.chapter_num => (p, ResumeOrigin::Persisted),
        (_, Some(i)) => (i, ResumeOrigin::Intermediate),
        (Some(p), None) => (p, ResumeOrigin::Persisted),
        (None, None) => return None,
    };

    Some(ResumePoint {
        url: candidate.url,
        chapter_num: candidate.chapter_num,
        origin,
        verified: false,
    })
}

/// Resolves resume points against the novel store and a staging store
pub struct ResumeResolver<'a, S> {
    store: &'a SharedStore<S>,
    staging: &'a IntermediateStore,
}

impl<'a, S: NovelStore> ResumeResolver<'a, S> {
    pub fn new(store: &'a SharedStore<S>, staging: &'a IntermediateStore) -> Self {
        Self { store, staging }
    }

    /// Returns the unverified resume point for `slug`
    ///
    /// With an explicit URL the starting counter is the highest persisted
    /// chapter number (1 for a new novel). Without one, the novel must exist
    /// and either store must know a chapter with a source URL; otherwise
    /// [`IngestError::MissingResumeState`] is returned.
    pub fn resolve(&self, slug: &str, explicit_url: Option<&str>) -> Result<ResumePoint> {
        let latest = self.latest_persisted(slug)?;

        if let Some(url) = explicit_url {
            let chapter_num = latest.as_ref().map_or(1, |c| c.chapter_num.max(1));
            return Ok(ResumePoint {
                url: url.to_string(),
                chapter_num,
                origin: ResumeOrigin::Explicit,
                verified: false,
            });
        }

        let novel_exists = lock_store(self.store)?.find_novel_by_slug(slug)?.is_some();
        if !novel_exists {
            return Err(IngestError::MissingResumeState {
                slug: slug.to_string(),
            });
        }

        let persisted = self.persisted_candidate(latest)?;
        let intermediate = self.intermediate_candidate()?;
        debug!(
            "Resume candidates for '{}': store={:?} staging={:?}",
            slug, persisted, intermediate
        );

        let point = choose_resume_point(persisted, intermediate).ok_or_else(|| {
            IngestError::MissingResumeState {
                slug: slug.to_string(),
            }
        })?;

        info!(
            "Resuming '{}' from chapter {} via {}: {}",
            slug, point.chapter_num, point.origin, point.url
        );
        Ok(point)
    }

    /// Highest persisted chapter, with or without a source URL
    fn latest_persisted(&self, slug: &str) -> Result<Option<ChapterRecord>> {
        let store = lock_store(self.store)?;
        match store.find_novel_by_slug(slug)? {
            Some(novel) => Ok(store.latest_chapter(novel.id)?),
            None => Ok(None),
        }
    }

    /// Highest persisted chapter with a usable URL
    ///
    /// A latest chapter stored without a URL borrows the URL of the staged
    /// record with the same number, if there is one.
    fn persisted_candidate(&self, latest: Option<ChapterRecord>) -> Result<Option<Candidate>> {
        let Some(chapter) = latest else {
            return Ok(None);
        };

        let url = match chapter.source_url.filter(|u| !u.is_empty()) {
            Some(url) => Some(url),
            None => self
                .staging
                .load(chapter.chapter_num)?
                .map(|record| record.source_url)
                .filter(|u| !u.is_empty()),
        };

        Ok(url.map(|url| Candidate {
            chapter_num: chapter.chapter_num,
            url,
        }))
    }

    fn intermediate_candidate(&self) -> Result<Option<Candidate>> {
        Ok(self
            .staging
            .latest()?
            .filter(|record| !record.source_url.is_empty())
            .map(|record| Candidate {
                chapter_num: record.chapter_num,
                url: record.source_url,
            }))
    }
}

/// Re-fetches the resume page and takes its title-declared number
///
/// Any failure keeps the candidate number; verification never blocks a run.
pub async fn verify_resume_point(fetcher: &mut PageFetcher, point: &ResumePoint) -> ResumePoint {
    let mut verified = point.clone();

    match fetcher.fetch(&point.url).await {
        Ok(page) => match declared_chapter_number(&page.title) {
            Some(number) => {
                if number != point.chapter_num {
                    warn!(
                        "Resume page declares chapter {} but was counted as {}; using {}",
                        number, point.chapter_num, number
                    );
                }
                verified.chapter_num = number;
                verified.verified = true;
            }
            None => {
                warn!(
                    "Resume page title '{}' declares no chapter number; keeping {}",
                    page.title, point.chapter_num
                );
            }
        },
        Err(e) => {
            warn!(
                "Could not verify resume point {}: {}; keeping chapter {}",
                point.url, e, point.chapter_num
            );
        }
    }

    verified
}
