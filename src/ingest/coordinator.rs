//! Ingestion coordinator
//!
//! One run for one novel:
//! 1. resolve the resume point
//! 2. crawl on the worker thread, staging new chapters
//! 3. make sure the novel exists
//! 4. walk every staged chapter in ascending order: skip (and heal) what the
//!    novel store already has, translate and commit the rest
//!
//! Per-chapter problems are recorded in the [`IngestReport`] and never stop
//! the batch. The store lock is only taken inside synchronous blocks and is
//! never held across a translation call.

use crate::config::Config;
use crate::crawler::CrawlOutcome;
use crate::ingest::report::{CrawlStatus, CrawlSummary, IngestReport};
use crate::ingest::resume::{ResumeOrigin, ResumeResolver};
use crate::ingest::worker::{CrawlHandle, CrawlJob};
use crate::storage::{
    lock_store, IntermediateChapter, IntermediateStore, NewChapter, NewNovel, NewTranslation,
    NovelStore, SharedStore, StorageError,
};
use crate::translate::{TranslationQuality, Translator};
use crate::{IngestError, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// One ingestion trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub slug: String,
    /// Where to start crawling; resumes from known progress when absent
    pub start_url: Option<String>,
    /// Title for a novel seen for the first time
    pub title: Option<String>,
}

/// Run-independent coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Parent of the per-novel staging directories
    pub staging_root: PathBuf,
    /// Pages per crawl session; zero or negative means no limit
    pub max_chapters: i64,
    /// Language tag written on translations
    pub language: String,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staging_root: PathBuf::from(&config.storage.raw_dir),
            max_chapters: config.crawler.max_chapters_per_run,
            language: config.translator.language.clone(),
        }
    }
}

/// Runs ingestion for one novel at a time
pub struct IngestionCoordinator<S> {
    store: SharedStore<S>,
    crawler: CrawlHandle,
    translator: Translator,
    settings: CoordinatorSettings,
}

impl<S: NovelStore> IngestionCoordinator<S> {
    pub fn new(
        store: SharedStore<S>,
        crawler: CrawlHandle,
        translator: Translator,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            crawler,
            translator,
            settings,
        }
    }

    pub fn store(&self) -> &SharedStore<S> {
        &self.store
    }

    /// Runs one end-to-end ingestion
    ///
    /// Returns an error only when the run could not start (no resume state,
    /// unknown novel without a title, unusable staging directory or store).
    /// Everything after that is reported, not returned.
    pub async fn run(&self, request: &IngestRequest) -> Result<IngestReport> {
        let slug = request.slug.as_str();
        let mut report = IngestReport::new(slug);
        let staging = IntermediateStore::open(&self.settings.staging_root, slug)?;

        // RESOLVE
        let start = ResumeResolver::new(&self.store, &staging)
            .resolve(slug, request.start_url.as_deref())?;

        let novel_exists = lock_store(&self.store)?.find_novel_by_slug(slug)?.is_some();
        if !novel_exists && request.title.is_none() {
            return Err(IngestError::NovelNotFound {
                slug: slug.to_string(),
            });
        }
        report.start = Some(start.clone());

        // CRAWL
        let job = CrawlJob {
            staging: staging.clone(),
            verify_start: start.origin != ResumeOrigin::Explicit,
            start,
            max_chapters: self.settings.max_chapters,
        };
        match self.crawler.submit(job).await {
            Ok(result) => {
                report.start = Some(result.start);
                let crawl = result.report;
                report.crawl = Some(CrawlSummary {
                    staged: crawl.saved,
                    collisions: crawl.collisions,
                    outcome: CrawlStatus::from(&crawl.outcome),
                });
                if let CrawlOutcome::Aborted(e) = crawl.outcome {
                    report.incidents.push(e);
                }
            }
            Err(e) => {
                error!("[{}] Crawl did not run: {}", slug, e);
                report.crawl = Some(CrawlSummary {
                    staged: Vec::new(),
                    collisions: 0,
                    outcome: CrawlStatus::Skipped,
                });
                report.incidents.push(e);
            }
        }

        // INGEST
        self.ingest_staged(slug, request.title.as_deref(), &staging, &mut report)
            .await?;
        Ok(report)
    }

    /// Ingests what is already staged for `slug`, without crawling
    ///
    /// Used to retry chapters held back by an earlier run, e.g. after the
    /// LLM endpoint comes back.
    pub async fn ingest_only(&self, slug: &str, title: Option<&str>) -> Result<IngestReport> {
        let mut report = IngestReport::new(slug);
        let staging = IntermediateStore::open(&self.settings.staging_root, slug)?;
        self.ingest_staged(slug, title, &staging, &mut report).await?;
        Ok(report)
    }

    async fn ingest_staged(
        &self,
        slug: &str,
        title: Option<&str>,
        staging: &IntermediateStore,
        report: &mut IngestReport,
    ) -> Result<()> {
        let novel_id = self.ensure_novel(slug, title)?;
        for chapter_num in staging.list_numbers()? {
            self.ingest_chapter(novel_id, chapter_num, staging, report)
                .await;
        }

        report.log_summary();
        Ok(())
    }

    fn ensure_novel(&self, slug: &str, title: Option<&str>) -> Result<i64> {
        let mut store = lock_store(&self.store)?;
        if let Some(novel) = store.find_novel_by_slug(slug)? {
            return Ok(novel.id);
        }

        let title = title.ok_or_else(|| IngestError::NovelNotFound {
            slug: slug.to_string(),
        })?;
        let novel = store.create_novel(&NewNovel {
            slug: slug.to_string(),
            title: title.to_string(),
            original_title: None,
        })?;
        info!("[{}] Created novel '{}' (id {})", slug, title, novel.id);
        Ok(novel.id)
    }

    async fn ingest_chapter(
        &self,
        novel_id: i64,
        chapter_num: u32,
        staging: &IntermediateStore,
        report: &mut IngestReport,
    ) {
        let mut record = match staging.load(chapter_num) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!("Staged chapter {} is unreadable: {}", chapter_num, e);
                report.failed.push(chapter_num);
                report.incidents.push(IngestError::PersistFailed {
                    chapter: chapter_num,
                    source: e,
                });
                return;
            }
        };

        if record.chapter_num != chapter_num {
            warn!(
                "Staged record {} declares chapter {}; using the record name",
                IntermediateStore::record_name(chapter_num),
                record.chapter_num
            );
            record.chapter_num = chapter_num;
        }

        let existing =
            lock_store(&self.store).and_then(|s| s.find_chapter(novel_id, chapter_num));
        let existing = match existing {
            Ok(existing) => existing,
            Err(e) => {
                self.record_persist_failure(chapter_num, e, report);
                return;
            }
        };

        if let Some(chapter) = existing {
            info!("Skip chapter {} (already ingested)", chapter_num);
            report.skipped.push(chapter_num);
            self.heal(chapter.id, chapter.source_url.as_deref(), &record, staging, report);
            return;
        }

        self.translate_and_commit(novel_id, record, report).await;
    }

    /// Copies a source URL to whichever store is missing it
    fn heal(
        &self,
        chapter_id: i64,
        persisted_url: Option<&str>,
        record: &IntermediateChapter,
        staging: &IntermediateStore,
        report: &mut IngestReport,
    ) {
        let persisted_url = persisted_url.filter(|u| !u.is_empty());
        let chapter_num = record.chapter_num;

        let healed = match (persisted_url, record.source_url.is_empty()) {
            (None, false) => lock_store(&self.store)
                .and_then(|mut s| s.update_chapter_source_url(chapter_id, &record.source_url))
                .map(|_| true),
            (Some(url), true) => staging.patch_source_url(chapter_num, url),
            _ => Ok(false),
        };

        match healed {
            Ok(true) => {
                info!("Healed source URL of chapter {}", chapter_num);
                report.healed.push(chapter_num);
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Could not heal source URL of chapter {}: {}", chapter_num, e);
                report.incidents.push(IngestError::Storage(e));
            }
        }
    }

    async fn translate_and_commit(
        &self,
        novel_id: i64,
        record: IntermediateChapter,
        report: &mut IngestReport,
    ) {
        let chapter_num = record.chapter_num;
        info!("Processing new chapter {}", chapter_num);

        let content = self.translator.translate(&record.content).await;
        if content.quality == TranslationQuality::Untranslated {
            // Keep the number free so the next run retries the chapter
            warn!(
                "Chapter {} held back: body translation failed ({})",
                chapter_num,
                content.quality.failed_stage().unwrap_or_default()
            );
            report.failed.push(chapter_num);
            report.incidents.push(IngestError::TranslationDegraded {
                chapter: chapter_num,
                stage: "body: literal pass failed, chapter not committed".to_string(),
            });
            return;
        }
        let title = self.translator.translate(&record.title).await;

        let chapter = NewChapter {
            novel_id,
            chapter_num,
            title: record.title,
            content: record.content,
            source_url: Some(record.source_url).filter(|u| !u.is_empty()),
        };
        let translation = NewTranslation {
            language: self.settings.language.clone(),
            title: title.text,
            content: content.text,
            published_at: Some(Utc::now()),
        };

        let committed = lock_store(&self.store)
            .and_then(|mut s| s.create_chapter_with_translation(&chapter, &translation));

        match committed {
            Ok(_) => {
                info!("Saved chapter {}", chapter_num);
                report.ingested.push(chapter_num);

                let stages: Vec<String> = [("body", content.quality), ("title", title.quality)]
                    .into_iter()
                    .filter_map(|(part, quality)| {
                        quality.failed_stage().map(|stage| format!("{}: {}", part, stage))
                    })
                    .collect();
                if !stages.is_empty() {
                    let stage = stages.join(", ");
                    warn!("Chapter {} translation degraded ({})", chapter_num, stage);
                    report.degraded.push(chapter_num);
                    report.incidents.push(IngestError::TranslationDegraded {
                        chapter: chapter_num,
                        stage,
                    });
                }
            }
            Err(e) => self.record_persist_failure(chapter_num, e, report),
        }
    }

    fn record_persist_failure(&self, chapter_num: u32, e: StorageError, report: &mut IngestReport) {
        match e {
            StorageError::ConstraintViolation(_) => {
                warn!("Chapter {} was ingested concurrently, skipping", chapter_num);
                report.skipped.push(chapter_num);
                report.incidents.push(IngestError::DuplicateChapter {
                    chapter: chapter_num,
                });
            }
            source => {
                error!("Failed to persist chapter {}: {}", chapter_num, source);
                report.failed.push(chapter_num);
                report.incidents.push(IngestError::PersistFailed {
                    chapter: chapter_num,
                    source,
                });
            }
        }
    }
}
