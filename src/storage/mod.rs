//! Storage module for staged and published chapters
//!
//! Two stores live here:
//! - the intermediate store, one JSON record per crawled chapter, owned by
//!   the pipeline and shared between the crawler (writer) and the ingestion
//!   pass (reader/patcher)
//! - the relational novel store, accessed through the [`NovelStore`] trait
//!   with a SQLite implementation

mod intermediate;
mod schema;
mod sqlite;
mod traits;

pub use intermediate::{CrawlCursor, IntermediateChapter, IntermediateStore, SaveOutcome};
pub use sqlite::SqliteNovelStore;
pub use traits::{NovelStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

/// A novel store shared between the coordinator and the trigger service
pub type SharedStore<S> = Arc<Mutex<S>>;

/// Locks a shared store, surfacing poisoning as a storage error
pub fn lock_store<S>(store: &SharedStore<S>) -> StorageResult<MutexGuard<'_, S>> {
    store
        .lock()
        .map_err(|_| StorageError::Database("store lock poisoned".to_string()))
}

/// Represents a novel in the database
#[derive(Debug, Clone)]
pub struct NovelRecord {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub original_title: Option<String>,
    pub status: NovelStatus,
    pub created_at: String,
}

/// Publication status of a novel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NovelStatus {
    Ongoing,
    Completed,
    Hiatus,
}

impl NovelStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Hiatus => "hiatus",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ongoing" => Some(Self::Ongoing),
            "completed" => Some(Self::Completed),
            "hiatus" => Some(Self::Hiatus),
            _ => None,
        }
    }
}

/// Represents a persisted chapter (raw, untranslated)
#[derive(Debug, Clone)]
pub struct ChapterRecord {
    pub id: i64,
    pub novel_id: i64,
    pub chapter_num: u32,
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
    pub created_at: String,
}

impl ChapterRecord {
    /// True when the record carries a non-empty source URL
    pub fn has_source_url(&self) -> bool {
        self.source_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Represents a translation of one chapter into one language
#[derive(Debug, Clone)]
pub struct TranslationRecord {
    pub id: i64,
    pub chapter_id: i64,
    pub language: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: String,
}

impl TranslationRecord {
    /// Whether readers may see this translation at `now`
    ///
    /// A missing timestamp means the translation is still a draft.
    pub fn is_published_at(&self, now: DateTime<Utc>) -> bool {
        self.published_at.is_some_and(|at| at <= now)
    }
}

/// Fields needed to create a novel
#[derive(Debug, Clone)]
pub struct NewNovel {
    pub slug: String,
    pub title: String,
    pub original_title: Option<String>,
}

/// Fields needed to create a chapter
#[derive(Debug, Clone)]
pub struct NewChapter {
    pub novel_id: i64,
    pub chapter_num: u32,
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
}

/// Fields needed to create a translation alongside its chapter
#[derive(Debug, Clone)]
pub struct NewTranslation {
    pub language: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
}
