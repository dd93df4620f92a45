//! Storage traits and error types
//!
//! This module defines the datastore contract the ingestion pipeline relies
//! on and the error type shared by every storage backend.

use crate::storage::{
    ChapterRecord, NewChapter, NewNovel, NewTranslation, NovelRecord, TranslationRecord,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Chapter ID {0} not found")]
    ChapterNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Datastore contract consumed by the ingestion pipeline
///
/// Novels are keyed by a unique slug, chapters by the unique pair
/// (novel id, chapter number) and translations by (chapter id, language).
pub trait NovelStore: Send {
    // ===== Novels =====

    fn find_novel_by_slug(&self, slug: &str) -> StorageResult<Option<NovelRecord>>;

    /// Creates a novel
    ///
    /// Fails with [`StorageError::ConstraintViolation`] when the slug or the
    /// original title is already taken.
    fn create_novel(&mut self, novel: &NewNovel) -> StorageResult<NovelRecord>;

    // ===== Chapters =====

    fn find_chapter(&self, novel_id: i64, chapter_num: u32)
        -> StorageResult<Option<ChapterRecord>>;

    /// The chapter with the highest number, if any
    fn latest_chapter(&self, novel_id: i64) -> StorageResult<Option<ChapterRecord>>;

    /// Patches the source URL of an existing chapter in place
    fn update_chapter_source_url(&mut self, chapter_id: i64, source_url: &str)
        -> StorageResult<()>;

    /// Creates a chapter and its translation as one unit
    ///
    /// Either both rows are written or neither is. A chapter number already
    /// present for the novel yields [`StorageError::ConstraintViolation`].
    fn create_chapter_with_translation(
        &mut self,
        chapter: &NewChapter,
        translation: &NewTranslation,
    ) -> StorageResult<(ChapterRecord, TranslationRecord)>;

    // ===== Translations =====

    fn find_translation(
        &self,
        chapter_id: i64,
        language: &str,
    ) -> StorageResult<Option<TranslationRecord>>;

    // ===== Statistics =====

    fn count_chapters(&self, novel_id: i64) -> StorageResult<u64>;

    fn count_translations(&self, novel_id: i64) -> StorageResult<u64>;
}
