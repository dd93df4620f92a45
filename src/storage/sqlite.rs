//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the NovelStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{NovelStore, StorageError, StorageResult};
use crate::storage::{
    ChapterRecord, NewChapter, NewNovel, NewTranslation, NovelRecord, NovelStatus,
    TranslationRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

const NOVEL_COLUMNS: &str = "id, slug, title, original_title, status, created_at";
const CHAPTER_COLUMNS: &str =
    "id, novel_id, chapter_num, title, content, source_url, created_at";
const TRANSLATION_COLUMNS: &str =
    "id, chapter_id, language, title, content, published_at, created_at";

/// SQLite novel store
pub struct SqliteNovelStore {
    conn: Connection,
}

impl SqliteNovelStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteNovelStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Separates uniqueness failures from other SQLite errors
fn classify(error: rusqlite::Error) -> StorageError {
    match error.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StorageError::ConstraintViolation(error.to_string()),
        _ => StorageError::Sqlite(error),
    }
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn novel_from_row(row: &Row<'_>) -> rusqlite::Result<NovelRecord> {
    Ok(NovelRecord {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        original_title: row.get(3)?,
        status: NovelStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(NovelStatus::Ongoing),
        created_at: row.get(5)?,
    })
}

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<ChapterRecord> {
    Ok(ChapterRecord {
        id: row.get(0)?,
        novel_id: row.get(1)?,
        chapter_num: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        source_url: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn translation_from_row(row: &Row<'_>) -> rusqlite::Result<TranslationRecord> {
    Ok(TranslationRecord {
        id: row.get(0)?,
        chapter_id: row.get(1)?,
        language: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        published_at: parse_timestamp(row.get(5)?),
        created_at: row.get(6)?,
    })
}

impl NovelStore for SqliteNovelStore {
    // ===== Novels =====

    fn find_novel_by_slug(&self, slug: &str) -> StorageResult<Option<NovelRecord>> {
        let novel = self
            .conn
            .query_row(
                &format!("SELECT {} FROM novels WHERE slug = ?1", NOVEL_COLUMNS),
                params![slug],
                novel_from_row,
            )
            .optional()?;
        Ok(novel)
    }

    fn create_novel(&mut self, novel: &NewNovel) -> StorageResult<NovelRecord> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO novels (slug, title, original_title, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    novel.slug,
                    novel.title,
                    novel.original_title,
                    NovelStatus::Ongoing.to_db_string(),
                    now
                ],
            )
            .map_err(classify)?;

        Ok(NovelRecord {
            id: self.conn.last_insert_rowid(),
            slug: novel.slug.clone(),
            title: novel.title.clone(),
            original_title: novel.original_title.clone(),
            status: NovelStatus::Ongoing,
            created_at: now,
        })
    }

    // ===== Chapters =====

    fn find_chapter(
        &self,
        novel_id: i64,
        chapter_num: u32,
    ) -> StorageResult<Option<ChapterRecord>> {
        let chapter = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM chapters WHERE novel_id = ?1 AND chapter_num = ?2",
                    CHAPTER_COLUMNS
                ),
                params![novel_id, chapter_num],
                chapter_from_row,
            )
            .optional()?;
        Ok(chapter)
    }

    fn latest_chapter(&self, novel_id: i64) -> StorageResult<Option<ChapterRecord>> {
        let chapter = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM chapters WHERE novel_id = ?1
                     ORDER BY chapter_num DESC LIMIT 1",
                    CHAPTER_COLUMNS
                ),
                params![novel_id],
                chapter_from_row,
            )
            .optional()?;
        Ok(chapter)
    }

    fn update_chapter_source_url(&mut self, chapter_id: i64, source_url: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE chapters SET source_url = ?1 WHERE id = ?2",
            params![source_url, chapter_id],
        )?;

        if updated == 0 {
            return Err(StorageError::ChapterNotFound(chapter_id));
        }
        Ok(())
    }

    fn create_chapter_with_translation(
        &mut self,
        chapter: &NewChapter,
        translation: &NewTranslation,
    ) -> StorageResult<(ChapterRecord, TranslationRecord)> {
        let now = Utc::now().to_rfc3339();
        let published_at = translation.published_at.map(|at| at.to_rfc3339());

        // Dropping the transaction without commit rolls both rows back
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO chapters (novel_id, chapter_num, title, content, source_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chapter.novel_id,
                chapter.chapter_num,
                chapter.title,
                chapter.content,
                chapter.source_url,
                now
            ],
        )
        .map_err(classify)?;
        let chapter_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO chapter_translations
                 (chapter_id, language, title, content, published_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chapter_id,
                translation.language,
                translation.title,
                translation.content,
                published_at,
                now
            ],
        )
        .map_err(classify)?;
        let translation_id = tx.last_insert_rowid();

        tx.commit()?;

        Ok((
            ChapterRecord {
                id: chapter_id,
                novel_id: chapter.novel_id,
                chapter_num: chapter.chapter_num,
                title: chapter.title.clone(),
                content: chapter.content.clone(),
                source_url: chapter.source_url.clone(),
                created_at: now.clone(),
            },
            TranslationRecord {
                id: translation_id,
                chapter_id,
                language: translation.language.clone(),
                title: translation.title.clone(),
                content: translation.content.clone(),
                published_at: translation.published_at,
                created_at: now,
            },
        ))
    }

    // ===== Translations =====

    fn find_translation(
        &self,
        chapter_id: i64,
        language: &str,
    ) -> StorageResult<Option<TranslationRecord>> {
        let translation = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM chapter_translations WHERE chapter_id = ?1 AND language = ?2",
                    TRANSLATION_COLUMNS
                ),
                params![chapter_id, language],
                translation_from_row,
            )
            .optional()?;
        Ok(translation)
    }

    // ===== Statistics =====

    fn count_chapters(&self, novel_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chapters WHERE novel_id = ?1",
            params![novel_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_translations(&self, novel_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chapter_translations t
             JOIN chapters c ON c.id = t.chapter_id
             WHERE c.novel_id = ?1",
            params![novel_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
