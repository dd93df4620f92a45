//! File-backed staging store for crawled chapters
//!
//! Each novel gets its own directory under the configured raw directory:
//!
//! ```text
//! <raw-dir>/<slug>/
//!     chapter_0001.json
//!     chapter_0002.json
//!     cursor.json            furthest chapter reached, rewritten after each save
//!     collisions/            records displaced by a later page with the same number
//! ```
//!
//! All writes go through a temp file followed by a rename so a crash never
//! leaves a truncated record behind.

use crate::storage::traits::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_PREFIX: &str = "chapter_";
const RECORD_SUFFIX: &str = ".json";
const CURSOR_FILE: &str = "cursor.json";
const COLLISIONS_DIR: &str = "collisions";

/// One staged chapter, exactly as crawled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntermediateChapter {
    /// Records staged before URL tracking have no source URL
    #[serde(default)]
    pub source_url: String,
    pub title: String,
    pub content: String,
    /// The record name is authoritative; this copy may be missing or stale
    #[serde(default)]
    pub chapter_num: u32,
}

/// Furthest point the crawler has staged for a novel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCursor {
    pub chapter_num: u32,
    pub source_url: String,
    pub updated_at: DateTime<Utc>,
}

/// What a save did to the slot for its chapter number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The number had no record yet
    Created,
    /// The same page was staged again
    Refreshed,
    /// A different page held this number; it was moved to `collisions/`
    Replaced { previous_url: String },
}

/// Staging directory for one novel
#[derive(Debug, Clone)]
pub struct IntermediateStore {
    dir: PathBuf,
}

impl IntermediateStore {
    /// Opens (creating if needed) the staging directory for `slug` under `root`
    pub fn open(root: impl AsRef<Path>, slug: &str) -> StorageResult<Self> {
        if slug.is_empty() || slug.contains(['/', '\\']) || slug == "." || slug == ".." {
            return Err(StorageError::Database(format!(
                "Invalid slug for staging directory: '{}'",
                slug
            )));
        }

        let dir = root.as_ref().join(slug);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record name for a chapter number, zero-padded to four digits
    pub fn record_name(chapter_num: u32) -> String {
        format!("{}{:04}{}", RECORD_PREFIX, chapter_num, RECORD_SUFFIX)
    }

    /// Inverse of [`Self::record_name`]
    pub fn parse_record_name(name: &str) -> Option<u32> {
        let digits = name.strip_prefix(RECORD_PREFIX)?.strip_suffix(RECORD_SUFFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    fn record_path(&self, chapter_num: u32) -> PathBuf {
        self.dir.join(Self::record_name(chapter_num))
    }

    /// Stages a chapter under its number and advances the cursor
    ///
    /// A record already holding the number for a different source URL is
    /// archived before being replaced; the newest page stays authoritative.
    pub fn save(&self, chapter: &IntermediateChapter) -> StorageResult<SaveOutcome> {
        let outcome = match self.load(chapter.chapter_num)? {
            None => SaveOutcome::Created,
            Some(existing)
                if existing.source_url == chapter.source_url || existing.source_url.is_empty() =>
            {
                SaveOutcome::Refreshed
            }
            Some(existing) => {
                let archived = self.archive(chapter.chapter_num)?;
                warn!(
                    "Chapter number collision at {}: {} replaced by {} (previous record archived to {})",
                    chapter.chapter_num,
                    existing.source_url,
                    chapter.source_url,
                    archived.display()
                );
                SaveOutcome::Replaced {
                    previous_url: existing.source_url,
                }
            }
        };

        write_json_atomic(&self.record_path(chapter.chapter_num), chapter)?;
        debug!(
            "Staged chapter {} ({:?}) in {}",
            chapter.chapter_num,
            outcome,
            self.dir.display()
        );

        self.advance_cursor(chapter)?;
        Ok(outcome)
    }

    /// Loads the record for a chapter number
    pub fn load(&self, chapter_num: u32) -> StorageResult<Option<IntermediateChapter>> {
        read_json(&self.record_path(chapter_num))
    }

    /// Staged chapter numbers, ascending
    pub fn list_numbers(&self) -> StorageResult<Vec<u32>> {
        let mut numbers = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(number) = entry.file_name().to_str().and_then(Self::parse_record_name) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// The cursor record, if one has been written
    pub fn cursor(&self) -> StorageResult<Option<CrawlCursor>> {
        read_json(&self.dir.join(CURSOR_FILE))
    }

    /// The furthest staged chapter
    ///
    /// Trusts the cursor when the record it points at still exists with the
    /// same URL, and falls back to scanning record names otherwise.
    pub fn latest(&self) -> StorageResult<Option<IntermediateChapter>> {
        if let Some(cursor) = self.cursor()? {
            if let Some(record) = self.load(cursor.chapter_num)? {
                if record.source_url == cursor.source_url {
                    return Ok(Some(record));
                }
            }
            debug!("Cursor in {} is stale, scanning records", self.dir.display());
        }

        match self.list_numbers()?.last() {
            Some(&number) => self.load(number),
            None => Ok(None),
        }
    }

    /// Fills in the source URL of a staged record that lacks one
    ///
    /// Returns true when the record was patched.
    pub fn patch_source_url(&self, chapter_num: u32, source_url: &str) -> StorageResult<bool> {
        let Some(mut record) = self.load(chapter_num)? else {
            return Ok(false);
        };
        if !record.source_url.is_empty() || source_url.is_empty() {
            return Ok(false);
        }

        record.source_url = source_url.to_string();
        write_json_atomic(&self.record_path(chapter_num), &record)?;
        Ok(true)
    }

    fn archive(&self, chapter_num: u32) -> StorageResult<PathBuf> {
        let archive_dir = self.dir.join(COLLISIONS_DIR);
        fs::create_dir_all(&archive_dir)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = archive_dir.join(format!(
            "{}{:04}.{}{}",
            RECORD_PREFIX, chapter_num, stamp, RECORD_SUFFIX
        ));
        fs::rename(self.record_path(chapter_num), &target)?;
        Ok(target)
    }

    fn advance_cursor(&self, chapter: &IntermediateChapter) -> StorageResult<()> {
        let target = match self.cursor()? {
            Some(current) if current.chapter_num > chapter.chapter_num => return Ok(()),
            Some(_) => chapter.clone(),
            // Records may predate the cursor; start from the furthest of them
            None => self.furthest_record(chapter)?,
        };

        let cursor = CrawlCursor {
            chapter_num: target.chapter_num,
            source_url: target.source_url,
            updated_at: Utc::now(),
        };
        write_json_atomic(&self.dir.join(CURSOR_FILE), &cursor)
    }

    fn furthest_record(&self, chapter: &IntermediateChapter) -> StorageResult<IntermediateChapter> {
        if let Some(&furthest) = self.list_numbers()?.last() {
            if furthest > chapter.chapter_num {
                if let Some(record) = self.load(furthest)? {
                    debug!(
                        "Seeding cursor in {} from existing chapter {}",
                        self.dir.display(),
                        furthest
                    );
                    return Ok(record);
                }
            }
        }
        Ok(chapter.clone())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::Database(format!("Invalid record path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let json = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
