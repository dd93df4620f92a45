//! Manov-Ingest: crawl, translate and stage web-novel chapters
//!
//! This crate implements the ingestion pipeline behind the Manov reading
//! platform. A browser-driven crawler walks a source site chapter by chapter,
//! stages every page in a per-novel intermediate store, and an ingestion pass
//! translates staged chapters through a local LLM before committing them to
//! the relational store that serves readers.

pub mod config;
pub mod crawler;
pub mod ingest;
pub mod storage;
pub mod translate;

use thiserror::Error;

/// Main error type for ingestion operations
///
/// Only `FetchBlocked` and `FetchFailed` end a crawl session. The remaining
/// pipeline variants describe per-chapter incidents that are logged and
/// collected in the run report while the batch continues.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bot challenge unresolved for {url}")]
    FetchBlocked { url: String },

    #[error("Fetch failed for {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Translation of chapter {chapter} degraded: {stage}")]
    TranslationDegraded { chapter: u32, stage: String },

    #[error("Chapter {chapter} is already ingested")]
    DuplicateChapter { chapter: u32 },

    #[error("Failed to persist chapter {chapter}: {source}")]
    PersistFailed {
        chapter: u32,
        #[source]
        source: storage::StorageError,
    },

    #[error("No resume state for '{slug}': a start URL is required")]
    MissingResumeState { slug: String },

    #[error("Novel '{slug}' does not exist and no title was supplied")]
    NovelNotFound { slug: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("LLM client error: {0}")]
    Llm(#[from] translate::LlmError),

    #[error("Crawl worker error: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Fetch-layer errors raised while loading a single source page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Content did not appear within {waited_secs}s (bot challenge unresolved)")]
    Blocked { waited_secs: u64 },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Content container missing from page")]
    MissingContent,
}

impl FetchError {
    /// Attaches the URL being fetched, producing the run-level error
    pub fn at(self, url: &str) -> IngestError {
        match self {
            Self::Blocked { .. } => IngestError::FetchBlocked {
                url: url.to_string(),
            },
            other => IngestError::FetchFailed {
                url: url.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{derive_chapter_number, SourcePage};
pub use ingest::{IngestReport, IngestRequest, IngestionCoordinator, IngestionService, Trigger};
pub use storage::{IntermediateChapter, IntermediateStore, NovelStore, SqliteNovelStore};
pub use translate::{Translation, TranslationQuality, Translator};
