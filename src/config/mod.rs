//! Configuration module for the ingestion pipeline
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; missing keys fall back to the defaults for the
//! 69shuba source and a local LM Studio endpoint.
//!
//! # Example
//!
//! ```no_run
//! use manov_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("manov.toml")).unwrap();
//! println!("Chapters per run: {}", config.crawler.max_chapters_per_run);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, Config, CrawlerConfig, SourceConfig, StorageConfig, TranslatorConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
