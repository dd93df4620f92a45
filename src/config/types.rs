use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for the ingestion pipeline
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Layout of the source site the crawler walks
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SourceConfig {
    /// Origin that relative "next chapter" links are resolved against
    pub origin: String,

    /// Container holding the chapter text
    pub content_selector: String,

    /// Navigation container holding the previous/next links
    pub nav_selector: String,

    /// Visible text of the "next chapter" anchor
    pub next_label: String,

    /// Separator splitting the document title into segments
    pub title_separator: String,

    /// Site watermark removed from titles and body lines
    pub watermark: String,

    /// Token marking injected ad-loader lines
    pub ad_marker: String,

    /// Marker after which the remaining chapter text is discarded
    pub end_marker: String,

    /// Subtrees removed from the container before text extraction
    pub junk_selectors: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            origin: "https://www.69shuba.com".to_string(),
            content_selector: ".txtnav".to_string(),
            nav_selector: ".page1".to_string(),
            next_label: "下一章".to_string(),
            title_separator: "-".to_string(),
            watermark: "69书吧".to_string(),
            ad_marker: "loadAdv".to_string(),
            end_marker: "(本章完)".to_string(),
            junk_selectors: [
                ".txtinfo",
                "#txtright",
                ".contentadv",
                ".bottom-ad",
                ".bottom-ad2",
                ".page1",
                "script",
                "style",
                "h1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Crawl loop behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Chapters fetched per run; zero or negative means unlimited
    pub max_chapters_per_run: i64,

    /// Lower bound of the randomized pause between pages (milliseconds)
    pub min_delay_ms: u64,

    /// Upper bound of the randomized pause between pages (milliseconds)
    pub max_delay_ms: u64,

    /// How long to wait for the content container before assuming a challenge
    pub content_wait_secs: u64,

    /// Additional wait granted to resolve a bot challenge
    pub challenge_wait_secs: u64,

    /// Upper bound on a single navigation
    pub navigation_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_chapters_per_run: 5,
            min_delay_ms: 2000,
            max_delay_ms: 4000,
            content_wait_secs: 10,
            challenge_wait_secs: 60,
            navigation_timeout_secs: 60,
        }
    }
}

/// Browser session settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BrowserConfig {
    /// Run without a visible window. Headed sessions fingerprint as less automated
    /// and let an operator solve a challenge by hand.
    pub headless: bool,

    /// User agent presented to the source
    pub user_agent: String,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Explicit Chrome/Chromium binary; discovered on PATH when unset
    pub chrome_executable: Option<PathBuf>,

    /// DevTools websocket of an already running browser
    pub remote_url: Option<String>,

    /// Extra command line flags passed to the browser
    pub chrome_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            viewport_width: 1280,
            viewport_height: 800,
            chrome_executable: None,
            remote_url: None,
            chrome_args: Vec::new(),
        }
    }
}

/// LLM completion endpoint settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TranslatorConfig {
    /// Base URL of an OpenAI-compatible API (LM Studio by default)
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,

    /// Language tag written on translation records
    pub language: String,

    /// Per-request timeout; local models can be slow on long chapters
    pub timeout_secs: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: "lm-studio".to_string(),
            model: "model-identifier".to_string(),
            temperature: 0.3,
            language: "EN".to_string(),
            timeout_secs: 600,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Root of the intermediate store; each novel gets its own subdirectory
    pub raw_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./manov.db".to_string(),
            raw_dir: "./raw_data".to_string(),
        }
    }
}
