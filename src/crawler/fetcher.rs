//! Browser-driven page fetcher
//!
//! The source fingerprints plain HTTP clients, so pages are loaded through a
//! real Chromium session driven over CDP. This module handles:
//! - launching (or attaching to) the browser with automation signals masked
//! - navigating and waiting for the content container to become visible
//! - escalating to a long wait when a bot challenge is suspected
//! - releasing the browser on every exit path

use crate::config::{BrowserConfig, CrawlerConfig};
use crate::crawler::parser::{ChapterExtractor, SourcePage};
use crate::FetchError;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig as CdpBrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs before any page script to hide the most common automation tells
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en-US', 'en'], configurable: true });
"#;

/// Loads rendered pages for one crawl session
///
/// Implementations own a live browser (or a stand-in for tests). `load`
/// returns once the content container is visible or fails with
/// [`FetchError::Blocked`] when a challenge never clears.
#[async_trait]
pub trait PageLoader: Send {
    async fn load(&mut self, url: &str) -> Result<String, FetchError>;

    /// Releases the session. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Opens a fresh [`PageLoader`] per crawl run
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageLoader>, FetchError>;
}

/// Short wait for content, then one long wait for a challenge to clear
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub content_wait: Duration,
    pub challenge_wait: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            content_wait: Duration::from_secs(config.content_wait_secs),
            challenge_wait: Duration::from_secs(config.challenge_wait_secs),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Something that can report whether the content container is visible yet
#[async_trait]
pub trait ContentCheck: Send {
    async fn content_visible(&mut self) -> Result<bool, FetchError>;
}

/// Waits for content, escalating to the challenge wait on a short timeout
///
/// No retry happens here; a failed long wait is terminal for the fetch and
/// the caller decides what to do next.
pub async fn wait_for_content<P: ContentCheck>(
    check: &mut P,
    policy: &WaitPolicy,
) -> Result<(), FetchError> {
    if poll_until_visible(check, policy.content_wait, policy.poll_interval).await? {
        return Ok(());
    }

    warn!(
        "Content not visible after {}s, assuming bot challenge; waiting up to {}s for it to clear",
        policy.content_wait.as_secs(),
        policy.challenge_wait.as_secs()
    );

    if poll_until_visible(check, policy.challenge_wait, policy.poll_interval).await? {
        info!("Challenge cleared, content visible");
        return Ok(());
    }

    Err(FetchError::Blocked {
        waited_secs: (policy.content_wait + policy.challenge_wait).as_secs(),
    })
}

async fn poll_until_visible<P: ContentCheck>(
    check: &mut P,
    budget: Duration,
    interval: Duration,
) -> Result<bool, FetchError> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if check.content_visible().await? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Fetches and extracts chapters through one loader session
pub struct PageFetcher {
    loader: Box<dyn PageLoader>,
    extractor: ChapterExtractor,
}

impl PageFetcher {
    pub fn new(loader: Box<dyn PageLoader>, extractor: ChapterExtractor) -> Self {
        Self { loader, extractor }
    }

    /// Loads `url` and extracts its chapter
    pub async fn fetch(&mut self, url: &str) -> Result<SourcePage, FetchError> {
        let html = self.loader.load(url).await?;
        self.extractor.extract(&html, url)
    }

    /// Releases the underlying session
    pub async fn close(&mut self) {
        self.loader.close().await;
    }
}

/// Launches Chromium sessions from the browser configuration
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    browser: BrowserConfig,
    content_selector: String,
    wait: WaitPolicy,
    navigation_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn new(
        browser: BrowserConfig,
        crawler: &CrawlerConfig,
        content_selector: impl Into<String>,
    ) -> Self {
        Self {
            browser,
            content_selector: content_selector.into(),
            wait: WaitPolicy::from_config(crawler),
            navigation_timeout: Duration::from_secs(crawler.navigation_timeout_secs),
        }
    }

    fn cdp_config(&self) -> Result<CdpBrowserConfig, FetchError> {
        let settings = &self.browser;
        let mut builder = CdpBrowserConfig::builder()
            .window_size(settings.viewport_width, settings.viewport_height)
            .viewport(Viewport {
                width: settings.viewport_width,
                height: settings.viewport_height,
                ..Viewport::default()
            });

        // with_head means NOT headless
        if !settings.headless {
            builder = builder.with_head();
        }

        if let Some(path) = &settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg(format!("--user-agent={}", settings.user_agent));

        for arg in &settings.chrome_args {
            builder = builder.arg(arg);
        }

        builder.build().map_err(FetchError::Browser)
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn PageLoader>, FetchError> {
        let (browser, mut handler) = match &self.browser.remote_url {
            Some(remote) => {
                info!("Connecting to remote browser at {}", remote);
                Browser::connect(remote.as_str()).await
            }
            None => {
                info!("Launching browser (headless={})", self.browser.headless);
                Browser::launch(self.cdp_config()?).await
            }
        }
        .map_err(|e| FetchError::Browser(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut session = BrowserSession {
            browser,
            page: None,
            handler_task,
            content_selector: self.content_selector.clone(),
            wait: self.wait.clone(),
            navigation_timeout: self.navigation_timeout,
            owns_process: self.browser.remote_url.is_none(),
            closed: false,
        };

        if let Err(e) = session.open_page(&self.browser.user_agent).await {
            session.close().await;
            return Err(e);
        }

        Ok(Box::new(session))
    }
}

/// A live Chromium session with one reusable tab
pub struct BrowserSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    content_selector: String,
    wait: WaitPolicy,
    navigation_timeout: Duration,
    owns_process: bool,
    closed: bool,
}

impl BrowserSession {
    async fn open_page(&mut self, user_agent: &str) -> Result<(), FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page, FetchError> {
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::Browser("session is closed".to_string()))
    }
}

/// Visibility check for the content container, evaluated in the page
struct VisibilityCheck<'a> {
    page: &'a Page,
    script: String,
}

impl<'a> VisibilityCheck<'a> {
    fn new(page: &'a Page, selector: &str) -> Self {
        let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"body\"".to_string());
        let script = format!(
            "(() => {{ const el = document.querySelector({quoted}); \
             if (!el) return false; \
             const style = window.getComputedStyle(el); \
             return style.display !== 'none' && style.visibility !== 'hidden' \
                 && el.getClientRects().length > 0; }})()"
        );
        Self { page, script }
    }
}

#[async_trait]
impl ContentCheck for VisibilityCheck<'_> {
    async fn content_visible(&mut self) -> Result<bool, FetchError> {
        match self.page.evaluate(self.script.as_str()).await {
            Ok(result) => Ok(result.into_value::<bool>().unwrap_or(false)),
            // Evaluation fails while a challenge page reloads itself
            Err(e) => {
                debug!("Visibility check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl PageLoader for BrowserSession {
    async fn load(&mut self, url: &str) -> Result<String, FetchError> {
        let page = self.page()?;

        info!("Navigating to {}", url);
        match tokio::time::timeout(self.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(FetchError::Navigation(e.to_string())),
            Err(_) => {
                return Err(FetchError::Navigation(format!(
                    "timed out after {}s",
                    self.navigation_timeout.as_secs()
                )))
            }
        }

        let mut check = VisibilityCheck::new(page, &self.content_selector);
        wait_for_content(&mut check, &self.wait).await?;

        page.content()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close tab: {}", e);
            }
        }

        if self.owns_process {
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                debug!("Failed to reap browser process: {}", e);
            }
        }

        self.handler_task.abort();
        info!("Browser session released");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            // The browser process is killed when `Browser` drops; stop the
            // event pump with it.
            self.handler_task.abort();
        }
    }
}
