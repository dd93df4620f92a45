//! Chapter page extraction
//!
//! This module turns the rendered HTML of one source page into a
//! [`SourcePage`]:
//! - cleaned chapter text from the content container (junk subtrees and
//!   boilerplate lines removed)
//! - the chapter title from the document title
//! - the absolute URL of the "next chapter" link, if any

use crate::config::SourceConfig;
use crate::{ConfigError, FetchError};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Title used when the document has no usable `<title>`
pub const UNKNOWN_TITLE: &str = "Unknown";

/// One fetched source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    /// The URL the page was fetched from
    pub source_url: String,

    /// Raw (untranslated) chapter title
    pub title: String,

    /// Cleaned chapter text, paragraphs separated by blank lines
    pub body: String,

    /// Absolute URL of the next chapter
    pub next_url: Option<String>,
}

/// Compiled extraction rules for one source site
#[derive(Debug, Clone)]
pub struct ChapterExtractor {
    content: Selector,
    junk: Vec<Selector>,
    nav_links: Selector,
    title: Selector,
    origin: Url,
    next_label: String,
    title_separator: String,
    watermark: String,
    ad_marker: String,
    end_marker: String,
}

impl ChapterExtractor {
    /// Compiles the selectors and origin from the source configuration
    pub fn new(config: &SourceConfig) -> Result<Self, ConfigError> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid origin: {}", e)))?;

        let junk = config
            .junk_selectors
            .iter()
            .map(|s| compile(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            content: compile(&config.content_selector)?,
            junk,
            nav_links: compile(&format!("{} a[href]", config.nav_selector))?,
            title: compile("title")?,
            origin,
            next_label: config.next_label.clone(),
            title_separator: config.title_separator.clone(),
            watermark: config.watermark.clone(),
            ad_marker: config.ad_marker.clone(),
            end_marker: config.end_marker.clone(),
        })
    }

    /// Extracts the chapter from a rendered page
    ///
    /// Fails with [`FetchError::MissingContent`] when the content container
    /// is absent, which happens when a challenge page was captured instead of
    /// the chapter.
    pub fn extract(&self, html: &str, source_url: &str) -> Result<SourcePage, FetchError> {
        let document = Html::parse_document(html);

        let container = document
            .select(&self.content)
            .next()
            .ok_or(FetchError::MissingContent)?;

        let raw_text = self.container_text(container);
        let body = self.clean_lines(&raw_text).join("\n\n");

        Ok(SourcePage {
            source_url: source_url.to_string(),
            title: self.extract_title(&document),
            body,
            next_url: self.extract_next_url(&document),
        })
    }

    /// Collects the container's text nodes, newline separated, skipping any
    /// that sit inside a junk subtree
    fn container_text(&self, container: ElementRef<'_>) -> String {
        let junk_ids: HashSet<_> = self
            .junk
            .iter()
            .flat_map(|selector| container.select(selector))
            .map(|element| element.id())
            .collect();

        let mut pieces: Vec<&str> = Vec::new();
        for node in container.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if node.ancestors().any(|a| junk_ids.contains(&a.id())) {
                continue;
            }
            pieces.push(&**text);
        }

        pieces.join("\n")
    }

    /// Applies the line filters
    ///
    /// Blank lines, ad-loader lines and watermark lines are dropped. The end
    /// marker truncates: text before it on the same line is kept, everything
    /// after it is discarded.
    fn clean_lines(&self, raw_text: &str) -> Vec<String> {
        let mut lines = Vec::new();

        for line in raw_text.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if !self.end_marker.is_empty() {
                if let Some(idx) = line.find(&self.end_marker) {
                    let head = line[..idx].trim();
                    if !head.is_empty() && !self.is_boilerplate(head) {
                        lines.push(head.to_string());
                    }
                    break;
                }
            }

            if self.is_boilerplate(line) {
                continue;
            }

            lines.push(line.to_string());
        }

        lines
    }

    fn is_boilerplate(&self, line: &str) -> bool {
        (!self.ad_marker.is_empty() && line.contains(&self.ad_marker))
            || (!self.watermark.is_empty() && line.contains(&self.watermark))
    }

    /// First segment of the document title, watermark removed
    fn extract_title(&self, document: &Html) -> String {
        let raw = document
            .select(&self.title)
            .next()
            .map(|element| element.text().collect::<String>())
            .unwrap_or_default();

        let first = raw.split(self.title_separator.as_str()).next().unwrap_or("");
        let cleaned = if self.watermark.is_empty() {
            first.trim().to_string()
        } else {
            first.replace(&self.watermark, "").trim().to_string()
        };

        if cleaned.is_empty() {
            UNKNOWN_TITLE.to_string()
        } else {
            cleaned
        }
    }

    /// Finds the anchor labelled as the next chapter inside the navigation
    /// container and resolves it against the origin
    fn extract_next_url(&self, document: &Html) -> Option<String> {
        document
            .select(&self.nav_links)
            .find(|a| a.text().collect::<String>().contains(&self.next_label))
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| self.resolve(href))
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }

        match self.origin.join(href) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Some(url.to_string()),
            _ => None,
        }
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}
