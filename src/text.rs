use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Elements whose content is never read aloud.
const SKIPPED_ELEMENTS: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

/// Elements that start a new line of speech.
const BLOCK_ELEMENTS: [&str; 16] = [
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "tr", "table", "section", "article", "title",
];

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));

/// Turns user input (plain text or a web page URL) into text to speak.
pub struct TextExtractor {
    client: reqwest::Client,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to configure HTTP client: {}. Using defaults.", e);
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Plain text is returned unchanged; http(s) URLs are fetched and reduced to text.
    pub async fn extract(&self, input: &str) -> Result<String> {
        if !is_url(input) {
            return Ok(input.to_string());
        }

        let url = input.trim();
        tracing::info!("Fetching {}", url);
        let html = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?
            .error_for_status()?
            .text()
            .await
            .context("Failed to read page body")?;

        let text = html_to_text(&html);
        tracing::info!("Extracted {} characters from {}", text.chars().count(), url);
        Ok(text)
    }
}

pub fn is_url(text: &str) -> bool {
    match reqwest::Url::parse(text.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Parse a page and keep the text a reader would hear, one block per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    collect_text(document.root_element(), &mut text);
    clean_whitespace(&text)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of spaces, trim every line, keep at most one blank line
/// between paragraphs and drop blank lines at both ends.
pub fn clean_whitespace(text: &str) -> String {
    let text = SPACES.replace_all(text, " ");

    let mut lines: Vec<&str> = Vec::new();
    for line in text.split('\n').map(str::trim) {
        if line.is_empty() && lines.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }

    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
