//! Verification code extraction.
//!
//! Message bodies are run through an ordered chain of heuristics; the first
//! one producing a candidate wins. Every candidate must be exactly four ASCII
//! digits and must not look like a calendar year.

use crate::message_body::{BodyKind, body_parts};
use once_cell::sync::Lazy;
use regex::Regex;
use regflow_core::config::ExtractorConfig;
use regflow_core::error::{RegflowError, Result};
use regflow_core::mail::{ExtractedCode, Heuristic};
use scraper::{ElementRef, Html, Selector};

static STANDALONE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}\b").expect("valid standalone code regex"));

static INLINE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)verification code[:\s]+(\d{4})\b").expect("valid inline label regex")
});

static WHITE_BACKGROUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)background-color:\s*#ffffff").expect("valid background regex")
});

const LABEL: &str = "verification code";
const EMPHASIS: &str = "b, strong";
const STYLED_CELL: &str = "td[style]";

/// Years that show up in footers and copyright lines.
fn is_denied(candidate: &str) -> bool {
    match candidate.parse::<u16>() {
        Ok(year) => year == 1999 || year == 2000 || (2019..=2026).contains(&year),
        Err(_) => false,
    }
}

/// Exactly four ASCII digits, not a denied year.
pub fn is_code(candidate: &str) -> bool {
    candidate.len() == 4 && candidate.bytes().all(|b| b.is_ascii_digit()) && !is_denied(candidate)
}

/// First standalone 4-digit token that passes [`is_code`].
fn first_standalone(text: &str) -> Option<String> {
    STANDALONE_CODE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| is_code(candidate))
        .map(str::to_string)
}

fn exact_text(element: ElementRef<'_>) -> Option<String> {
    let text: String = element.text().collect();
    let text = text.trim();
    is_code(text).then(|| text.to_string())
}

fn parse_selector(name: &str, raw: &str) -> Result<Selector> {
    Selector::parse(raw)
        .map_err(|e| RegflowError::config(format!("invalid {name} selector '{raw}': {e:?}")))
}

/// The heuristic chain.
///
/// Selectors are kept as strings and parsed per extraction so the extractor
/// stays `Send + Sync` and cheap to share across polling threads.
#[derive(Debug, Clone)]
pub struct CodeExtractor {
    primary: String,
    fallback: String,
}

impl CodeExtractor {
    /// # Returns
    ///
    /// - `Err(Configuration)`: one of the marker selectors does not parse
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        parse_selector("primary", &config.primary_selector)?;
        parse_selector("fallback", &config.fallback_selector)?;
        Ok(Self {
            primary: config.primary_selector.clone(),
            fallback: config.fallback_selector.clone(),
        })
    }

    /// Walks a raw RFC 822 message. HTML parts get the full chain, plain
    /// parts the generic scan. The first part yielding a code wins.
    pub fn extract_message(&self, raw: &[u8]) -> Option<ExtractedCode> {
        let parts = match body_parts(raw) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!("Unreadable message: {}", e);
                return None;
            }
        };
        parts.iter().find_map(|part| match part.kind {
            BodyKind::Html => self.extract_html(&part.text),
            BodyKind::Plain => self.extract_text(&part.text),
        })
    }

    /// Plain text only supports the generic scan.
    pub fn extract_text(&self, text: &str) -> Option<ExtractedCode> {
        first_standalone(text).map(|code| ExtractedCode::new(code, Heuristic::GenericScan))
    }

    pub fn extract_html(&self, html: &str) -> Option<ExtractedCode> {
        let document = Html::parse_document(html);
        let tag = |heuristic: Heuristic| move |code: String| (code, heuristic);

        let (code, heuristic) = self
            .marker(&document, &self.primary)
            .map(tag(Heuristic::PrimaryMarker))
            .or_else(|| self.marker(&document, &self.fallback).map(tag(Heuristic::FallbackMarker)))
            .or_else(|| label_proximity(&document).map(tag(Heuristic::LabelProximity)))
            .or_else(|| emphasis(&document).map(tag(Heuristic::Emphasis)))
            .or_else(|| styled_container(&document).map(tag(Heuristic::StyledContainer)))
            .or_else(|| generic_scan(&document).map(tag(Heuristic::GenericScan)))?;

        tracing::debug!(heuristic = %heuristic, "Extracted verification code");
        Some(ExtractedCode::new(code, heuristic))
    }

    fn marker(&self, document: &Html, raw_selector: &str) -> Option<String> {
        let selector = Selector::parse(raw_selector).ok()?;
        document.select(&selector).find_map(exact_text)
    }
}

/// A text node mentioning the label, then the label element's following
/// siblings, then the label text itself.
fn label_proximity(document: &Html) -> Option<String> {
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        if !text.to_lowercase().contains(LABEL) {
            continue;
        }
        let Some(label) = node.parent().and_then(ElementRef::wrap) else {
            continue;
        };

        let sibling_code = label
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find_map(exact_text);
        if sibling_code.is_some() {
            return sibling_code;
        }

        let label_text: String = label.text().collect();
        let inline = INLINE_LABEL
            .captures_iter(&label_text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .find(|candidate| is_code(candidate));
        if let Some(code) = inline {
            return Some(code.to_string());
        }
    }
    None
}

fn emphasis(document: &Html) -> Option<String> {
    let selector = Selector::parse(EMPHASIS).ok()?;
    document.select(&selector).find_map(exact_text)
}

fn styled_container(document: &Html) -> Option<String> {
    let selector = Selector::parse(STYLED_CELL).ok()?;
    document
        .select(&selector)
        .filter(|cell| {
            cell.value()
                .attr("style")
                .is_some_and(|style| WHITE_BACKGROUND.is_match(style))
        })
        .find_map(|cell| first_standalone(&cell.text().collect::<Vec<_>>().join(" ")))
}

fn generic_scan(document: &Html) -> Option<String> {
    let text = document
        .root_element()
        .descendants()
        .filter(|node| {
            // Skip stylesheet and script bodies.
            node.parent()
                .and_then(ElementRef::wrap)
                .is_none_or(|parent| !matches!(parent.value().name(), "style" | "script"))
        })
        .filter_map(|node| node.value().as_text().map(|text| text.to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    first_standalone(&text)
}
