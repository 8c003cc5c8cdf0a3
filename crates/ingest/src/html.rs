//! HTML to plain text for knowledge ingestion.
//!
//! Picks the page's main content region when one is marked up, drops
//! navigation chrome and scripts, and collapses whitespace.

use scraper::{ElementRef, Html, Selector};

/// Content regions tried in order; the first with text wins.
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    ".content",
    ".main-content",
    "#content",
    ".post-content",
    ".entry-content",
];

/// Elements whose text never reaches the knowledge store.
const SKIPPED_SELECTORS: &[&str] = &[
    "script", "style", "nav", "header", "footer", ".nav", ".menu", ".sidebar",
];

pub const UNTITLED: &str = "Untitled";

/// Title and readable text of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub text: String,
}

pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);
    ExtractedPage {
        title: extract_title(&document),
        text: extract_text(&document),
    }
}

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
    selectors.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return UNTITLED.to_string();
    };
    document
        .select(&selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

fn extract_text(document: &Html) -> String {
    let skipped = parse_all(SKIPPED_SELECTORS);

    for selector in parse_all(MAIN_SELECTORS) {
        let mut raw = String::new();
        for region in document.select(&selector) {
            if !skipped.iter().any(|s| s.matches(&region)) {
                collect_text(region, &skipped, &mut raw);
            }
        }
        let text = collapse_whitespace(&raw);
        if !text.is_empty() {
            return text;
        }
    }

    let mut raw = String::new();
    match Selector::parse("body").ok().and_then(|s| document.select(&s).next()) {
        Some(body) => collect_text(body, &skipped, &mut raw),
        None => collect_text(document.root_element(), &skipped, &mut raw),
    }
    collapse_whitespace(&raw)
}

fn collect_text(element: ElementRef<'_>, skipped: &[Selector], out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if skipped.iter().any(|s| s.matches(&child_el)) {
                continue;
            }
            collect_text(child_el, skipped, out);
        }
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
