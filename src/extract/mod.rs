//! HTML → program-record extraction pipeline.
//!
//! Strategies run in priority order: JSON-LD, microdata, then a
//! heuristic list scan when structured data was thin, then a page-level
//! fallback when nothing was found at all. Every candidate goes through
//! the same normalization pass before dedup and truncation.

pub mod fallback;
pub mod jsonld;
pub mod lists;
pub mod microdata;

use std::collections::HashSet;

use chrono::{Local, NaiveDate};
use scraper::{ElementRef, Html};
use url::Url;

use crate::normalize::classify::{classify_kind, classify_mode, Mode, ProgramKind};
use crate::normalize::currency::normalize_currency;
use crate::normalize::clean_opt;

/// Hard cap on records returned per page.
pub const MAX_RECORDS: usize = 30;
/// Below this many structured records the heuristic list scan kicks in.
const LIST_SCAN_THRESHOLD: usize = 5;
/// Placeholder title for candidates that arrived without one.
const TITLE_PLACEHOLDER: &str = "Program";

/// Final, normalized program record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramRecord {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub mode: Mode,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub kind: ProgramKind,
}

/// Raw candidate produced by a single extractor, before the
/// normalization pass. `mode` carries whatever delivery-mode text the
/// source had ("courseMode", attendance-mode URLs, plain keywords).
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub mode: Option<String>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub kind: Option<ProgramKind>,
}

/// Shared per-page extraction inputs.
pub struct PageContext<'a> {
    pub page_url: &'a str,
    pub today: NaiveDate,
    base: Option<Url>,
}

impl<'a> PageContext<'a> {
    fn new(page_url: &'a str, today: NaiveDate) -> Self {
        Self {
            page_url,
            today,
            base: Url::parse(page_url).ok(),
        }
    }

    /// Resolve a possibly-relative href against the page URL.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        match &self.base {
            Some(base) => base.join(href).ok(),
            None => Url::parse(href).ok(),
        }
    }
}

/// Extract program records from one page of raw HTML.
///
/// Never fails: malformed input at worst yields an empty list.
pub fn extract_programs(html: &str, url: &str) -> Vec<ProgramRecord> {
    extract_programs_at(html, url, Local::now().date_naive())
}

/// Like [`extract_programs`] with an explicit "today", so relative-date
/// reinterpretation is deterministic under test.
pub fn extract_programs_at(html: &str, url: &str, today: NaiveDate) -> Vec<ProgramRecord> {
    if html.is_empty() {
        return Vec::new();
    }
    let doc = Html::parse_document(html);
    let ctx = PageContext::new(url, today);

    let mut candidates = jsonld::extract(&doc, &ctx);
    candidates.extend(microdata::extract(&doc, &ctx));
    if candidates.len() < LIST_SCAN_THRESHOLD {
        candidates.extend(lists::extract(&doc, &ctx));
    }
    if candidates.is_empty() {
        candidates.extend(fallback::extract(&doc, &ctx));
    }

    let records = candidates.into_iter().map(|c| normalize(c, url)).collect();
    let mut records = dedupe(records);
    records.truncate(MAX_RECORDS);
    records
}

/// Normalization pass, applied to every candidate regardless of which
/// extractor produced it.
fn normalize(c: Candidate, page_url: &str) -> ProgramRecord {
    let title = c
        .title
        .as_deref()
        .and_then(clean_opt)
        .unwrap_or_else(|| TITLE_PLACEHOLDER.to_string());
    let description = c.description.as_deref().and_then(clean_opt);
    let url = c
        .url
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| page_url.to_string());
    let currency = c.currency.as_deref().and_then(normalize_currency);
    let mode = classify_mode(c.mode.as_deref().unwrap_or(""));
    let kind = c.kind.unwrap_or_else(|| {
        classify_kind(&format!("{} {}", title, description.as_deref().unwrap_or("")))
    });

    ProgramRecord {
        title,
        description,
        url,
        price: c.price,
        currency,
        start_date: c.start_date,
        end_date: c.end_date,
        mode,
        venue: c.venue,
        city: c.city,
        country: c.country,
        kind,
    }
}

/// Drop records sharing a (lowercased title, lowercased url) key,
/// keeping the first seen.
fn dedupe(records: Vec<ProgramRecord>) -> Vec<ProgramRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert((r.title.trim().to_lowercase(), r.url.trim().to_lowercase())))
        .collect()
}

/// All text content of an element, space-joined.
pub(crate) fn element_text(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

// ── Tests ──
