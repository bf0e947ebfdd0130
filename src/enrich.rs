//! Post-extraction enrichment: relevance gating, geography matching,
//! USD conversion, and backfill of fields the extractor left open.

use std::sync::LazyLock;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::extract::ProgramRecord;
use crate::normalize::classify::{classify_kind, Mode, ProgramKind};
use crate::normalize::{clean_opt, clean_text};
use crate::search::SearchFilters;

/// Fixed conversion table, relative to USD.
const EXCHANGE_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("AUD", 0.65),
    ("GBP", 1.25),
    ("EUR", 1.08),
    ("INR", 0.012),
];

/// Title length cap when backfilling from search-hit titles.
const MAX_TITLE_CHARS: usize = 140;
/// Relevance text cap per page.
const MAX_TEXT_CHARS: usize = 200_000;

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

/// Convert a price to USD via the fixed table. Unknown currencies give
/// no conversion rather than a guess.
pub fn usd_price(price: Option<f64>, currency: Option<&str>) -> Option<f64> {
    let price = price?;
    let currency = currency?.to_uppercase();
    let rate = EXCHANGE_RATES
        .iter()
        .find(|(code, _)| *code == currency)
        .map(|(_, rate)| *rate)?;
    let usd = EXCHANGE_RATES[0].1;
    Some(price * (usd / rate))
}

/// Country/region substring match over combined page text. "Any" country
/// always passes; an "Any" region requires only the country to appear.
pub fn matches_location(combined: &str, country: &str, region: &str) -> bool {
    if country == "Any" {
        return true;
    }
    let text = combined.to_lowercase();
    let c = country.to_lowercase();
    if region == "Any" {
        return text.contains(&c);
    }
    text.contains(&c) || text.contains(&region.to_lowercase())
}

/// Backfill pass applied to each record after extraction, before
/// persistence. Returns the USD conversion of the record's price.
///
/// Title fallback chain: extractor → search-hit title → page `<title>`
/// → placeholder.
pub fn enrich_record(
    record: &mut ProgramRecord,
    combined: &str,
    hit_title: &str,
    page_title: Option<&str>,
    filters: &SearchFilters,
) -> Option<f64> {
    if record.title.is_empty() || record.title == "Program" {
        let fallback = if !hit_title.is_empty() {
            hit_title
        } else {
            page_title.unwrap_or("Program")
        };
        record.title = fallback.chars().take(MAX_TITLE_CHARS).collect();
    }
    if record.kind == ProgramKind::Other {
        record.kind = classify_kind(combined);
    }
    if record.mode == Mode::Unknown && combined.to_lowercase().contains("online") {
        record.mode = Mode::Online;
    }
    if record.country.is_none() && filters.country != "Any" {
        record.country = Some(filters.country.clone());
    }
    if record.city.is_none() && filters.region != "Any" {
        record.city = Some(filters.region.clone());
    }
    usd_price(record.price, record.currency.as_deref())
}

/// Readable page text for relevance checks and previews; script, style
/// and noscript content is dropped.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut parts = Vec::new();
    collect_text(doc.root_element(), &mut parts);
    let text = clean_text(&parts.join(" "));
    if text.chars().count() > MAX_TEXT_CHARS {
        text.chars().take(MAX_TEXT_CHARS).collect()
    } else {
        text
    }
}

fn collect_text(el: ElementRef, out: &mut Vec<String>) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push(text.to_string()),
            Node::Element(data) => {
                if matches!(data.name(), "script" | "style" | "noscript") {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

/// The page's `<title>` text, if any.
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let title = doc.select(&TITLE_SEL).next()?;
    clean_opt(&title.text().collect::<String>())
}
