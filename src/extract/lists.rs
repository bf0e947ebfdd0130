//! Heuristic extraction from repeating list/card/table structures.
//!
//! Only runs when the structured extractors came up short; cheap pages
//! rarely carry schema markup.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::{element_text, Candidate, PageContext};
use crate::normalize::classify::{classify_kind, looks_educational};
use crate::normalize::clean_text;
use crate::normalize::price::extract_prices;

/// List-like structures inside main/section-scoped regions.
static ITEM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "main li, main div.course-item, main div.event-card, \
         .course-list > div, .events-grid > *, section li, \
         ul.course-list > li, ol.course-list > li, table tr",
    )
    .unwrap()
});
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2, h3, h4, a").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static DESC_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p, div").unwrap());

/// Upper bound on candidate item scans per page.
const MAX_ITEMS: usize = 60;
/// A title must span more than one word to count.
const MIN_TITLE_WORDS: usize = 2;
/// A description must span more than five words to count.
const MIN_DESC_WORDS: usize = 6;

pub fn extract(doc: &Html, ctx: &PageContext) -> Vec<Candidate> {
    doc.select(&ITEM_SELECTOR)
        .take(MAX_ITEMS)
        .filter_map(|item| candidate_from_item(item, ctx))
        .collect()
}

fn candidate_from_item(item: ElementRef, ctx: &PageContext) -> Option<Candidate> {
    let title = item
        .select(&TITLE_SEL)
        .map(|el| clean_text(&element_text(el)))
        .find(|t| t.split_whitespace().count() >= MIN_TITLE_WORDS)?;

    let href = item.select(&LINK_SEL).next()?.value().attr("href")?;
    let url = ctx.resolve(href)?;
    if !url.has_host() || url.fragment().is_some_and(|f| !f.is_empty()) {
        return None;
    }

    let description = item
        .select(&DESC_SEL)
        .map(|el| clean_text(&element_text(el)))
        .find(|d| d.split_whitespace().count() >= MIN_DESC_WORDS);

    let combined = format!("{} {}", title, description.as_deref().unwrap_or(""));
    if !looks_educational(&combined) {
        return None;
    }

    let full_text = element_text(item);
    let (price, currency) = match extract_prices(&full_text).into_iter().next() {
        Some((price, currency)) => (Some(price), currency),
        None => (None, None),
    };
    let lower = full_text.to_lowercase();
    let mode = (lower.contains("online") || lower.contains("virtual")).then(|| "Online".to_string());

    Some(Candidate {
        title: Some(title),
        description,
        url: Some(url.to_string()),
        price,
        currency,
        mode,
        kind: Some(classify_kind(&combined)),
        ..Default::default()
    })
}
