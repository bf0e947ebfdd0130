//! Last-resort single-record extraction from page-level metadata.
//!
//! Runs only when every other extractor produced nothing. The whole
//! page must still look educational or nothing is emitted.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{element_text, Candidate, PageContext};
use crate::normalize::classify::{classify_kind, looks_educational};
use crate::normalize::dates::parse_date;
use crate::normalize::price::extract_prices;
use crate::normalize::{clean_opt, clean_text};

static OG_TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static TW_TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="twitter:title"]"#).unwrap());
static OG_DESC_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static TW_DESC_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="twitter:description"]"#).unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2}-\d{2}-\d{2})\b").unwrap());

pub fn extract(doc: &Html, ctx: &PageContext) -> Vec<Candidate> {
    let text = clean_text(&element_text(doc.root_element()));
    if !looks_educational(&text) {
        return Vec::new();
    }

    let page_title = doc
        .select(&TITLE_SEL)
        .next()
        .and_then(|t| clean_opt(&element_text(t)));
    let title = meta_content(doc, &OG_TITLE_SEL)
        .or_else(|| meta_content(doc, &TW_TITLE_SEL))
        .or(page_title);
    let description =
        meta_content(doc, &OG_DESC_SEL).or_else(|| meta_content(doc, &TW_DESC_SEL));

    let (price, currency) = match extract_prices(&text).into_iter().next() {
        Some((price, currency)) => (Some(price), currency),
        None => (None, None),
    };
    let start_date = ISO_DATE_RE
        .captures(&text)
        .and_then(|caps| parse_date(&caps[1], ctx.today));
    let mode = text.to_lowercase().contains("online").then(|| "Online".to_string());

    vec![Candidate {
        title,
        description,
        url: Some(ctx.page_url.to_string()),
        price,
        currency,
        start_date,
        mode,
        kind: Some(classify_kind(&text)),
        ..Default::default()
    }]
}

fn meta_content(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .and_then(clean_opt)
}
