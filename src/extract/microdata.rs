//! Microdata extraction from itemscope/itemprop annotations.

use std::sync::LazyLock;

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{element_text, Candidate, PageContext};
use crate::normalize::classify::classify_kind;
use crate::normalize::clean_opt;
use crate::normalize::dates::parse_date;

static ITEM_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[itemscope][itemtype]").unwrap());

static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"[itemprop="name"]"#).unwrap());
static DESC_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="description"]"#).unwrap());
static URL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"[itemprop="url"]"#).unwrap());
static START_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="startDate"]"#).unwrap());
static END_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="endDate"]"#).unwrap());
static PRICE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="price"]"#).unwrap());
static CURRENCY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="priceCurrency"]"#).unwrap());
static VENUE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[itemprop="location"] [itemprop="name"], [itemprop="organizer"] [itemprop="name"]"#)
        .unwrap()
});
static CITY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="addressLocality"]"#).unwrap());
static COUNTRY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="addressCountry"]"#).unwrap());

/// Item types worth scanning. Matched as substrings of the itemtype URL.
const TYPE_HINTS: &[&str] = &["course", "event", "education"];

pub fn extract(doc: &Html, ctx: &PageContext) -> Vec<Candidate> {
    let mut out = Vec::new();
    for item in doc.select(&ITEM_SELECTOR) {
        let itemtype = item.value().attr("itemtype").unwrap_or("").to_lowercase();
        if !TYPE_HINTS.iter().any(|k| itemtype.contains(k)) {
            continue;
        }
        out.push(candidate_from_item(item, &itemtype, ctx));
    }
    out
}

fn candidate_from_item(item: ElementRef, itemtype: &str, ctx: &PageContext) -> Candidate {
    let url = item
        .select(&URL_SEL)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(clean_opt)
        .map(|href| resolve_item_url(&href, ctx))
        .unwrap_or_else(|| ctx.page_url.to_string());

    // Malformed price text means no price, not a failure.
    let price = prop_text(item, &PRICE_SEL).and_then(|p| p.parse::<f64>().ok());

    Candidate {
        title: prop_text(item, &NAME_SEL),
        description: prop_text(item, &DESC_SEL),
        url: Some(url),
        price,
        currency: prop_text(item, &CURRENCY_SEL),
        start_date: prop_date(item, &START_SEL, ctx),
        end_date: prop_date(item, &END_SEL, ctx),
        venue: prop_text(item, &VENUE_SEL),
        city: prop_text(item, &CITY_SEL),
        country: prop_text(item, &COUNTRY_SEL),
        kind: Some(classify_kind(itemtype)),
        ..Default::default()
    }
}

fn prop_text(item: ElementRef, sel: &Selector) -> Option<String> {
    let el = item.select(sel).next()?;
    clean_opt(&element_text(el))
}

/// Date properties prefer the machine-readable `content` attribute over
/// the element text.
fn prop_date(item: ElementRef, sel: &Selector, ctx: &PageContext) -> Option<NaiveDate> {
    let el = item.select(sel).next()?;
    el.value()
        .attr("content")
        .and_then(|c| parse_date(c, ctx.today))
        .or_else(|| parse_date(&element_text(el), ctx.today))
}

/// Absolute URLs pass through; anything without a host is resolved
/// against the page URL.
fn resolve_item_url(href: &str, ctx: &PageContext) -> String {
    let is_absolute = Url::parse(href).map(|u| u.has_host()).unwrap_or(false);
    if is_absolute {
        href.to_string()
    } else {
        ctx.resolve(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|| href.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx(url: &str) -> PageContext<'_> {
        PageContext {
            page_url: url,
            today: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            base: Url::parse(url).ok(),
        }
    }

    #[test]
    fn course_item_with_content_dates() {
        let html = r#"<div itemscope itemtype="https://schema.org/Course">
            <h2 itemprop="name">Robotics for Teens</h2>
            <p itemprop="description">Build and program robots.</p>
            <a itemprop="url" href="/courses/robotics">Details</a>
            <time itemprop="startDate" content="2025-07-01">July 1</time>
            <span itemprop="price">89.50</span>
            <span itemprop="priceCurrency">AUD</span>
          </div>"#;
        let doc = Html::parse_document(html);
        let out = extract(&doc, &ctx("https://e.com/catalog"));
        assert_eq!(out.len(), 1);

        let c = &out[0];
        assert_eq!(c.title.as_deref(), Some("Robotics for Teens"));
        assert_eq!(c.url.as_deref(), Some("https://e.com/courses/robotics"));
        assert_eq!(c.start_date, NaiveDate::from_ymd_opt(2025, 7, 1));
        assert_eq!(c.price, Some(89.5));
        assert_eq!(c.kind, Some(crate::normalize::classify::ProgramKind::Course));
    }

    #[test]
    fn date_falls_back_to_element_text() {
        let html = r#"<div itemscope itemtype="https://schema.org/EducationEvent">
            <span itemprop="name">Study Skills Night</span>
            <span itemprop="startDate">2025-09-03</span>
          </div>"#;
        let doc = Html::parse_document(html);
        let out = extract(&doc, &ctx("https://e.com/"));
        assert_eq!(out[0].start_date, NaiveDate::from_ymd_opt(2025, 9, 3));
    }

    #[test]
    fn unrelated_item_types_are_ignored() {
        let html = r#"<div itemscope itemtype="https://schema.org/Product">
            <span itemprop="name">Desk lamp</span>
          </div>"#;
        let doc = Html::parse_document(html);
        assert!(extract(&doc, &ctx("https://e.com/")).is_empty());
    }

    #[test]
    fn nested_location_name_becomes_venue() {
        let html = r#"<div itemscope itemtype="https://schema.org/EducationEvent">
            <span itemprop="name">Parent Info Evening</span>
            <div itemprop="location" itemscope itemtype="https://schema.org/Place">
              <span itemprop="name">Riverside Library</span>
              <span itemprop="addressLocality">Geelong</span>
              <span itemprop="addressCountry">Australia</span>
            </div>
          </div>"#;
        let doc = Html::parse_document(html);
        let out = extract(&doc, &ctx("https://e.com/"));
        // The nested Place item is itself scanned but carries no hint type.
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.venue.as_deref(), Some("Riverside Library"));
        assert_eq!(c.city.as_deref(), Some("Geelong"));
        assert_eq!(c.country.as_deref(), Some("Australia"));
    }

    #[test]
    fn malformed_price_text_is_absent_price() {
        let html = r#"<div itemscope itemtype="https://schema.org/Course">
            <span itemprop="name">Free Coding Club</span>
            <span itemprop="price">Free!</span>
          </div>"#;
        let doc = Html::parse_document(html);
        assert_eq!(extract(&doc, &ctx("https://e.com/"))[0].price, None);
    }
}
