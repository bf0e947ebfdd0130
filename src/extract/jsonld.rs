//! Structured-data extraction from `application/ld+json` script blocks.

use std::sync::LazyLock;

use chrono::NaiveDate;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::{Candidate, PageContext};
use crate::normalize::classify::ProgramKind;
use crate::normalize::clean_opt;
use crate::normalize::currency::normalize_currency;
use crate::normalize::dates::parse_date;

static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Denylist of object types that are clearly not program listings.
/// Structured vocabularies vary too much for an allowlist.
const SKIP_TYPES: &[&str] = &["jobposting", "person", "organization", "faqpage", "article"];

pub fn extract(doc: &Html, ctx: &PageContext) -> Vec<Candidate> {
    let mut out = Vec::new();
    for script in doc.select(&SCRIPT_SELECTOR) {
        let raw = script.text().collect::<String>();
        let objects = match parse_block(&raw) {
            Ok(objects) => objects,
            Err(err) => {
                // Malformed blocks are common in the wild. Skip the
                // block, keep the rest of the page.
                debug!("skipping unparseable ld+json block: {err}");
                continue;
            }
        };
        for obj in &objects {
            out.extend(candidate_from_object(obj, ctx));
        }
    }
    out
}

/// Parse one script block into its top-level objects, flattening both
/// list containers and `@graph` wrappers.
fn parse_block(raw: &str) -> serde_json::Result<Vec<Value>> {
    let value: Value = serde_json::from_str(raw.trim())?;
    let objects = match value {
        Value::Array(items) => items.into_iter().filter(|v| v.is_object()).collect(),
        Value::Object(mut map) => match map.remove("@graph") {
            Some(Value::Array(graph)) => {
                graph.into_iter().filter(|v| v.is_object()).collect()
            }
            _ => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    };
    Ok(objects)
}

fn candidate_from_object(obj: &Value, ctx: &PageContext) -> Option<Candidate> {
    let tag = type_tag(obj);
    if SKIP_TYPES.iter().any(|k| tag.contains(k)) {
        return None;
    }
    if tag.contains("course") {
        course_candidate(obj, ctx)
    } else if tag.contains("event") {
        event_candidate(obj, ctx)
    } else if tag.contains("creativework") || tag.contains("learningresource") {
        generic_candidate(obj, ctx)
    } else {
        None
    }
}

/// `@type` lowered to a single comparable string ("learningresource,course"
/// for multi-typed objects).
fn type_tag(obj: &Value) -> String {
    match obj.get("@type") {
        Some(Value::String(s)) => s.to_lowercase(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(",")
            .to_lowercase(),
        _ => String::new(),
    }
}

fn course_candidate(obj: &Value, ctx: &PageContext) -> Option<Candidate> {
    let title = coerce_str(obj.get("name"));
    let description = coerce_str(obj.get("description"));
    if title.is_none() && description.is_none() {
        return None;
    }
    let url = coerce_str(obj.get("url"))
        .or_else(|| coerce_str(obj.get("mainEntityOfPage")))
        .unwrap_or_else(|| ctx.page_url.to_string());
    let (price, currency) = lowest_offer(obj.get("offers"));
    let provider = obj.get("provider").or_else(|| obj.get("organizer"));

    Some(Candidate {
        title,
        description,
        url: Some(url),
        price,
        currency,
        start_date: date_field(obj, "startDate", ctx),
        end_date: date_field(obj, "endDate", ctx),
        mode: coerce_str(obj.get("courseMode")),
        venue: provider.and_then(entity_name),
        kind: Some(ProgramKind::Course),
        ..Default::default()
    })
}

fn event_candidate(obj: &Value, ctx: &PageContext) -> Option<Candidate> {
    let title = coerce_str(obj.get("name"));
    let description = coerce_str(obj.get("description"));
    if title.is_none() && description.is_none() {
        return None;
    }
    let url = coerce_str(obj.get("url")).unwrap_or_else(|| ctx.page_url.to_string());
    let (price, currency) = lowest_offer(obj.get("offers"));
    let location = obj.get("location");
    let address = location.and_then(|l| l.get("address"));

    Some(Candidate {
        title,
        description,
        url: Some(url),
        price,
        currency,
        start_date: date_field(obj, "startDate", ctx),
        end_date: date_field(obj, "endDate", ctx),
        mode: coerce_str(obj.get("eventAttendanceMode")),
        venue: location.and_then(entity_name),
        city: address.and_then(|a| {
            coerce_str(a.get("addressLocality")).or_else(|| coerce_str(a.get("addressRegion")))
        }),
        country: address.and_then(|a| coerce_str(a.get("addressCountry"))),
        kind: Some(ProgramKind::Seminar),
        ..Default::default()
    })
}

/// CreativeWork/LearningResource objects carry too little to commit to a
/// kind; name/description/url only.
fn generic_candidate(obj: &Value, ctx: &PageContext) -> Option<Candidate> {
    let title = coerce_str(obj.get("name"));
    let description = coerce_str(obj.get("description"));
    if title.is_none() && description.is_none() {
        return None;
    }
    let url = coerce_str(obj.get("url")).unwrap_or_else(|| ctx.page_url.to_string());
    Some(Candidate {
        title,
        description,
        url: Some(url),
        ..Default::default()
    })
}

fn date_field(obj: &Value, key: &str, ctx: &PageContext) -> Option<NaiveDate> {
    coerce_str(obj.get(key)).and_then(|s| parse_date(&s, ctx.today))
}

/// Lowest price across one-or-many offers, paired with that offer's
/// currency.
fn lowest_offer(offers: Option<&Value>) -> (Option<f64>, Option<String>) {
    let Some(offers) = offers else {
        return (None, None);
    };
    let items: Vec<&Value> = match offers {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut best: Option<(f64, Option<String>)> = None;
    for item in items {
        let Some(price) = offer_price(item) else {
            continue;
        };
        if best.as_ref().is_some_and(|(b, _)| price >= *b) {
            continue;
        }
        let currency = item
            .get("priceCurrency")
            .and_then(|c| c.as_str())
            .and_then(normalize_currency);
        best = Some((price, currency));
    }
    match best {
        Some((price, currency)) => (Some(price), currency),
        None => (None, None),
    }
}

fn offer_price(offer: &Value) -> Option<f64> {
    match offer.get("price")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce a JSON value to cleaned display text. Arrays yield their first
/// usable element; objects their name or `@id`.
fn coerce_str(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => clean_opt(s),
        Value::Number(n) => clean_opt(&n.to_string()),
        Value::Array(items) => items.iter().find_map(|item| coerce_str(Some(item))),
        Value::Object(map) => coerce_str(map.get("name")).or_else(|| coerce_str(map.get("@id"))),
        _ => None,
    }
}

/// Display name of a provider/location entity (object or bare string).
fn entity_name(entity: &Value) -> Option<String> {
    match entity {
        Value::Object(map) => {
            coerce_str(map.get("name")).or_else(|| coerce_str(map.get("addressLocality")))
        }
        other => coerce_str(Some(other)),
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
            base: url::Url::parse(url).ok(),
        }
    }

    fn parse(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn course_with_offer_list_keeps_lowest_price() {
        let html = r#"<html><head><script type="application/ld+json">
        {"@context":"https://schema.org","@type":"Course",
         "name":"Statistics 101","description":"Intro stats",
         "provider":{"@type":"Organization","name":"Uni of Example"},
         "offers":[{"price":"350.00","priceCurrency":"AUD"},
                   {"price":120,"priceCurrency":"USD"}]}
        </script></head></html>"#;
        let c = &extract(&parse(html), &ctx("https://e.com/p"))[0];
        assert_eq!(c.price, Some(120.0));
        assert_eq!(c.currency.as_deref(), Some("USD"));
        assert_eq!(c.venue.as_deref(), Some("Uni of Example"));
        assert_eq!(c.kind, Some(ProgramKind::Course));
    }

    #[test]
    fn multi_type_learning_resource_course_is_a_course() {
        let html = r#"<script type="application/ld+json">
        {"@context":"https://schema.org","@type":["LearningResource","Course"],
         "name":"Open Algebra"}
        </script>"#;
        let out = extract(&parse(html), &ctx("https://e.com/p"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, Some(ProgramKind::Course));
    }

    #[test]
    fn denylisted_types_are_skipped() {
        let html = r#"<script type="application/ld+json">
        [{"@type":"JobPosting","name":"Tutor wanted"},
         {"@type":"Organization","name":"Acme"},
         {"@type":"FAQPage","name":"Questions"}]
        </script>"#;
        assert!(extract(&parse(html), &ctx("https://e.com/p")).is_empty());
    }

    #[test]
    fn stub_objects_without_name_or_description_are_dropped() {
        let html = r#"<script type="application/ld+json">
        {"@context":"https://schema.org","@type":"Course","url":"https://e.com/c"}
        </script>"#;
        assert!(extract(&parse(html), &ctx("https://e.com/p")).is_empty());
    }

    #[test]
    fn event_location_feeds_venue_city_country() {
        let html = r#"<script type="application/ld+json">
        {"@context":"https://schema.org","@type":"EducationEvent",
         "name":"STEM Evening Seminar",
         "eventAttendanceMode":"https://schema.org/OfflineEventAttendanceMode",
         "location":{"@type":"Place","name":"Town Hall",
            "address":{"addressLocality":"Bristol","addressCountry":"GB"}}}
        </script>"#;
        let c = &extract(&parse(html), &ctx("https://e.com/p"))[0];
        assert_eq!(c.venue.as_deref(), Some("Town Hall"));
        assert_eq!(c.city.as_deref(), Some("Bristol"));
        assert_eq!(c.country.as_deref(), Some("GB"));
        assert_eq!(c.kind, Some(ProgramKind::Seminar));
    }

    #[test]
    fn creative_work_yields_minimal_record() {
        let html = r#"<script type="application/ld+json">
        {"@context":"https://schema.org","@type":"CreativeWork",
         "name":"Maths Revision Pack"}
        </script>"#;
        let out = extract(&parse(html), &ctx("https://e.com/p"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, None);
        assert_eq!(out[0].url.as_deref(), Some("https://e.com/p"));
        assert!(out[0].price.is_none());
    }

    #[test]
    fn graph_container_is_flattened() {
        let html = r#"<script type="application/ld+json">
        {"@context":"https://schema.org","@graph":[
          {"@type":"WebSite","name":"ignored"},
          {"@type":"Course","name":"Graph Course","description":"d"}]}
        </script>"#;
        let out = extract(&parse(html), &ctx("https://e.com/p"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title.as_deref(), Some("Graph Course"));
    }

    #[test]
    fn broken_block_does_not_poison_siblings() {
        let html = r#"
        <script type="application/ld+json">{"@type": broken</script>
        <script type="application/ld+json">
        {"@context":"https://schema.org","@type":"Course","name":"Survivor"}
        </script>"#;
        let out = extract(&parse(html), &ctx("https://e.com/p"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title.as_deref(), Some("Survivor"));
    }
}
