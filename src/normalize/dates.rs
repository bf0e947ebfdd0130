//! Free-form date parsing with forward-looking resolution of
//! year-omitted listings ("Starts March 3").

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use super::clean_text;

/// Formats that carry an explicit year. Dates parsed from these are
/// returned as-is, never reinterpreted.
const QUALIFIED_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %b %Y",
    "%d %b, %Y",
];

/// Year-omitted formats; the reference year gets appended before parsing.
const YEARLESS_FORMATS: &[&str] = &["%B %d", "%b %d", "%d %B", "%d %b"];

/// How far into the future a next-year reinterpretation may land and
/// still be trusted.
const REINTERPRET_WINDOW_DAYS: i64 = 400;

/// Parse a free-form date string into a calendar date, relative to
/// `today`.
///
/// A year-omitted date that lands in the past is retried as next year and
/// kept only when that puts it within [`REINTERPRET_WINDOW_DAYS`] of
/// `today`. Unparseable input yields `None`, never an error.
pub fn parse_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = clean_text(raw);
    if s.is_empty() {
        return None;
    }

    // Full timestamps first: "2024-01-15T09:00:00+02:00" and friends.
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }

    for fmt in QUALIFIED_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&s, fmt) {
            return Some(d);
        }
    }

    for fmt in YEARLESS_FORMATS {
        let pattern = format!("{fmt} %Y");
        let this_year = format!("{s} {}", today.year());
        let Ok(d) = NaiveDate::parse_from_str(&this_year, &pattern) else {
            continue;
        };
        if d < today {
            let next_year = format!("{s} {}", today.year() + 1);
            if let Ok(next) = NaiveDate::parse_from_str(&next_year, &pattern) {
                if (next - today).num_days() < REINTERPRET_WINDOW_DAYS {
                    return Some(next);
                }
            }
        }
        return Some(d);
    }

    None
}
