//! Currency symbol/alias mapping.

/// Symbol and alias table. Keys are compared after trim + uppercase.
const CURRENCY_MAP: &[(&str, &str)] = &[
    ("$", "USD"),
    ("US$", "USD"),
    ("USD", "USD"),
    ("A$", "AUD"),
    ("AU$", "AUD"),
    ("AUD", "AUD"),
    ("£", "GBP"),
    ("GBP", "GBP"),
    ("€", "EUR"),
    ("EUR", "EUR"),
    ("INR", "INR"),
    ("₹", "INR"),
];

/// Map a raw currency token to its canonical code.
///
/// Tokens outside the table survive only when they already look like a
/// currency code (2-4 ASCII letters, kept uppercased); bare symbols and
/// other junk are dropped.
pub fn normalize_currency(raw: &str) -> Option<String> {
    let cur = raw.trim().to_uppercase();
    if cur.is_empty() {
        return None;
    }
    if let Some((_, code)) = CURRENCY_MAP.iter().find(|(alias, _)| *alias == cur) {
        return Some((*code).to_string());
    }
    let len = cur.chars().count();
    if (2..=4).contains(&len) && cur.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(cur)
    } else {
        None
    }
}
