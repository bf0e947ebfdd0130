//! Price pattern matching over free text.

use std::sync::LazyLock;

use regex::Regex;

use super::currency::normalize_currency;

/// Currency markers accepted before an amount (symbols and codes).
const CURR: &str = r"USD|AUD|EUR|GBP|INR|US\$|AU\$|A\$|\$|£|€|₹";
/// Bare codes accepted after an amount.
const CODE: &str = r"USD|AUD|EUR|GBP|INR";
/// Decimal amount with optional thousand separators.
const AMOUNT: &str = r"(?:\d{1,3}(?:,\d{3})*|\d+)(?:\.\d{1,2})?";

/// Single prices and ranges: `$100`, `1,299.50 USD`, `$100–150`,
/// `100 to 150 USD`, `€50 and €80`. The range alternative is tried
/// first so `100 to 150` is one match, not two.
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?i)(?P<curr>{CURR})?\s*(?P<amt1>{AMOUNT})\s*(?:to|–|-|—|and)\s*(?:(?P<curr_range>{CURR})?\s*)(?P<amt2>{AMOUNT})?\s*(?P<curr2>{CODE})?|(?P<curr_solo>{CURR})?\s*(?P<amt_solo>{AMOUNT})\s*(?P<curr2_solo>{CODE})?"
    );
    Regex::new(&pattern).unwrap()
});

/// Currency capture groups in priority order: the first non-empty one
/// wins, even for ambiguous multi-currency ranges ("$100 to €150" is
/// USD). Documented first-match-wins behavior.
const CURRENCY_GROUPS: &[&str] = &["curr", "curr_range", "curr2", "curr_solo", "curr2_solo"];

/// All price matches in `text`, in first-match order.
///
/// A range keeps its first amount as the canonical value. Amounts that
/// fail to parse as decimals are skipped silently.
pub fn extract_prices(text: &str) -> Vec<(f64, Option<String>)> {
    let mut out = Vec::new();
    for caps in PRICE_RE.captures_iter(text) {
        let Some(amount) = caps.name("amt1").or_else(|| caps.name("amt_solo")) else {
            continue;
        };
        let Ok(value) = amount.as_str().replace(',', "").parse::<f64>() else {
            continue;
        };
        let currency = CURRENCY_GROUPS
            .iter()
            .find_map(|&group| caps.name(group).map(|m| m.as_str()))
            .and_then(normalize_currency);
        out.push((value, currency));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(text: &str) -> (f64, Option<String>) {
        extract_prices(text).into_iter().next().expect("no price match")
    }

    #[test]
    fn single_price_with_symbol() {
        assert_eq!(first("Enrol now for $250!"), (250.0, Some("USD".into())));
        assert_eq!(first("Fee: £1,299.50 per term"), (1299.5, Some("GBP".into())));
    }

    #[test]
    fn range_keeps_lower_bound() {
        assert_eq!(first("100 to 150 USD"), (100.0, Some("USD".into())));
        assert_eq!(first("$100–150"), (100.0, Some("USD".into())));
        assert_eq!(first("€50 and €80"), (50.0, Some("EUR".into())));
    }

    #[test]
    fn ambiguous_range_currency_is_first_group() {
        assert_eq!(first("$100 to €150"), (100.0, Some("USD".into())));
    }

    #[test]
    fn trailing_code_on_solo_amount() {
        assert_eq!(first("Costs 4500 INR total"), (4500.0, Some("INR".into())));
    }

    #[test]
    fn bare_number_has_no_currency() {
        assert_eq!(first("Only 12 seats left"), (12.0, None));
    }

    #[test]
    fn matches_come_in_text_order() {
        let prices = extract_prices("Basic $99, premium $199.");
        assert_eq!(prices[0], (99.0, Some("USD".into())));
        assert_eq!(prices[1], (199.0, Some("USD".into())));
    }

    #[test]
    fn no_amount_no_match() {
        assert!(extract_prices("completely free of charge").is_empty());
    }
}
