pub mod classify;
pub mod currency;
pub mod dates;
pub mod price;

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collapse whitespace runs to single spaces and trim.
pub fn clean_text(x: &str) -> String {
    WHITESPACE_RE.replace_all(x, " ").trim().to_string()
}

/// [`clean_text`] that drops empty results.
pub fn clean_opt(x: &str) -> Option<String> {
    let cleaned = clean_text(x);
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_runs() {
        assert_eq!(clean_text("  a \n\t b  c "), "a b c");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn clean_opt_drops_blank() {
        assert_eq!(clean_opt("  \n "), None);
        assert_eq!(clean_opt(" x "), Some("x".to_string()));
    }
}
