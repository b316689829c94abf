//! Lexical helpers shared by history, scoring and the predictor

use regex::Regex;
use std::sync::OnceLock;

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+").expect("static word pattern"))
}

/// Lowercased word terms in order of appearance, duplicates kept
pub fn terms(text: &str) -> Vec<String> {
    word_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Normalized form used to compare query strings
pub fn normalize_query(text: &str) -> String {
    terms(text).join(" ")
}

/// Case-insensitive literal prefix check
pub fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.to_lowercase().starts_with(&prefix.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms() {
        assert_eq!(terms("Child  Nutrition, child!"), vec!["child", "nutrition", "child"]);
        assert!(terms("  ...  ").is_empty());
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Maternal   HEALTH policy "), "maternal health policy");
    }

    #[test]
    fn test_prefix() {
        assert!(starts_with_ignore_case("Maternal health", "mater"));
        assert!(!starts_with_ignore_case("health maternal", "mater"));
    }
}
