use std::sync::LazyLock;

use regex::Regex;

static STRAIGHT_QUOTES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""[^"]*""#).unwrap());
static CURLY_QUOTES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"“[^”]*”").unwrap());

/// Rule-based format check: does the entry contain a properly paired quoted
/// title span, straight or curly? Purely syntactic.
pub fn has_quoted_title(entry: &str) -> bool {
    STRAIGHT_QUOTES_RE.is_match(entry) || CURLY_QUOTES_RE.is_match(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_quotes_pass() {
        assert!(has_quoted_title(r#"환경부, "보고서," http://example.com"#));
    }

    #[test]
    fn curly_quotes_pass() {
        assert!(has_quoted_title("환경부, “보고서,” http://example.com"));
    }

    #[test]
    fn missing_quotes_fail() {
        assert!(!has_quoted_title("환경부, 보고서, http://example.com"));
    }

    #[test]
    fn unpaired_quotes_fail() {
        assert!(!has_quoted_title("환경부, “보고서, http://example.com"));
        assert!(!has_quoted_title(r#"환경부, "보고서, http://example.com"#));
    }

    #[test]
    fn mismatched_styles_fail() {
        assert!(!has_quoted_title(r#"환경부, “보고서," http://example.com"#));
    }
}
