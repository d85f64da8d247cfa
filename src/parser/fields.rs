use std::sync::LazyLock;

use regex::Regex;

/// Label prefixing the retrieval-date part of an entry ("검색일: yyyy.m.d.").
pub const SEARCH_DATE_KEYWORD: &str = "검색일";

static HTTP_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s+http").unwrap());
static DATE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s+검색일").unwrap());
static QUOTED_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.+?),\s*“(.*)”").unwrap());

/// The four ordered fields of one citation entry. Slots that could not be
/// extracted stay empty; the needs-review sentinel is applied at record
/// assembly so the URL verifier can still tell a missing URL apart from a
/// malformed one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    pub attribution: String,
    pub title: String,
    pub source_url: String,
    pub retrieval_marker: String,
}

/// Decompose one raw entry line. Two-stage split: document part vs retrieval
/// part first, then each part on its own. Pure function, never fails.
pub fn parse(entry: &str) -> ParsedFields {
    let mut fields = ParsedFields::default();

    // Presence of "http" anywhere selects the split pattern.
    let (doc_part, ref_part) = if entry.contains("http") {
        split_before(entry, &HTTP_SPLIT_RE, "http")
    } else {
        split_before(entry, &DATE_SPLIT_RE, SEARCH_DATE_KEYWORD)
    }
    .unwrap_or((entry, ""));

    // Document part: attribution before the comma preceding a curly-quoted
    // title; the title keeps its quote marks.
    if doc_part.contains('“') && doc_part.contains('”') {
        if let Some(caps) = QUOTED_TITLE_RE.captures(doc_part) {
            fields.attribution = caps[1].trim().to_string();
            fields.title = format!("“{}”", &caps[2]);
        } else {
            fields.attribution = doc_part.trim().to_string();
        }
    } else {
        fields.attribution = doc_part.trim().to_string();
    }

    // Retrieval part: URL before the retrieval-date keyword, if any.
    if ref_part.contains("http") {
        if let Some((url, marker)) = split_before(ref_part, &DATE_SPLIT_RE, SEARCH_DATE_KEYWORD) {
            fields.source_url = url.trim().to_string();
            fields.retrieval_marker = marker.trim().to_string();
        } else {
            fields.source_url = ref_part.trim().to_string();
        }
    } else {
        fields.retrieval_marker = ref_part.trim().to_string();
    }

    fields
}

/// Split at the first ",<ws>" immediately followed by `token`, keeping the
/// token in the second piece. The regex crate has no lookahead, so the match
/// end is rewound by the token length.
fn split_before<'a>(text: &'a str, re: &Regex, token: &str) -> Option<(&'a str, &'a str)> {
    let m = re.find(text)?;
    Some((&text[..m.start()], &text[m.end() - token.len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_entry() {
        let entry = "환경부, “2023년 탄소중립 보고서,” http://example.com/report, 검색일: 2023.5.1";
        let fields = parse(entry);
        assert_eq!(fields.attribution, "환경부");
        assert_eq!(fields.title, "“2023년 탄소중립 보고서,”");
        assert_eq!(fields.source_url, "http://example.com/report");
        assert_eq!(fields.retrieval_marker, "검색일: 2023.5.1");
    }

    #[test]
    fn no_url() {
        let fields = parse("환경부, 검색일: 2023.5.1");
        assert_eq!(fields.attribution, "환경부");
        assert!(fields.title.is_empty());
        assert!(fields.source_url.is_empty());
        assert_eq!(fields.retrieval_marker, "검색일: 2023.5.1");
    }

    #[test]
    fn no_split_token_at_all() {
        let fields = parse("환경부 보도자료");
        assert_eq!(fields.attribution, "환경부 보도자료");
        assert!(fields.title.is_empty());
        assert!(fields.source_url.is_empty());
        assert!(fields.retrieval_marker.is_empty());
    }

    #[test]
    fn http_takes_priority_over_date_keyword() {
        // "검색일" appears before the URL; the split must still happen at http.
        let fields = parse("기관, 검색일 안내문, https://example.org");
        assert_eq!(fields.attribution, "기관, 검색일 안내문");
        assert_eq!(fields.source_url, "https://example.org");
        assert!(fields.retrieval_marker.is_empty());
    }

    #[test]
    fn unquoted_title_folds_into_attribution() {
        let fields = parse("환경부, 탄소중립 보고서, http://example.com, 검색일: 2023.5.1");
        assert_eq!(fields.attribution, "환경부, 탄소중립 보고서");
        assert!(fields.title.is_empty());
        assert_eq!(fields.source_url, "http://example.com");
    }

    #[test]
    fn url_without_retrieval_date() {
        let fields = parse("환경부, “보고서,” http://example.com/report");
        assert_eq!(fields.source_url, "http://example.com/report");
        assert!(fields.retrieval_marker.is_empty());
    }

    #[test]
    fn empty_entry() {
        assert_eq!(parse(""), ParsedFields::default());
    }

    #[test]
    fn parse_is_idempotent() {
        let entry = "환경부, “보고서,” http://example.com, 검색일: 2023.5.1";
        assert_eq!(parse(entry), parse(entry));
    }
}
