use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Known document/file extensions. Longest variant first so ".docx" is not
/// reported as ".doc". Substring match tolerates trailing query strings.
pub const DOC_EXTS: &[&str] = &[
    ".pdf", ".docx", ".doc", ".xlsx", ".xls", ".pptx", ".ppt", ".txt", ".csv", ".rtf",
];

const META_TIMEOUT: Duration = Duration::from_secs(12);

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static META_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<meta\b[^>]*>").unwrap());
static CONTENT_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)content\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap());
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Descriptive page metadata for human review. All fields display-capped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub og_title: String,
    pub description: String,
}

pub fn detect_file_ext(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    DOC_EXTS.iter().find(|ext| lower.contains(*ext)).copied()
}

/// Best-effort metadata fetch: title / og:title / meta description. Never
/// raises; every failure path degrades to empty fields. File URLs are
/// skipped without any network request.
pub async fn fetch_page_meta(client: &reqwest::Client, url: &str) -> PageMeta {
    let url = url.trim();
    if url.is_empty() || !(url.starts_with("http://") || url.starts_with("https://")) {
        return PageMeta::default();
    }
    if detect_file_ext(url).is_some() {
        return PageMeta::default();
    }

    let resp = match client.get(url).timeout(META_TIMEOUT).send().await {
        Ok(r) => r,
        Err(_) => return PageMeta::default(),
    };
    if !resp.status().is_success() {
        return PageMeta::default();
    }
    let body = match resp.text().await {
        Ok(b) => b,
        Err(_) => return PageMeta::default(),
    };

    extract_meta(&body)
}

/// Pull the three display fields out of an HTML body.
pub fn extract_meta(html: &str) -> PageMeta {
    let title = TITLE_RE
        .captures(html)
        .map(|c| collapse_ws(&decode_entities(&c[1])))
        .unwrap_or_default();
    let og_title = meta_content(html, "property", "og:title").unwrap_or_default();
    let description = meta_content(html, "name", "description").unwrap_or_default();

    PageMeta {
        title: truncate_chars(&title, 200),
        og_title: truncate_chars(&og_title, 200),
        description: truncate_chars(&description, 300),
    }
}

/// Content attribute of the first <meta> tag carrying key="value",
/// tolerant of attribute order and quote style.
fn meta_content(html: &str, key: &str, value: &str) -> Option<String> {
    let wanted = [
        format!("{key}=\"{value}\""),
        format!("{key}='{value}'"),
    ];
    for m in META_TAG_RE.find_iter(html) {
        let tag = m.as_str();
        let lower = tag.to_lowercase();
        if !wanted.iter().any(|w| lower.contains(w.as_str())) {
            continue;
        }
        if let Some(caps) = CONTENT_ATTR_RE.captures(tag) {
            let content = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|g| g.as_str())
                .unwrap_or("");
            return Some(decode_entities(content.trim()));
        }
    }
    None
}

/// Flatten an HTML body to whitespace-normalized text, the input handed to
/// the content-match judgment.
pub fn html_to_text(html: &str) -> String {
    let no_script = SCRIPT_RE.replace_all(html, " ");
    let no_style = STYLE_RE.replace_all(&no_script, " ");
    let no_tags = TAG_RE.replace_all(&no_style, " ");
    collapse_ws(&decode_entities(&no_tags))
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn collapse_ws(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ext_detection() {
        assert_eq!(detect_file_ext("http://a.com/r.pdf"), Some(".pdf"));
        assert_eq!(detect_file_ext("http://a.com/R.PDF"), Some(".pdf"));
        assert_eq!(detect_file_ext("http://a.com/dl?file=report.pdf&v=2"), Some(".pdf"));
        assert_eq!(detect_file_ext("http://a.com/r.docx"), Some(".docx"));
        assert_eq!(detect_file_ext("http://a.com/page"), None);
    }

    #[test]
    fn extracts_title_and_meta_tags() {
        let html = r#"<html><head>
            <title> 환경부  보도자료 </title>
            <meta content="탄소중립 보고서" property="og:title">
            <meta name='description' content='2023년 탄소중립 추진 현황입니다.'>
        </head><body>본문</body></html>"#;
        let meta = extract_meta(html);
        assert_eq!(meta.title, "환경부 보도자료");
        assert_eq!(meta.og_title, "탄소중립 보고서");
        assert_eq!(meta.description, "2023년 탄소중립 추진 현황입니다.");
    }

    #[test]
    fn missing_tags_stay_empty() {
        let meta = extract_meta("<html><body>no head</body></html>");
        assert_eq!(meta, PageMeta::default());
    }

    #[test]
    fn display_caps_are_character_based() {
        let long = "가".repeat(500);
        let html = format!("<title>{long}</title>");
        let meta = extract_meta(&html);
        assert_eq!(meta.title.chars().count(), 200);
    }

    #[test]
    fn html_to_text_strips_scripts_and_tags() {
        let html = "<html><script>var x = 1;</script><style>p{}</style>\
                    <p>첫 번째 &amp; 두 번째</p><div>문단</div></html>";
        assert_eq!(html_to_text(html), "첫 번째 & 두 번째 문단");
    }

    #[test]
    fn truncate_handles_short_input() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }
}
