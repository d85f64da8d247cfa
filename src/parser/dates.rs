use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::fields::SEARCH_DATE_KEYWORD;

// YYYY.M.D without leading-zero month/day, matching how entries are written.
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\.([1-9][0-9]?)\.([1-9][0-9]?)\b").unwrap());

/// Strip the retrieval-date label and validate the remainder. Returns the
/// stripped marker text when it contains a real calendar date, `None`
/// otherwise (caller substitutes the needs-review sentinel).
pub fn validate_retrieval_date(marker: &str) -> Option<String> {
    let stripped = strip_label(marker);
    let caps = DATE_RE.captures(stripped)?;

    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?;

    Some(stripped.to_string())
}

fn strip_label(marker: &str) -> &str {
    let trimmed = marker.trim();
    match trimmed.strip_prefix(SEARCH_DATE_KEYWORD) {
        Some(rest) => rest.trim_start_matches(':').trim(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_date() {
        assert_eq!(
            validate_retrieval_date("검색일: 2023.11.5").as_deref(),
            Some("2023.11.5")
        );
    }

    #[test]
    fn keeps_trailing_period() {
        assert_eq!(
            validate_retrieval_date("검색일: 2023.5.1.").as_deref(),
            Some("2023.5.1.")
        );
    }

    #[test]
    fn rejects_impossible_calendar_date() {
        // Day 30 is in range 1-31 but February has no 30th.
        assert_eq!(validate_retrieval_date("검색일: 2023.2.30"), None);
    }

    #[test]
    fn rejects_month_out_of_range() {
        assert_eq!(validate_retrieval_date("검색일: 2023.13.1"), None);
    }

    #[test]
    fn rejects_leading_zero_month() {
        assert_eq!(validate_retrieval_date("검색일: 2023.02.5"), None);
    }

    #[test]
    fn rejects_missing_or_garbled_marker() {
        assert_eq!(validate_retrieval_date(""), None);
        assert_eq!(validate_retrieval_date("검색일: 어제"), None);
        assert_eq!(validate_retrieval_date("확인필요"), None);
    }

    #[test]
    fn works_without_label() {
        assert_eq!(
            validate_retrieval_date("2023.11.5").as_deref(),
            Some("2023.11.5")
        );
    }
}
