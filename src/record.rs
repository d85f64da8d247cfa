use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Sentinel placed in any record field that could not be confidently
/// extracted, so reviewers can tell "absent" from "not yet checked".
pub const NEEDS_REVIEW: &str = "확인필요";

/// URL reachability classification. `OkTlsWarning` means the page answered
/// only after certificate validation was disabled on retry; it is never
/// merged with plain `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlStatus {
    Ok,
    OkTlsWarning,
    Error,
    Unknown,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Ok => "정상",
            UrlStatus::OkTlsWarning => "정상(보안주의)",
            UrlStatus::Error => "오류",
            UrlStatus::Unknown => "확인불가",
        }
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrlStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "정상" => Ok(UrlStatus::Ok),
            "정상(보안주의)" => Ok(UrlStatus::OkTlsWarning),
            "오류" => Ok(UrlStatus::Error),
            "확인불가" => Ok(UrlStatus::Unknown),
            other => anyhow::bail!(
                "알 수 없는 상태 '{}': 정상, 정상(보안주의), 오류, 확인불가 중 하나여야 합니다",
                other
            ),
        }
    }
}

/// One verified citation entry. Field order follows the export column order
/// consumed by the spreadsheet collaborator; serialized names keep the
/// operator-facing column labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    #[serde(rename = "최종_URL_상태")]
    pub final_status: String,
    #[serde(rename = "최종_URL_메모")]
    pub final_memo: String,
    #[serde(rename = "URL_수정안")]
    pub redirect_url: String,
    #[serde(rename = "작성기관_작성자")]
    pub attribution: String,
    #[serde(rename = "제목")]
    pub title: String,
    #[serde(rename = "URL_보고서기준")]
    pub source_url: String,
    #[serde(rename = "search_date")]
    pub search_date: String,
    #[serde(rename = "원문")]
    pub original: String,
    #[serde(rename = "참고문헌_작성양식_체크(규칙기반)")]
    pub rule_format_note: String,
    #[serde(rename = "참고문헌_작성양식_체크(GPT기반)")]
    pub judge_format_note: String,
    #[serde(rename = "URL_내용일치여부(GPT)")]
    pub content_match: String,
    #[serde(rename = "페이지_title")]
    pub page_title: String,
    #[serde(rename = "페이지_og_title")]
    pub page_og_title: String,
    #[serde(rename = "페이지_description")]
    pub page_description: String,
    #[serde(rename = "파일_여부")]
    pub file_flag: String,
    #[serde(rename = "파일_확장자")]
    pub file_ext: String,
    #[serde(rename = "URL_상태")]
    pub url_status: String,
    #[serde(rename = "URL_메모")]
    pub url_memo: String,
    #[serde(rename = "URL_상태코드")]
    pub status_code: Option<u16>,
    #[serde(rename = "URL_수동검증_결과")]
    pub manual_status: String,
    #[serde(rename = "수동검증_메모")]
    pub manual_memo: String,
}

/// Manual verdict from the human-review collaborator.
#[derive(Debug, Clone, Default)]
pub struct ManualOverride {
    pub status: Option<UrlStatus>,
    pub memo: Option<String>,
}

/// Merge a manual verdict into a record. A manual field wins only when
/// non-empty; parsed and probed fields are never touched.
pub fn apply_override(record: &mut Record, ov: &ManualOverride) {
    if let Some(status) = ov.status {
        record.manual_status = status.to_string();
    }
    if let Some(memo) = &ov.memo {
        let memo = memo.trim();
        if !memo.is_empty() {
            record.manual_memo = memo.to_string();
        }
    }

    record.final_status = if record.manual_status.is_empty() {
        record.url_status.clone()
    } else {
        record.manual_status.clone()
    };
    record.final_memo = if record.manual_memo.is_empty() {
        record.url_memo.clone()
    } else {
        record.manual_memo.clone()
    };
}

pub fn needs_review_if_empty(value: &str) -> String {
    let v = value.trim();
    if v.is_empty() || v == "NA" {
        NEEDS_REVIEW.to_string()
    } else {
        v.to_string()
    }
}
