use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::warn;

use crate::meta::{detect_file_ext, html_to_text, truncate_chars};
use crate::verify::USER_AGENT;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-4o";

/// Page text handed to the content-match judgment is capped to bound cost.
pub const MAX_PAGE_CHARS: usize = 20_000;

const FORMAT_PROMPT: &str = "당신은 각 줄마다 아래 형식에 맞는 문헌 정보가 정확히 입력되었는지 검토합니다.\n\
    1. 출처\n\
    2. 제목: 반드시 큰따옴표(\" \")로 감쌈\n\
    3. URL\n\
    4. 검색일: \"검색일: yyyy.m.d.\" 형식\n\
    출력: JSON {\"오류여부\":\"X\"} 또는 {\"오류여부\":\"O(이유)\"}";

const MATCH_PROMPT: &str =
    "웹페이지 내용이 주어진 정보와 대체로 일치하면 '일치(유효)', 아니면 '불일치(오류)'만 출력하세요.";

/// Bounded retry applied around rate-limited oracle calls: sleep the
/// server-suggested delay (or the default) plus a fixed buffer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub default_delay: Duration,
    pub buffer: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            default_delay: Duration::from_secs(2),
            buffer: Duration::from_secs(2),
        }
    }

    pub fn delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.default_delay) + self.buffer
    }
}

pub const FORMAT_RETRY: RetryPolicy = RetryPolicy::new(5);
pub const MATCH_RETRY: RetryPolicy = RetryPolicy::new(3);

/// Citation-format judgment per the oracle's JSON contract:
/// `X` means no issue, `O(이유)` names one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatJudgment {
    Ok,
    Issue(String),
}

impl FormatJudgment {
    pub fn to_note(&self) -> String {
        match self {
            FormatJudgment::Ok => "X".to_string(),
            FormatJudgment::Issue(reason) => reason.clone(),
        }
    }
}

/// Content-match verdict for one cited page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentMatch {
    Matched,
    Mismatched,
    Unreachable,
    FileUnreadable,
    Unclassified(String),
}

impl ContentMatch {
    pub fn to_label(&self) -> String {
        match self {
            ContentMatch::Matched => "일치(유효)".to_string(),
            ContentMatch::Mismatched => "불일치(오류)".to_string(),
            ContentMatch::Unreachable => "확인불가".to_string(),
            ContentMatch::FileUnreadable => "파일(내용확인불가)".to_string(),
            ContentMatch::Unclassified(raw) => raw.clone(),
        }
    }
}

enum CallReply {
    Text(String),
    RateLimited(Option<Duration>),
}

enum PageText {
    Text(String),
    File,
    Unreachable,
}

/// Client for the external language-judgment service. Failure modes are
/// finite and classified; no transport error reaches the orchestrator.
pub struct JudgeClient {
    http: reqwest::Client,
    api_key: String,
}

impl JudgeClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(JudgeClient { http, api_key })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY가 설정되지 않았습니다. 환경변수에 추가해주세요.")?;
        JudgeClient::new(api_key)
    }

    /// Judge whether one entry follows the expected citation format.
    /// Rate limits are retried up to the policy cap; any other failure is
    /// converted immediately into an issue naming the failure kind.
    pub async fn judge_format(&self, doc: &str) -> FormatJudgment {
        let body = json!({
            "model": MODEL,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": FORMAT_PROMPT},
                {"role": "user", "content": format!("문서:{doc}")},
            ],
        });

        let mut attempts = 0;
        while attempts < FORMAT_RETRY.max_attempts {
            match self.chat(body.clone()).await {
                Ok(CallReply::Text(raw)) => return parse_format_reply(&raw),
                Ok(CallReply::RateLimited(after)) => {
                    attempts += 1;
                    if attempts >= FORMAT_RETRY.max_attempts {
                        break;
                    }
                    let delay = FORMAT_RETRY.delay(after);
                    warn!(
                        "형식 검증 호출 속도 제한 (시도 {}/{}), {:.0}초 대기",
                        attempts,
                        FORMAT_RETRY.max_attempts,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return FormatJudgment::Issue(format!("O(형식검증 실패:{})", failure_kind(&e)))
                }
            }
        }
        FormatJudgment::Issue("O(형식검증 실패:RateLimit 재시도 초과)".to_string())
    }

    /// Judge whether the cited page's text matches the entry's info string.
    /// Page retrieval is a lightweight single attempt; file URLs and fetch
    /// failures return without invoking the oracle at all.
    pub async fn judge_content_match(&self, info: &str, url: &str) -> ContentMatch {
        let page = match self.fetch_page_text(url).await {
            PageText::Text(t) => t,
            PageText::File => return ContentMatch::FileUnreadable,
            PageText::Unreachable => return ContentMatch::Unreachable,
        };

        let body = json!({
            "model": MODEL,
            "messages": [
                {"role": "system", "content": MATCH_PROMPT},
                {"role": "user", "content": format!("[정보]: {info}\n[웹페이지텍스트]: {page}")},
            ],
        });

        let mut attempts = 0;
        while attempts < MATCH_RETRY.max_attempts {
            match self.chat(body.clone()).await {
                Ok(CallReply::Text(raw)) => return classify_match_reply(&raw),
                Ok(CallReply::RateLimited(after)) => {
                    attempts += 1;
                    if attempts >= MATCH_RETRY.max_attempts {
                        break;
                    }
                    let delay = MATCH_RETRY.delay(after);
                    warn!(
                        "내용일치 호출 속도 제한 (시도 {}/{}), {:.0}초 대기",
                        attempts,
                        MATCH_RETRY.max_attempts,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(_) => return ContentMatch::Unreachable,
            }
        }
        ContentMatch::Unreachable
    }

    async fn chat(&self, body: Value) -> Result<CallReply> {
        let resp = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Ok(CallReply::RateLimited(retry_after));
        }

        let v: Value = resp.error_for_status()?.json().await?;
        let content = v["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(CallReply::Text(content))
    }

    async fn fetch_page_text(&self, url: &str) -> PageText {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return PageText::Unreachable;
        }
        if detect_file_ext(url).is_some() {
            return PageText::File;
        }

        let resp = match self
            .http
            .get(url)
            .timeout(Duration::from_secs(15))
            .send()
            .await
        {
            Ok(r) => r,
            Err(_) => return PageText::Unreachable,
        };
        if !resp.status().is_success() {
            return PageText::Unreachable;
        }
        match resp.text().await {
            Ok(body) => PageText::Text(truncate_chars(&html_to_text(&body), MAX_PAGE_CHARS)),
            Err(_) => PageText::Unreachable,
        }
    }
}

fn parse_format_reply(raw: &str) -> FormatJudgment {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return FormatJudgment::Issue("O(형식검증 실패:응답 파싱 불가)".to_string()),
    };
    match parsed.get("오류여부").and_then(Value::as_str) {
        Some("X") => FormatJudgment::Ok,
        Some(reason) => FormatJudgment::Issue(reason.to_string()),
        None => FormatJudgment::Issue("O(오류여부 누락)".to_string()),
    }
}

/// "불일치" contains "일치", so the mismatch token must be checked first.
fn classify_match_reply(raw: &str) -> ContentMatch {
    let out = raw.trim();
    if out.contains("불일치") {
        ContentMatch::Mismatched
    } else if out.contains("일치") {
        ContentMatch::Matched
    } else {
        ContentMatch::Unclassified(truncate_chars(out, 50))
    }
}

fn failure_kind(err: &anyhow::Error) -> String {
    if let Some(re) = err.downcast_ref::<reqwest::Error>() {
        if re.is_timeout() {
            return "Timeout".to_string();
        }
        if re.is_connect() {
            return "Connection".to_string();
        }
        if let Some(status) = re.status() {
            return format!("HTTP {}", status.as_u16());
        }
        return "Request".to_string();
    }
    "Unknown".to_string()
}
