use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::record::UrlStatus;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const USER_AGENT: &str = "Mozilla/5.0";

/// Outcome of one reachability probe.
#[derive(Debug, Clone)]
pub struct UrlCheck {
    pub status: UrlStatus,
    pub code: Option<u16>,
    pub final_url: Option<String>,
    pub memo: String,
}

impl UrlCheck {
    fn error(memo: impl Into<String>) -> Self {
        UrlCheck {
            status: UrlStatus::Error,
            code: None,
            final_url: None,
            memo: memo.into(),
        }
    }

    fn unknown(memo: impl Into<String>) -> Self {
        UrlCheck {
            status: UrlStatus::Unknown,
            code: None,
            final_url: None,
            memo: memo.into(),
        }
    }
}

/// Probes URLs with a strict client first and retries exactly once with
/// certificate validation disabled when the strict attempt fails on TLS.
pub struct UrlVerifier {
    strict: reqwest::Client,
    insecure: reqwest::Client,
}

impl UrlVerifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let strict = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        let insecure = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(UrlVerifier { strict, insecure })
    }

    /// Classify one URL. Always returns exactly one of the four statuses;
    /// no failure escapes as an error.
    pub async fn check(&self, url: &str) -> UrlCheck {
        let url = url.trim();
        if url.is_empty() {
            return UrlCheck::error("URL 없음");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return UrlCheck::error("http/https로 시작하지 않음");
        }

        match self.strict.get(url).send().await {
            Ok(resp) => classify_response(resp),
            // TLS before timeout/connect: an intercepted handshake often
            // surfaces as a connect error further down the chain.
            Err(e) if is_tls_error(&e) => self.retry_insecure(url).await,
            Err(e) if e.is_timeout() => UrlCheck::unknown("Timeout"),
            Err(e) if e.is_connect() => UrlCheck::unknown("Connection error"),
            Err(e) if e.is_builder() => UrlCheck::error("Invalid URL"),
            Err(e) => UrlCheck::unknown(format!("예외: {}", error_kind(&e))),
        }
    }

    async fn retry_insecure(&self, url: &str) -> UrlCheck {
        warn!("TLS 검증 실패, 인증서 검증을 생략하고 재시도: {}", url);
        match self.insecure.get(url).send().await {
            Ok(resp) => {
                let code = resp.status().as_u16();
                let final_url = resp.url().to_string();
                if resp.status().is_success() {
                    UrlCheck {
                        status: UrlStatus::OkTlsWarning,
                        code: Some(code),
                        final_url: Some(final_url),
                        memo: "SSL 검증 실패(보안주의): 인증서 검증 생략 시 접속됨".into(),
                    }
                } else {
                    UrlCheck {
                        status: UrlStatus::Error,
                        code: Some(code),
                        final_url: Some(final_url),
                        memo: format!("SSL 검증 실패 + HTTP {}(인증서 검증 생략)", code),
                    }
                }
            }
            Err(e) => UrlCheck::unknown(format!(
                "SSL 핸드셰이크 실패(인증서 검증 생략도 실패) - {}",
                error_kind(&e)
            )),
        }
    }
}

fn classify_response(resp: reqwest::Response) -> UrlCheck {
    let code = resp.status().as_u16();
    let final_url = resp.url().to_string();
    if resp.status().is_success() {
        UrlCheck {
            status: UrlStatus::Ok,
            code: Some(code),
            final_url: Some(final_url),
            memo: String::new(),
        }
    } else {
        UrlCheck {
            status: UrlStatus::Error,
            code: Some(code),
            final_url: Some(final_url),
            memo: format!("HTTP {}", code),
        }
    }
}

/// Walk the error source chain looking for certificate/TLS markers.
fn is_tls_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        let msg = e.to_string().to_lowercase();
        if msg.contains("certificate")
            || msg.contains("tls")
            || msg.contains("ssl")
            || msg.contains("handshake")
        {
            return true;
        }
        source = e.source();
    }
    false
}

/// Short failure-kind name for memos; never the full error chain.
fn error_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "Timeout"
    } else if err.is_connect() {
        "Connection"
    } else if err.is_redirect() {
        "Redirect"
    } else if err.is_body() || err.is_decode() {
        "Body"
    } else if err.is_request() {
        "Request"
    } else {
        "Unknown"
    }
}
