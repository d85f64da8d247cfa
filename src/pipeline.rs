use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::judge::JudgeClient;
use crate::meta::{self, detect_file_ext};
use crate::parser::{dates, fields, format};
use crate::record::{needs_review_if_empty, Record, NEEDS_REVIEW};
use crate::verify::{UrlVerifier, DEFAULT_TIMEOUT, USER_AGENT};

const CONCURRENCY: usize = 8;

/// Composes grammar, rule check, URL probe, meta fetch and the optional
/// judgments over a batch of entries, one record per entry.
pub struct Pipeline {
    verifier: Arc<UrlVerifier>,
    http: reqwest::Client,
    judge: Option<Arc<JudgeClient>>,
}

impl Pipeline {
    pub fn new(judge: Option<JudgeClient>) -> Result<Self> {
        Ok(Pipeline {
            verifier: Arc::new(UrlVerifier::new(DEFAULT_TIMEOUT)?),
            http: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(DEFAULT_TIMEOUT)
                .build()?,
            judge: judge.map(Arc::new),
        })
    }

    /// Verify a batch. Entries run concurrently under a bounded pool and are
    /// reassembled into input order — downstream review keys off row
    /// position. A single entry's failure degrades to classified statuses
    /// and never aborts the batch.
    pub async fn run(&self, entries: Vec<String>) -> Result<Vec<Record>> {
        let total = entries.len();
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
        let (tx, mut rx) = tokio::sync::mpsc::channel::<(usize, Record)>(CONCURRENCY * 2);

        for (row, entry) in entries.into_iter().enumerate() {
            let verifier = Arc::clone(&self.verifier);
            let http = self.http.clone();
            let judge = self.judge.clone();
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let _permit = sem.acquire().await.unwrap();
                let record = verify_entry(&verifier, &http, judge.as_deref(), &entry).await;
                let _ = tx.send((row, record)).await;
            });
        }

        // Drop our copy of tx so rx closes when all spawned tasks finish
        drop(tx);

        let mut slots: Vec<Option<Record>> = (0..total).map(|_| None).collect();
        while let Some((row, record)) = rx.recv().await {
            slots[row] = Some(record);
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!("Verified {} entries", total);
        Ok(slots
            .into_iter()
            .map(|r| r.expect("every entry yields a record"))
            .collect())
    }

    /// Content-match judgment for the selected row indices only (0-based).
    /// Mutates only the `content_match` field of the selected rows.
    pub async fn reverify(&self, records: &mut [Record], selected: &[usize]) -> Result<usize> {
        let judge = self
            .judge
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("내용일치 검증에는 judgment 클라이언트가 필요합니다"))?;

        let mut updated = 0;
        for &row in selected {
            let Some(record) = records.get_mut(row) else {
                warn!("행 {}이 저장된 범위를 벗어나 건너뜁니다", row + 1);
                continue;
            };
            let info = format!("{} + {}", record.title, record.attribution);
            let url = if record.redirect_url.is_empty() {
                record.source_url.clone()
            } else {
                record.redirect_url.clone()
            };
            record.content_match = judge.judge_content_match(&info, &url).await.to_label();
            updated += 1;
        }
        Ok(updated)
    }
}

async fn verify_entry(
    verifier: &UrlVerifier,
    http: &reqwest::Client,
    judge: Option<&JudgeClient>,
    entry: &str,
) -> Record {
    let rule_format_note = if format::has_quoted_title(entry) {
        String::new()
    } else {
        NEEDS_REVIEW.to_string()
    };

    let parsed = fields::parse(entry);
    let search_date = dates::validate_retrieval_date(&parsed.retrieval_marker)
        .unwrap_or_else(|| NEEDS_REVIEW.to_string());

    let check = verifier.check(&parsed.source_url).await;

    let file_ext = detect_file_ext(&parsed.source_url);
    let file_flag = if file_ext.is_some() { "파일" } else { "웹" };

    // Prefer the post-redirect URL for meta extraction when the probe got one.
    let meta_url = check
        .final_url
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| parsed.source_url.clone());
    let meta = meta::fetch_page_meta(http, &meta_url).await;

    let judge_format_note = match judge {
        Some(client) => client.judge_format(entry).await.to_note(),
        None => String::new(),
    };

    Record {
        final_status: check.status.to_string(),
        final_memo: check.memo.clone(),
        redirect_url: check.final_url.clone().unwrap_or_default(),
        attribution: needs_review_if_empty(&parsed.attribution),
        title: needs_review_if_empty(&parsed.title),
        source_url: needs_review_if_empty(&parsed.source_url),
        search_date,
        original: entry.to_string(),
        rule_format_note,
        judge_format_note,
        content_match: String::new(),
        page_title: meta.title,
        page_og_title: meta.og_title,
        page_description: meta.description,
        file_flag: file_flag.to_string(),
        file_ext: file_ext.unwrap_or("").to_string(),
        url_status: check.status.to_string(),
        url_memo: check.memo,
        status_code: check.code,
        manual_status: String::new(),
        manual_memo: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Entries without a usable URL short-circuit before any network call,
    // so these run offline.

    #[tokio::test]
    async fn batch_preserves_input_order_and_length() {
        let pipeline = Pipeline::new(None).unwrap();
        let entries: Vec<String> = (0..5)
            .map(|i| format!("기관{}, 검색일: 2023.1.{}", i, i + 1))
            .collect();
        let records = pipeline.run(entries.clone()).await.unwrap();
        assert_eq!(records.len(), entries.len());
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.original, entries[i]);
        }
    }

    #[tokio::test]
    async fn url_less_entry_degrades_to_classified_error() {
        let pipeline = Pipeline::new(None).unwrap();
        let records = pipeline
            .run(vec!["환경부, “보고서,” 검색일: 2023.5.1".to_string()])
            .await
            .unwrap();
        let record = &records[0];
        assert_eq!(record.url_status, "오류");
        assert_eq!(record.url_memo, "URL 없음");
        assert_eq!(record.final_status, "오류");
        assert_eq!(record.source_url, NEEDS_REVIEW);
        assert_eq!(record.search_date, "2023.5.1");
        assert_eq!(record.attribution, "환경부");
    }

    #[tokio::test]
    async fn empty_entry_still_yields_a_record() {
        let pipeline = Pipeline::new(None).unwrap();
        let records = pipeline.run(vec![String::new()]).await.unwrap();
        let record = &records[0];
        assert_eq!(record.attribution, NEEDS_REVIEW);
        assert_eq!(record.title, NEEDS_REVIEW);
        assert_eq!(record.search_date, NEEDS_REVIEW);
        assert_eq!(record.rule_format_note, NEEDS_REVIEW);
        assert_eq!(record.url_status, "오류");
    }

    #[tokio::test]
    async fn file_url_sets_file_flags_without_meta() {
        let pipeline = Pipeline::new(None).unwrap();
        // Unreachable host, but flags derive from the URL text alone.
        let records = pipeline
            .run(vec![
                "기관, “제목,” http://invalid.invalid/r.pdf, 검색일: 2023.5.1".to_string(),
            ])
            .await
            .unwrap();
        let record = &records[0];
        assert_eq!(record.file_flag, "파일");
        assert_eq!(record.file_ext, ".pdf");
        assert!(record.page_title.is_empty());
    }

    #[tokio::test]
    async fn reverify_touches_only_selected_content_match() {
        let judge = JudgeClient::new("test-key".into()).unwrap();
        let pipeline = Pipeline::new(Some(judge)).unwrap();

        // File URL: content match resolves without calling the oracle.
        let mut records = vec![
            Record {
                title: "“보고서,”".into(),
                attribution: "환경부".into(),
                source_url: "http://example.com/a.pdf".into(),
                url_status: "오류".into(),
                ..Default::default()
            },
            Record {
                title: "“다른 보고서,”".into(),
                attribution: "국토부".into(),
                source_url: "http://example.com/b.pdf".into(),
                ..Default::default()
            },
        ];
        let before = records[1].clone();

        let updated = pipeline.reverify(&mut records, &[0, 9]).await.unwrap();
        assert_eq!(updated, 1);
        assert_eq!(records[0].content_match, "파일(내용확인불가)");
        // Everything else on the selected row is untouched.
        assert_eq!(records[0].url_status, "오류");
        assert_eq!(records[0].title, "“보고서,”");
        // Unselected rows are untouched entirely.
        assert_eq!(records[1], before);
    }

    #[tokio::test]
    async fn reverify_without_judge_is_an_error() {
        let pipeline = Pipeline::new(None).unwrap();
        let mut records = vec![Record::default()];
        assert!(pipeline.reverify(&mut records, &[0]).await.is_err());
    }
}
