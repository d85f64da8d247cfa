mod db;
mod judge;
mod meta;
mod parser;
mod pipeline;
mod record;
mod verify;

use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use record::{apply_override, ManualOverride, UrlStatus};

#[derive(Parser)]
#[command(name = "refcheck", about = "Online-source reference verifier")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse entries, probe URLs, and save one record per line
    Verify {
        /// Text file with one citation entry per line (stdin if omitted)
        input: Option<PathBuf>,
        /// Also run the GPT citation-format judgment per entry
        #[arg(long)]
        judge_format: bool,
        /// Max entries to verify
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// GPT content-match judgment for selected rows of the saved batch
    Reverify {
        /// Row numbers (1-based, as printed by verify/stats), comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        rows: Vec<usize>,
    },
    /// Record a manual verdict for one row of the saved batch
    Override {
        /// Row number (1-based)
        row: usize,
        /// Manual status: 정상, 정상(보안주의), 오류, 확인불가
        #[arg(long)]
        status: Option<String>,
        /// Manual memo
        #[arg(long)]
        memo: Option<String>,
    },
    /// Dump the saved batch as JSON in export column order
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Final status summary of the saved batch
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Verify {
            input,
            judge_format,
            limit,
        } => run_verify(input, judge_format, limit).await,
        Commands::Reverify { rows } => run_reverify(rows).await,
        Commands::Override { row, status, memo } => run_override(row, status, memo),
        Commands::Export { output } => run_export(output),
        Commands::Stats => run_stats(),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

async fn run_verify(
    input: Option<PathBuf>,
    judge_format: bool,
    limit: Option<usize>,
) -> Result<()> {
    let data = match &input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("입력 파일을 읽을 수 없습니다: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let mut entries: Vec<String> = data.trim().lines().map(str::to_string).collect();
    if let Some(n) = limit {
        entries.truncate(n);
    }
    if entries.is_empty() {
        bail!("검증할 항목이 없습니다. 파일 또는 표준입력으로 텍스트를 전달해주세요.");
    }

    // Credentials are the only fatal condition: checked before any processing.
    let judge = if judge_format {
        Some(judge::JudgeClient::from_env()?)
    } else {
        None
    };

    let pipeline = pipeline::Pipeline::new(judge)?;
    println!("Verifying {} entries...", entries.len());
    let records = pipeline.run(entries).await?;

    let conn = db::connect()?;
    db::init_schema(&conn)?;
    db::replace_batch(&conn, &records)?;

    let needs_review: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            r.final_status == UrlStatus::Error.as_str()
                || r.final_status == UrlStatus::Unknown.as_str()
        })
        .map(|(i, _)| i + 1)
        .collect();

    println!("Saved {} records.", records.len());
    if needs_review.is_empty() {
        println!("No rows need manual review.");
    } else {
        println!(
            "{} rows need manual review (오류/확인불가): {}",
            needs_review.len(),
            needs_review
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

async fn run_reverify(rows: Vec<usize>) -> Result<()> {
    // Fatal before any processing when the oracle credential is absent.
    let judge = judge::JudgeClient::from_env()?;

    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let mut records = db::fetch_records(&conn)?;
    if records.is_empty() {
        bail!("저장된 검증 결과가 없습니다. 먼저 verify를 실행해주세요.");
    }

    let mut selected = Vec::new();
    for row in rows {
        match row.checked_sub(1) {
            Some(idx) => selected.push(idx),
            None => warn!("행 번호는 1부터 시작합니다. 0은 건너뜁니다."),
        }
    }

    let pipeline = pipeline::Pipeline::new(Some(judge))?;
    let updated = pipeline.reverify(&mut records, &selected).await?;

    for &idx in &selected {
        if let Some(record) = records.get(idx) {
            db::update_content_match(&conn, idx + 1, &record.content_match)?;
        }
    }

    println!("Updated content-match verdict for {} rows.", updated);
    Ok(())
}

fn run_override(row: usize, status: Option<String>, memo: Option<String>) -> Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;

    let Some(mut record) = db::fetch_record(&conn, row)? else {
        bail!("행 {}을 찾을 수 없습니다.", row);
    };

    let status = status
        .as_deref()
        .map(str::parse::<UrlStatus>)
        .transpose()?;
    apply_override(&mut record, &ManualOverride { status, memo });
    db::update_manual(&conn, row, &record)?;

    println!(
        "Row {}: {} ({})",
        row,
        record.final_status,
        if record.final_memo.is_empty() {
            "메모 없음"
        } else {
            record.final_memo.as_str()
        }
    );
    Ok(())
}

fn run_export(output: PathBuf) -> Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let records = db::fetch_records(&conn)?;
    if records.is_empty() {
        bail!("내보낼 결과가 없습니다. 먼저 verify를 실행해주세요.");
    }

    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(&output, json)
        .with_context(|| format!("결과를 쓸 수 없습니다: {}", output.display()))?;
    println!("Exported {} records to {}", records.len(), output.display());
    Ok(())
}

fn run_stats() -> Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let counts = db::status_counts(&conn)?;

    println!("Total:          {}", counts.total);
    println!("정상:           {}", counts.ok);
    println!("정상(보안주의): {}", counts.tls_warning);
    println!("오류:           {}", counts.error);
    println!("확인불가:       {}", counts.unknown);
    Ok(())
}
