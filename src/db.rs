use anyhow::Result;
use rusqlite::Connection;

use crate::record::Record;

const DB_PATH: &str = "data/refcheck.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS records (
            row_no            INTEGER PRIMARY KEY,
            final_status      TEXT NOT NULL,
            final_memo        TEXT NOT NULL DEFAULT '',
            redirect_url      TEXT NOT NULL DEFAULT '',
            attribution       TEXT NOT NULL DEFAULT '',
            title             TEXT NOT NULL DEFAULT '',
            source_url        TEXT NOT NULL DEFAULT '',
            search_date       TEXT NOT NULL DEFAULT '',
            original          TEXT NOT NULL DEFAULT '',
            rule_format_note  TEXT NOT NULL DEFAULT '',
            judge_format_note TEXT NOT NULL DEFAULT '',
            content_match     TEXT NOT NULL DEFAULT '',
            page_title        TEXT NOT NULL DEFAULT '',
            page_og_title     TEXT NOT NULL DEFAULT '',
            page_description  TEXT NOT NULL DEFAULT '',
            file_flag         TEXT NOT NULL DEFAULT '',
            file_ext          TEXT NOT NULL DEFAULT '',
            url_status        TEXT NOT NULL,
            url_memo          TEXT NOT NULL DEFAULT '',
            status_code       INTEGER,
            manual_status     TEXT NOT NULL DEFAULT '',
            manual_memo       TEXT NOT NULL DEFAULT '',
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_records_final_status ON records(final_status);
        ",
    )?;
    Ok(())
}

/// Replace the saved batch with a fresh one. One live batch per database,
/// row numbers starting at 1 in input order.
pub fn replace_batch(conn: &Connection, records: &[Record]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM records", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO records
             (row_no, final_status, final_memo, redirect_url, attribution, title,
              source_url, search_date, original, rule_format_note, judge_format_note,
              content_match, page_title, page_og_title, page_description, file_flag,
              file_ext, url_status, url_memo, status_code, manual_status, manual_memo)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22)",
        )?;
        for (i, r) in records.iter().enumerate() {
            stmt.execute(rusqlite::params![
                (i + 1) as i64,
                r.final_status,
                r.final_memo,
                r.redirect_url,
                r.attribution,
                r.title,
                r.source_url,
                r.search_date,
                r.original,
                r.rule_format_note,
                r.judge_format_note,
                r.content_match,
                r.page_title,
                r.page_og_title,
                r.page_description,
                r.file_flag,
                r.file_ext,
                r.url_status,
                r.url_memo,
                r.status_code.map(|c| c as i64),
                r.manual_status,
                r.manual_memo,
            ])?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

const RECORD_COLUMNS: &str = "final_status, final_memo, redirect_url, attribution, title, \
     source_url, search_date, original, rule_format_note, judge_format_note, \
     content_match, page_title, page_og_title, page_description, file_flag, \
     file_ext, url_status, url_memo, status_code, manual_status, manual_memo";

fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    Ok(Record {
        final_status: row.get(0)?,
        final_memo: row.get(1)?,
        redirect_url: row.get(2)?,
        attribution: row.get(3)?,
        title: row.get(4)?,
        source_url: row.get(5)?,
        search_date: row.get(6)?,
        original: row.get(7)?,
        rule_format_note: row.get(8)?,
        judge_format_note: row.get(9)?,
        content_match: row.get(10)?,
        page_title: row.get(11)?,
        page_og_title: row.get(12)?,
        page_description: row.get(13)?,
        file_flag: row.get(14)?,
        file_ext: row.get(15)?,
        url_status: row.get(16)?,
        url_memo: row.get(17)?,
        status_code: row.get::<_, Option<i64>>(18)?.map(|c| c as u16),
        manual_status: row.get(19)?,
        manual_memo: row.get(20)?,
    })
}

/// The whole saved batch in row order.
pub fn fetch_records(conn: &Connection) -> Result<Vec<Record>> {
    let sql = format!("SELECT {} FROM records ORDER BY row_no", RECORD_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| record_from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_record(conn: &Connection, row_no: usize) -> Result<Option<Record>> {
    let sql = format!("SELECT {} FROM records WHERE row_no = ?1", RECORD_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map([row_no as i64], |row| record_from_row(row))?;
    Ok(rows.next().transpose()?)
}

pub fn update_content_match(conn: &Connection, row_no: usize, value: &str) -> Result<()> {
    conn.execute(
        "UPDATE records SET content_match = ?1 WHERE row_no = ?2",
        rusqlite::params![value, row_no as i64],
    )?;
    Ok(())
}

/// Persist the manual-verdict fields and the final fields they derive.
pub fn update_manual(conn: &Connection, row_no: usize, record: &Record) -> Result<()> {
    conn.execute(
        "UPDATE records
         SET manual_status = ?1, manual_memo = ?2, final_status = ?3, final_memo = ?4
         WHERE row_no = ?5",
        rusqlite::params![
            record.manual_status,
            record.manual_memo,
            record.final_status,
            record.final_memo,
            row_no as i64,
        ],
    )?;
    Ok(())
}

pub struct StatusCounts {
    pub total: usize,
    pub ok: usize,
    pub tls_warning: usize,
    pub error: usize,
    pub unknown: usize,
}

pub fn status_counts(conn: &Connection) -> Result<StatusCounts> {
    let count = |status: &str| -> Result<usize> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM records WHERE final_status = ?1",
            [status],
            |r| r.get(0),
        )?)
    };
    let total: usize = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
    Ok(StatusCounts {
        total,
        ok: count("정상")?,
        tls_warning: count("정상(보안주의)")?,
        error: count("오류")?,
        unknown: count("확인불가")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sample(original: &str, status: &str) -> Record {
        Record {
            final_status: status.into(),
            url_status: status.into(),
            original: original.into(),
            status_code: Some(200),
            ..Default::default()
        }
    }

    #[test]
    fn batch_roundtrip_preserves_order() {
        let conn = test_conn();
        let records = vec![
            sample("첫째 항목", "정상"),
            sample("둘째 항목", "오류"),
            sample("셋째 항목", "확인불가"),
        ];
        replace_batch(&conn, &records).unwrap();
        let loaded = fetch_records(&conn).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn replace_discards_previous_batch() {
        let conn = test_conn();
        replace_batch(&conn, &[sample("옛 항목", "정상"), sample("옛 항목 2", "정상")]).unwrap();
        replace_batch(&conn, &[sample("새 항목", "오류")]).unwrap();
        let loaded = fetch_records(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].original, "새 항목");
    }

    #[test]
    fn point_updates() {
        let conn = test_conn();
        replace_batch(&conn, &[sample("항목", "오류")]).unwrap();

        update_content_match(&conn, 1, "일치(유효)").unwrap();
        let mut record = fetch_record(&conn, 1).unwrap().unwrap();
        assert_eq!(record.content_match, "일치(유효)");

        record.manual_status = "정상".into();
        record.final_status = "정상".into();
        update_manual(&conn, 1, &record).unwrap();
        let reloaded = fetch_record(&conn, 1).unwrap().unwrap();
        assert_eq!(reloaded.manual_status, "정상");
        assert_eq!(reloaded.final_status, "정상");

        assert!(fetch_record(&conn, 99).unwrap().is_none());
    }

    #[test]
    fn counts_group_by_final_status() {
        let conn = test_conn();
        replace_batch(
            &conn,
            &[
                sample("a", "정상"),
                sample("b", "정상"),
                sample("c", "오류"),
                sample("d", "확인불가"),
                sample("e", "정상(보안주의)"),
            ],
        )
        .unwrap();
        let counts = status_counts(&conn).unwrap();
        assert_eq!(counts.total, 5);
        assert_eq!(counts.ok, 2);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.unknown, 1);
        assert_eq!(counts.tls_warning, 1);
    }
}
