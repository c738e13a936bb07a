//! # Export
//!
//! Record sinks for the extracted history plus the text rendering and the
//! diagnostic log used by the binary. The engine never calls into this
//! module; it only consumes [`HistoryRecord`]s.

pub mod csv;
pub mod jsonl;

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;

use crate::browser::{BrowserKind, HistoryRecord};

pub const LAST_VISITED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormatKind {
    Csv,
    Jsonl,
}

impl ExportFormatKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub trait RecordSink {
    fn record(&mut self, record: &HistoryRecord) -> Result<(), ExportError>;
    fn flush(&mut self) -> Result<(), ExportError>;
}

pub fn build_sink(
    format: ExportFormatKind,
    kind: BrowserKind,
    path: &Path,
) -> Result<Box<dyn RecordSink>, ExportError> {
    match format {
        ExportFormatKind::Csv => Ok(Box::new(csv::CsvSink::create(path)?)),
        ExportFormatKind::Jsonl => Ok(Box::new(jsonl::JsonlSink::create(path, kind)?)),
    }
}

/// Write every record to a new export file at `path`.
pub fn export_records(
    format: ExportFormatKind,
    kind: BrowserKind,
    path: &Path,
    records: &[HistoryRecord],
) -> Result<(), ExportError> {
    let mut sink = build_sink(format, kind, path)?;
    for record in records {
        sink.record(record)?;
    }
    sink.flush()
}

/// `chrome_history_20230601_100000.csv`
pub fn export_file_name<Tz: TimeZone>(
    kind: BrowserKind,
    now: &DateTime<Tz>,
    format: ExportFormatKind,
) -> String
where
    Tz::Offset: Display,
{
    format!(
        "{}_history_{}.{}",
        kind.display_name().to_ascii_lowercase(),
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

pub fn format_last_visited(record: &HistoryRecord) -> String {
    record
        .visited_at
        .with_timezone(&Local)
        .format(LAST_VISITED_FORMAT)
        .to_string()
}

pub fn render_text(records: &[HistoryRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "Title: {}\nURL: {}\nLast Visited: {}\n\n",
            record.title,
            record.url,
            format_last_visited(record)
        ));
    }
    out
}

/// Append one line to the diagnostic log, creating it if needed.
pub fn append_error_log(
    path: &Path,
    kind: BrowserKind,
    err: &dyn Display,
) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "[{}] {} Error: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
        kind.display_name(),
        err
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample() -> HistoryRecord {
        HistoryRecord {
            title: "Example".to_string(),
            url: "https://example.com".to_string(),
            visited_at: Utc.with_ymd_and_hms(2023, 6, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn names_export_files() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            export_file_name(BrowserKind::WebKit, &now, ExportFormatKind::Csv),
            "chrome_history_20240102_030405.csv"
        );
        assert_eq!(
            export_file_name(BrowserKind::Gecko, &now, ExportFormatKind::Jsonl),
            "firefox_history_20240102_030405.jsonl"
        );
    }

    #[test]
    fn renders_text_blocks() {
        let record = sample();
        let text = render_text(std::slice::from_ref(&record));
        let expected = format!(
            "Title: Example\nURL: https://example.com\nLast Visited: {}\n\n",
            format_last_visited(&record)
        );
        assert_eq!(text, expected);
        assert_eq!(render_text(&[]), "");
    }

    #[test]
    fn appends_to_error_log() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("error_log.txt");
        append_error_log(&path, BrowserKind::WebKit, &"first").expect("append");
        append_error_log(&path, BrowserKind::Gecko, &"second").expect("append");
        let content = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] Chrome Error: first"));
        assert!(lines[1].ends_with("] Firefox Error: second"));
    }

    #[test]
    fn exports_jsonl_lines() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out.jsonl");
        export_records(ExportFormatKind::Jsonl, BrowserKind::Gecko, &path, &[sample(), sample()])
            .expect("export");
        let content = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).expect("json"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["browser"], "gecko");
        assert_eq!(lines[0]["url"], "https://example.com");
        assert_eq!(lines[0]["visited_at"], "2023-06-01T10:00:00Z");
    }
}
