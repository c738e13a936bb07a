//! Shared fixtures for the extraction tests.
//!
//! Builds small Chrome and Firefox history databases on disk and wraps the
//! engine context so each test file only states what it checks.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use histsalvage::browser::BrowserKind;
use histsalvage::error::Result;
use histsalvage::normalize::DateRange;
use histsalvage::pipeline::{EngineContext, ExtractionRequest};
use histsalvage::recover::RawRecoverer;

// ============================================================================
// Constants
// ============================================================================

/// 2023-06-01T10:00:00Z in WebKit microseconds.
pub const WEBKIT_2023_06_01_10H: i64 = 13_330_087_200_000_000;
/// 2023-06-02T10:00:00Z in WebKit microseconds.
pub const WEBKIT_2023_06_02_10H: i64 = 13_330_173_600_000_000;
/// 2023-06-01T10:00:00Z in Gecko microseconds.
pub const GECKO_2023_06_01_10H: i64 = 1_685_613_600_000_000;

// ============================================================================
// Store Builders
// ============================================================================

pub fn chrome_history(path: &Path, rows: &[(&str, &str, i64)]) {
    let conn = Connection::open(path).expect("conn");
    conn.execute_batch(
        "CREATE TABLE urls (id INTEGER PRIMARY KEY AUTOINCREMENT, url LONGVARCHAR, title LONGVARCHAR,
             visit_count INTEGER DEFAULT 0 NOT NULL, typed_count INTEGER DEFAULT 0 NOT NULL,
             last_visit_time INTEGER NOT NULL, hidden INTEGER DEFAULT 0 NOT NULL);",
    )
    .expect("schema");
    for (url, title, time) in rows {
        conn.execute(
            "INSERT INTO urls (url, title, last_visit_time) VALUES (?1, ?2, ?3)",
            rusqlite::params![url, title, time],
        )
        .expect("insert");
    }
}

pub fn firefox_places(path: &Path, rows: &[(&str, Option<&str>, Option<i64>)]) {
    let conn = Connection::open(path).expect("conn");
    conn.execute_batch(
        "CREATE TABLE moz_places (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR,
             rev_host LONGVARCHAR, visit_count INTEGER DEFAULT 0, hidden INTEGER DEFAULT 0 NOT NULL,
             typed INTEGER DEFAULT 0 NOT NULL, frecency INTEGER DEFAULT -1 NOT NULL,
             last_visit_date INTEGER, guid TEXT);",
    )
    .expect("schema");
    for (url, title, time) in rows {
        conn.execute(
            "INSERT INTO moz_places (url, title, last_visit_date) VALUES (?1, ?2, ?3)",
            rusqlite::params![url, title, time],
        )
        .expect("insert");
    }
}

/// Chrome-shaped store on 1 KiB pages holding 200 visits, of which ids
/// above 100 are deleted with `secure_delete` off. The freed pages keep
/// their cells. Returns the number of live rows.
pub fn chrome_history_with_deletions(path: &Path) -> usize {
    let conn = Connection::open(path).expect("conn");
    conn.execute_batch(
        "PRAGMA page_size=1024; PRAGMA auto_vacuum=NONE; PRAGMA secure_delete=OFF; VACUUM;
         CREATE TABLE meta (key LONGVARCHAR NOT NULL UNIQUE PRIMARY KEY, value LONGVARCHAR);
         CREATE TABLE urls (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR, visit_count INTEGER, typed_count INTEGER, last_visit_time INTEGER, hidden INTEGER);",
    )
    .expect("schema");
    for i in 0..200i64 {
        conn.execute(
            "INSERT INTO urls (url, title, visit_count, typed_count, last_visit_time, hidden) VALUES (?1, ?2, 1, 0, ?3, 0)",
            (
                format!("https://site{i}.example.com/"),
                format!("Page {i} {}", "x".repeat(150)),
                WEBKIT_2023_06_01_10H + i,
            ),
        )
        .expect("insert");
    }
    conn.execute("DELETE FROM urls WHERE id > 100", [])
        .expect("delete");
    100
}

/// WAL-mode `places.sqlite` whose writer stays open, so every row is still
/// only in `places.sqlite-wal`. Keep the returned connection alive.
pub fn firefox_places_live(path: &Path, rows: &[(&str, Option<&str>, Option<i64>)]) -> Connection {
    let conn = Connection::open(path).expect("conn");
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA wal_autocheckpoint=0;")
        .expect("wal");
    conn.execute_batch(
        "CREATE TABLE moz_places (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR,
             last_visit_date INTEGER);",
    )
    .expect("schema");
    for (url, title, time) in rows {
        conn.execute(
            "INSERT INTO moz_places (url, title, last_visit_date) VALUES (?1, ?2, ?3)",
            rusqlite::params![url, title, time],
        )
        .expect("insert");
    }
    conn
}

/// `sqlite3` on PATH with `.recover` support.
pub fn sqlite3_recover_available() -> bool {
    std::process::Command::new("sqlite3")
        .arg(":memory:")
        .arg(".recover")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

// ============================================================================
// Engine Helpers
// ============================================================================

/// One calendar day in UTC, so results do not depend on the host zone.
pub fn utc_day(year: i32, month: u32, day: u32) -> DateRange {
    let start = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap();
    let end = Utc
        .with_ymd_and_hms(year, month, day, 23, 59, 59)
        .unwrap()
        + chrono::Duration::microseconds(999_999);
    DateRange::new(Some(start), Some(end)).expect("range")
}

pub fn request(kind: BrowserKind, range: DateRange, include_deleted: bool) -> ExtractionRequest {
    ExtractionRequest {
        kind,
        range,
        include_deleted,
        keep_working_files: false,
    }
}

pub fn context<'a>(working_dir: &Path, recoverer: &'a dyn RawRecoverer) -> EngineContext<'a> {
    EngineContext {
        working_dir: working_dir.to_path_buf(),
        recoverer,
    }
}

/// Recoverer that hands back a canned script regardless of input.
pub struct CannedRecoverer(pub String);

impl RawRecoverer for CannedRecoverer {
    fn name(&self) -> &str {
        "canned"
    }

    fn reconstruction_script(&self, _db_path: &Path) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// Path Helpers
// ============================================================================

pub fn sha256_file(path: &Path) -> String {
    let bytes = fs::read(path).expect("read");
    hex::encode(Sha256::digest(&bytes))
}

pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("entry").path())
        .collect();
    entries.sort();
    entries
}
