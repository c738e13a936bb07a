use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::browser::{BrowserKind, RawRow};
use crate::error::{ExtractError, Result};

/// Read-only view of a history store (snapshot or recovered).
pub struct HistoryReader {
    conn: Connection,
    kind: BrowserKind,
}

impl HistoryReader {
    /// Open `path` read-only and verify the projection columns exist.
    pub fn open(path: &Path, kind: BrowserKind) -> Result<Self> {
        if !path.is_file() {
            return Err(ExtractError::NotFound(format!("store {}", path.display())));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ExtractError::io(path, std::io::Error::other(e)))?;

        let reader = Self { conn, kind };
        reader.check_schema()?;
        Ok(reader)
    }

    fn check_schema(&self) -> Result<()> {
        let table = self.kind.table();
        if !has_table(&self.conn, table)? {
            return Err(ExtractError::Schema(format!("missing table {table}")));
        }
        let columns = table_columns(&self.conn, table)?;
        for expected in ["url", "title", self.kind.time_column()] {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(expected)) {
                return Err(ExtractError::Schema(format!(
                    "table {table} has no column {expected}"
                )));
            }
        }
        Ok(())
    }

    /// Stream rows ordered by last visit, newest first.
    pub fn for_each_row<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(RawRow),
    {
        let sql = format!(
            "SELECT url, title, {time} FROM {table} ORDER BY {time} DESC",
            time = self.kind.time_column(),
            table = self.kind.table(),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(schema_error)?;
        let mut rows = stmt.query([]).map_err(schema_error)?;
        while let Some(row) = rows.next().map_err(schema_error)? {
            let url = row.get_ref(0).map_err(schema_error)?;
            let title = row.get_ref(1).map_err(schema_error)?;
            let time = row.get_ref(2).map_err(schema_error)?;
            f(RawRow {
                url: value_text(url).unwrap_or_default(),
                title: value_text(title),
                last_visit: value_int(time),
            });
        }
        Ok(())
    }
}

/// Collect every row of the store at `path`.
pub fn read_rows(path: &Path, kind: BrowserKind) -> Result<Vec<RawRow>> {
    let reader = HistoryReader::open(path, kind)?;
    let mut out = Vec::new();
    reader.for_each_row(|row| out.push(row))?;
    Ok(out)
}

fn schema_error(err: rusqlite::Error) -> ExtractError {
    ExtractError::Schema(err.to_string())
}

fn has_table(conn: &Connection, name: &str) -> Result<bool> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")
        .map_err(schema_error)?;
    let mut rows = stmt.query([name]).map_err(schema_error)?;
    Ok(rows.next().map_err(schema_error)?.is_some())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(schema_error)?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(schema_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(schema_error)?;
    Ok(columns)
}

// Salvaged rows can carry any storage class; coerce instead of failing.
fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn value_int(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(v) => Some(v),
        ValueRef::Real(v) if v.is_finite() && v.abs() < i64::MAX as f64 => Some(v as i64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
        _ => None,
    }
}
