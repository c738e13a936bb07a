use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::browser::BrowserKind;
use crate::error::{ExtractError, Result};

/// Files SQLite keeps next to a database that can hold committed or
/// in-flight pages.
const LOG_SUFFIXES: [&str; 2] = ["-wal", "-journal"];
/// Every sidecar SQLite may create next to a database.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-journal", "-shm"];

/// Working copy of a live store. Only the copy is ever opened by later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub source_path: PathBuf,
    pub working_path: PathBuf,
}

impl Snapshot {
    /// SHA-256 (hex) of the working copy.
    pub fn sha256(&self) -> Result<String> {
        hash_file(&self.working_path)
    }

    /// Deletes the copy and any sidecar files next to it.
    pub fn remove(&self) -> Result<()> {
        remove_database(&self.working_path)
    }
}

/// Copy `source` to `<working_dir>/<kind>_<run key>.sqlite`.
///
/// The name only depends on the browser kind and the source path, so a rerun
/// overwrites its own previous snapshot and distinct profiles never share one.
///
/// A write-ahead log or rollback journal next to the source is copied too and
/// folded into the working copy, so pages a running browser has not yet
/// checkpointed are part of the snapshot.
pub fn snapshot(source: &Path, kind: BrowserKind, working_dir: &Path) -> Result<Snapshot> {
    if !source.is_file() {
        return Err(ExtractError::NotFound(format!(
            "{} store {}",
            kind.display_name(),
            source.display()
        )));
    }
    std::fs::create_dir_all(working_dir).map_err(|e| ExtractError::io(working_dir, e))?;

    let working_path = working_dir.join(format!("{}_{}.sqlite", kind.label(), run_key(source)));
    // fs::copy keeps source permissions; a read-only leftover would block the overwrite.
    // A stale log from an earlier run must never be applied to this copy.
    remove_database(&working_path)?;
    std::fs::copy(source, &working_path).map_err(|e| ExtractError::io(source, e))?;

    let mut copied_logs = 0;
    for suffix in LOG_SUFFIXES {
        let log = sidecar_path(source, suffix);
        if log.is_file() {
            std::fs::copy(&log, sidecar_path(&working_path, suffix))
                .map_err(|e| ExtractError::io(&log, e))?;
            copied_logs += 1;
        }
    }
    if copied_logs > 0 {
        if let Err(err) = fold_logs(&working_path) {
            warn!(
                "could not apply copied log to {}: {err}",
                working_path.display()
            );
        }
    }
    debug!(
        "snapshot {} -> {} ({} log file(s))",
        source.display(),
        working_path.display(),
        copied_logs
    );

    Ok(Snapshot {
        source_path: source.to_path_buf(),
        working_path,
    })
}

/// Checkpoint a copied WAL (or roll back a copied hot journal) into the
/// working copy and leave it in rollback-journal mode as a single file.
fn fold_logs(working_path: &Path) -> rusqlite::Result<()> {
    let conn = Connection::open(working_path)?;
    let _: i64 = conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))?;
    let _: String = conn.query_row("PRAGMA journal_mode=DELETE", [], |row| row.get(0))?;
    conn.close().map_err(|(_, err)| err)
}

/// `<path><suffix>`, the way SQLite names its sidecar files.
pub(crate) fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove a database file and every sidecar SQLite may have left next to it.
pub(crate) fn remove_database(path: &Path) -> Result<()> {
    remove_if_exists(path)?;
    for suffix in SIDECAR_SUFFIXES {
        remove_if_exists(&sidecar_path(path, suffix))?;
    }
    Ok(())
}

/// First 16 hex chars of the SHA-256 of the source path.
pub fn run_key(source: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

pub(crate) fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| ExtractError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ExtractError::io(path, err)),
    }
}
