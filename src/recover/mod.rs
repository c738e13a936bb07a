//! # Deleted-Record Recovery
//!
//! Turns a [`Snapshot`] into a [`RecoveredStore`]: a fresh database holding
//! every row a raw salvage pass could reconstruct, live or orphaned.
//!
//! The salvage pass itself sits behind [`RawRecoverer`] so the replay logic
//! does not care whether the script came from the `sqlite3` shell, the native
//! page scanner, or a test fake.

pub mod page_scan;
pub mod pages;
pub mod script;

use std::path::{Path, PathBuf};
use std::process::Command;

use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ExtractError, Result};
use crate::snapshot::{Snapshot, remove_database};

pub use page_scan::PageScanRecoverer;
use script::strip_dot_commands;

/// Produces a reconstruction script (schema plus data statements) for a
/// database file.
pub trait RawRecoverer: Send + Sync {
    fn name(&self) -> &str;
    fn reconstruction_script(&self, db_path: &Path) -> Result<String>;
}

/// Runs `<binary> <db> .recover` and captures its output.
#[derive(Debug, Clone)]
pub struct SqliteCliRecoverer {
    binary: PathBuf,
}

impl SqliteCliRecoverer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SqliteCliRecoverer {
    fn default() -> Self {
        Self::new("sqlite3")
    }
}

impl RawRecoverer for SqliteCliRecoverer {
    fn name(&self) -> &str {
        "sqlite-cli"
    }

    fn reconstruction_script(&self, db_path: &Path) -> Result<String> {
        // Blocking, no timeout.
        let output = Command::new(&self.binary)
            .arg(db_path)
            .arg(".recover")
            .output()
            .map_err(|e| {
                ExtractError::RecoveryTool(format!(
                    "failed to run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let diagnostic = if stderr.is_empty() {
                format!("{} exited with {}", self.binary.display(), output.status)
            } else {
                stderr
            };
            return Err(ExtractError::RecoveryTool(diagnostic));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryBackendKind {
    SqliteCli,
    PageScan,
}

pub fn build_recoverer(kind: RecoveryBackendKind, sqlite_binary: &Path) -> Box<dyn RawRecoverer> {
    match kind {
        RecoveryBackendKind::SqliteCli => Box::new(SqliteCliRecoverer::new(sqlite_binary)),
        RecoveryBackendKind::PageScan => Box::new(PageScanRecoverer::new()),
    }
}

/// Database rebuilt from a reconstruction script. Read exactly like a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredStore {
    pub snapshot_path: PathBuf,
    pub store_path: PathBuf,
    /// The script exactly as the recoverer produced it, kept on disk for
    /// inspection.
    pub script_path: PathBuf,
}

impl RecoveredStore {
    /// Deletes the rebuilt database; the script stays.
    pub fn remove(&self) -> Result<()> {
        remove_database(&self.store_path)
    }
}

pub fn recover(snapshot: &Snapshot, recoverer: &dyn RawRecoverer) -> Result<RecoveredStore> {
    let working = &snapshot.working_path;
    let dir = working.parent().unwrap_or_else(|| Path::new("."));
    let stem = working
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let script_path = dir.join(format!("{stem}_recovered.sql"));
    let store_path = dir.join(format!("{stem}_recovered.sqlite"));

    let raw = recoverer.reconstruction_script(working)?;
    debug!(
        "{} produced {} bytes of sql for {}",
        recoverer.name(),
        raw.len(),
        working.display()
    );

    std::fs::write(&script_path, &raw).map_err(|e| ExtractError::io(&script_path, e))?;

    remove_database(&store_path)?;
    if let Err(err) = replay(&store_path, &strip_dot_commands(&raw)) {
        let _ = remove_database(&store_path);
        return Err(err);
    }

    info!(
        "recovered store {} (script {})",
        store_path.display(),
        script_path.display()
    );
    Ok(RecoveredStore {
        snapshot_path: working.clone(),
        store_path,
        script_path,
    })
}

fn replay(store_path: &Path, script: &str) -> Result<()> {
    let conn = Connection::open(store_path).map_err(|e| {
        ExtractError::Replay(format!("cannot create {}: {e}", store_path.display()))
    })?;
    conn.execute_batch(script)
        .map_err(|e| ExtractError::Replay(e.to_string()))?;
    conn.close()
        .map_err(|(_, e)| ExtractError::Replay(e.to_string()))
}
