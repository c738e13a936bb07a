use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure of a single extraction run.
///
/// Every variant is recoverable at the boundary of one profile; the pipeline
/// collects them per profile instead of aborting sibling runs.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("raw recovery failed: {0}")]
    RecoveryTool(String),
    #[error("replaying recovered sql failed: {0}")]
    Replay(String),
    #[error("unexpected schema: {0}")]
    Schema(String),
    #[error("start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Failures of the storage layer, which the binary also appends to the
    /// diagnostic log.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::RecoveryTool(_) | Self::Replay(_) | Self::Schema(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_storage_failures() {
        let io = ExtractError::io("/tmp/x", std::io::Error::other("boom"));
        assert!(io.is_storage_failure());
        assert!(ExtractError::Schema("no urls".into()).is_storage_failure());
        assert!(!ExtractError::NotFound("History".into()).is_storage_failure());
        let range = ExtractError::InvalidRange {
            start: Utc::now(),
            end: Utc::now(),
        };
        assert!(!range.is_storage_failure());
    }

    #[test]
    fn io_error_names_the_path() {
        let err = ExtractError::io("/data/History", std::io::Error::other("denied"));
        assert_eq!(err.to_string(), "io error on /data/History: denied");
    }
}
