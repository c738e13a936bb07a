use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// Chromium-style store: `urls.last_visit_time`, microseconds since 1601.
    WebKit,
    /// Firefox-style store: `moz_places.last_visit_date`, microseconds since 1970.
    Gecko,
}

impl BrowserKind {
    /// Stable label used in working file names.
    pub fn label(self) -> &'static str {
        match self {
            Self::WebKit => "webkit",
            Self::Gecko => "gecko",
        }
    }

    /// Product name used in exports and the diagnostic log.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::WebKit => "Chrome",
            Self::Gecko => "Firefox",
        }
    }

    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::WebKit => "urls",
            Self::Gecko => "moz_places",
        }
    }

    pub(crate) fn time_column(self) -> &'static str {
        match self {
            Self::WebKit => "last_visit_time",
            Self::Gecko => "last_visit_date",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub kind: BrowserKind,
    pub store_path: PathBuf,
}

/// Row as stored, before timestamp decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub url: String,
    pub title: Option<String>,
    pub last_visit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub title: String,
    pub url: String,
    pub visited_at: DateTime<Utc>,
}
