use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use crate::browser::BrowserKind;
use crate::export::ExportFormatKind;
use crate::recover::RecoveryBackendKind;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
}

impl From<Browser> for BrowserKind {
    fn from(value: Browser) -> Self {
        match value {
            Browser::Chrome => BrowserKind::WebKit,
            Browser::Firefox => BrowserKind::Gecko,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryBackend {
    /// `sqlite3 <db> .recover`
    SqliteCli,
    /// Built-in page scanner
    PageScan,
}

impl From<RecoveryBackend> for RecoveryBackendKind {
    fn from(value: RecoveryBackend) -> Self {
        match value {
            RecoveryBackend::SqliteCli => RecoveryBackendKind::SqliteCli,
            RecoveryBackend::PageScan => RecoveryBackendKind::PageScan,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Jsonl,
}

impl From<ExportFormat> for ExportFormatKind {
    fn from(value: ExportFormat) -> Self {
        match value {
            ExportFormat::Csv => ExportFormatKind::Csv,
            ExportFormat::Jsonl => ExportFormatKind::Jsonl,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Browser whose history to extract
    #[arg(short, long, value_enum)]
    pub browser: Browser,

    /// First day to include (YYYY-MM-DD, local time)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD, local time)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Also recover rows deleted from the history database
    #[arg(long)]
    pub include_deleted: bool,

    /// Recovery backend (overrides config when set)
    #[arg(long, value_enum)]
    pub recovery_backend: Option<RecoveryBackend>,

    /// Export format
    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,

    /// Output directory for the export file (overrides config when set)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Chrome `History` file to read instead of the platform default
    #[arg(long)]
    pub history_path: Option<PathBuf>,

    /// Firefox profiles directory to search instead of the platform default
    #[arg(long)]
    pub profiles_root: Option<PathBuf>,

    /// Keep snapshots and recovered stores in the working directory
    #[arg(long)]
    pub keep_working_files: bool,

    /// Do not print records to stdout
    #[arg(short, long)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
