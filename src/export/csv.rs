use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::browser::HistoryRecord;
use crate::export::{ExportError, RecordSink, format_last_visited};

pub struct CsvSink {
    writer: csv::Writer<File>,
}

#[derive(Serialize)]
struct HistoryCsv<'a> {
    title: &'a str,
    url: &'a str,
    last_visited: String,
}

impl CsvSink {
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        let file = File::create(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(["Title", "URL", "Last Visited"])?;
        Ok(Self { writer })
    }
}

impl RecordSink for CsvSink {
    fn record(&mut self, record: &HistoryRecord) -> Result<(), ExportError> {
        let row = HistoryCsv {
            title: &record.title,
            url: &record.url,
            last_visited: format_last_visited(record),
        };
        self.writer.serialize(row)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}
