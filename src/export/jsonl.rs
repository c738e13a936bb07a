use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::browser::{BrowserKind, HistoryRecord};
use crate::export::{ExportError, RecordSink};

pub struct JsonlSink {
    kind: BrowserKind,
    writer: BufWriter<File>,
}

#[derive(Serialize)]
struct HistoryJsonl<'a> {
    browser: BrowserKind,
    #[serde(flatten)]
    record: &'a HistoryRecord,
}

impl JsonlSink {
    pub fn create(path: &Path, kind: BrowserKind) -> Result<Self, ExportError> {
        let file = File::create(path)?;
        Ok(Self {
            kind,
            writer: BufWriter::new(file),
        })
    }
}

impl RecordSink for JsonlSink {
    fn record(&mut self, record: &HistoryRecord) -> Result<(), ExportError> {
        let line = HistoryJsonl {
            browser: self.kind,
            record,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}
