//! Report sinks: append-only text log and tabular per-assertion report.

use crate::descriptions::ASSERTION_DESCRIPTIONS;
use conformance_types::{AssertionId, Status};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only log line writer. The console mirror is applied by the ledger,
/// not the sink.
pub trait TextSink: Send {
    fn line(&mut self, text: &str) -> io::Result<()>;
}

/// Tabular report: one row per assertion identity.
pub trait TabularSink: Send {
    /// Row position for an identity. Deterministic within a run: rows are
    /// pre-built from the description table and never reordered.
    fn row_index(&self, id: &AssertionId) -> Option<usize>;
    fn set_status(&mut self, id: &AssertionId, status: Status) -> io::Result<()>;
    fn append_comment(&mut self, id: &AssertionId, text: &str) -> io::Result<()>;
    fn append_header(&mut self, id: &AssertionId, text: &str) -> io::Result<()>;
    fn save(&mut self) -> io::Result<()>;
}

/// Text sink writing to a file.
pub struct FileTextSink {
    file: File,
}

impl FileTextSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
        })
    }
}

impl TextSink for FileTextSink {
    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.file, "{text}")
    }
}

/// In-memory text sink, used by tests and as the degraded fallback.
#[derive(Default)]
pub struct BufferTextSink {
    pub lines: Vec<String>,
}

impl TextSink for BufferTextSink {
    fn line(&mut self, text: &str) -> io::Result<()> {
        self.lines.push(text.to_string());
        Ok(())
    }
}

struct Row {
    id: String,
    description: &'static str,
    status: Option<Status>,
    header: String,
    comment: String,
}

/// Tabular sink rendered as CSV on save.
///
/// Rows are pre-built from the assertion description table, so `row_index`
/// is stable for every identity across the whole run.
pub struct CsvTabularSink {
    path: PathBuf,
    rows: Vec<Row>,
}

impl CsvTabularSink {
    pub fn new(path: PathBuf) -> Self {
        let rows = ASSERTION_DESCRIPTIONS
            .iter()
            .map(|(id, description)| Row {
                id: (*id).to_string(),
                description,
                status: None,
                header: String::new(),
                comment: String::new(),
            })
            .collect();
        Self { path, rows }
    }

    fn row_mut(&mut self, id: &AssertionId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|row| row.id == id.as_str())
    }

    /// Final status recorded for an identity, if any. Used by tests and the
    /// run report.
    pub fn status_of(&self, id: &AssertionId) -> Option<Status> {
        self.rows
            .iter()
            .find(|row| row.id == id.as_str())
            .and_then(|row| row.status)
    }
}

fn csv_escape(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

impl TabularSink for CsvTabularSink {
    fn row_index(&self, id: &AssertionId) -> Option<usize> {
        self.rows.iter().position(|row| row.id == id.as_str())
    }

    fn set_status(&mut self, id: &AssertionId, status: Status) -> io::Result<()> {
        if let Some(row) = self.row_mut(id) {
            row.status = Some(status);
        } else {
            tracing::warn!(id = %id, "assertion identity not in description table");
        }
        Ok(())
    }

    fn append_comment(&mut self, id: &AssertionId, text: &str) -> io::Result<()> {
        if let Some(row) = self.row_mut(id) {
            if !row.comment.is_empty() {
                row.comment.push_str("; ");
            }
            row.comment.push_str(text);
        }
        Ok(())
    }

    fn append_header(&mut self, id: &AssertionId, text: &str) -> io::Result<()> {
        if let Some(row) = self.row_mut(id) {
            if !row.header.is_empty() {
                row.header.push_str("; ");
            }
            row.header.push_str(text);
        }
        Ok(())
    }

    fn save(&mut self) -> io::Result<()> {
        let mut file = File::create(&self.path)?;
        writeln!(file, "assertion,description,status,header,comment")?;
        for row in &self.rows {
            writeln!(
                file,
                "{},{},{},{},{}",
                csv_escape(&row.id),
                csv_escape(row.description),
                csv_escape(row.status.map(|s| s.label()).unwrap_or("")),
                csv_escape(&row.header),
                csv_escape(&row.comment),
            )?;
        }
        Ok(())
    }
}
