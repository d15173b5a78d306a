//! Verdict ledger: per-SUT assertion bookkeeping and report sinks.
//!
//! One `VerdictLedger` instance is constructed per SUT run and passed by
//! mutable reference into every check; there is no process-wide singleton.
//! Sink I/O failures never fail the calling check: the ledger degrades to the
//! console mirror and keeps going.

pub mod descriptions;
mod report;
mod sinks;

pub use report::{AssertionRecord, RunReport, Tally};
pub use sinks::{BufferTextSink, CsvTabularSink, FileTextSink, TabularSink, TextSink};

use chrono::{DateTime, Utc};
use conformance_types::{AssertionId, Status};
use std::collections::BTreeMap;

/// Destination of a ledger note.
///
/// Explicit variants replace the string control codes of older tooling; each
/// routes to a fixed set of sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteChannel {
    /// Console mirror plus the text log.
    ConsoleAndText,
    /// Text log only.
    TextOnly,
    /// Comment cell of the current assertion's tabular row.
    TabularComment,
    /// Header cell of the current assertion's tabular row.
    TabularHeader,
}

#[derive(Debug, PartialEq, Eq)]
enum RunState {
    Open,
    Closed,
}

/// Per-SUT verdict ledger.
///
/// State machine: `Open -> {begin -> notes -> finish}* -> Closed`. Checks are
/// trusted callers; a `finish` without a matching `begin` is a defect in the
/// check, not a condition the ledger defends against.
pub struct VerdictLedger {
    sut_name: String,
    state: RunState,
    current: Option<AssertionId>,
    tally: Tally,
    statuses: BTreeMap<AssertionId, Status>,
    started_at: DateTime<Utc>,
    text: Box<dyn TextSink>,
    tabular: Box<dyn TabularSink>,
}

impl VerdictLedger {
    /// Opens the ledger for one SUT. Entered once per run.
    pub fn open(
        sut_name: impl Into<String>,
        text: Box<dyn TextSink>,
        tabular: Box<dyn TabularSink>,
    ) -> Self {
        let sut_name = sut_name.into();
        let mut ledger = Self {
            sut_name: sut_name.clone(),
            state: RunState::Open,
            current: None,
            tally: Tally::default(),
            statuses: BTreeMap::new(),
            started_at: Utc::now(),
            text,
            tabular,
        };
        ledger.note(
            NoteChannel::ConsoleAndText,
            &format!("conformance run opened for {sut_name}"),
        );
        ledger
    }

    /// Sets the current assertion identity and writes the begin marker.
    pub fn begin(&mut self, id: &AssertionId) {
        debug_assert_eq!(self.state, RunState::Open);
        self.current = Some(id.clone());
        let description = descriptions::description_of(id.as_str()).unwrap_or("(undocumented)");
        self.note(
            NoteChannel::ConsoleAndText,
            &format!("[{id}] {description}"),
        );
        if let Err(e) = self.tabular.append_header(id, description) {
            self.degrade("tabular header", e);
        }
    }

    /// Appends a note to the indicated sink(s). Never fails the caller.
    pub fn note(&mut self, channel: NoteChannel, text: &str) {
        match channel {
            NoteChannel::ConsoleAndText => {
                tracing::info!(sut = %self.sut_name, "{text}");
                if let Err(e) = self.text.line(text) {
                    self.degrade("text log", e);
                }
            }
            NoteChannel::TextOnly => {
                if let Err(e) = self.text.line(text) {
                    self.degrade("text log", e);
                }
            }
            NoteChannel::TabularComment => {
                if let Some(id) = self.current.clone() {
                    if let Err(e) = self.tabular.append_comment(&id, text) {
                        self.degrade("tabular comment", e);
                    }
                }
            }
            NoteChannel::TabularHeader => {
                if let Some(id) = self.current.clone() {
                    if let Err(e) = self.tabular.append_header(&id, text) {
                        self.degrade("tabular header", e);
                    }
                }
            }
        }
    }

    /// Records the final status for an assertion and updates the tally.
    pub fn finish(&mut self, id: &AssertionId, status: Status) {
        debug_assert_eq!(self.state, RunState::Open);
        self.tally.record(status);
        self.statuses.insert(id.clone(), status);
        if let Err(e) = self.tabular.set_status(id, status) {
            self.degrade("tabular status", e);
        }
        self.note(
            NoteChannel::ConsoleAndText,
            &format!("[{id}] finished {status}"),
        );
        self.current = None;
    }

    /// Closes the run: writes the aggregate line, saves the tabular report,
    /// and returns the structured run summary. Terminal.
    pub fn close_run(mut self) -> RunReport {
        self.state = RunState::Closed;
        let report = RunReport::new(
            self.sut_name.clone(),
            self.started_at,
            self.tally,
            &self.statuses,
        );
        self.note(NoteChannel::ConsoleAndText, &report.summary_line());
        if let Err(e) = self.tabular.save() {
            self.degrade("tabular save", e);
        }
        report
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    /// Identity set by the last `begin`, if a check is in progress.
    pub fn current(&self) -> Option<&AssertionId> {
        self.current.as_ref()
    }

    fn degrade(&self, sink: &str, e: std::io::Error) {
        // The run continues on console output alone.
        tracing::warn!(sut = %self.sut_name, sink, error = %e, "report sink write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FailingTextSink;

    impl TextSink for FailingTextSink {
        fn line(&mut self, _text: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    fn csv_sink(dir: &tempfile::TempDir) -> Box<CsvTabularSink> {
        Box::new(CsvTabularSink::new(dir.path().join("report.csv")))
    }

    #[test]
    fn begin_note_finish_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = VerdictLedger::open(
            "bmc-1",
            Box::new(BufferTextSink::default()),
            csv_sink(&dir),
        );
        let id = AssertionId::new("6.1.1");
        ledger.begin(&id);
        assert_eq!(ledger.current(), Some(&id));
        ledger.note(NoteChannel::TabularComment, "value mismatch");
        ledger.finish(&id, Status::Fail);
        assert_eq!(ledger.current(), None);
        assert_eq!(ledger.tally().failed, 1);

        let report = ledger.close_run();
        assert_eq!(report.status_of("6.1.1"), Some(Status::Fail));
        assert_eq!(report.tally.failed, 1);
    }

    #[test]
    fn incomplete_counts_with_pass() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = VerdictLedger::open(
            "bmc-1",
            Box::new(BufferTextSink::default()),
            csv_sink(&dir),
        );
        ledger.begin(&AssertionId::new("6.1.1"));
        ledger.finish(&AssertionId::new("6.1.1"), Status::Pass);
        ledger.begin(&AssertionId::new("6.1.2"));
        ledger.finish(&AssertionId::new("6.1.2"), Status::Incomplete);
        assert_eq!(ledger.tally().passed, 2);
    }

    #[test]
    fn sink_failure_does_not_fail_the_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = VerdictLedger::open("bmc-1", Box::new(FailingTextSink), csv_sink(&dir));
        let id = AssertionId::new("9.1.1");
        ledger.begin(&id);
        ledger.note(NoteChannel::TextOnly, "still running");
        ledger.finish(&id, Status::Warn);
        let report = ledger.close_run();
        assert_eq!(report.status_of("9.1.1"), Some(Status::Warn));
    }
}
