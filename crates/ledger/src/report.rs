//! JSON run report emitted when the ledger closes.

use crate::descriptions::description_of;
use chrono::{DateTime, Utc};
use conformance_types::{AssertionId, Status};
use serde::Serialize;
use std::collections::BTreeMap;

/// Final status of one assertion in the run.
#[derive(Debug, Clone, Serialize)]
pub struct AssertionRecord {
    pub id: AssertionId,
    pub description: Option<&'static str>,
    pub status: Status,
}

/// Aggregate counts. PASS and INCOMPLETE share the passing bucket.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Tally {
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
}

impl Tally {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pass | Status::Incomplete => self.passed += 1,
            Status::Warn => self.warned += 1,
            Status::Fail => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.warned + self.failed
    }
}

/// Per-SUT run summary.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub sut: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tally: Tally,
    pub assertions: Vec<AssertionRecord>,
}

impl RunReport {
    pub(crate) fn new(
        sut: String,
        started_at: DateTime<Utc>,
        tally: Tally,
        statuses: &BTreeMap<AssertionId, Status>,
    ) -> Self {
        let assertions = statuses
            .iter()
            .map(|(id, status)| AssertionRecord {
                id: id.clone(),
                description: description_of(id.as_str()),
                status: *status,
            })
            .collect();
        Self {
            sut,
            started_at,
            finished_at: Utc::now(),
            tally,
            assertions,
        }
    }

    /// Final status of one assertion, if it ran.
    pub fn status_of(&self, id: &str) -> Option<Status> {
        self.assertions
            .iter()
            .find(|record| record.id.as_str() == id)
            .map(|record| record.status)
    }

    /// One-line aggregate in the historical log format.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} passed, {} warned, {} failed, {} total",
            self.sut,
            self.tally.passed,
            self.tally.warned,
            self.tally.failed,
            self.tally.total()
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
