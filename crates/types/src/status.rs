//! Verdict status lattice.

use serde::{Deserialize, Serialize};

/// Outcome of an assertion or sub-verdict.
///
/// Ordered by severity: `Pass < Incomplete < Warn < Fail`. `Incomplete` is a
/// legacy alias of `Pass` for tallying purposes, but it sorts above `Pass` so
/// that an incomplete observation wins over a clean one when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The observed behavior matches the normative rule.
    Pass,
    /// The rule could not be fully evaluated (counted with Pass in the tally).
    Incomplete,
    /// A non-blocking deviation, or a prerequisite was unavailable.
    Warn,
    /// The observed behavior violates the normative rule.
    Fail,
}

impl Status {
    /// Joins two sub-verdicts, keeping the more severe one.
    ///
    /// This is a lattice join with `Pass` as bottom and `Fail` as top, so it
    /// is associative, commutative, and idempotent. It is the only mechanism
    /// checks use to merge sub-verdicts.
    pub fn combine(self, other: Status) -> Status {
        self.max(other)
    }

    /// Upper-case label used in report rows and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Incomplete => "INCOMPLETE",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
        }
    }

    /// True for the statuses counted in the passing bucket of the tally.
    pub fn counts_as_pass(&self) -> bool {
        matches!(self, Status::Pass | Status::Incomplete)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
