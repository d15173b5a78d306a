//! Assertion identities.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Dotted numeric identity of a normative rule, e.g. `"6.4.23"`.
///
/// Keys into the report sink's description table and the per-run status
/// ledger. Ordering is numeric per segment, so `"6.10.1"` sorts after
/// `"6.9.1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssertionId(String);

impl AssertionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading segment, used to group assertions by specification section.
    pub fn section(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    fn segments(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.split('.').map(|s| s.parse::<u64>().unwrap_or(0))
    }
}

impl PartialOrd for AssertionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AssertionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments()
            .cmp(other.segments())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl std::fmt::Display for AssertionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssertionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
