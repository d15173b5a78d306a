//! Check groups, ordered the way the run executes them.

pub mod data_model;
pub mod protocol;
pub mod security;
pub mod service;

use crate::Sut;
use conformance_client::{Auth, Response};
use conformance_ledger::{NoteChannel, VerdictLedger};
use conformance_types::{AssertionId, Status};
use serde_json::Value;

/// Merges a sub-verdict into the running aggregate, logging the explanation
/// for every non-PASS observation to both the text log and the tabular
/// comment cell.
pub(crate) fn merge(
    ledger: &mut VerdictLedger,
    aggregate: Status,
    observed: Status,
    explanation: &str,
) -> Status {
    if observed != Status::Pass {
        ledger.note(NoteChannel::ConsoleAndText, explanation);
        ledger.note(NoteChannel::TabularComment, explanation);
    }
    aggregate.combine(observed)
}

/// Records a WARN early-return for a check whose prerequisite resource role
/// is not exposed by this service. Absence of an optional resource is not a
/// violation.
pub(crate) fn warn_missing(ledger: &mut VerdictLedger, id: &AssertionId, what: &str) {
    let text = format!("{what}; not verified");
    ledger.note(NoteChannel::ConsoleAndText, &text);
    ledger.note(NoteChannel::TabularComment, &text);
    ledger.finish(id, Status::Warn);
}

/// GETs a URL for a check body; a client-level error (not transport) is
/// recorded as WARN and `None` is returned so the caller can exit early.
pub(crate) async fn get_or_warn(
    sut: &Sut,
    ledger: &mut VerdictLedger,
    id: &AssertionId,
    url: &str,
    auth: Auth,
) -> Option<Response> {
    match sut.client.get(url, auth).await {
        Ok(response) => Some(response),
        Err(e) => {
            warn_missing(ledger, id, &format!("GET {url} could not be issued ({e})"));
            None
        }
    }
}

/// Resolves the URL of a child link inside a top-level role's payload, e.g.
/// the Accounts collection inside AccountService. `None` when the role is
/// absent, unfetchable, or lacks the link.
pub(crate) async fn resolve_role_child(sut: &Sut, role: &str, child: &str) -> Option<String> {
    let role_url = sut.catalog.role_url(role)?;
    let response = sut.client.get(role_url, Auth::Basic).await.ok()?;
    if !response.is_success() {
        return None;
    }
    response
        .property(child)
        .and_then(|v| v.get("@odata.id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// URL of the session collection: the `Links/Sessions` entry of the service
/// root on most services, the SessionService's `Sessions` link otherwise.
pub(crate) async fn resolve_sessions_url(sut: &Sut) -> Option<String> {
    if let Some(url) = sut.catalog.role_url("Sessions") {
        return Some(url.to_string());
    }
    resolve_role_child(sut, "SessionService", "Sessions").await
}
