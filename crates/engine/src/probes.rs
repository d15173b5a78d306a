//! Data-driven method probes.
//!
//! Many normative rules reduce to "issue one method against one kind of
//! resource and compare the status code". Those run as table entries through
//! a single routine instead of one hand-written function each; only the
//! genuinely stateful rules (lifecycles, round-trips) keep dedicated bodies.

use crate::checks::{merge, resolve_role_child};
use crate::Sut;
use conformance_ledger::{NoteChannel, VerdictLedger};
use conformance_types::{AssertionId, Status};
use reqwest::Method;

/// Which resource(s) a probe is issued against.
#[derive(Debug, Clone, Copy)]
pub enum ProbeTarget {
    /// The service root URL.
    ServiceRoot,
    /// Every URI in the non-member catalog.
    EachNonMember,
    /// A child link inside a top-level role's payload, e.g. the Accounts
    /// collection inside AccountService.
    RoleChild {
        role: &'static str,
        child: &'static str,
    },
    /// The first discovered resource collection.
    FirstCollection,
    /// A deliberately unknown path under the service root.
    UnknownResource,
}

/// Credential mode for a probe.
#[derive(Debug, Clone, Copy)]
pub enum ProbeAuth {
    Basic,
    None,
    BadBasic,
}

/// One table-driven check: method, target, and the statuses that satisfy it.
pub struct MethodProbe {
    pub id: &'static str,
    pub method: &'static str,
    pub target: ProbeTarget,
    pub auth: ProbeAuth,
    /// Statuses that satisfy the rule outright.
    pub accept: &'static [u16],
    /// Statuses recorded PASS with an explanatory note.
    pub tolerate: &'static [u16],
}

impl MethodProbe {
    fn method(&self) -> Method {
        Method::from_bytes(self.method.as_bytes()).unwrap_or(Method::GET)
    }

    fn auth(&self, _sut: &Sut) -> conformance_client::Auth {
        match self.auth {
            ProbeAuth::Basic => conformance_client::Auth::Basic,
            ProbeAuth::None => conformance_client::Auth::None,
            ProbeAuth::BadBasic => conformance_client::Auth::BasicOverride {
                username: "conformance-invalid".to_string(),
                password: "conformance-invalid".to_string(),
            },
        }
    }
}

async fn resolve_targets(sut: &Sut, target: ProbeTarget) -> Option<Vec<(String, String)>> {
    match target {
        ProbeTarget::ServiceRoot => Some(vec![(
            "ServiceRoot".to_string(),
            sut.config.service_root_url(),
        )]),
        ProbeTarget::EachNonMember => Some(
            sut.catalog
                .non_member_uris()
                .iter()
                .map(|(name, url)| (name.clone(), url.clone()))
                .collect(),
        ),
        ProbeTarget::RoleChild { role, child } => resolve_role_child(sut, role, child)
            .await
            .map(|url| vec![(format!("{role}/{child}"), url)]),
        ProbeTarget::FirstCollection => sut
            .catalog
            .collection_uris()
            .iter()
            .next()
            .map(|(name, url)| vec![(name.clone(), url.clone())]),
        ProbeTarget::UnknownResource => Some(vec![(
            "UnknownResource".to_string(),
            format!(
                "{}ThisResourceDoesNotExist",
                sut.config.service_root_url()
            ),
        )]),
    }
}

/// Runs one table entry: begin, issue the method against each target,
/// classify each status, finish with the combined verdict.
pub async fn run_probe(sut: &Sut, ledger: &mut VerdictLedger, probe: &MethodProbe) {
    let id = AssertionId::new(probe.id);
    ledger.begin(&id);

    let targets = match resolve_targets(sut, probe.target).await {
        Some(targets) if !targets.is_empty() => targets,
        _ => {
            ledger.note(
                NoteChannel::ConsoleAndText,
                "prerequisite resource is not exposed by this service; not verified",
            );
            ledger.note(NoteChannel::TabularComment, "prerequisite resource absent");
            ledger.finish(&id, Status::Warn);
            return;
        }
    };

    let mut aggregate = Status::Pass;
    for (name, url) in targets {
        let response = match sut
            .client
            .request(probe.method(), &url, &[], None, probe.auth(sut))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                aggregate = merge(
                    ledger,
                    aggregate,
                    Status::Warn,
                    &format!("{name}: request could not be issued ({e})"),
                );
                continue;
            }
        };

        let observed = match response.status_u16() {
            None => {
                aggregate = merge(
                    ledger,
                    aggregate,
                    Status::Warn,
                    &format!("{name}: no usable response ({})", response.raw),
                );
                continue;
            }
            Some(code) => code,
        };

        if probe.accept.contains(&observed) {
            continue;
        }
        if probe.tolerate.contains(&observed) {
            ledger.note(
                NoteChannel::TabularComment,
                &format!("{name}: {} {url} answered {observed} (tolerated)", probe.method),
            );
            continue;
        }
        aggregate = merge(
            ledger,
            aggregate,
            Status::Fail,
            &format!(
                "{name}: {} {url} answered {observed}, expected one of {:?}",
                probe.method, probe.accept
            ),
        );
    }

    ledger.finish(&id, aggregate);
}
