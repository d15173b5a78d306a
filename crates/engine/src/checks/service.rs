//! Service behavior checks (section 8): resource creation round-trips,
//! action advertisements, and method support on collections.

use super::{merge, resolve_sessions_url, warn_missing};
use crate::probes::{run_probe, MethodProbe, ProbeAuth, ProbeTarget};
use crate::Sut;
use conformance_client::Auth;
use conformance_ledger::{NoteChannel, VerdictLedger};
use conformance_types::{AssertionId, Status};
use serde_json::{json, Value};

const SERVICE_PROBES: &[MethodProbe] = &[
    // Deleting a whole collection is not a supported operation.
    MethodProbe {
        id: "8.3.1",
        method: "DELETE",
        target: ProbeTarget::FirstCollection,
        auth: ProbeAuth::Basic,
        accept: &[405],
        tolerate: &[400, 401, 403, 501],
    },
    // An unknown resource path answers 404.
    MethodProbe {
        id: "8.4.1",
        method: "GET",
        target: ProbeTarget::UnknownResource,
        auth: ProbeAuth::Basic,
        accept: &[404],
        tolerate: &[],
    },
];

pub async fn run_group(sut: &Sut, ledger: &mut VerdictLedger) {
    check_creation_round_trip(sut, ledger).await;
    check_actions_have_targets(sut, ledger).await;
    for probe in SERVICE_PROBES {
        run_probe(sut, ledger, probe).await;
    }
}

/// 8.1.1 and 8.1.2 as one composite: POST a session to the session
/// collection, then read it back by its Location and verify the service
/// persisted what was sent.
///
/// 8.1.1 covers the creation response itself (status and Location header);
/// 8.1.2 covers the round-trip property comparison. The session is deleted
/// afterwards regardless of the verdicts.
async fn check_creation_round_trip(sut: &Sut, ledger: &mut VerdictLedger) {
    let create_id = AssertionId::new("8.1.1");
    let round_trip_id = AssertionId::new("8.1.2");

    ledger.begin(&create_id);
    let Some(sessions_url) = resolve_sessions_url(sut).await else {
        warn_missing(ledger, &create_id, "the service exposes no session collection");
        ledger.begin(&round_trip_id);
        warn_missing(ledger, &round_trip_id, "the service exposes no session collection");
        return;
    };

    let request_body = json!({
        "UserName": sut.config.username,
        "Password": sut.config.password,
    });
    let created = match sut.client.post(&sessions_url, &request_body, Auth::None).await {
        Ok(response) => response,
        Err(e) => {
            warn_missing(
                ledger,
                &create_id,
                &format!("POST {sessions_url} could not be issued ({e})"),
            );
            ledger.begin(&round_trip_id);
            warn_missing(ledger, &round_trip_id, "no session was created");
            return;
        }
    };

    let mut create_status = Status::Pass;
    match created.status_u16() {
        None => {
            create_status = merge(
                ledger,
                create_status,
                Status::Warn,
                &format!("no usable response from POST {sessions_url}"),
            );
        }
        Some(201) => {}
        Some(200) => {
            ledger.note(
                NoteChannel::TabularComment,
                "session creation answered 200, expected 201",
            );
        }
        Some(code) => {
            create_status = merge(
                ledger,
                create_status,
                Status::Fail,
                &format!("POST {sessions_url} answered {code}, expected 201"),
            );
        }
    }

    let location = created.header("Location").map(str::to_string);
    if created.is_success() && location.is_none() {
        create_status = merge(
            ledger,
            create_status,
            Status::Fail,
            "session creation response carries no Location header",
        );
    }
    ledger.finish(&create_id, create_status);

    // 8.1.2: read the created resource back and compare.
    ledger.begin(&round_trip_id);
    let Some(location) = location else {
        warn_missing(ledger, &round_trip_id, "no created resource to read back");
        return;
    };
    let token = created.header("X-Auth-Token").map(str::to_string);
    let read_auth = match &token {
        Some(token) => Auth::Session(token.clone()),
        None => Auth::Basic,
    };

    let mut status = Status::Pass;
    match sut.client.get(&location, read_auth).await {
        Ok(read_back) if read_back.is_success() => {
            if let Value::Object(sent) = &request_body {
                for (key, sent_value) in sent {
                    // Write-only credential; never echoed back.
                    if key == "Password" {
                        continue;
                    }
                    match read_back.property(key) {
                        Some(got) if got == sent_value => {}
                        Some(got) => {
                            status = merge(
                                ledger,
                                status,
                                Status::Fail,
                                &format!(
                                    "created session reports {key} = {got}, request sent {sent_value}"
                                ),
                            );
                        }
                        None => {
                            status = merge(
                                ledger,
                                status,
                                Status::Fail,
                                &format!("created session payload lacks the {key} property"),
                            );
                        }
                    }
                }
            }
        }
        Ok(read_back) => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!(
                    "GET {location} answered {:?}, round-trip not verified",
                    read_back.status_u16()
                ),
            );
        }
        Err(e) => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("GET {location} could not be issued ({e})"),
            );
        }
    }
    ledger.finish(&round_trip_id, status);

    // Cleanup only; the outcome does not affect either verdict.
    let cleanup_auth = match token {
        Some(token) => Auth::Session(token),
        None => Auth::Basic,
    };
    if let Err(e) = sut.client.delete(&location, cleanup_auth).await {
        tracing::warn!(url = %location, error = %e, "session cleanup failed");
    }
}

/// 8.2.1: every advertised action (a `#Namespace.Action` key under Actions)
/// carries a `target` URL.
async fn check_actions_have_targets(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("8.2.1");
    ledger.begin(&id);

    let targets: Vec<(String, String)> = sut
        .catalog
        .non_member_uris()
        .iter()
        .map(|(name, url)| (name.clone(), url.clone()))
        .collect();

    let mut status = Status::Pass;
    let mut advertised = 0usize;
    for (name, url) in targets {
        let response = match sut.client.get(&url, Auth::Basic).await {
            Ok(response) => response,
            Err(_) => continue,
        };
        let Some(Value::Object(actions)) = response.property("Actions") else {
            continue;
        };
        for (key, body) in actions {
            if !key.starts_with('#') {
                continue;
            }
            advertised += 1;
            if body.get("target").and_then(Value::as_str).is_none() {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("{name}: action {key} of {url} has no target URL"),
                );
            }
        }
    }
    if advertised == 0 {
        ledger.note(
            NoteChannel::TabularComment,
            "no actions advertised by any resource",
        );
    }
    ledger.finish(&id, status);
}
