//! Security checks (section 9): authentication enforcement, session token
//! lifecycle, and the manager account lifecycle.
//!
//! The lifecycle clusters are order-dependent composites. Each stage records
//! its own verdict, but later stages depend on side effects of earlier ones
//! on the real SUT; when a prerequisite stage fails, the dependent stages
//! record WARN rather than exercising an account that was never created.

use super::{merge, resolve_role_child, resolve_sessions_url, warn_missing};
use crate::probes::{run_probe, MethodProbe, ProbeAuth, ProbeTarget};
use crate::Sut;
use conformance_client::{Auth, Response};
use conformance_ledger::{NoteChannel, VerdictLedger};
use conformance_types::{AssertionId, Status};
use serde_json::{json, Value};

const SECURITY_PROBES: &[MethodProbe] = &[
    // Credentials are required to read the account collection.
    MethodProbe {
        id: "9.1.1",
        method: "GET",
        target: ProbeTarget::RoleChild {
            role: "AccountService",
            child: "Accounts",
        },
        auth: ProbeAuth::None,
        accept: &[401, 403],
        tolerate: &[],
    },
    // Wrong credentials are rejected, not silently accepted.
    MethodProbe {
        id: "9.1.2",
        method: "GET",
        target: ProbeTarget::RoleChild {
            role: "AccountService",
            child: "Accounts",
        },
        auth: ProbeAuth::BadBasic,
        accept: &[401],
        tolerate: &[403],
    },
];

pub async fn run_group(sut: &Sut, ledger: &mut VerdictLedger) {
    for probe in SECURITY_PROBES {
        run_probe(sut, ledger, probe).await;
    }
    check_session_lifecycle(sut, ledger).await;
    check_account_lifecycle(sut, ledger).await;
}

fn warn_chain(ledger: &mut VerdictLedger, ids: &[&AssertionId], what: &str) {
    for id in ids {
        ledger.begin(id);
        warn_missing(ledger, id, what);
    }
}

/// 9.2.1 through 9.2.3: create a session, prove the token authorizes
/// requests, delete the session, prove the token stops working.
async fn check_session_lifecycle(sut: &Sut, ledger: &mut VerdictLedger) {
    let create_id = AssertionId::new("9.2.1");
    let authorize_id = AssertionId::new("9.2.2");
    let revoke_id = AssertionId::new("9.2.3");

    let Some(sessions_url) = resolve_sessions_url(sut).await else {
        warn_chain(
            ledger,
            &[&create_id, &authorize_id, &revoke_id],
            "the service exposes no session collection",
        );
        return;
    };

    // 9.2.1: the creation response carries a token and a session URL.
    ledger.begin(&create_id);
    let body = json!({
        "UserName": sut.config.username,
        "Password": sut.config.password,
    });
    let created = match sut.client.post(&sessions_url, &body, Auth::None).await {
        Ok(response) => response,
        Err(e) => {
            warn_missing(
                ledger,
                &create_id,
                &format!("POST {sessions_url} could not be issued ({e})"),
            );
            warn_chain(ledger, &[&authorize_id, &revoke_id], "no session was created");
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
        Some(code) if !created.is_success() => {
            create_status = merge(
                ledger,
                create_status,
                Status::Fail,
                &format!("POST {sessions_url} answered {code}, expected 201"),
            );
        }
        Some(_) => {}
    }
    let token = created.header("X-Auth-Token").map(str::to_string);
    let location = created.header("Location").map(str::to_string);
    if created.is_success() && token.is_none() {
        create_status = merge(
            ledger,
            create_status,
            Status::Fail,
            "session creation response carries no X-Auth-Token header",
        );
    }
    if created.is_success() && location.is_none() {
        create_status = merge(
            ledger,
            create_status,
            Status::Fail,
            "session creation response carries no Location header",
        );
    }
    ledger.finish(&create_id, create_status);

    let (Some(token), Some(location)) = (token, location) else {
        warn_chain(
            ledger,
            &[&authorize_id, &revoke_id],
            "no session token was obtained",
        );
        return;
    };

    // 9.2.2: the token alone authorizes an authenticated read.
    ledger.begin(&authorize_id);
    let mut authorize_status = Status::Pass;
    match sut
        .client
        .get(&sut.config.service_root_url(), Auth::Session(token.clone()))
        .await
    {
        Ok(response) if response.is_success() => {}
        Ok(response) => match response.status_u16() {
            None => {
                authorize_status = merge(
                    ledger,
                    authorize_status,
                    Status::Warn,
                    "no usable response from the token-authenticated GET",
                );
            }
            Some(code) => {
                authorize_status = merge(
                    ledger,
                    authorize_status,
                    Status::Fail,
                    &format!("GET with session token answered {code}, expected success"),
                );
            }
        },
        Err(e) => {
            authorize_status = merge(
                ledger,
                authorize_status,
                Status::Warn,
                &format!("token-authenticated GET could not be issued ({e})"),
            );
        }
    }
    ledger.finish(&authorize_id, authorize_status);

    // 9.2.3: after DELETE, the old token is rejected.
    ledger.begin(&revoke_id);
    let deleted = match sut
        .client
        .delete(&location, Auth::Session(token.clone()))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn_missing(
                ledger,
                &revoke_id,
                &format!("DELETE {location} could not be issued ({e})"),
            );
            return;
        }
    };
    let mut revoke_status = Status::Pass;
    match deleted.status_u16() {
        None => {
            revoke_status = merge(
                ledger,
                revoke_status,
                Status::Warn,
                &format!("no usable response from DELETE {location}"),
            );
            ledger.finish(&revoke_id, revoke_status);
            return;
        }
        Some(code) if !deleted.is_success() => {
            revoke_status = merge(
                ledger,
                revoke_status,
                Status::Fail,
                &format!("DELETE {location} answered {code}, expected success"),
            );
            ledger.finish(&revoke_id, revoke_status);
            return;
        }
        Some(_) => {}
    }
    match sut.client.get(&location, Auth::Session(token)).await {
        Ok(response) => match response.status_u16() {
            Some(401) | Some(403) | Some(404) => {}
            Some(code) => {
                revoke_status = merge(
                    ledger,
                    revoke_status,
                    Status::Fail,
                    &format!("deleted session token still accepted (GET {location} answered {code})"),
                );
            }
            None => {
                revoke_status = merge(
                    ledger,
                    revoke_status,
                    Status::Warn,
                    &format!("no usable response from GET {location}"),
                );
            }
        },
        Err(e) => {
            revoke_status = merge(
                ledger,
                revoke_status,
                Status::Warn,
                &format!("GET {location} could not be issued ({e})"),
            );
        }
    }
    ledger.finish(&revoke_id, revoke_status);
}

/// Side effects of the account lifecycle, threaded through its stages.
struct LifecycleState {
    accounts_url: String,
    account_location: Option<String>,
    user_name: String,
    created: bool,
}

/// 9.3.1 through 9.3.4: create a manager account, find it in the collection,
/// PATCH it, delete it. Strictly ordered; each later stage depends on the
/// account the first stage created.
async fn check_account_lifecycle(sut: &Sut, ledger: &mut VerdictLedger) {
    let create_id = AssertionId::new("9.3.1");
    let list_id = AssertionId::new("9.3.2");
    let patch_id = AssertionId::new("9.3.3");
    let delete_id = AssertionId::new("9.3.4");
    let ids = [&create_id, &list_id, &patch_id, &delete_id];

    if !sut.config.allow_destructive_probes {
        warn_chain(ledger, &ids, "destructive probes are disabled for this SUT");
        return;
    }
    let Some(accounts_url) = resolve_role_child(sut, "AccountService", "Accounts").await else {
        warn_chain(ledger, &ids, "the service exposes no account collection");
        return;
    };

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let mut state = LifecycleState {
        accounts_url,
        account_location: None,
        user_name: format!("cctest-{}", &suffix[..8]),
        created: false,
    };

    lifecycle_create(sut, ledger, &create_id, &mut state).await;
    lifecycle_list(sut, ledger, &list_id, &state).await;
    lifecycle_patch(sut, ledger, &patch_id, &state).await;
    lifecycle_delete(sut, ledger, &delete_id, &mut state).await;

    // Last-resort cleanup if the delete stage did not remove the account.
    if state.created {
        if let Some(location) = &state.account_location {
            if let Err(e) = sut.client.delete(location, Auth::Basic).await {
                tracing::warn!(url = %location, error = %e, "account cleanup failed");
            }
        }
    }
}

/// 9.3.1: POST a new account and verify the creation round-trip.
async fn lifecycle_create(
    sut: &Sut,
    ledger: &mut VerdictLedger,
    id: &AssertionId,
    state: &mut LifecycleState,
) {
    ledger.begin(id);
    let mut status = Status::Pass;

    // The collection must advertise POST before the probe is attempted.
    match sut.client.get(&state.accounts_url, Auth::Basic).await {
        Ok(collection) => {
            if collection.is_transport_failure() {
                warn_missing(
                    ledger,
                    id,
                    &format!("no usable response from GET {}", state.accounts_url),
                );
                return;
            }
            let allow = collection.header("Allow").unwrap_or_default().to_string();
            if !allow
                .split(',')
                .any(|m| m.trim().eq_ignore_ascii_case("POST"))
            {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!(
                        "account collection does not advertise POST (Allow: {allow:?})"
                    ),
                );
                ledger.finish(id, status);
                return;
            }
        }
        Err(e) => {
            warn_missing(
                ledger,
                id,
                &format!("GET {} could not be issued ({e})", state.accounts_url),
            );
            return;
        }
    }

    let request_body = json!({
        "UserName": state.user_name,
        "Password": format!("Cc-{}-Pw1!", state.user_name),
        "RoleId": "ReadOnly",
    });
    let created = match sut
        .client
        .post(&state.accounts_url, &request_body, Auth::Basic)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn_missing(
                ledger,
                id,
                &format!("POST {} could not be issued ({e})", state.accounts_url),
            );
            return;
        }
    };

    match created.status_u16() {
        None => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("no usable response from POST {}", state.accounts_url),
            );
            ledger.finish(id, status);
            return;
        }
        Some(code) if !created.is_success() => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("POST {} answered {code}, expected 201", state.accounts_url),
            );
            ledger.finish(id, status);
            return;
        }
        Some(_) => {}
    }
    state.created = true;
    state.account_location = created
        .header("Location")
        .map(str::to_string)
        .or_else(|| account_url_from_payload(&created));
    let Some(location) = state.account_location.clone() else {
        status = merge(
            ledger,
            status,
            Status::Fail,
            "account creation response carries no Location header",
        );
        ledger.finish(id, status);
        return;
    };

    // Read the account back; every sent property except the credential must
    // be reported with the value the request carried.
    match sut.client.get(&location, Auth::Basic).await {
        Ok(read_back) if read_back.is_success() => {
            if let Value::Object(sent) = &request_body {
                for (key, sent_value) in sent {
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
                                    "created account reports {key} = {got}, request sent {sent_value}"
                                ),
                            );
                        }
                        None => {
                            status = merge(
                                ledger,
                                status,
                                Status::Fail,
                                &format!("created account payload lacks the {key} property"),
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
    ledger.finish(id, status);
}

fn account_url_from_payload(response: &Response) -> Option<String> {
    response
        .property("@odata.id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// 9.3.2: the created account appears in the account collection listing.
async fn lifecycle_list(sut: &Sut, ledger: &mut VerdictLedger, id: &AssertionId, state: &LifecycleState) {
    ledger.begin(id);
    if !state.created {
        warn_missing(ledger, id, "no account was created, listing could not be verified");
        return;
    }

    let mut status = Status::Pass;
    let mut found = false;
    let mut members = conformance_catalog::MemberIter::new(
        &sut.client,
        conformance_catalog::MemberSource::Url(state.accounts_url.clone()),
    );
    while let Some((payload, _)) = members.next().await {
        if payload.get("UserName").and_then(Value::as_str) == Some(state.user_name.as_str()) {
            found = true;
            break;
        }
    }
    if !found {
        status = merge(
            ledger,
            status,
            Status::Fail,
            &format!(
                "created account {} does not appear in the account collection",
                state.user_name
            ),
        );
    }
    ledger.finish(id, status);
}

/// 9.3.3: the created account accepts a PATCH and reports the new value.
async fn lifecycle_patch(sut: &Sut, ledger: &mut VerdictLedger, id: &AssertionId, state: &LifecycleState) {
    ledger.begin(id);
    let Some(location) = state.account_location.as_deref().filter(|_| state.created) else {
        warn_missing(ledger, id, "no account was created, PATCH could not be verified");
        return;
    };

    let mut status = Status::Pass;
    let body = json!({ "Locked": false });
    let patched = match sut.client.patch(location, &body, Auth::Basic).await {
        Ok(response) => response,
        Err(e) => {
            warn_missing(ledger, id, &format!("PATCH {location} could not be issued ({e})"));
            return;
        }
    };
    match patched.status_u16() {
        None => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("no usable response from PATCH {location}"),
            );
            ledger.finish(id, status);
            return;
        }
        Some(code) if !patched.is_success() => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("PATCH {location} answered {code}, expected success"),
            );
            ledger.finish(id, status);
            return;
        }
        Some(_) => {}
    }

    match sut.client.get(location, Auth::Basic).await {
        Ok(read_back) => match read_back.property("Locked").and_then(Value::as_bool) {
            Some(false) => {}
            Some(true) => {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("PATCH {location} was accepted but Locked is still true"),
                );
            }
            None => {
                ledger.note(
                    NoteChannel::TabularComment,
                    "account payload does not report Locked",
                );
            }
        },
        Err(e) => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("verification GET {location} could not be issued ({e})"),
            );
        }
    }
    ledger.finish(id, status);
}

/// 9.3.4: the created account can be deleted and is gone afterwards.
async fn lifecycle_delete(
    sut: &Sut,
    ledger: &mut VerdictLedger,
    id: &AssertionId,
    state: &mut LifecycleState,
) {
    ledger.begin(id);
    let Some(location) = state.account_location.clone().filter(|_| state.created) else {
        warn_missing(ledger, id, "no account was created, DELETE could not be verified");
        return;
    };

    let mut status = Status::Pass;
    let deleted = match sut.client.delete(&location, Auth::Basic).await {
        Ok(response) => response,
        Err(e) => {
            warn_missing(ledger, id, &format!("DELETE {location} could not be issued ({e})"));
            return;
        }
    };
    match deleted.status_u16() {
        None => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("no usable response from DELETE {location}"),
            );
            ledger.finish(id, status);
            return;
        }
        Some(code) if !deleted.is_success() => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("DELETE {location} answered {code}, expected success"),
            );
            ledger.finish(id, status);
            return;
        }
        Some(_) => {}
    }
    state.created = false;

    match sut.client.get(&location, Auth::Basic).await {
        Ok(after) => match after.status_u16() {
            Some(404) => {}
            Some(code) => {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("deleted account still answers {code} (GET {location}), expected 404"),
                );
            }
            None => {
                status = merge(
                    ledger,
                    status,
                    Status::Warn,
                    &format!("no usable response from GET {location}"),
                );
            }
        },
        Err(e) => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("GET {location} could not be issued ({e})"),
            );
        }
    }
    ledger.finish(id, status);
}
