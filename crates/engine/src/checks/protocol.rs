//! Protocol and transport checks (section 6).

use super::{get_or_warn, merge, resolve_role_child, warn_missing};
use crate::probes::{run_probe, MethodProbe, ProbeAuth, ProbeTarget};
use crate::Sut;
use conformance_catalog::{MemberIter, MemberSource};
use conformance_client::Auth;
use conformance_ledger::{NoteChannel, VerdictLedger};
use conformance_types::{AssertionId, Status};
use serde_json::Value;

const PROTOCOL_PROBES: &[MethodProbe] = &[
    MethodProbe {
        id: "6.2.1",
        method: "GET",
        target: ProbeTarget::EachNonMember,
        auth: ProbeAuth::Basic,
        accept: &[200],
        tolerate: &[],
    },
    MethodProbe {
        id: "6.2.2",
        method: "TRACE",
        target: ProbeTarget::ServiceRoot,
        auth: ProbeAuth::Basic,
        accept: &[405, 501],
        tolerate: &[400, 403, 404],
    },
];

pub async fn run_group(sut: &Sut, ledger: &mut VerdictLedger) {
    check_protocol_version(sut, ledger).await;
    check_service_root_unauthenticated(sut, ledger).await;
    check_odata_service_document(sut, ledger).await;
    check_metadata_document(sut, ledger).await;
    for probe in PROTOCOL_PROBES {
        run_probe(sut, ledger, probe).await;
    }
    check_head_mirrors_get(sut, ledger).await;
    check_odata_version_rejection(sut, ledger).await;
    check_accept_negotiation(sut, ledger).await;
    check_allow_header(sut, ledger).await;
    check_account_etag(sut, ledger).await;
    check_conditional_get(sut, ledger).await;
}

/// 6.1.1: GET /redfish shall return the protocol version body.
async fn check_protocol_version(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.1.1");
    ledger.begin(&id);

    let url = sut.config.version_url();
    let Some(response) = get_or_warn(sut, ledger, &id, &url, Auth::None).await else {
        return;
    };
    if response.is_transport_failure() {
        warn_missing(ledger, &id, &format!("no usable response from {url}"));
        return;
    }

    let mut status = Status::Pass;
    if !response.is_ok() {
        status = merge(
            ledger,
            status,
            Status::Fail,
            &format!(
                "GET {url} answered {:?}, expected 200",
                response.status_u16()
            ),
        );
    }
    match response.property("v1").and_then(Value::as_str) {
        Some("/redfish/v1/") => {}
        Some(other) => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("GET {url} returned v1 = {other:?}, expected \"/redfish/v1/\""),
            );
        }
        None => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("GET {url} body lacks the v1 key"),
            );
        }
    }
    ledger.finish(&id, status);
}

/// 6.1.2: the service root shall be retrievable without authentication.
async fn check_service_root_unauthenticated(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.1.2");
    ledger.begin(&id);

    let url = sut.config.service_root_url();
    let Some(response) = get_or_warn(sut, ledger, &id, &url, Auth::None).await else {
        return;
    };

    let mut status = Status::Pass;
    match response.status_u16() {
        None => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("no usable response from {url}"),
            );
        }
        Some(200) => {
            if !matches!(response.payload, Some(Value::Object(_))) {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("{url} did not return a JSON object"),
                );
            }
        }
        Some(code) => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("unauthenticated GET {url} answered {code}, expected 200"),
            );
        }
    }
    ledger.finish(&id, status);
}

/// 6.1.3: the OData service document shall list the top-level services.
async fn check_odata_service_document(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.1.3");
    ledger.begin(&id);

    let url = sut.config.odata_document_url();
    let Some(response) = get_or_warn(sut, ledger, &id, &url, Auth::Basic).await else {
        return;
    };
    if response.is_transport_failure() {
        warn_missing(ledger, &id, &format!("no usable response from {url}"));
        return;
    }

    let mut status = Status::Pass;
    if !response.is_ok() {
        status = merge(
            ledger,
            status,
            Status::Fail,
            &format!(
                "GET {url} answered {:?}, expected 200",
                response.status_u16()
            ),
        );
        ledger.finish(&id, status);
        return;
    }

    match response.property("value").and_then(Value::as_array) {
        Some(entries) if !entries.is_empty() => {
            for entry in entries {
                if entry.get("url").is_none() {
                    status = merge(
                        ledger,
                        status,
                        Status::Fail,
                        &format!("service document entry without url: {entry}"),
                    );
                }
            }
        }
        Some(_) => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("{url} value array is empty"),
            );
        }
        None => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("{url} body lacks the value array"),
            );
        }
    }
    ledger.finish(&id, status);
}

/// 6.1.4: the metadata document shall be served as an XML CSDL document.
async fn check_metadata_document(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.1.4");
    ledger.begin(&id);

    let url = sut.config.metadata_document_url();
    let response = match sut
        .client
        .request(
            reqwest::Method::GET,
            &url,
            &[("accept", "application/xml")],
            None,
            Auth::Basic,
        )
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn_missing(ledger, &id, &format!("GET {url} could not be issued ({e})"));
            return;
        }
    };
    if response.is_transport_failure() {
        warn_missing(ledger, &id, &format!("no usable response from {url}"));
        return;
    }

    let mut status = Status::Pass;
    if !response.is_ok() {
        status = merge(
            ledger,
            status,
            Status::Fail,
            &format!(
                "GET {url} answered {:?}, expected 200",
                response.status_u16()
            ),
        );
    }
    let content_type = response.header("content-type").unwrap_or("");
    if !content_type.contains("xml") {
        status = merge(
            ledger,
            status,
            Status::Fail,
            &format!("{url} served content-type {content_type:?}, expected an XML type"),
        );
    }
    if !response.raw.contains("Edmx") {
        status = merge(
            ledger,
            status,
            Status::Fail,
            &format!("{url} body does not look like a CSDL Edmx document"),
        );
    }
    ledger.finish(&id, status);
}

/// 6.2.3: HEAD on the service root mirrors GET headers with an empty body.
async fn check_head_mirrors_get(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.2.3");
    ledger.begin(&id);

    let url = sut.config.service_root_url();
    let response = match sut.client.head(&url, Auth::Basic).await {
        Ok(response) => response,
        Err(e) => {
            warn_missing(ledger, &id, &format!("HEAD {url} could not be issued ({e})"));
            return;
        }
    };

    let mut status = Status::Pass;
    match response.status_u16() {
        None => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("no usable response from HEAD {url}"),
            );
        }
        Some(405) | Some(501) => {
            // HEAD support is recommended, not required.
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("HEAD {url} is not supported"),
            );
        }
        Some(200) => {
            if !response.raw.is_empty() {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("HEAD {url} returned a message body"),
                );
            }
        }
        Some(code) => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("HEAD {url} answered {code}, expected 200"),
            );
        }
    }
    ledger.finish(&id, status);
}

/// 6.3.1: an unsupported OData-Version request header shall be rejected.
///
/// Mandatory rejection is ambiguous in the governing text, so acceptance is
/// recorded WARN rather than FAIL.
async fn check_odata_version_rejection(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.3.1");
    ledger.begin(&id);

    let url = sut.config.service_root_url();
    let response = match sut
        .client
        .request(
            reqwest::Method::GET,
            &url,
            &[("odata-version", "3.0")],
            None,
            Auth::Basic,
        )
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn_missing(ledger, &id, &format!("GET {url} could not be issued ({e})"));
            return;
        }
    };

    let mut status = Status::Pass;
    match response.status_u16() {
        None => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("no usable response from {url}"),
            );
        }
        Some(412) => {}
        Some(code) if (400..600).contains(&code) => {
            ledger.note(
                NoteChannel::TabularComment,
                &format!("OData-Version: 3.0 rejected with {code} rather than 412"),
            );
        }
        Some(code) => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("service answered {code} and ignored the unsupported OData-Version header"),
            );
        }
    }
    ledger.finish(&id, status);
}

/// 6.3.2: Accept negotiation for a non-JSON media type yields 406 or a valid
/// 200.
async fn check_accept_negotiation(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.3.2");
    ledger.begin(&id);

    let url = sut.config.service_root_url();
    let response = match sut
        .client
        .request(
            reqwest::Method::GET,
            &url,
            &[("accept", "application/xml")],
            None,
            Auth::Basic,
        )
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn_missing(ledger, &id, &format!("GET {url} could not be issued ({e})"));
            return;
        }
    };

    let mut status = Status::Pass;
    match response.status_u16() {
        None => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("no usable response from {url}"),
            );
        }
        Some(406) => {}
        Some(200) => {
            ledger.note(
                NoteChannel::TabularComment,
                "service chose to serve a representation despite Accept: application/xml",
            );
        }
        Some(code) => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("GET {url} with Accept: application/xml answered {code}, expected 406 or 200"),
            );
        }
    }
    ledger.finish(&id, status);
}

/// 6.4.1: the Allow header on GET responses names the supported methods.
async fn check_allow_header(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.4.1");
    ledger.begin(&id);

    let mut status = Status::Pass;
    let targets: Vec<(String, String)> = sut
        .catalog
        .non_member_uris()
        .iter()
        .map(|(name, url)| (name.clone(), url.clone()))
        .collect();

    for (name, url) in targets {
        let response = match sut.client.get(&url, Auth::Basic).await {
            Ok(response) => response,
            Err(e) => {
                status = merge(
                    ledger,
                    status,
                    Status::Warn,
                    &format!("{name}: GET could not be issued ({e})"),
                );
                continue;
            }
        };
        if response.is_transport_failure() {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("{name}: no usable response"),
            );
            continue;
        }
        match response.header("allow") {
            Some(allow) if allow.to_ascii_uppercase().contains("GET") => {}
            Some(allow) => {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("{name}: Allow header {allow:?} does not name GET"),
                );
            }
            None => {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("{name}: no Allow header on GET {url}"),
                );
            }
        }
    }
    ledger.finish(&id, status);
}

/// Fetches the first manager account member, shared by the ETag rules.
async fn first_account(sut: &Sut) -> Option<(String, conformance_client::Response)> {
    let accounts_url = resolve_role_child(sut, "AccountService", "Accounts").await?;
    let collection = sut.client.get(&accounts_url, Auth::Basic).await.ok()?;
    let payload = collection.payload?;
    let mut iter = MemberIter::new(&sut.client, MemberSource::Payload(payload));
    let (member, _headers) = iter.next().await?;
    let url = member.get("@odata.id")?.as_str()?.to_string();
    let response = sut.client.get(&url, Auth::Basic).await.ok()?;
    Some((url, response))
}

/// 6.5.1: manager account resources carry an ETag on GET.
async fn check_account_etag(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.5.1");
    ledger.begin(&id);

    let Some((url, response)) = first_account(sut).await else {
        warn_missing(ledger, &id, "no manager account was reachable");
        return;
    };

    let status = if response.header("etag").is_some() {
        Status::Pass
    } else {
        merge(
            ledger,
            Status::Pass,
            Status::Fail,
            &format!("GET {url} returned no ETag header"),
        )
    };
    ledger.finish(&id, status);
}

/// 6.5.2: conditional GET with the current ETag yields 304.
async fn check_conditional_get(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("6.5.2");
    ledger.begin(&id);

    let Some((url, response)) = first_account(sut).await else {
        warn_missing(ledger, &id, "no manager account was reachable");
        return;
    };
    let Some(etag) = response.header("etag").map(str::to_string) else {
        warn_missing(ledger, &id, &format!("GET {url} returned no ETag to condition on"));
        return;
    };

    let conditional = match sut
        .client
        .request(
            reqwest::Method::GET,
            &url,
            &[("if-none-match", etag.as_str())],
            None,
            Auth::Basic,
        )
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn_missing(ledger, &id, &format!("conditional GET {url} could not be issued ({e})"));
            return;
        }
    };

    let mut status = Status::Pass;
    match conditional.status_u16() {
        None => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("no usable response from conditional GET {url}"),
            );
        }
        Some(304) => {}
        Some(200) => {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("conditional GET {url} re-served the full representation"),
            );
        }
        Some(code) => {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("conditional GET {url} answered {code}, expected 304"),
            );
        }
    }
    ledger.finish(&id, status);
}
