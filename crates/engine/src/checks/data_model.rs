//! Data model and schema conformance checks (section 7).

use super::{merge, resolve_role_child, warn_missing};
use crate::Sut;
use conformance_catalog::member_urls;
use conformance_client::Auth;
use conformance_ledger::{NoteChannel, VerdictLedger};
use conformance_types::{AssertionId, Status};
use serde_json::{json, Value};

pub async fn run_group(sut: &Sut, ledger: &mut VerdictLedger) {
    check_resource_identifiers(sut, ledger).await;
    check_collection_count_property(sut, ledger).await;
    check_count_matches_members(sut, ledger).await;
    check_schema_declares_properties(sut, ledger).await;
    check_read_only_rejects_patch(sut, ledger).await;
    check_next_link_page(sut, ledger).await;
}

fn non_member_targets(sut: &Sut) -> Vec<(String, String)> {
    sut.catalog
        .non_member_uris()
        .iter()
        .map(|(name, url)| (name.clone(), url.clone()))
        .collect()
}

fn collection_targets(sut: &Sut) -> Vec<(String, String)> {
    sut.catalog
        .collection_uris()
        .iter()
        .map(|(name, url)| (name.clone(), url.clone()))
        .collect()
}

/// 7.1.1: every non-member resource carries @odata.id and @odata.type.
async fn check_resource_identifiers(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("7.1.1");
    ledger.begin(&id);

    let mut status = Status::Pass;
    for (name, url) in non_member_targets(sut) {
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
        if !response.is_success() {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("{name}: GET {url} answered {:?}", response.status_u16()),
            );
            continue;
        }
        for key in ["@odata.id", "@odata.type"] {
            if response.property(key).and_then(Value::as_str).is_none() {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("{name}: resource {url} lacks the {key} property"),
                );
            }
        }
    }
    ledger.finish(&id, status);
}

/// 7.2.1: collection payloads carry Members and Members@odata.count.
async fn check_collection_count_property(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("7.2.1");
    ledger.begin(&id);

    let targets = collection_targets(sut);
    if targets.is_empty() {
        warn_missing(ledger, &id, "the service exposes no resource collections");
        return;
    }

    let mut status = Status::Pass;
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
        if !response.is_success() {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("{name}: GET {url} answered {:?}", response.status_u16()),
            );
            continue;
        }
        if response.property("Members").and_then(Value::as_array).is_none() {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("{name}: collection {url} lacks the Members array"),
            );
        }
        if response
            .property("Members@odata.count")
            .and_then(Value::as_u64)
            .is_none()
        {
            status = merge(
                ledger,
                status,
                Status::Fail,
                &format!("{name}: collection {url} lacks the Members@odata.count property"),
            );
        }
    }
    ledger.finish(&id, status);
}

/// 7.2.2: Members@odata.count equals the number of members reachable through
/// paging.
async fn check_count_matches_members(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("7.2.2");
    ledger.begin(&id);

    let targets = collection_targets(sut);
    if targets.is_empty() {
        warn_missing(ledger, &id, "the service exposes no resource collections");
        return;
    }

    let mut status = Status::Pass;
    'collections: for (name, url) in targets {
        let mut page_url = url.clone();
        let mut reachable = 0usize;
        let mut declared: Option<u64> = None;

        // Walk the page chain, totaling member links.
        loop {
            let response = match sut.client.get(&page_url, Auth::Basic).await {
                Ok(response) => response,
                Err(e) => {
                    status = merge(
                        ledger,
                        status,
                        Status::Warn,
                        &format!("{name}: GET {page_url} could not be issued ({e})"),
                    );
                    continue 'collections;
                }
            };
            if !response.is_success() {
                status = merge(
                    ledger,
                    status,
                    Status::Warn,
                    &format!("{name}: page {page_url} answered {:?}", response.status_u16()),
                );
                continue 'collections;
            }
            let Some(payload) = response.payload else {
                status = merge(
                    ledger,
                    status,
                    Status::Warn,
                    &format!("{name}: page {page_url} returned no JSON body"),
                );
                continue 'collections;
            };

            if declared.is_none() {
                declared = payload.get("Members@odata.count").and_then(Value::as_u64);
            }
            reachable += member_urls(&payload).len();

            match payload
                .get("Members@odata.nextLink")
                .and_then(Value::as_str)
            {
                Some(next) => page_url = next.to_string(),
                None => break,
            }
        }

        match declared {
            Some(declared) if declared as usize == reachable => {}
            Some(declared) => {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!(
                        "{name}: Members@odata.count is {declared} but {reachable} members are reachable"
                    ),
                );
            }
            // The missing-count case is 7.2.1's finding, not this rule's.
            None => {}
        }
    }
    ledger.finish(&id, status);
}

/// 7.3.1: payload properties are declared by the resolved schema type.
async fn check_schema_declares_properties(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("7.3.1");
    ledger.begin(&id);

    if sut.schema.is_empty() {
        warn_missing(ledger, &id, "no schema corpus is configured");
        return;
    }

    let mut status = Status::Pass;
    for (name, url) in non_member_targets(sut) {
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
        if !response.is_success() {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("{name}: GET {url} answered {:?}", response.status_u16()),
            );
            continue;
        }
        let Some(type_ident) = response.odata_type().map(str::to_string) else {
            // 7.1.1 already reports the missing identifier.
            continue;
        };
        let Some((_, descriptor)) = sut.schema.resolve_type(&type_ident) else {
            status = merge(
                ledger,
                status,
                Status::Warn,
                &format!("{name}: schema for {type_ident} is not in the corpus"),
            );
            continue;
        };
        let Some(Value::Object(payload)) = response.payload else {
            continue;
        };
        for key in payload.keys() {
            if key == "Oem" {
                continue;
            }
            if !descriptor.declares(key) {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("{name}: property {key:?} of {url} is not declared by {type_ident}"),
                );
            }
        }
    }
    ledger.finish(&id, status);
}

/// 7.3.2: properties annotated read-only are not writable via PATCH.
///
/// Services may reject the write or accept-and-ignore it; a write that
/// persists is the violation.
async fn check_read_only_rejects_patch(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("7.3.2");
    ledger.begin(&id);

    if !sut.config.allow_destructive_probes {
        warn_missing(ledger, &id, "destructive probes are disabled for this SUT");
        return;
    }
    if sut.schema.is_empty() {
        warn_missing(ledger, &id, "no schema corpus is configured");
        return;
    }

    let Some(accounts_url) = resolve_role_child(sut, "AccountService", "Accounts").await else {
        warn_missing(ledger, &id, "the service exposes no account collection");
        return;
    };
    let Some((account_url, payload, type_ident)) = first_member_with_type(sut, &accounts_url).await
    else {
        warn_missing(ledger, &id, "no manager account was reachable");
        return;
    };
    let Some((_, descriptor)) = sut.schema.resolve_type(&type_ident) else {
        warn_missing(ledger, &id, &format!("schema for {type_ident} is not in the corpus"));
        return;
    };

    // Pick a read-only string property present in the payload.
    let target = descriptor.properties.iter().find(|p| {
        p.is_read_only()
            && payload
                .get(&p.name)
                .map(|v| v.is_string())
                .unwrap_or(false)
    });
    let Some(property) = target else {
        warn_missing(
            ledger,
            &id,
            &format!("{type_ident} declares no read-only string property to probe"),
        );
        return;
    };

    let original = payload
        .get(&property.name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let probe_value = format!("{original}-conformance-probe");
    let body = json!({ &property.name: probe_value });

    let response = match sut.client.patch(&account_url, &body, Auth::Basic).await {
        Ok(response) => response,
        Err(e) => {
            warn_missing(ledger, &id, &format!("PATCH {account_url} could not be issued ({e})"));
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
                &format!("no usable response from PATCH {account_url}"),
            );
        }
        Some(code) if (400..600).contains(&code) => {
            ledger.note(
                NoteChannel::TabularComment,
                &format!("write to read-only {} rejected with {code}", property.name),
            );
        }
        Some(_) => {
            // Accepted: the write must not have persisted.
            match sut.client.get(&account_url, Auth::Basic).await {
                Ok(after) if after.is_transport_failure() => {
                    status = merge(
                        ledger,
                        status,
                        Status::Warn,
                        &format!("no usable response from verification GET {account_url}"),
                    );
                }
                Ok(after) => {
                    let now = after
                        .property(&property.name)
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if now == probe_value {
                        status = merge(
                            ledger,
                            status,
                            Status::Fail,
                            &format!(
                                "read-only property {} of {account_url} was modified from {original:?} to {now:?}",
                                property.name
                            ),
                        );
                    } else {
                        ledger.note(
                            NoteChannel::TabularComment,
                            &format!("write to read-only {} was accepted and ignored", property.name),
                        );
                    }
                }
                Err(e) => {
                    status = merge(
                        ledger,
                        status,
                        Status::Warn,
                        &format!("verification GET {account_url} could not be issued ({e})"),
                    );
                }
            }
        }
    }
    ledger.finish(&id, status);
}

async fn first_member_with_type(sut: &Sut, collection_url: &str) -> Option<(String, Value, String)> {
    let collection = sut.client.get(collection_url, Auth::Basic).await.ok()?;
    let member_url = member_urls(collection.payload.as_ref()?).into_iter().next()?;
    let member = sut.client.get(&member_url, Auth::Basic).await.ok()?;
    let type_ident = member.odata_type()?.to_string();
    Some((member_url, member.payload?, type_ident))
}

/// 7.4.1: a Members@odata.nextLink page is retrievable and non-empty.
async fn check_next_link_page(sut: &Sut, ledger: &mut VerdictLedger) {
    let id = AssertionId::new("7.4.1");
    ledger.begin(&id);

    let mut status = Status::Pass;
    for (name, url) in collection_targets(sut) {
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
                &format!("{name}: no usable response from {url}"),
            );
            continue;
        }
        let Some(next) = response
            .property("Members@odata.nextLink")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            // No paging on this collection; the rule holds trivially.
            continue;
        };

        let page = match sut.client.get(&next, Auth::Basic).await {
            Ok(page) => page,
            Err(e) => {
                status = merge(
                    ledger,
                    status,
                    Status::Warn,
                    &format!("{name}: GET {next} could not be issued ({e})"),
                );
                continue;
            }
        };
        match page.status_u16() {
            None => {
                status = merge(
                    ledger,
                    status,
                    Status::Warn,
                    &format!("{name}: no usable response from page {next}"),
                );
            }
            Some(200) => {
                let members = page
                    .property("Members")
                    .and_then(Value::as_array)
                    .map(|m| m.len())
                    .unwrap_or(0);
                if members == 0 {
                    status = merge(
                        ledger,
                        status,
                        Status::Fail,
                        &format!("{name}: page {next} advertised by Members@odata.nextLink is empty"),
                    );
                }
            }
            Some(code) => {
                status = merge(
                    ledger,
                    status,
                    Status::Fail,
                    &format!("{name}: page {next} answered {code}, expected 200"),
                );
            }
        }
    }
    ledger.finish(&id, status);
}
