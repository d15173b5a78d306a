//! Resource discovery for the conformance engine.
//!
//! Crawls the SUT once, breadth-first from the service root, and produces an
//! immutable snapshot: every reachable resource URI, the subset that is not a
//! collection member, and the table of well-known top-level services. Checks
//! read the snapshot; they never mutate it, even when they create or delete
//! real resources on the SUT.

mod error;
mod members;

pub use error::{CatalogError, CatalogResult};
pub use members::{member_urls, MemberIter, MemberSource};

use conformance_client::{Auth, HttpClient};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Crawl depth guard; real services stay well under this.
const MAX_DEPTH: usize = 8;

/// One well-known entry point reachable directly from the service root.
#[derive(Debug, Clone)]
pub struct TopLevelEntry {
    pub url: String,
}

/// Immutable snapshot of the SUT's resource surface.
#[derive(Debug, Default)]
pub struct ResourceCatalog {
    all_uris: BTreeMap<String, String>,
    non_member_uris: BTreeMap<String, String>,
    collection_uris: BTreeMap<String, String>,
    top_level: BTreeMap<String, TopLevelEntry>,
}

impl ResourceCatalog {
    /// Every discovered URI, collection members included.
    pub fn all_uris(&self) -> &BTreeMap<String, String> {
        &self.all_uris
    }

    /// Collections and singletons only. Rules that must run once per
    /// collection rather than once per member iterate this set.
    pub fn non_member_uris(&self) -> &BTreeMap<String, String> {
        &self.non_member_uris
    }

    /// The subset of non-member URIs whose payload carried a `Members` array.
    pub fn collection_uris(&self) -> &BTreeMap<String, String> {
        &self.collection_uris
    }

    /// Well-known role name to entry-point mapping, built once per run.
    pub fn top_level(&self) -> &BTreeMap<String, TopLevelEntry> {
        &self.top_level
    }

    /// URL of a top-level role, if the service exposes it.
    pub fn role_url(&self, role: &str) -> Option<&str> {
        self.top_level.get(role).map(|e| e.url.as_str())
    }
}

fn link_of(value: &Value) -> Option<&str> {
    value.get("@odata.id").and_then(Value::as_str)
}

/// Derives the human-readable catalog key for a URL: the path under the
/// service root, e.g. `AccountService/Accounts/1`.
fn catalog_key(url: &str) -> String {
    let path = url
        .find("/redfish/v1")
        .map(|idx| &url[idx + "/redfish/v1".len()..])
        .unwrap_or(url);
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "ServiceRoot".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Crawls from the service root and builds the catalog snapshot.
///
/// Linked resources that fail to fetch are skipped with a warning; partial
/// discovery is preferable to no catalog at all. Only an unreachable or
/// non-JSON service root is an error.
pub async fn discover(client: &HttpClient, service_root: &str) -> CatalogResult<ResourceCatalog> {
    let root = client.get(service_root, Auth::Basic).await?;
    if root.is_transport_failure() {
        return Err(CatalogError::ServiceRootUnreachable(root.raw));
    }
    let root_payload = match (&root.status, &root.payload) {
        (Some(status), Some(Value::Object(_))) if status.is_success() => {
            root.payload.clone().unwrap_or(Value::Null)
        }
        _ => {
            return Err(CatalogError::ServiceRootNotJson {
                url: service_root.to_string(),
                status: root.status_u16(),
            })
        }
    };

    let mut catalog = ResourceCatalog::default();
    let root_key = catalog_key(service_root);
    catalog
        .all_uris
        .insert(root_key.clone(), service_root.to_string());
    catalog
        .non_member_uris
        .insert(root_key, service_root.to_string());

    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(client.absolute_url(service_root));

    // Top-level table from the service root payload. Session collections hide
    // under Links on most services.
    if let Some(object) = root_payload.as_object() {
        for (name, value) in object {
            if name == "Links" {
                if let Some(links) = value.as_object() {
                    for (link_name, link_value) in links {
                        if let Some(url) = link_of(link_value) {
                            catalog.top_level.insert(
                                link_name.clone(),
                                TopLevelEntry { url: url.to_string() },
                            );
                            queue.push_back((url.to_string(), 1));
                        }
                    }
                }
            } else if let Some(url) = link_of(value) {
                catalog
                    .top_level
                    .insert(name.clone(), TopLevelEntry { url: url.to_string() });
                queue.push_back((url.to_string(), 1));
            }
        }
    }

    while let Some((url, depth)) = queue.pop_front() {
        let absolute = client.absolute_url(&url);
        if !visited.insert(absolute) {
            continue;
        }
        if depth > MAX_DEPTH {
            tracing::warn!(%url, depth, "crawl depth limit reached, not expanding");
            continue;
        }

        let response = match client.get(&url, Auth::Basic).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%url, error = %e, "skipping resource during discovery");
                continue;
            }
        };
        if !response.is_success() {
            tracing::warn!(%url, status = ?response.status_u16(), "skipping unfetchable resource");
            continue;
        }
        let payload = match response.payload {
            Some(Value::Object(map)) => map,
            _ => {
                tracing::warn!(%url, "resource body is not a JSON object, skipping");
                continue;
            }
        };

        let key = catalog_key(&url);
        catalog.all_uris.insert(key.clone(), url.clone());
        catalog.non_member_uris.insert(key.clone(), url.clone());

        let collection_typed = payload
            .get("@odata.type")
            .and_then(Value::as_str)
            .map(|t| t.contains("Collection"))
            .unwrap_or(false);
        if collection_typed || payload.contains_key("Members") {
            // Collection: record member URIs in the full catalog only. Member
            // payloads are fetched by the checks that need them, not here. A
            // collection-typed payload without Members still lands here so
            // the data-model rules can flag it.
            catalog.collection_uris.insert(key, url.clone());
            if let Some(members) = payload.get("Members").and_then(Value::as_array) {
                for member in members {
                    if let Some(member_url) = link_of(member) {
                        catalog
                            .all_uris
                            .insert(catalog_key(member_url), member_url.to_string());
                    }
                }
            }
            continue;
        }

        // Singleton: follow nested links one object deep.
        for (name, value) in &payload {
            if name.starts_with('@') {
                continue;
            }
            if let Some(child) = link_of(value) {
                if child != url {
                    queue.push_back((child.to_string(), depth + 1));
                }
            } else if let Some(nested) = value.as_object() {
                for nested_value in nested.values() {
                    if let Some(child) = link_of(nested_value) {
                        if child != url {
                            queue.push_back((child.to_string(), depth + 1));
                        }
                    }
                }
            }
        }
    }

    tracing::info!(
        total = catalog.all_uris.len(),
        non_member = catalog.non_member_uris.len(),
        collections = catalog.collection_uris.len(),
        "resource discovery complete"
    );

    Ok(catalog)
}
