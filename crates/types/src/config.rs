//! Resolved per-SUT configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_timeout_seconds() -> u64 {
    30
}

/// Fully resolved handle for one System Under Test.
///
/// Built by the configuration layer before the engine runs; the engine and
/// checks treat it as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SutConfig {
    /// Human-readable name used in report file names and log banners.
    pub display_name: String,

    /// Scheme + authority of the service, e.g. `https://10.0.0.5`.
    pub base_url: String,

    /// Credential pair for HTTP basic authentication.
    pub username: String,
    pub password: String,

    /// Gates checks that create, patch, or delete real resources on the SUT.
    #[serde(default)]
    pub allow_destructive_probes: bool,

    /// Directory of JSON schema bundles for type/annotation lookups.
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,

    /// Per-request timeout applied by the HTTP client.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl SutConfig {
    /// Root-relative protocol version endpoint (`GET /redfish`).
    pub fn version_url(&self) -> String {
        format!("{}/redfish", self.base_url.trim_end_matches('/'))
    }

    /// Service root URL (`/redfish/v1/`).
    pub fn service_root_url(&self) -> String {
        format!("{}/redfish/v1/", self.base_url.trim_end_matches('/'))
    }

    /// OData service document URL.
    pub fn odata_document_url(&self) -> String {
        format!("{}/redfish/v1/odata", self.base_url.trim_end_matches('/'))
    }

    /// Metadata document URL.
    pub fn metadata_document_url(&self) -> String {
        format!("{}/redfish/v1/$metadata", self.base_url.trim_end_matches('/'))
    }
}
