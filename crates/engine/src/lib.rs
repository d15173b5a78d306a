//! Assertion engine: the ordered collection of conformance checks.
//!
//! The engine is invoked once per SUT. It builds the resource catalog
//! snapshot, then drives the four thematic check groups in a fixed order:
//! protocol/transport, data model/schema, service semantics, and security.
//! Checks run strictly sequentially; the account and session lifecycle
//! clusters depend on side effects of their earlier stages on the real SUT,
//! so the order is load-bearing and must not be parallelized.

mod checks;
mod error;
mod probes;

pub use error::{EngineError, EngineResult};
pub use probes::{MethodProbe, ProbeAuth, ProbeTarget};

use conformance_catalog::{discover, ResourceCatalog};
use conformance_client::HttpClient;
use conformance_ledger::VerdictLedger;
use conformance_schema::SchemaIndex;
use conformance_types::SutConfig;
use std::time::Duration;

/// Fully resolved handle for one System Under Test.
///
/// Built once before any check executes; the catalog and schema index are
/// immutable for the whole run even though checks create and delete real
/// resources on the SUT (the catalog is a snapshot, not a live view).
pub struct Sut {
    pub config: SutConfig,
    pub client: HttpClient,
    pub catalog: ResourceCatalog,
    pub schema: SchemaIndex,
}

impl Sut {
    /// Connects to the SUT: builds the client, discovers the resource
    /// surface, and loads the schema corpus if one is configured.
    ///
    /// Schema availability is best-effort: a corpus that fails to load
    /// degrades to an empty index with a warning.
    pub async fn connect(config: SutConfig) -> EngineResult<Self> {
        let client = HttpClient::new(
            &config.base_url,
            &config.username,
            &config.password,
            Duration::from_secs(config.timeout_seconds),
        )?;

        let catalog = discover(&client, &config.service_root_url()).await?;

        let schema = match &config.schema_dir {
            Some(dir) => SchemaIndex::load_dir(dir).unwrap_or_else(|e| {
                tracing::warn!(dir = %dir.display(), error = %e, "schema corpus unavailable");
                SchemaIndex::empty()
            }),
            None => SchemaIndex::empty(),
        };

        Ok(Self {
            config,
            client,
            catalog,
            schema,
        })
    }
}

/// Runs every check group against one SUT.
pub struct Engine;

impl Engine {
    /// Drives all checks in their fixed order. A failure inside one check
    /// never aborts the run; every check records its own verdict and the
    /// engine proceeds to the next.
    pub async fn run(sut: &Sut, ledger: &mut VerdictLedger) {
        tracing::info!(sut = %sut.config.display_name, "running protocol checks");
        checks::protocol::run_group(sut, ledger).await;

        tracing::info!(sut = %sut.config.display_name, "running data model checks");
        checks::data_model::run_group(sut, ledger).await;

        tracing::info!(sut = %sut.config.display_name, "running service detail checks");
        checks::service::run_group(sut, ledger).await;

        tracing::info!(sut = %sut.config.display_name, "running security checks");
        checks::security::run_group(sut, ledger).await;
    }
}
