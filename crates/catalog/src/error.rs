//! Catalog error types

use thiserror::Error;

/// Errors raised while building the resource catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The service root itself could not be fetched with a usable status.
    #[error("service root unreachable: {0}")]
    ServiceRootUnreachable(String),

    /// The service root answered but not with a JSON object.
    #[error("service root at {url} returned no JSON object (status {status:?})")]
    ServiceRootNotJson {
        url: String,
        status: Option<u16>,
    },

    /// Underlying client error (URL/headers, not transport).
    #[error(transparent)]
    Client(#[from] conformance_client::ClientError),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
