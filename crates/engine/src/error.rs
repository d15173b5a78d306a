//! Engine error types

use thiserror::Error;

/// Errors that prevent the engine from running at all.
///
/// Once checks are running, nothing propagates between them: a failed check
/// records its verdict and the engine moves on.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Client(#[from] conformance_client::ClientError),

    #[error(transparent)]
    Catalog(#[from] conformance_catalog::CatalogError),
}

/// Result type for engine setup
pub type EngineResult<T> = Result<T, EngineError>;
