//! Client error types

use thiserror::Error;

/// Errors the HTTP adapter can surface to callers.
///
/// Connection-level failures are deliberately NOT represented here: they are
/// encoded as a [`crate::Response`] with `status: None` so that checks can
/// degrade to WARN instead of aborting.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client could not be constructed (TLS backend, builder options).
    #[error("HTTP client build error: {0}")]
    Build(#[source] reqwest::Error),

    /// The request URL could not be formed.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
