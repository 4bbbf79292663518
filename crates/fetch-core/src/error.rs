//! Error types for partition retrieval

use thiserror::Error;

use crate::types::EndpointIndex;

/// Errors that can occur while resolving or fetching a request
#[derive(Error, Debug)]
pub enum FetchError {
    /// A connection to the location could not be established
    #[error("Unreachable location {location}: {reason}")]
    Unreachable { location: String, reason: String },

    /// The coordinator explicitly declined the request
    #[error("Request rejected: {reason}")]
    RequestRejected { reason: String },

    /// Transport failed mid-stream; batches already delivered stay valid
    #[error("Stream interrupted after {batches_delivered} batches: {reason}")]
    StreamInterrupted {
        batches_delivered: usize,
        reason: String,
    },

    /// Cooperative cancellation was honored
    #[error("Request cancelled")]
    Cancelled,

    /// A tagged endpoint could not be turned into a secondary fetch
    #[error("Redirect unresolved: {0}")]
    RedirectUnresolved(String),

    /// Location URI with an unsupported scheme or bad syntax
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// The connection was closed before the call was issued
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Configuration could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Whether this error aborts the whole request rather than one endpoint
    pub fn is_request_level(&self) -> bool {
        matches!(
            self,
            FetchError::Unreachable { .. }
                | FetchError::RequestRejected { .. }
                | FetchError::Cancelled
        )
    }

    pub fn unreachable(location: impl Into<String>, reason: impl ToString) -> Self {
        FetchError::Unreachable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rejected(reason: impl ToString) -> Self {
        FetchError::RequestRejected {
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Config(err.to_string())
    }
}

/// Failure of a single partition; never invalidates other partitions
#[derive(Error, Debug)]
#[error("Endpoint {index} failed: {cause}")]
pub struct EndpointError {
    /// Position of the endpoint in the result descriptor
    pub index: EndpointIndex,
    /// What went wrong
    #[source]
    pub cause: FetchError,
}

impl EndpointError {
    pub fn new(index: EndpointIndex, cause: FetchError) -> Self {
        Self { index, cause }
    }
}

/// Result type for fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;
