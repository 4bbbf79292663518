//! Error types for Arrow Flight calls

use fetch_core::{FetchError, Location};
use thiserror::Error;
use tonic::Code;

/// Errors raised by the Flight client before they reach the orchestrator
#[derive(Debug, Error)]
pub enum FlightError {
    /// Arrow error
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Arrow Flight decode error
    #[error("Flight error: {0}")]
    FlightDecodeError(#[from] arrow_flight::error::FlightError),

    /// gRPC transport error
    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    /// gRPC status error
    #[error("gRPC error: {0}")]
    GrpcError(#[from] tonic::Status),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FlightError {
    fn is_unavailable(&self) -> bool {
        match self {
            FlightError::TransportError(_) => true,
            FlightError::GrpcError(status) => status.code() == Code::Unavailable,
            _ => false,
        }
    }

    /// Failure of a unary call (`GetFlightInfo`, `ListFlights`, opening `DoGet`)
    pub fn into_call_error(self, location: &Location) -> FetchError {
        if self.is_unavailable() {
            return FetchError::unreachable(location.uri(), self);
        }
        match self {
            FlightError::GrpcError(status) => FetchError::rejected(status.message()),
            FlightError::InvalidRequest(msg) => FetchError::rejected(msg),
            other => FetchError::rejected(other),
        }
    }

    /// Failure while pulling from an open stream
    pub fn into_stream_error(self) -> FetchError {
        FetchError::StreamInterrupted {
            batches_delivered: 0,
            reason: self.to_string(),
        }
    }
}
