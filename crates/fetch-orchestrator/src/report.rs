//! Request state and outcome reporting

use std::fmt;
use std::time::Duration;

use arrow::record_batch::RecordBatch;
use fetch_core::{EndpointIndex, RequestId};

use crate::redirect::Route;

/// Lifecycle of a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Accepted, nothing sent yet
    Submitted,
    /// Waiting for the coordinator's endpoint list
    Resolving,
    /// Streaming endpoints
    Fetching,
    /// Every endpoint succeeded
    Completed,
    /// At least one endpoint succeeded and at least one failed
    PartiallyFailed,
    /// Resolution failed or every endpoint failed
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed
                | RequestState::PartiallyFailed
                | RequestState::Failed
                | RequestState::Cancelled
        )
    }

    /// Final state once every endpoint has been attempted
    pub fn settle(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => RequestState::Completed,
            (0, _) => RequestState::Failed,
            _ => RequestState::PartiallyFailed,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Submitted => "submitted",
            RequestState::Resolving => "resolving",
            RequestState::Fetching => "fetching",
            RequestState::Completed => "completed",
            RequestState::PartiallyFailed => "partially failed",
            RequestState::Failed => "failed",
            RequestState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Outcome of one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    pub index: EndpointIndex,
    /// Unset when classification itself failed
    pub route: Option<Route>,
    pub batches: usize,
    pub rows: usize,
    pub error: Option<String>,
}

impl EndpointReport {
    pub fn new(index: EndpointIndex) -> Self {
        Self {
            index,
            route: None,
            batches: 0,
            rows: 0,
            error: None,
        }
    }

    pub(crate) fn record(&mut self, batch: &RecordBatch) {
        self.batches += 1;
        self.rows += batch.num_rows();
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a finished request
#[derive(Debug, Clone)]
pub struct RequestReport {
    pub request_id: RequestId,
    pub state: RequestState,
    /// Endpoints that finished, in endpoint order
    pub endpoints: Vec<EndpointReport>,
    pub elapsed: Duration,
}

impl RequestReport {
    pub fn succeeded(&self) -> usize {
        self.endpoints.iter().filter(|e| e.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.endpoints.len() - self.succeeded()
    }

    pub fn total_batches(&self) -> usize {
        self.endpoints.iter().map(|e| e.batches).sum()
    }

    pub fn total_rows(&self) -> usize {
        self.endpoints.iter().map(|e| e.rows).sum()
    }
}
