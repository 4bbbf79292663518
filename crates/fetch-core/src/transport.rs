//! Transport seam between the orchestrator and a wire protocol
//!
//! The orchestrator only talks to servers through these traits; the Flight
//! implementation lives in `fetch-flight`, tests use in-memory ones.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{Location, QueryRequest, ResultDescriptor, Ticket};

/// Server-streamed record batches for one ticket
pub type BatchStream = BoxStream<'static, Result<RecordBatch>>;

/// Opens connections to locations
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a channel to `location`, failing with `Unreachable`
    async fn connect(&self, location: &Location) -> Result<Arc<dyn Connection>>;
}

/// A live channel to one server
#[async_trait]
pub trait Connection: Send + Sync {
    /// Submit a query or metadata lookup and drain the full descriptor
    async fn describe(&self, request: &QueryRequest) -> Result<ResultDescriptor>;

    /// Start a server-streaming retrieval for `ticket`
    async fn do_get(&self, ticket: &Ticket) -> Result<BatchStream>;

    /// Close the channel; later calls fail with `ConnectionClosed`
    async fn close(&self);

    fn is_closed(&self) -> bool;
}
