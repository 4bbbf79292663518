//! Partitioned result retrieval
//!
//! Resolves a request into endpoints on the coordinator, follows redirects
//! to secondary servers and streams every endpoint back to the caller in
//! endpoint order.
//!
//! # Architecture
//!
//! - **EndpointResolver**: asks the coordinator for the result descriptor
//! - **RedirectionPolicy**: decides between direct and redirected fetches
//! - **StreamFetcher**: redeems one ticket on one connection
//! - **QueryOrchestrator**: runs the per-request state machine
//!
//! # Example
//!
//! ```ignore
//! use fetch_core::{ClientConfig, QueryRequest};
//! use fetch_flight::FlightConnector;
//! use fetch_orchestrator::{DrainItem, QueryOrchestrator};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! let config = ClientConfig::new("grpc+tcp://localhost:32010");
//! let connector = Arc::new(FlightConnector::new(config.connection.clone()));
//! let orchestrator = QueryOrchestrator::from_config(connector, &config);
//!
//! let mut handle = orchestrator.submit(QueryRequest::sql("SELECT * FROM my_table"));
//! let mut drain = handle.drain();
//! while let Some(item) = drain.next().await {
//!     if let DrainItem::Batch { endpoint, batch } = item? {
//!         println!("{}: {} rows", endpoint, batch.num_rows());
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`connections`]: per-request connection set
//! - [`resolver`]: endpoint resolution
//! - [`redirect`]: redirection policy
//! - [`fetcher`]: ticket streams
//! - [`orchestrator`]: request driver and handle
//! - [`report`]: request states and reports

pub mod connections;
pub mod fetcher;
pub mod orchestrator;
pub mod redirect;
pub mod report;
pub mod resolver;

#[cfg(test)]
mod mock;

pub use connections::{ConnectionHandle, ConnectionSet};
pub use fetcher::{FetchStream, StreamFetcher};
pub use orchestrator::{CancelHandle, DrainItem, QueryOrchestrator, RequestHandle};
pub use redirect::{Classification, RedirectTarget, RedirectionPolicy, Route};
pub use report::{EndpointReport, RequestReport, RequestState};
pub use resolver::EndpointResolver;
