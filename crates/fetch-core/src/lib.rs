//! Core types for partitioned Flight result retrieval
//!
//! Shared by the Flight transport, the orchestrator and the CLI:
//!
//! - [`types`]: requests, endpoints, tickets and locations
//! - [`error`]: the fetch error taxonomy
//! - [`config`]: client, connection, redirection and orchestration settings
//! - [`transport`]: the connector/connection seam implemented by transports

pub mod config;
pub mod error;
pub mod transport;
pub mod types;

pub use config::{ClientConfig, ConnectionConfig, OrchestratorConfig, RedirectConfig};
pub use error::{EndpointError, FetchError, Result};
pub use transport::{BatchStream, Connection, Connector};
pub use types::*;
