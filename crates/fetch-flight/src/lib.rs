//! Arrow Flight transport for partition retrieval
//!
//! Implements the `fetch-core` transport traits on top of `tonic` and
//! `arrow-flight`:
//!
//! - SQL and metadata lookups are sent as Flight SQL commands packed in a
//!   command descriptor (`GetFlightInfo`)
//! - `ListFlights` is drained to completion
//! - `DoGet` streams are decoded with `FlightRecordBatchStream`
//!
//! # Example
//!
//! ```ignore
//! use fetch_core::{Connector, ConnectionConfig, Location, QueryRequest};
//! use fetch_flight::FlightConnector;
//!
//! let connector = FlightConnector::new(ConnectionConfig::default());
//! let conn = connector.connect(&Location::new("grpc+tcp://localhost:32010")).await?;
//! let descriptor = conn.describe(&QueryRequest::sql("SELECT * FROM my_table")).await?;
//! ```

pub mod client;
pub mod error;
mod request;

#[cfg(test)]
mod test_server;

pub use client::{FlightConnection, FlightConnector};
pub use error::FlightError;
