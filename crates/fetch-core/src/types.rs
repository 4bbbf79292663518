//! Request, endpoint and ticket types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{FetchError, Result};

/// URI scheme the coordinator uses to say "fetch from me"
pub const REUSE_CONNECTION_URI: &str = "arrow-flight-reuse-connection://?";

/// Unique identifier for a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", &self.0.to_string()[..8])
    }
}

/// Position of an endpoint inside a [`ResultDescriptor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointIndex(pub usize);

impl fmt::Display for EndpointIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque retrieval token, meaningful only to the server that issued it
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ticket(Bytes);

impl Ticket {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Tickets may carry credentials; only the length is printed.
impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticket({} bytes)", self.0.len())
    }
}

impl From<&str> for Ticket {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for Ticket {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Vec<u8>> for Ticket {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

/// A connection target named by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
}

impl Location {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether this location means "the server that issued the ticket"
    pub fn is_reuse_connection(&self) -> bool {
        self.uri.starts_with("arrow-flight-reuse-connection://")
    }

    /// Translate the Flight URI into an HTTP/2 channel URL
    ///
    /// `grpc://`, `grpc+tcp://` and bare `host:port` are plaintext and
    /// `http://` passes through. TLS schemes are rejected: channels are
    /// built without TLS support.
    pub fn channel_url(&self) -> Result<String> {
        let uri = self.uri.trim();
        if uri.is_empty() {
            return Err(FetchError::InvalidLocation("empty location".to_string()));
        }

        let url = match uri.split_once("://") {
            Some(("grpc", rest)) | Some(("grpc+tcp", rest)) => format!("http://{}", rest),
            Some(("http", _)) => uri.to_string(),
            Some(("grpc+tls", _)) | Some(("https", _)) => {
                return Err(FetchError::InvalidLocation(format!(
                    "TLS locations are not supported: {}",
                    uri
                )))
            }
            Some((scheme, _)) => {
                return Err(FetchError::InvalidLocation(format!(
                    "unsupported scheme '{}' in {}",
                    scheme, uri
                )))
            }
            None => format!("http://{}", uri),
        };

        Ok(url)
    }

    /// Whether both locations name the same server
    ///
    /// Scheme spellings of one plaintext address (`grpc://`, `grpc+tcp://`,
    /// bare `host:port`) compare equal.
    pub fn same_server(&self, other: &Location) -> bool {
        match (self.channel_url(), other.channel_url()) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.uri.trim() == other.uri.trim(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl From<&str> for Location {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for Location {
    fn from(uri: String) -> Self {
        Self::new(uri)
    }
}

/// One independently retrievable partition of a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Where the ticket may be redeemed; empty means the coordinator
    pub locations: Vec<Location>,
    /// Retrieval token
    pub ticket: Ticket,
    /// Opaque application metadata set by the coordinator
    pub app_metadata: Bytes,
}

impl Endpoint {
    pub fn new(ticket: impl Into<Ticket>) -> Self {
        Self {
            locations: Vec::new(),
            ticket: ticket.into(),
            app_metadata: Bytes::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<Location>) -> Self {
        self.locations.push(location.into());
        self
    }

    pub fn with_app_metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.app_metadata = metadata.into();
        self
    }

    /// Locations other than the reuse-connection marker
    pub fn remote_locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter().filter(|l| !l.is_reuse_connection())
    }

    /// Locations naming a server other than `origin`, the server that
    /// issued the ticket
    pub fn secondary_locations<'a>(
        &'a self,
        origin: &'a Location,
    ) -> impl Iterator<Item = &'a Location> + 'a {
        self.remote_locations().filter(move |l| !l.same_server(origin))
    }
}

/// The coordinator's answer to a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultDescriptor {
    /// Partitions in coordinator order
    pub endpoints: Vec<Endpoint>,
    /// Total record count, when the coordinator reported one
    pub total_records: Option<i64>,
}

impl ResultDescriptor {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            total_records: None,
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EndpointIndex, &Endpoint)> {
        self.endpoints
            .iter()
            .enumerate()
            .map(|(i, e)| (EndpointIndex(i), e))
    }
}

/// Metadata lookups understood by a Flight SQL coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataRequest {
    ListFlights {
        criteria: Option<String>,
    },
    ListTables {
        catalog: Option<String>,
        db_schema_filter_pattern: Option<String>,
        table_name_filter_pattern: Option<String>,
        table_types: Vec<String>,
        include_schema: bool,
    },
    ListSchemas {
        catalog: Option<String>,
        db_schema_filter_pattern: Option<String>,
    },
    ListCatalogs,
    ListPrimaryKeys {
        catalog: Option<String>,
        db_schema: Option<String>,
        table: String,
    },
    ListTypeInfo {
        data_type: Option<i32>,
    },
    ListSqlInfo {
        info: Vec<u32>,
    },
}

impl MetadataRequest {
    /// All tables, no filters
    pub fn tables() -> Self {
        MetadataRequest::ListTables {
            catalog: None,
            db_schema_filter_pattern: None,
            table_name_filter_pattern: None,
            table_types: Vec::new(),
            include_schema: false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MetadataRequest::ListFlights { .. } => "list-flights",
            MetadataRequest::ListTables { .. } => "list-tables",
            MetadataRequest::ListSchemas { .. } => "list-schemas",
            MetadataRequest::ListCatalogs => "list-catalogs",
            MetadataRequest::ListPrimaryKeys { .. } => "list-primary-keys",
            MetadataRequest::ListTypeInfo { .. } => "list-type-info",
            MetadataRequest::ListSqlInfo { .. } => "list-sql-info",
        }
    }
}

/// What the caller asks the coordinator for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRequest {
    /// A raw query string
    Sql(String),
    /// A metadata lookup
    Metadata(MetadataRequest),
}

impl QueryRequest {
    pub fn sql(query: impl Into<String>) -> Self {
        QueryRequest::Sql(query.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryRequest::Sql(_) => "sql",
            QueryRequest::Metadata(m) => m.kind(),
        }
    }
}

impl From<MetadataRequest> for QueryRequest {
    fn from(request: MetadataRequest) -> Self {
        QueryRequest::Metadata(request)
    }
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRequest::Sql(sql) => write!(f, "sql: {}", sql),
            QueryRequest::Metadata(m) => f.write_str(m.kind()),
        }
    }
}
