//! Client configuration
//!
//! Connection, redirection and orchestration settings, grouped in
//! [`ClientConfig`] which can be loaded from and saved to JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::types::{Location, Ticket};

/// App metadata value marking an endpoint whose payload lives elsewhere
pub const DEFAULT_REDIRECT_TAG: &str = "table_data";

/// Settings handed to the connector when opening a channel
///
/// Credentials are passed through unchanged as gRPC metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-call timeout in milliseconds (0 disables)
    pub request_timeout_ms: u64,
    /// Bearer token sent as `authorization`
    pub bearer_token: Option<String>,
    /// Extra gRPC metadata sent with every call
    pub headers: BTreeMap<String, String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            request_timeout_ms: 0,
            bearer_token: None,
            headers: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// How tagged endpoints are turned into secondary fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    /// App metadata value that marks a claim-check endpoint
    pub tag: String,
    /// Ticket presented to a secondary location with no override
    pub derived_ticket: Option<String>,
    /// Per-location tickets, keyed by location URI
    pub location_tickets: BTreeMap<String, String>,
    /// Also redeem the claim-check ticket on the coordinator first
    pub redeem_claim_check: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_REDIRECT_TAG.to_string(),
            derived_ticket: None,
            location_tickets: BTreeMap::new(),
            redeem_claim_check: false,
        }
    }
}

impl RedirectConfig {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_derived_ticket(mut self, ticket: impl Into<String>) -> Self {
        self.derived_ticket = Some(ticket.into());
        self
    }

    pub fn with_location_ticket(
        mut self,
        location: impl Into<String>,
        ticket: impl Into<String>,
    ) -> Self {
        self.location_tickets.insert(location.into(), ticket.into());
        self
    }

    pub fn with_redeem_claim_check(mut self, redeem: bool) -> Self {
        self.redeem_claim_check = redeem;
        self
    }

    /// Ticket to present at `location`, override first
    pub fn ticket_for(&self, location: &Location) -> Option<Ticket> {
        self.location_tickets
            .get(location.uri())
            .or(self.derived_ticket.as_ref())
            .map(|t| Ticket::from(t.as_str()))
    }
}

/// Scheduling settings for one orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Endpoints fetched at the same time (1 = sequential)
    pub max_concurrent_fetches: usize,
    /// Upper bound on closing connections after cancellation, in milliseconds
    pub cancel_grace_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            cancel_grace_ms: 5000,
        }
    }
}

impl OrchestratorConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n.max(1);
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Everything a client needs to run requests against one coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The coordinating server
    pub coordinator: Location,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub redirect: RedirectConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            coordinator: Location::new("grpc+tcp://localhost:32010"),
            connection: ConnectionConfig::default(),
            redirect: RedirectConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(coordinator: impl Into<Location>) -> Self {
        Self {
            coordinator: coordinator.into(),
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
