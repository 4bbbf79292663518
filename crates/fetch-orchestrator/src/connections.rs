//! Per-request connection set
//!
//! Every request owns one [`ConnectionSet`]. A location is connected at most
//! once per request and the handle is shared by every stream fetched there.
//! The set is closed when the request ends and never handed to another one.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fetch_core::{Connection, Connector, FetchError, Location, Result};
use tokio::sync::OnceCell;
use tracing::debug;

/// A live channel to one location, shared within a request
#[derive(Clone)]
pub struct ConnectionHandle {
    location: Location,
    connection: Arc<dyn Connection>,
    open_streams: Arc<AtomicUsize>,
}

impl ConnectionHandle {
    pub fn new(location: Location, connection: Arc<dyn Connection>) -> Self {
        Self {
            location,
            connection,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Streams currently holding a lease on this handle
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    pub(crate) fn lease(&self) -> StreamLease {
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        StreamLease {
            location: self.location.clone(),
            open_streams: Arc::clone(&self.open_streams),
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("location", &self.location)
            .field("open_streams", &self.open_streams())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Held by a stream for as long as it may pull from the connection
pub(crate) struct StreamLease {
    location: Location,
    open_streams: Arc<AtomicUsize>,
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        let remaining = self.open_streams.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(
            "Released stream on {} ({} still open)",
            self.location, remaining
        );
    }
}

/// Connections opened on behalf of one request
pub struct ConnectionSet {
    connector: Arc<dyn Connector>,
    coordinator: Location,
    handles: DashMap<Location, Arc<OnceCell<ConnectionHandle>>>,
    closed: AtomicBool,
}

impl ConnectionSet {
    pub fn new(connector: Arc<dyn Connector>, coordinator: Location) -> Self {
        Self {
            connector,
            coordinator,
            handles: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn coordinator_location(&self) -> &Location {
        &self.coordinator
    }

    /// The coordinator connection, established on first use
    pub async fn coordinator(&self) -> Result<ConnectionHandle> {
        let coordinator = self.coordinator.clone();
        self.get(&coordinator).await
    }

    /// Connection to `location`, established on first use
    ///
    /// The reuse-connection marker resolves to the coordinator.
    pub async fn get(&self, location: &Location) -> Result<ConnectionHandle> {
        let location = if location.is_reuse_connection() {
            &self.coordinator
        } else {
            location
        };

        if self.is_closed() {
            return Err(FetchError::Cancelled);
        }

        let cell = self.handles.entry(location.clone()).or_default().value().clone();
        let handle = cell
            .get_or_try_init(|| async {
                debug!("Opening connection to {}", location);
                let connection = self.connector.connect(location).await?;
                Ok::<_, FetchError>(ConnectionHandle::new(location.clone(), connection))
            })
            .await?
            .clone();

        // close_all may have run while we were connecting
        if self.is_closed() {
            handle.connection().close().await;
            return Err(FetchError::Cancelled);
        }

        Ok(handle)
    }

    /// First of `locations` that accepts a connection, tried in order
    ///
    /// An empty list means the coordinator.
    pub async fn first_reachable(&self, locations: &[Location]) -> Result<ConnectionHandle> {
        if locations.is_empty() {
            return self.coordinator().await;
        }

        let mut last_error = None;
        for location in locations {
            match self.get(location).await {
                Ok(handle) => return Ok(handle),
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    debug!("Location {} unavailable: {}", location, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Internal("no locations".to_string())))
    }

    /// Handles opened so far
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.handles
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close every connection and refuse new ones
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let handles = self.handles();
        for handle in &handles {
            handle.connection().close().await;
        }
        debug!("Closed {} connections", handles.len());
    }
}
