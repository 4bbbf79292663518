//! Scripted in-memory servers for orchestrator tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use async_trait::async_trait;
use fetch_core::{
    BatchStream, Connection, Connector, Endpoint, FetchError, Location, QueryRequest,
    ResultDescriptor, Result, Ticket,
};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

pub(crate) fn batch(values: &[i64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap()
}

pub(crate) fn values(batch: &RecordBatch) -> Vec<i64> {
    batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .to_vec()
}

/// What a server streams for one ticket
#[derive(Clone)]
pub(crate) enum Script {
    Batches(Vec<RecordBatch>),
    /// Batches, then a transport error
    FailAfter(Vec<RecordBatch>),
    /// Batches, then nothing ever again
    Stall(Vec<RecordBatch>),
    /// Batches, each after a pause
    Delayed(Duration, Vec<RecordBatch>),
}

#[derive(Clone, Default)]
pub(crate) struct MockServer {
    unreachable: bool,
    describe: Option<std::result::Result<Vec<Endpoint>, String>>,
    tickets: HashMap<Ticket, Script>,
}

impl MockServer {
    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub(crate) fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.describe = Some(Ok(endpoints));
        self
    }

    pub(crate) fn rejecting(mut self, reason: &str) -> Self {
        self.describe = Some(Err(reason.to_string()));
        self
    }

    pub(crate) fn with_script(mut self, ticket: &str, script: Script) -> Self {
        self.tickets.insert(Ticket::from(ticket), script);
        self
    }

    pub(crate) fn with_ticket(self, ticket: &str, batches: Vec<RecordBatch>) -> Self {
        self.with_script(ticket, Script::Batches(batches))
    }
}

/// Counts streams that have not been dropped yet
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockConnection {
    location: Location,
    server: MockServer,
    closed: AtomicBool,
    do_gets: Arc<Mutex<Vec<(String, Ticket)>>>,
    live_streams: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn describe(&self, _request: &QueryRequest) -> Result<ResultDescriptor> {
        if self.is_closed() {
            return Err(FetchError::ConnectionClosed(self.location.uri.clone()));
        }
        match &self.server.describe {
            Some(Ok(endpoints)) => Ok(ResultDescriptor::new(endpoints.clone())),
            Some(Err(reason)) => Err(FetchError::rejected(reason)),
            None => Ok(ResultDescriptor::default()),
        }
    }

    async fn do_get(&self, ticket: &Ticket) -> Result<BatchStream> {
        if self.is_closed() {
            return Err(FetchError::ConnectionClosed(self.location.uri.clone()));
        }
        self.do_gets
            .lock()
            .push((self.location.uri.clone(), ticket.clone()));

        let script = self
            .server
            .tickets
            .get(ticket)
            .cloned()
            .ok_or_else(|| FetchError::rejected("unknown ticket"))?;

        let body: BatchStream = match script {
            Script::Batches(batches) => stream::iter(batches.into_iter().map(Ok)).boxed(),
            Script::FailAfter(batches) => stream::iter(batches.into_iter().map(Ok))
                .chain(stream::once(async {
                    Err(FetchError::StreamInterrupted {
                        batches_delivered: 0,
                        reason: "connection reset".to_string(),
                    })
                }))
                .boxed(),
            Script::Stall(batches) => stream::iter(batches.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
            Script::Delayed(delay, batches) => stream::iter(batches)
                .then(move |batch| async move {
                    tokio::time::sleep(delay).await;
                    Ok(batch)
                })
                .boxed(),
        };

        let guard = LiveGuard::new(Arc::clone(&self.live_streams));
        Ok(body
            .map(move |item| {
                let _live = &guard;
                item
            })
            .boxed())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct MockConnector {
    servers: HashMap<String, MockServer>,
    connects: Mutex<Vec<String>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    do_gets: Arc<Mutex<Vec<(String, Ticket)>>>,
    live_streams: Arc<AtomicUsize>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_server(mut self, uri: &str, server: MockServer) -> Self {
        self.servers.insert(uri.to_string(), server);
        self
    }

    pub(crate) fn connect_attempts(&self, uri: &str) -> usize {
        self.connects.lock().iter().filter(|u| u.as_str() == uri).count()
    }

    /// Every ticket redeemed so far, with the location it was redeemed at
    pub(crate) fn do_gets(&self) -> Vec<(String, Ticket)> {
        self.do_gets.lock().clone()
    }

    pub(crate) fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    pub(crate) fn all_closed(&self) -> bool {
        self.connections.lock().iter().all(|c| c.is_closed())
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    fn open(&self, uri: &str, server: MockServer) -> Arc<MockConnection> {
        let connection = Arc::new(MockConnection {
            location: Location::new(uri),
            server,
            closed: AtomicBool::new(false),
            do_gets: Arc::clone(&self.do_gets),
            live_streams: Arc::clone(&self.live_streams),
        });
        self.connections.lock().push(Arc::clone(&connection));
        connection
    }

    pub(crate) fn connection_for_test(&self, uri: &str) -> Arc<dyn Connection> {
        self.open(uri, MockServer::default())
    }

    /// Poll until every stream handed out has been dropped
    pub(crate) async fn wait_for_streams_released(&self) -> bool {
        for _ in 0..200 {
            if self.live_streams() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, location: &Location) -> Result<Arc<dyn Connection>> {
        self.connects.lock().push(location.uri.clone());
        match self.servers.get(&location.uri) {
            Some(server) if !server.unreachable => Ok(self.open(&location.uri, server.clone())),
            _ => Err(FetchError::unreachable(&location.uri, "connection refused")),
        }
    }
}
