//! Query orchestrator
//!
//! [`QueryOrchestrator::submit`] starts one background driver per request.
//! The driver resolves endpoints on the coordinator, fetches them on a
//! bounded pool and forwards their batches to the caller strictly in
//! endpoint order. The caller consumes results through [`RequestHandle`].

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use fetch_core::{
    ClientConfig, Connector, Endpoint, EndpointError, EndpointIndex, FetchError, Location,
    OrchestratorConfig, QueryRequest, RequestId, Result, Ticket,
};
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::connections::{ConnectionHandle, ConnectionSet};
use crate::fetcher::StreamFetcher;
use crate::redirect::{Classification, RedirectionPolicy, Route};
use crate::report::{EndpointReport, RequestReport, RequestState};
use crate::resolver::EndpointResolver;

/// One element of a request's output
#[derive(Debug)]
pub enum DrainItem {
    /// A batch, tagged with the endpoint it came from
    Batch {
        endpoint: EndpointIndex,
        batch: RecordBatch,
    },
    /// An endpoint failed; other endpoints are unaffected
    EndpointFailed(EndpointError),
}

/// Submits requests against one coordinator
pub struct QueryOrchestrator {
    /// Opens connections for each request's private set
    connector: Arc<dyn Connector>,
    /// Server every request is resolved on
    coordinator: Location,
    /// Shared by every request
    policy: Arc<RedirectionPolicy>,
    config: OrchestratorConfig,
}

impl QueryOrchestrator {
    pub fn new(connector: Arc<dyn Connector>, coordinator: impl Into<Location>) -> Self {
        Self {
            connector,
            coordinator: coordinator.into(),
            policy: Arc::new(RedirectionPolicy::default()),
            config: OrchestratorConfig::default(),
        }
    }

    /// Build from a client configuration; the connector carries the
    /// connection settings
    pub fn from_config(connector: Arc<dyn Connector>, config: &ClientConfig) -> Self {
        Self::new(connector, config.coordinator.clone())
            .with_policy(RedirectionPolicy::new(config.redirect.clone()))
            .with_config(config.orchestrator.clone())
    }

    pub fn with_policy(mut self, policy: RedirectionPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn coordinator(&self) -> &Location {
        &self.coordinator
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a request in the background
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: QueryRequest) -> RequestHandle {
        let id = RequestId::new();
        let connections = Arc::new(ConnectionSet::new(
            Arc::clone(&self.connector),
            self.coordinator.clone(),
        ));

        let (output_tx, output_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(RequestState::Submitted);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let report = Arc::new(Mutex::new(None));

        let span = info_span!("request", id = %id, kind = request.kind());
        let driver = Driver {
            id,
            request,
            connections: Arc::clone(&connections),
            policy: Arc::clone(&self.policy),
            config: self.config.clone(),
            output: output_tx,
            state: state_tx,
            report: Arc::clone(&report),
        };
        tokio::spawn(driver.run(cancel_rx).instrument(span));

        RequestHandle {
            id,
            output: output_rx,
            state: state_rx,
            cancel: Arc::new(cancel_tx),
            report,
            connections,
            finished: false,
        }
    }
}

/// Caller's side of a submitted request
///
/// Dropping the handle cancels the request.
pub struct RequestHandle {
    id: RequestId,
    output: mpsc::Receiver<Result<DrainItem>>,
    state: watch::Receiver<RequestState>,
    cancel: Arc<watch::Sender<bool>>,
    report: Arc<Mutex<Option<RequestReport>>>,
    connections: Arc<ConnectionSet>,
    finished: bool,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    /// Results in endpoint order
    ///
    /// Yields batches and per-endpoint failures, then ends. A request-level
    /// failure (`RequestRejected`, `Unreachable`, `Cancelled`) is yielded
    /// once as `Err` and ends the stream.
    pub fn drain(&mut self) -> impl Stream<Item = Result<DrainItem>> + '_ {
        stream::poll_fn(move |cx| self.poll_drain(cx))
    }

    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<DrainItem>>> {
        if self.finished {
            return Poll::Ready(None);
        }
        if *self.cancel.borrow() {
            self.finished = true;
            return Poll::Ready(Some(Err(FetchError::Cancelled)));
        }

        match self.output.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                if item.is_err() {
                    self.finished = true;
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.finished = true;
                if *self.cancel.borrow() {
                    Poll::Ready(Some(Err(FetchError::Cancelled)))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }

    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// A clonable handle that can cancel while the request is being drained
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
            state: self.state.clone(),
        }
    }

    /// Wait for a terminal state
    ///
    /// Undrained batches keep the request in `Fetching`; call this after
    /// draining or cancelling.
    pub async fn wait(&self) -> RequestState {
        let mut state = self.state.clone();
        let settled = state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        settled.unwrap_or_else(|_| *state.borrow())
    }

    /// Available once the request is terminal
    pub fn report(&self) -> Option<RequestReport> {
        self.report.lock().clone()
    }

    /// The request's private connection set
    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

/// Cancels a request from outside its drain loop
#[derive(Clone)]
pub struct CancelHandle {
    cancel: Arc<watch::Sender<bool>>,
    state: watch::Receiver<RequestState>,
}

impl CancelHandle {
    /// Request cancellation; no effect once the request is terminal
    pub fn cancel(&self) {
        if self.state.borrow().is_terminal() {
            return;
        }
        if !self.cancel.send_replace(true) {
            info!("Cancellation requested");
        }
    }
}

/// Progress of one endpoint, sent from its fetch task to the driver
enum EndpointMessage {
    Routed(Route),
    Batch(RecordBatch),
    Failed(FetchError),
    Done,
}

struct Driver {
    id: RequestId,
    request: QueryRequest,
    connections: Arc<ConnectionSet>,
    policy: Arc<RedirectionPolicy>,
    config: OrchestratorConfig,
    output: mpsc::Sender<Result<DrainItem>>,
    state: watch::Sender<RequestState>,
    report: Arc<Mutex<Option<RequestReport>>>,
}

impl Driver {
    async fn run(self, mut cancel: watch::Receiver<bool>) {
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        let mut endpoints = Vec::new();

        let outcome = tokio::select! {
            biased;
            _ = cancel.wait_for(|cancelled| *cancelled) => None,
            outcome = self.execute(&mut tasks, &mut endpoints) => Some(outcome),
        };

        // stops every fetch and drops its stream before connections close
        tasks.shutdown().await;

        let state = match outcome {
            None | Some(Err(FetchError::Cancelled)) => {
                info!("Request cancelled");
                RequestState::Cancelled
            }
            Some(Err(e)) => {
                warn!("Request failed: {}", e);
                let _ = self.output.try_send(Err(e));
                RequestState::Failed
            }
            Some(Ok(())) => {
                let failed = endpoints.iter().filter(|e| !e.succeeded()).count();
                RequestState::settle(endpoints.len() - failed, failed)
            }
        };

        let grace = self.config.cancel_grace();
        if tokio::time::timeout(grace, self.connections.close_all())
            .await
            .is_err()
        {
            warn!("Connections still closing after {:?}", grace);
        }

        let elapsed = started.elapsed();
        info!("Request {} {} in {:?}", self.id, state, elapsed);
        *self.report.lock() = Some(RequestReport {
            request_id: self.id,
            state,
            endpoints,
            elapsed,
        });
        self.state.send_replace(state);
    }

    async fn execute(
        &self,
        tasks: &mut JoinSet<()>,
        reports: &mut Vec<EndpointReport>,
    ) -> Result<()> {
        self.state.send_replace(RequestState::Resolving);
        let descriptor = EndpointResolver::resolve(&self.connections, &self.request).await?;
        self.state.send_replace(RequestState::Fetching);

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..descriptor.len())
            .map(|_| mpsc::channel::<EndpointMessage>(1))
            .unzip();

        // Permits are taken in endpoint order, so the lowest endpoint not
        // yet forwarded always holds one.
        let spawn_all = async {
            for ((index, endpoint), tx) in descriptor.iter().zip(senders) {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let fetch = EndpointFetch {
                    index,
                    endpoint: endpoint.clone(),
                    policy: Arc::clone(&self.policy),
                    connections: Arc::clone(&self.connections),
                    tx,
                };
                let span = info_span!("endpoint", index = index.0);
                tasks.spawn(
                    async move {
                        let _permit = permit;
                        fetch.run().await;
                    }
                    .instrument(span),
                );
            }
        };

        let (_, forwarded) = tokio::join!(spawn_all, self.forward(receivers, reports));
        forwarded
    }

    /// Forward every endpoint's output, one endpoint at a time
    async fn forward(
        &self,
        receivers: Vec<mpsc::Receiver<EndpointMessage>>,
        reports: &mut Vec<EndpointReport>,
    ) -> Result<()> {
        for (i, mut rx) in receivers.into_iter().enumerate() {
            let index = EndpointIndex(i);
            let mut report = EndpointReport::new(index);

            let failure = loop {
                match rx.recv().await {
                    Some(EndpointMessage::Routed(route)) => report.route = Some(route),
                    Some(EndpointMessage::Batch(batch)) => {
                        report.record(&batch);
                        self.emit(DrainItem::Batch {
                            endpoint: index,
                            batch,
                        })
                        .await?;
                    }
                    Some(EndpointMessage::Done) => break None,
                    Some(EndpointMessage::Failed(cause)) => break Some(cause),
                    None => {
                        break Some(FetchError::Internal(
                            "fetch task ended without a result".to_string(),
                        ))
                    }
                }
            };

            match failure {
                Some(cause) => {
                    warn!("Endpoint {} failed: {}", index, cause);
                    report.error = Some(cause.to_string());
                    reports.push(report);
                    self.emit(DrainItem::EndpointFailed(EndpointError::new(index, cause)))
                        .await?;
                }
                None => {
                    debug!(
                        "Endpoint {} done: {} batches, {} rows",
                        index, report.batches, report.rows
                    );
                    reports.push(report);
                }
            }
        }
        Ok(())
    }

    async fn emit(&self, item: DrainItem) -> Result<()> {
        self.output
            .send(Ok(item))
            .await
            .map_err(|_| FetchError::Cancelled)
    }
}

/// Fetches one endpoint and reports its progress
struct EndpointFetch {
    index: EndpointIndex,
    endpoint: Endpoint,
    policy: Arc<RedirectionPolicy>,
    connections: Arc<ConnectionSet>,
    tx: mpsc::Sender<EndpointMessage>,
}

impl EndpointFetch {
    async fn run(self) {
        let message = match self.fetch().await {
            Ok(()) => EndpointMessage::Done,
            Err(e) => EndpointMessage::Failed(e),
        };
        let _ = self.tx.send(message).await;
    }

    async fn fetch(&self) -> Result<()> {
        let classification = self
            .policy
            .classify(&self.endpoint, self.connections.coordinator_location())?;
        debug!("Endpoint {} is {}", self.index, classification.route());
        self.send(EndpointMessage::Routed(classification.route()))
            .await?;

        match classification {
            Classification::Direct { locations, ticket } => {
                let handle = self.connections.first_reachable(&locations).await?;
                self.stream(&handle, &ticket).await
            }
            Classification::Redirect {
                claim_check,
                targets,
            } => {
                if let Some(ticket) = claim_check {
                    let handle = self.connections.coordinator().await?;
                    self.stream(&handle, &ticket).await?;
                }
                for target in targets {
                    info!("Endpoint {} redirected to {}", self.index, target.location);
                    let handle = self.connections.get(&target.location).await?;
                    self.stream(&handle, &target.ticket).await?;
                }
                Ok(())
            }
        }
    }

    async fn stream(&self, handle: &ConnectionHandle, ticket: &Ticket) -> Result<()> {
        let mut stream = StreamFetcher::fetch(handle, ticket).await?;
        while let Some(batch) = stream.next().await {
            self.send(EndpointMessage::Batch(batch?)).await?;
        }
        Ok(())
    }

    async fn send(&self, message: EndpointMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| FetchError::Cancelled)
    }
}
