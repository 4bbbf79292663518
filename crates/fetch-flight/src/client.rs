//! Arrow Flight client connections
//!
//! [`FlightConnector`] opens one tonic channel per location; each
//! [`FlightConnection`] answers requests and streams tickets over it.

use std::sync::Arc;

use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::FlightInfo;
use async_trait::async_trait;
use fetch_core::{
    BatchStream, Connection, ConnectionConfig, Connector, FetchError, Location, QueryRequest,
    ResultDescriptor, Result, Ticket,
};
use futures::{StreamExt, TryStreamExt};
use parking_lot::RwLock;
use tonic::metadata::{MetadataKey, MetadataValue};
use tonic::transport::Channel;
use tonic::Request;
use tracing::{debug, info};

use crate::error::FlightError;
use crate::request::{self, FlightCall};

/// Opens [`FlightConnection`]s with shared settings
#[derive(Debug, Clone, Default)]
pub struct FlightConnector {
    config: ConnectionConfig,
}

impl FlightConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for FlightConnector {
    async fn connect(&self, location: &Location) -> Result<Arc<dyn Connection>> {
        let connection = FlightConnection::connect(location, self.config.clone()).await?;
        Ok(Arc::new(connection))
    }
}

/// A Flight channel to one location
pub struct FlightConnection {
    location: Location,
    client: RwLock<Option<FlightServiceClient<Channel>>>,
    config: ConnectionConfig,
}

impl FlightConnection {
    /// Connect to a Flight server
    pub async fn connect(location: &Location, config: ConnectionConfig) -> Result<Self> {
        let url = location.channel_url()?;
        info!("Connecting to Flight server at {}", url);

        let channel = Channel::from_shared(url)
            .map_err(|e| FetchError::InvalidLocation(e.to_string()))?
            .connect_timeout(config.connect_timeout())
            .connect()
            .await
            .map_err(|e| FlightError::from(e).into_call_error(location))?;

        Ok(Self {
            location: location.clone(),
            client: RwLock::new(Some(FlightServiceClient::new(channel))),
            config,
        })
    }

    /// Get the location this connection points at
    pub fn location(&self) -> &Location {
        &self.location
    }

    fn client(&self) -> Result<FlightServiceClient<Channel>> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| FetchError::ConnectionClosed(self.location.uri().to_string()))
    }

    /// Wrap a message with the configured credentials and timeout
    fn request<T>(&self, message: T) -> Result<Request<T>> {
        let mut request = Request::new(message);

        if let Some(token) = &self.config.bearer_token {
            let value = MetadataValue::try_from(format!("Bearer {}", token))
                .map_err(|e| FetchError::Config(e.to_string()))?;
            request.metadata_mut().insert("authorization", value);
        }
        for (key, value) in &self.config.headers {
            let key = MetadataKey::from_bytes(key.as_bytes())
                .map_err(|e| FetchError::Config(e.to_string()))?;
            let value = MetadataValue::try_from(value.as_str())
                .map_err(|e| FetchError::Config(e.to_string()))?;
            request.metadata_mut().insert(key, value);
        }
        if let Some(timeout) = self.config.request_timeout() {
            request.set_timeout(timeout);
        }

        Ok(request)
    }

    async fn call(&self, call: FlightCall) -> std::result::Result<Vec<FlightInfo>, FlightError> {
        let mut client = self
            .client()
            .map_err(|e| FlightError::InvalidRequest(e.to_string()))?;

        match call {
            FlightCall::Info(descriptor) => {
                let request = self
                    .request(descriptor)
                    .map_err(|e| FlightError::InvalidRequest(e.to_string()))?;
                let info = client.get_flight_info(request).await?.into_inner();
                Ok(vec![info])
            }
            FlightCall::List(criteria) => {
                let request = self
                    .request(criteria)
                    .map_err(|e| FlightError::InvalidRequest(e.to_string()))?;
                let mut stream = client.list_flights(request).await?.into_inner();

                let mut infos = Vec::new();
                while let Some(info) = stream.message().await? {
                    infos.push(info);
                }
                Ok(infos)
            }
        }
    }
}

#[async_trait]
impl Connection for FlightConnection {
    async fn describe(&self, request: &QueryRequest) -> Result<ResultDescriptor> {
        if self.is_closed() {
            return Err(FetchError::ConnectionClosed(self.location.uri().to_string()));
        }

        debug!("Describing {} at {}", request, self.location);
        let infos = self
            .call(request::encode(request))
            .await
            .map_err(|e| e.into_call_error(&self.location))?;

        let descriptor = request::descriptor_from_infos(infos);
        info!(
            "{} resolved to {} endpoints at {}",
            request.kind(),
            descriptor.len(),
            self.location
        );
        Ok(descriptor)
    }

    async fn do_get(&self, ticket: &Ticket) -> Result<BatchStream> {
        let mut client = self.client()?;
        let request = self.request(arrow_flight::Ticket::new(ticket.as_bytes().clone()))?;

        let response = client
            .do_get(request)
            .await
            .map_err(|status| FlightError::from(status).into_call_error(&self.location))?;

        let flight_data = response
            .into_inner()
            .map_err(arrow_flight::error::FlightError::from);

        let batches = FlightRecordBatchStream::new_from_flight_data(flight_data)
            .map_err(|e| FlightError::from(e).into_stream_error());

        Ok(batches.boxed())
    }

    async fn close(&self) {
        if self.client.write().take().is_some() {
            debug!("Closed Flight connection to {}", self.location);
        }
    }

    fn is_closed(&self) -> bool {
        self.client.read().is_none()
    }
}
