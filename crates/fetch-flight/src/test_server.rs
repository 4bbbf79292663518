//! In-process Flight server used by the client tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
};
use bytes::Bytes;
use fetch_core::{Endpoint, Location};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use parking_lot::Mutex;
use tonic::metadata::KeyAndValueRef;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

pub(crate) fn batch(values: &[i64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap()
}

enum TicketScript {
    Batches(Vec<RecordBatch>),
    FailAfter(Vec<RecordBatch>, String),
}

#[derive(Default)]
pub(crate) struct TestFlightService {
    infos: Vec<FlightInfo>,
    tickets: HashMap<Bytes, TicketScript>,
    reject: Option<String>,
    headers: Arc<Mutex<Vec<(String, String)>>>,
}

impl TestFlightService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add one `FlightInfo` carrying these endpoints
    pub(crate) fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        let mut info = FlightInfo::new();
        for endpoint in endpoints {
            let mut flight_endpoint = arrow_flight::FlightEndpoint::new()
                .with_ticket(Ticket::new(endpoint.ticket.into_bytes()))
                .with_app_metadata(endpoint.app_metadata);
            for location in endpoint.locations {
                flight_endpoint = flight_endpoint.with_location(location.uri);
            }
            info = info.with_endpoint(flight_endpoint);
        }
        self.infos.push(info);
        self
    }

    pub(crate) fn with_ticket(mut self, ticket: &str, batches: Vec<RecordBatch>) -> Self {
        self.tickets
            .insert(Bytes::copy_from_slice(ticket.as_bytes()), TicketScript::Batches(batches));
        self
    }

    pub(crate) fn with_failing_ticket(
        mut self,
        ticket: &str,
        batches: Vec<RecordBatch>,
        reason: &str,
    ) -> Self {
        self.tickets.insert(
            Bytes::copy_from_slice(ticket.as_bytes()),
            TicketScript::FailAfter(batches, reason.to_string()),
        );
        self
    }

    pub(crate) fn rejecting(mut self, reason: &str) -> Self {
        self.reject = Some(reason.to_string());
        self
    }

    pub(crate) fn seen_headers(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        Arc::clone(&self.headers)
    }

    fn record_headers<T>(&self, request: &Request<T>) {
        let mut seen = self.headers.lock();
        for entry in request.metadata().iter() {
            if let KeyAndValueRef::Ascii(key, value) = entry {
                if let Ok(value) = value.to_str() {
                    seen.push((key.as_str().to_string(), value.to_string()));
                }
            }
        }
    }

    fn encode(batches: Vec<RecordBatch>) -> BoxStream<'static, Result<FlightData, Status>> {
        FlightDataEncoderBuilder::new()
            .build(stream::iter(batches.into_iter().map(Ok)))
            .map_err(|e| Status::internal(e.to_string()))
            .boxed()
    }
}

/// A loopback address nothing listens on
pub(crate) fn unused_location() -> Location {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Location::new(format!("grpc+tcp://{}", addr))
}

/// Serve on a loopback port and wait until it accepts connections
pub(crate) async fn spawn(service: TestFlightService) -> Location {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    tokio::spawn(async move {
        Server::builder()
            .add_service(FlightServiceServer::new(service))
            .serve(addr)
            .await
            .unwrap();
    });

    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    Location::new(format!("grpc+tcp://{}", addr))
}

#[tonic::async_trait]
impl FlightService for TestFlightService {
    type HandshakeStream = BoxStream<'static, Result<HandshakeResponse, Status>>;
    type ListFlightsStream = BoxStream<'static, Result<FlightInfo, Status>>;
    type DoGetStream = BoxStream<'static, Result<FlightData, Status>>;
    type DoPutStream = BoxStream<'static, Result<PutResult, Status>>;
    type DoActionStream = BoxStream<'static, Result<arrow_flight::Result, Status>>;
    type ListActionsStream = BoxStream<'static, Result<ActionType, Status>>;
    type DoExchangeStream = BoxStream<'static, Result<FlightData, Status>>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        Err(Status::unimplemented("handshake"))
    }

    async fn list_flights(
        &self,
        request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        self.record_headers(&request);
        if let Some(reason) = &self.reject {
            return Err(Status::invalid_argument(reason.clone()));
        }
        let infos: Vec<_> = self.infos.iter().cloned().map(Ok).collect();
        Ok(Response::new(stream::iter(infos).boxed()))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.record_headers(&request);
        if let Some(reason) = &self.reject {
            return Err(Status::invalid_argument(reason.clone()));
        }
        let descriptor = request.into_inner();
        let info = self
            .infos
            .first()
            .cloned()
            .unwrap_or_default()
            .with_descriptor(descriptor);
        Ok(Response::new(info))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info"))
    }

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        Err(Status::unimplemented("get_schema"))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        self.record_headers(&request);
        let ticket = request.into_inner().ticket;

        let stream = match self.tickets.get(&ticket) {
            Some(TicketScript::Batches(batches)) => Self::encode(batches.clone()),
            Some(TicketScript::FailAfter(batches, reason)) => {
                let failure = Status::internal(reason.clone());
                Self::encode(batches.clone())
                    .chain(stream::once(async move { Err(failure) }))
                    .boxed()
            }
            None => return Err(Status::not_found("unknown ticket")),
        };

        Ok(Response::new(stream))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        Err(Status::unimplemented("do_put"))
    }

    async fn do_action(
        &self,
        _request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        Err(Status::unimplemented("do_action"))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        Ok(Response::new(stream::empty().boxed()))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange"))
    }
}
