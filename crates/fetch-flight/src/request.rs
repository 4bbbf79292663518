//! Translation of requests into Flight calls

use arrow_flight::sql::{
    CommandGetCatalogs, CommandGetDbSchemas, CommandGetPrimaryKeys, CommandGetSqlInfo,
    CommandGetTables, CommandGetXdbcTypeInfo, CommandStatementQuery, ProstMessageExt,
};
use arrow_flight::{Criteria, FlightDescriptor, FlightInfo};
use bytes::Bytes;
use fetch_core::{Endpoint, Location, MetadataRequest, QueryRequest, ResultDescriptor, Ticket};
use prost::Message;

/// The Flight RPC that answers a request
pub(crate) enum FlightCall {
    /// `GetFlightInfo` with a command descriptor
    Info(FlightDescriptor),
    /// `ListFlights`, streamed
    List(Criteria),
}

fn command<M: ProstMessageExt>(cmd: M) -> FlightCall {
    FlightCall::Info(FlightDescriptor::new_cmd(cmd.as_any().encode_to_vec()))
}

pub(crate) fn encode(request: &QueryRequest) -> FlightCall {
    match request {
        QueryRequest::Sql(query) => command(CommandStatementQuery {
            query: query.clone(),
            transaction_id: None,
        }),
        QueryRequest::Metadata(metadata) => match metadata {
            MetadataRequest::ListFlights { criteria } => FlightCall::List(Criteria {
                expression: criteria
                    .as_ref()
                    .map(|c| Bytes::copy_from_slice(c.as_bytes()))
                    .unwrap_or_default(),
            }),
            MetadataRequest::ListTables {
                catalog,
                db_schema_filter_pattern,
                table_name_filter_pattern,
                table_types,
                include_schema,
            } => command(CommandGetTables {
                catalog: catalog.clone(),
                db_schema_filter_pattern: db_schema_filter_pattern.clone(),
                table_name_filter_pattern: table_name_filter_pattern.clone(),
                table_types: table_types.clone(),
                include_schema: *include_schema,
            }),
            MetadataRequest::ListSchemas {
                catalog,
                db_schema_filter_pattern,
            } => command(CommandGetDbSchemas {
                catalog: catalog.clone(),
                db_schema_filter_pattern: db_schema_filter_pattern.clone(),
            }),
            MetadataRequest::ListCatalogs => command(CommandGetCatalogs {}),
            MetadataRequest::ListPrimaryKeys {
                catalog,
                db_schema,
                table,
            } => command(CommandGetPrimaryKeys {
                catalog: catalog.clone(),
                db_schema: db_schema.clone(),
                table: table.clone(),
            }),
            MetadataRequest::ListTypeInfo { data_type } => command(CommandGetXdbcTypeInfo {
                data_type: *data_type,
            }),
            MetadataRequest::ListSqlInfo { info } => {
                command(CommandGetSqlInfo { info: info.clone() })
            }
        },
    }
}

fn endpoint_from_flight(endpoint: arrow_flight::FlightEndpoint) -> Endpoint {
    Endpoint {
        locations: endpoint
            .location
            .into_iter()
            .map(|l| Location::new(l.uri))
            .collect(),
        ticket: endpoint
            .ticket
            .map(|t| Ticket::new(t.ticket))
            .unwrap_or_else(|| Ticket::new(Bytes::new())),
        app_metadata: endpoint.app_metadata,
    }
}

/// Endpoints of every info, in arrival order
pub(crate) fn descriptor_from_infos(infos: Vec<FlightInfo>) -> ResultDescriptor {
    let total_records = match infos.as_slice() {
        [single] if single.total_records >= 0 => Some(single.total_records),
        _ => None,
    };

    let endpoints = infos
        .into_iter()
        .flat_map(|info| info.endpoint)
        .map(endpoint_from_flight)
        .collect();

    ResultDescriptor {
        endpoints,
        total_records,
    }
}
