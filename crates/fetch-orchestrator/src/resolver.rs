//! Endpoint resolver

use fetch_core::{FetchError, QueryRequest, Result, ResultDescriptor};
use tracing::info;

use crate::connections::ConnectionSet;

/// Turns a request into the coordinator's list of endpoints
pub struct EndpointResolver;

impl EndpointResolver {
    /// Submit `request` to the coordinator and collect every endpoint
    ///
    /// The coordinator connection is cached in `connections` for later
    /// direct fetches.
    pub async fn resolve(
        connections: &ConnectionSet,
        request: &QueryRequest,
    ) -> Result<ResultDescriptor> {
        let coordinator = connections.coordinator().await.map_err(|e| {
            if e.is_request_level() {
                e
            } else {
                FetchError::unreachable(connections.coordinator_location().uri(), e)
            }
        })?;

        let descriptor = coordinator
            .connection()
            .describe(request)
            .await
            .map_err(|e| {
                if e.is_request_level() {
                    e
                } else {
                    FetchError::rejected(e)
                }
            })?;

        info!(
            "Resolved {} into {} endpoints via {}",
            request.kind(),
            descriptor.len(),
            coordinator.location()
        );
        Ok(descriptor)
    }
}
