//! Stream fetcher
//!
//! Redeems one ticket on one connection and exposes the server stream as a
//! [`FetchStream`]. The stream holds a lease on the connection handle until
//! it ends, fails or is dropped.

use std::pin::Pin;
use std::task::{Context, Poll};

use arrow::record_batch::RecordBatch;
use fetch_core::{BatchStream, FetchError, Location, Result, Ticket};
use futures::stream::{FusedStream, Stream, StreamExt};
use tracing::debug;

use crate::connections::{ConnectionHandle, StreamLease};

/// Opens ticket streams on a connection
pub struct StreamFetcher;

impl StreamFetcher {
    pub async fn fetch(handle: &ConnectionHandle, ticket: &Ticket) -> Result<FetchStream> {
        let lease = handle.lease();
        debug!("Redeeming {:?} at {}", ticket, handle.location());
        let inner = handle.connection().do_get(ticket).await?;

        Ok(FetchStream {
            inner: Some(inner),
            lease: Some(lease),
            delivered: 0,
            location: handle.location().clone(),
        })
    }
}

/// Finite, non-restartable batch stream for one ticket
///
/// A transport error ends the stream with a single `StreamInterrupted`
/// carrying the number of batches already delivered.
pub struct FetchStream {
    inner: Option<BatchStream>,
    lease: Option<StreamLease>,
    delivered: usize,
    location: Location,
}

impl FetchStream {
    pub fn batches_delivered(&self) -> usize {
        self.delivered
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    fn release(&mut self) {
        self.inner = None;
        self.lease = None;
    }
}

impl Stream for FetchStream {
    type Item = Result<RecordBatch>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(batch))) => {
                this.delivered += 1;
                Poll::Ready(Some(Ok(batch)))
            }
            Poll::Ready(Some(Err(e))) => {
                let reason = match e {
                    FetchError::StreamInterrupted { reason, .. } => reason,
                    other => other.to_string(),
                };
                debug!(
                    "Stream from {} interrupted after {} batches: {}",
                    this.location, this.delivered, reason
                );
                this.release();
                Poll::Ready(Some(Err(FetchError::StreamInterrupted {
                    batches_delivered: this.delivered,
                    reason,
                })))
            }
            Poll::Ready(None) => {
                this.release();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for FetchStream {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}
