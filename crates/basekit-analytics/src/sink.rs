//! Analytics destinations

use crate::events::PageViewEvent;
use async_trait::async_trait;
use basekit_core::{Error, Result};
use basekit_egress::{RemoteClient, RemoteRequest};
use tracing::debug;

/// A batch that stopped part way through
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("delivered {delivered} of the batch before failing: {source}")]
pub struct BatchError {
    /// Leading events the destination accepted before the failure
    pub delivered: usize,
    pub source: Error,
}

impl From<Error> for BatchError {
    fn from(source: Error) -> Self {
        Self { delivered: 0, source }
    }
}

pub type BatchResult = std::result::Result<(), BatchError>;

/// Receives batches of page views from the tracker worker
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn send_batch(&self, events: &[PageViewEvent]) -> BatchResult;
}

/// Posts each event as one JSON document to the collector endpoint
pub struct HttpCollector {
    remote: RemoteClient,
}

impl HttpCollector {
    /// `remote` has the full collector endpoint as its base URL
    pub fn new(remote: RemoteClient) -> Self {
        Self { remote }
    }

    async fn deliver(&self, event: &PageViewEvent) -> Result<()> {
        let request = RemoteRequest::post("").json(serde_json::to_value(event)?);
        self.remote.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsSink for HttpCollector {
    async fn send_batch(&self, events: &[PageViewEvent]) -> BatchResult {
        for (delivered, event) in events.iter().enumerate() {
            // Stop at the first failure; the collector is most likely down
            self.deliver(event)
                .await
                .map_err(|source| BatchError { delivered, source })?;
        }
        debug!(count = events.len(), "Page views delivered");
        Ok(())
    }
}

/// Discards everything; used when analytics is turned off
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSink;

#[async_trait]
impl AnalyticsSink for DisabledSink {
    async fn send_batch(&self, _events: &[PageViewEvent]) -> BatchResult {
        Ok(())
    }
}
