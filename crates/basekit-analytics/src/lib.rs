//! Basekit Analytics
//!
//! Page-view tracking decoupled from the navigation it observes:
//! - `PageViewTracker`: non-blocking `on_navigate`, deduplication, batching
//! - `AnalyticsSink`: where batches go (`HttpCollector`, `DisabledSink`)
//! - `PageViewEvent`: the event document

pub mod events;
pub mod sink;
pub mod tracker;

pub use events::PageViewEvent;
pub use sink::{AnalyticsSink, BatchError, BatchResult, DisabledSink, HttpCollector};
pub use tracker::{PageViewTracker, TrackerBuilder, TrackerConfig};
