//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for Basekit:
//! - Data access request counts and latency by verb and outcome
//! - Session refresh outcomes
//! - Page-view tracking outcomes

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector for Basekit
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Data access calls by verb and outcome
    pub data_requests_total: CounterVec,
    /// Data access call duration, including any refresh-and-retry
    pub data_request_duration_seconds: HistogramVec,

    /// Credential refresh attempts by outcome
    pub session_refreshes_total: CounterVec,

    /// Page views by outcome (queued, deduplicated, dropped, sent, failed)
    pub page_views_total: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let data_requests_total = CounterVec::new(
            Opts::new("basekit_data_requests_total", "Total number of data access calls"),
            &["verb", "outcome"],
        )?;

        let data_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "basekit_data_request_duration_seconds",
                "Data access call duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["verb"],
        )?;

        let session_refreshes_total = CounterVec::new(
            Opts::new(
                "basekit_session_refreshes_total",
                "Total number of credential refresh attempts",
            ),
            &["outcome"],
        )?;

        let page_views_total = CounterVec::new(
            Opts::new("basekit_page_views_total", "Page views observed by the tracker"),
            &["outcome"],
        )?;

        registry.register(Box::new(data_requests_total.clone()))?;
        registry.register(Box::new(data_request_duration_seconds.clone()))?;
        registry.register(Box::new(session_refreshes_total.clone()))?;
        registry.register(Box::new(page_views_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            data_requests_total,
            data_request_duration_seconds,
            session_refreshes_total,
            page_views_total,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one data access call
    pub fn record_data_request(&self, verb: &str, outcome: &str, duration_secs: f64) {
        self.data_requests_total
            .with_label_values(&[verb, outcome])
            .inc();
        self.data_request_duration_seconds
            .with_label_values(&[verb])
            .observe(duration_secs);
    }

    /// Record one refresh attempt
    pub fn record_refresh(&self, outcome: &str) {
        self.session_refreshes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record one page-view outcome
    pub fn record_page_view(&self, outcome: &str) {
        self.page_views_total.with_label_values(&[outcome]).inc();
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
