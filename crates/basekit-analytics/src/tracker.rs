//! Page-view tracker
//!
//! `on_navigate` only enqueues; a background worker batches events and hands
//! them to the sink. Nothing the sink does can fail or block navigation:
//! failures are logged and counted, a full queue drops the event.

use crate::events::PageViewEvent;
use crate::sink::AnalyticsSink;
use basekit_core::{Clock, SystemClock};
use basekit_observability::Metrics;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Events buffered before a flush
    pub batch_size: usize,
    /// Flush interval for partially filled batches (milliseconds)
    pub flush_interval_ms: u64,
    /// Queue capacity between `on_navigate` and the worker
    pub channel_buffer_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            flush_interval_ms: 2000,
            channel_buffer_size: 256,
        }
    }
}

pub struct PageViewTracker {
    tx: Mutex<Option<mpsc::Sender<PageViewEvent>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    last_path: Mutex<Option<String>>,
    session_id: Uuid,
    clock: Arc<dyn Clock>,
    metrics: Option<Metrics>,
}

impl PageViewTracker {
    /// Start a tracker on the system clock
    pub fn new(sink: Arc<dyn AnalyticsSink>, config: TrackerConfig) -> Self {
        TrackerBuilder::new(sink).config(config).build()
    }

    pub fn builder(sink: Arc<dyn AnalyticsSink>) -> TrackerBuilder {
        TrackerBuilder::new(sink)
    }

    /// Identifier attached to every event from this tracker
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Record a navigation to `path`
    ///
    /// Never blocks. Returns `false` when the event was not queued: a repeat
    /// of the previous path, a full queue, or a stopped tracker.
    pub fn on_navigate(&self, path: &str) -> bool {
        let mut last_path = self.last_path.lock().unwrap_or_else(|e| e.into_inner());
        if last_path.as_deref() == Some(path) {
            self.record("deduplicated");
            return false;
        }

        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = tx.as_ref() else {
            debug!(path, "Tracker stopped, ignoring navigation");
            return false;
        };

        let event = PageViewEvent::new(path, self.clock.now(), self.session_id);
        match tx.try_send(event) {
            Ok(()) => {
                *last_path = Some(path.to_string());
                self.record("queued");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(path, "Page-view queue full, dropping event");
                self.record("dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Page-view worker has stopped");
                self.record("dropped");
                false
            }
        }
    }

    /// Flush buffered events and stop the worker
    ///
    /// Later navigations are ignored. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        // Dropping the sender lets the worker drain and exit
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "Page-view worker failed");
            }
            info!("Page-view tracker stopped");
        }
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_page_view(outcome);
        }
    }

    async fn worker_loop(
        mut rx: mpsc::Receiver<PageViewEvent>,
        sink: Arc<dyn AnalyticsSink>,
        config: TrackerConfig,
        metrics: Option<Metrics>,
    ) {
        let batch_size = config.batch_size.max(1);
        let mut buffer = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(Duration::from_millis(config.flush_interval_ms.max(1)));

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => {
                        buffer.push(event);
                        if buffer.len() >= batch_size {
                            Self::flush(&*sink, &mut buffer, metrics.as_ref()).await;
                        }
                    }
                    None => {
                        Self::flush(&*sink, &mut buffer, metrics.as_ref()).await;
                        break;
                    }
                },
                _ = interval.tick() => {
                    Self::flush(&*sink, &mut buffer, metrics.as_ref()).await;
                }
            }
        }

        debug!("Page-view worker exited");
    }

    async fn flush(sink: &dyn AnalyticsSink, buffer: &mut Vec<PageViewEvent>, metrics: Option<&Metrics>) {
        if buffer.is_empty() {
            return;
        }

        let events = std::mem::take(buffer);
        let sent = match sink.send_batch(&events).await {
            Ok(()) => events.len(),
            Err(e) => {
                warn!(
                    error = %e.source,
                    delivered = e.delivered,
                    event_count = events.len(),
                    "Failed to deliver page views"
                );
                e.delivered.min(events.len())
            }
        };

        if let Some(metrics) = metrics {
            for (outcome, count) in [("sent", sent), ("failed", events.len() - sent)] {
                if count > 0 {
                    metrics
                        .page_views_total
                        .with_label_values(&[outcome])
                        .inc_by(count as f64);
                }
            }
        }
    }
}

impl Drop for PageViewTracker {
    fn drop(&mut self) {
        let worker_running = self
            .worker
            .try_lock()
            .map(|worker| worker.is_some())
            .unwrap_or(false);
        if worker_running {
            warn!("PageViewTracker dropped without shutdown(); buffered events may be lost");
        }
    }
}

/// Builder for `PageViewTracker`
pub struct TrackerBuilder {
    sink: Arc<dyn AnalyticsSink>,
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    metrics: Option<Metrics>,
}

impl TrackerBuilder {
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            sink,
            config: TrackerConfig::default(),
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the worker; must be called inside a Tokio runtime
    pub fn build(self) -> PageViewTracker {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size.max(1));
        let worker = tokio::spawn(PageViewTracker::worker_loop(
            rx,
            self.sink,
            self.config,
            self.metrics.clone(),
        ));

        PageViewTracker {
            tx: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            last_path: Mutex::new(None),
            session_id: Uuid::new_v4(),
            clock: self.clock,
            metrics: self.metrics,
        }
    }
}
