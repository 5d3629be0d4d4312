//! Application context

use basekit_analytics::{AnalyticsSink, DisabledSink, HttpCollector, PageViewTracker, TrackerConfig};
use basekit_config::AppConfig;
use basekit_core::{Clock, ConfigError, DataAccess, Error, Result, SystemClock};
use basekit_data::{AuthorizedDispatcher, BackendApi, CollectionPolicy, LiveDataAccess};
use basekit_egress::{AuthClient, HttpClientConfig, RemoteClient, RemoteConfig, create_client};
use basekit_observability::Metrics;
use basekit_session::{AutoRefreshHandle, CredentialStorage, FileStorage, MemoryStorage, SessionStore};
use chrono::Duration;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Install the global subscriber from the `logging` section
pub fn init_logging(config: &AppConfig) -> std::result::Result<(), tracing::subscriber::SetGlobalDefaultError> {
    basekit_observability::init_logging(&config.logging.level, config.logging.log_http)
}

/// Prebuilt components for `AppContext::from_parts`
pub struct ContextParts {
    pub config: AppConfig,
    pub session: SessionStore,
    pub data: Arc<dyn DataAccess>,
    pub backend: BackendApi,
    pub tracker: Arc<PageViewTracker>,
    pub metrics: Metrics,
}

pub struct AppContext {
    config: AppConfig,
    session: SessionStore,
    data: Arc<dyn DataAccess>,
    backend: BackendApi,
    tracker: Arc<PageViewTracker>,
    metrics: Metrics,
    auto_refresh: Mutex<Option<AutoRefreshHandle>>,
}

impl AppContext {
    /// Build every component from `config`
    ///
    /// # Errors
    /// `Error::Config` when configuration is incomplete or malformed. A
    /// persisted credential that cannot be read is logged and ignored.
    pub async fn bootstrap(config: AppConfig) -> Result<Self> {
        Self::bootstrap_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn bootstrap_with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let service_url = required(&config.service.url, "service.url")?;
        let public_key = required(&config.service.public_key, "service.public_key")?;
        let backend_url = required(&config.backend.url, "backend.url")?;

        let metrics = Metrics::new().map_err(|e| ConfigError::Invalid {
            field: "metrics".to_string(),
            reason: e.to_string(),
        })?;

        let client = create_client(&HttpClientConfig {
            timeout_secs: config.http.timeout_secs,
            connect_timeout_secs: config.http.connect_timeout_secs,
            pool_max_idle_per_host: config.http.pool_max_idle_per_host,
            ..HttpClientConfig::default()
        })?;

        let service = RemoteClient::with_client(
            RemoteConfig::new(service_url).with_header("apikey", public_key),
            client.clone(),
        )?;
        let backend_remote = RemoteClient::with_client(RemoteConfig::new(backend_url), client.clone())?;

        let storage: Arc<dyn CredentialStorage> = match &config.session.storage_path {
            Some(path) => Arc::new(FileStorage::from_config_path(path)),
            None => Arc::new(MemoryStorage::new()),
        };
        let session = SessionStore::new(
            Arc::new(AuthClient::new(service.clone(), clock.clone())),
            storage,
            clock.clone(),
            refresh_margin(config.session.refresh_margin_secs)?,
        )
        .with_metrics(metrics.clone());

        match session.restore().await {
            Ok(Some(_)) => info!("Resumed persisted session"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not restore persisted session"),
        }

        let data = LiveDataAccess::new(
            AuthorizedDispatcher::new(service, session.clone(), public_key),
            CollectionPolicy::with_public(config.data.public_collections.iter().cloned()),
        )
        .with_metrics(metrics.clone());
        let backend = BackendApi::new(AuthorizedDispatcher::new(backend_remote, session.clone(), public_key));

        let sink: Arc<dyn AnalyticsSink> = if config.analytics.enabled {
            let endpoint = required(&config.analytics.endpoint, "analytics.endpoint")?;
            Arc::new(HttpCollector::new(RemoteClient::with_client(
                RemoteConfig::new(endpoint),
                client,
            )?))
        } else {
            info!("Analytics disabled");
            Arc::new(DisabledSink)
        };
        let tracker = PageViewTracker::builder(sink)
            .config(TrackerConfig {
                batch_size: config.analytics.batch_size,
                flush_interval_ms: config.analytics.flush_interval_ms,
                channel_buffer_size: config.analytics.channel_buffer_size,
            })
            .clock(clock)
            .metrics(metrics.clone())
            .build();

        let auto_refresh = config.session.auto_refresh.then(|| {
            session.spawn_auto_refresh(std::time::Duration::from_secs(
                config.session.auto_refresh_interval_secs,
            ))
        });

        info!("Application context ready");
        Ok(Self {
            config,
            session,
            data: Arc::new(data),
            backend,
            tracker: Arc::new(tracker),
            metrics,
            auto_refresh: Mutex::new(auto_refresh),
        })
    }

    /// Assemble a context from prebuilt parts, e.g. a `ScriptedDataAccess`
    pub fn from_parts(parts: ContextParts) -> Self {
        Self {
            config: parts.config,
            session: parts.session,
            data: parts.data,
            backend: parts.backend,
            tracker: parts.tracker,
            metrics: parts.metrics,
            auto_refresh: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn data(&self) -> Arc<dyn DataAccess> {
        Arc::clone(&self.data)
    }

    pub fn backend(&self) -> &BackendApi {
        &self.backend
    }

    pub fn tracker(&self) -> Arc<PageViewTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop background refresh and flush pending page views
    pub async fn shutdown(&self) {
        let auto_refresh = self
            .auto_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = auto_refresh {
            handle.stop();
        }
        self.tracker.shutdown().await;
        info!("Application context shut down");
    }
}

fn refresh_margin(secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| {
            Error::Config(ConfigError::Invalid {
                field: "session.refresh_margin_secs".to_string(),
                reason: format!("{} seconds is out of range", secs),
            })
        })
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| Error::Config(ConfigError::Missing(field.to_string())))
}
