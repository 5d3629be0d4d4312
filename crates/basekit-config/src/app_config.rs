use basekit_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hosted data/auth service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Application backend API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Refresh once less than this much validity is left
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,

    #[serde(default = "default_true")]
    pub auto_refresh: bool,

    #[serde(default = "default_auto_refresh_interval_secs")]
    pub auto_refresh_interval_secs: u64,

    /// Credential file; in-memory storage when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// Collections readable and writable without a signed-in user
    #[serde(default)]
    pub public_collections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub log_http: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            channel_buffer_size: default_channel_buffer_size(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: default_refresh_margin_secs(),
            auto_refresh: true,
            auto_refresh_interval_secs: default_auto_refresh_interval_secs(),
            storage_path: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_http: false,
        }
    }
}

impl AppConfig {
    /// Read configuration from file (if given), overlay the process
    /// environment, and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| ConfigError::Load(format!("Invalid TOML in {}: {}", path.display(), e)))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::Load(format!("Invalid YAML in {}: {}", path.display(), e)))?
        };

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Merge process environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        self.merge_env_from(|key| std::env::var(key).ok());
    }

    /// Merge variables resolved by `lookup` into config
    pub fn merge_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("BASEKIT_SERVICE_URL") {
            self.service.url = Some(val);
        }

        if let Some(val) = lookup("BASEKIT_SERVICE_KEY") {
            self.service.public_key = Some(val);
        }

        if let Some(val) = lookup("BASEKIT_API_URL") {
            self.backend.url = Some(val);
        }

        if let Some(val) = lookup("BASEKIT_ANALYTICS_ENDPOINT") {
            self.analytics.endpoint = Some(val);
        }

        if let Some(val) = lookup("BASEKIT_ANALYTICS_ENABLED") {
            match val.parse::<bool>() {
                Ok(enabled) => self.analytics.enabled = enabled,
                Err(_) => warn!("Ignoring invalid BASEKIT_ANALYTICS_ENABLED '{}'", val),
            }
        }

        if let Some(val) = lookup("BASEKIT_SESSION_FILE") {
            self.session.storage_path = Some(val);
        }

        if let Some(val) = lookup("BASEKIT_REFRESH_MARGIN_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => self.session.refresh_margin_secs = secs,
                Err(_) => warn!("Ignoring invalid BASEKIT_REFRESH_MARGIN_SECS '{}'", val),
            }
        }

        if let Some(val) = lookup("BASEKIT_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Check that every required value is present and well-formed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let service_url = required("service.url", &self.service.url)?;
        validate_url("service.url", service_url)?;
        required("service.public_key", &self.service.public_key)?;

        let backend_url = required("backend.url", &self.backend.url)?;
        validate_url("backend.url", backend_url)?;

        if self.analytics.enabled {
            let endpoint = required("analytics.endpoint", &self.analytics.endpoint)?;
            validate_url("analytics.endpoint", endpoint)?;

            if self.analytics.batch_size == 0 {
                return Err(ConfigError::Invalid {
                    field: "analytics.batch_size".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            if self.analytics.channel_buffer_size == 0 {
                return Err(ConfigError::Invalid {
                    field: "analytics.channel_buffer_size".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if self.session.refresh_margin_secs > MAX_REFRESH_MARGIN_SECS {
            return Err(ConfigError::Invalid {
                field: "session.refresh_margin_secs".to_string(),
                reason: format!("must not exceed {} seconds", MAX_REFRESH_MARGIN_SECS),
            });
        }

        if self.session.auto_refresh && self.session.auto_refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "session.auto_refresh_interval_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Access tokens live minutes to hours; a margin beyond a day refreshes on every call
pub const MAX_REFRESH_MARGIN_SECS: u64 = 86_400;

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(field.to_string())),
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .ok_or_else(|| ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("'{}' must start with http:// or https://", value),
        })?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("'{}' has no host", value),
        });
    }

    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_batch_size() -> usize {
    20
}

fn default_flush_interval_ms() -> u64 {
    2000
}

fn default_channel_buffer_size() -> usize {
    256
}

fn default_refresh_margin_secs() -> u64 {
    60
}

fn default_auto_refresh_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_pool_max_idle_per_host() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn complete_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.service.url = Some("https://project.example.com".to_string());
        config.service.public_key = Some("anon-key".to_string());
        config.backend.url = Some("https://api.example.com/v1".to_string());
        config.analytics.endpoint = Some("https://collector.example.com/events".to_string());
        config
    }

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.analytics.enabled);
        assert_eq!(config.analytics.batch_size, 20);
        assert_eq!(config.session.refresh_margin_secs, 60);
        assert!(config.session.auto_refresh);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert!(config.data.public_collections.is_empty());
    }

    #[test]
    fn test_from_yaml_file() {
        let file = write_config(
            ".yaml",
            r#"
service:
  url: https://project.example.com
  public_key: anon-key
backend:
  url: https://api.example.com
analytics:
  endpoint: https://collector.example.com/events
  batch_size: 5
session:
  refresh_margin_secs: 120
  storage_path: ~/.basekit/session.json
data:
  public_collections: [articles, tags]
"#,
        );

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.service.url.as_deref(), Some("https://project.example.com"));
        assert_eq!(config.analytics.batch_size, 5);
        assert_eq!(config.analytics.flush_interval_ms, 2000);
        assert_eq!(config.session.refresh_margin_secs, 120);
        assert_eq!(config.data.public_collections, vec!["articles", "tags"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file() {
        let file = write_config(
            ".toml",
            r#"
[service]
url = "https://project.example.com"
public_key = "anon-key"

[backend]
url = "https://api.example.com"

[analytics]
enabled = false

[logging]
level = "debug"
"#,
        );

        let config = AppConfig::from_file(file.path()).unwrap();
        assert!(!config.analytics.enabled);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let file = write_config(".yaml", "service: [unclosed");
        assert!(matches!(AppConfig::from_file(file.path()), Err(ConfigError::Load(_))));

        let missing = AppConfig::from_file("/definitely/not/here.yaml");
        assert!(matches!(missing, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("BASEKIT_SERVICE_URL", "https://override.example.com"),
            ("BASEKIT_ANALYTICS_ENABLED", "false"),
            ("BASEKIT_REFRESH_MARGIN_SECS", "15"),
            ("BASEKIT_LOG_LEVEL", "trace"),
        ]);

        let mut config = complete_config();
        config.merge_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.service.url.as_deref(), Some("https://override.example.com"));
        assert!(!config.analytics.enabled);
        assert_eq!(config.session.refresh_margin_secs, 15);
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.service.public_key.as_deref(), Some("anon-key"));
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = complete_config();
        config.merge_env_from(|key| match key {
            "BASEKIT_ANALYTICS_ENABLED" => Some("maybe".to_string()),
            "BASEKIT_REFRESH_MARGIN_SECS" => Some("soon".to_string()),
            _ => None,
        });

        assert!(config.analytics.enabled);
        assert_eq!(config.session.refresh_margin_secs, 60);
    }

    #[test]
    fn test_validate_reports_first_missing_value() {
        let mut config = complete_config();
        config.service.public_key = Some("   ".to_string());
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("service.public_key".to_string()))
        );

        let mut config = complete_config();
        config.backend.url = None;
        assert_eq!(config.validate(), Err(ConfigError::Missing("backend.url".to_string())));

        assert_eq!(
            AppConfig::default().validate(),
            Err(ConfigError::Missing("service.url".to_string()))
        );
    }

    #[test]
    fn test_analytics_endpoint_only_required_when_enabled() {
        let mut config = complete_config();
        config.analytics.endpoint = None;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("analytics.endpoint".to_string()))
        );

        config.analytics.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_values() {
        let mut config = complete_config();
        config.service.url = Some("project.example.com".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = complete_config();
        config.backend.url = Some("https:///path-only".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = complete_config();
        config.analytics.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validate_bounds_refresh_margin() {
        let mut config = complete_config();
        config.session.refresh_margin_secs = MAX_REFRESH_MARGIN_SECS;
        assert!(config.validate().is_ok());

        config.session.refresh_margin_secs = 10_000_000_000_000_000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "session.refresh_margin_secs".to_string(),
                reason: "must not exceed 86400 seconds".to_string(),
            })
        );
    }

    #[test]
    fn test_oversized_env_margin_is_rejected_by_validate() {
        let env: HashMap<&str, &str> = [("BASEKIT_REFRESH_MARGIN_SECS", "9300000000000000")].into();
        let mut config = complete_config();
        config.merge_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "session.refresh_margin_secs"
        ));
    }

    #[test]
    fn test_load_without_file_uses_env_only() {
        // Process env is not populated in tests, so loading must fail fast
        let result = AppConfig::load(None);
        if std::env::var("BASEKIT_SERVICE_URL").is_err() {
            assert!(matches!(result, Err(ConfigError::Missing(_))));
        }
    }
}
