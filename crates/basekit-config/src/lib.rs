//! Basekit Configuration
//!
//! Startup configuration: YAML or TOML file, overlaid by environment
//! variables, validated once. Missing required values fail fast with
//! `ConfigError` instead of surfacing at first use.

pub mod app_config;

pub use app_config::{
    AnalyticsConfig, AppConfig, BackendConfig, DataConfig, HttpConfig, LoggingConfig,
    ServiceConfig, SessionConfig,
};
