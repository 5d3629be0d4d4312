//! Basekit Observability
//!
//! This crate provides observability features:
//! - Metrics collection (Prometheus)
//! - Structured logging setup

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, parse_level};
pub use metrics::Metrics;
