//! Structured logging setup

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Map a configured level name onto a tracing level (unknown → INFO)
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the filter used by `init_logging`
///
/// HTTP client internals stay at WARN unless `log_http` is set.
pub fn build_filter(level: &str, log_http: bool) -> EnvFilter {
    let mut filter = EnvFilter::new(parse_level(level).to_string());

    if !log_http {
        for directive in ["hyper=warn", "hyper_util=warn", "reqwest=warn"] {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => tracing::warn!("Failed to set log filter {}: {}", directive, e),
            }
        }
    }

    filter
}

/// Install the global tracing subscriber
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(
    level: &str,
    log_http: bool,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(build_filter(level, log_http))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
