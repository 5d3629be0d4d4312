//! Shared HTTP client utilities

use basekit_core::{ConfigError, Error, Result, TransportError};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds (whole request, including the body)
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 16,
            user_agent: format!("Basekit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn create_client(config: &HttpClientConfig) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        // Expire idle connections before the service closes them on its side
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(&config.user_agent)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| {
            Error::Config(ConfigError::Invalid {
                field: "http".to_string(),
                reason: format!("Failed to create HTTP client: {}", e),
            })
        })
}

/// Map a reqwest failure onto the transport taxonomy
pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    let message = err.to_string();
    let transport = if err.is_timeout() {
        TransportError::Timeout(message)
    } else if err.is_connect() {
        TransportError::Connect(message)
    } else {
        TransportError::Request(message)
    };
    Error::Transport(transport)
}

/// Caller-side retry policy for idempotent operations
///
/// Neither the data access layer nor the page-view tracker retries on its
/// own; callers that know an operation is safe to repeat wrap it here.
pub async fn with_retry<F, Fut, T>(max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let backoff_ms = 2u64.pow(attempt - 1) * 100; // 100ms, 200ms, 400ms
                warn!(
                    error_kind = e.kind(),
                    attempt,
                    max_retries,
                    "Request failed, retrying after {}ms",
                    backoff_ms
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                debug!("Retrying request (attempt {}/{})", attempt, max_retries);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_config() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.pool_max_idle_per_host, 16);
        assert!(config.user_agent.starts_with("Basekit/"));
    }

    #[test]
    fn test_create_client() {
        let config = HttpClientConfig::default();
        assert!(create_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let result = with_retry(3, || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_error_is_not_repeated() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<i32, Error>(Error::Remote {
                    status_code: 400,
                    body: "bad filter".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_transport_error_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(Error::Transport(TransportError::Connect("reset".to_string())))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result = with_retry(1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), Error>(Error::Remote {
                    status_code: 503,
                    body: String::new(),
                })
            }
        })
        .await;

        assert_eq!(result.unwrap_err().status_code(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
