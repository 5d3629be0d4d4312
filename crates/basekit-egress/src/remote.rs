//! Remote invocation client
//!
//! Thin transport shared by the data access layer, the auth client, the
//! backend API and the analytics collector. Base URL and default headers are
//! resolved once at construction; `send` is stateless afterwards.

use crate::client::{HttpClientConfig, create_client, transport_error};
use basekit_core::{ConfigError, Error, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, instrument};

/// Remote client configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL every request path is appended to
    pub base_url: String,

    /// Headers attached to every request
    pub default_headers: Vec<(String, String)>,

    /// HTTP client configuration
    pub client_config: HttpClientConfig,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: Vec::new(),
            client_config: HttpClientConfig::default(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_client_config(mut self, client_config: HttpClientConfig) -> Self {
        self.client_config = client_config;
        self
    }
}

/// One outbound request, relative to the client's base URL
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RemoteRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn queries(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Successful (2xx) response
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RemoteResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.is_empty() {
            return Err(Error::InvalidResponse("Empty response body".to_string()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

/// Remote invocation client
#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: Url,
    default_headers: HeaderMap,
    client: Client,
}

impl RemoteClient {
    /// Create a client with its own connection pool
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = create_client(&config.client_config)?;
        Self::with_client(config, client)
    }

    /// Create a client sharing an existing connection pool
    pub fn with_client(config: RemoteConfig, client: Client) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let (name, value) = parse_header(name, value).map_err(|reason| {
                Error::Config(ConfigError::Invalid {
                    field: format!("header {}", name),
                    reason,
                })
            })?;
            default_headers.insert(name, value);
        }

        Ok(Self {
            base_url,
            default_headers,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Issue one request
    ///
    /// # Errors
    /// - `Error::Transport` when the request never produced a response
    /// - `Error::Remote` with the status code and body verbatim for non-2xx
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        let url = self.resolve_url(&request)?;

        let mut headers = self.default_headers.clone();
        for (name, value) in &request.headers {
            let (name, value) = parse_header(name, value).map_err(Error::InvalidQuery)?;
            headers.insert(name, value);
        }

        let mut builder = self.client.request(request.method, url).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;

        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            body_bytes = body.len(),
            "Remote response received"
        );

        if !status.is_success() {
            return Err(Error::Remote {
                status_code: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(RemoteResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }

    fn resolve_url(&self, request: &RemoteRequest) -> Result<Url> {
        let path = request.path.trim_start_matches('/');
        let mut url = if path.is_empty() {
            self.base_url.clone()
        } else {
            let joined = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
            Url::parse(&joined)
                .map_err(|e| Error::InvalidQuery(format!("Invalid request path '{}': {}", request.path, e)))?
        };

        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| {
        Error::Config(ConfigError::Invalid {
            field: "base_url".to_string(),
            reason: format!("'{}': {}", raw, e),
        })
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::Config(ConfigError::Invalid {
            field: "base_url".to_string(),
            reason: format!("'{}' is not an http(s) URL", raw),
        }));
    }

    Ok(url)
}

fn parse_header(name: &str, value: &str) -> std::result::Result<(HeaderName, HeaderValue), String> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| format!("Invalid header name '{}': {}", name, e))?;
    let header_value =
        HeaderValue::from_str(value).map_err(|e| format!("Invalid value for header '{}': {}", name, e))?;
    Ok((header_name, header_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> RemoteClient {
        RemoteClient::new(RemoteConfig::new(base)).unwrap()
    }

    #[test]
    fn test_resolve_url_keeps_base_path_prefix() {
        let client = client("https://api.example.com/v2/");
        let request = RemoteRequest::get("/reports/weekly").query("team", "a b");
        let url = client.resolve_url(&request).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/reports/weekly?team=a+b");
    }

    #[test]
    fn test_resolve_url_empty_path_uses_base() {
        let client = client("https://collector.example.com/ingest");
        let url = client.resolve_url(&RemoteRequest::post("")).unwrap();
        assert_eq!(url.as_str(), "https://collector.example.com/ingest");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = RemoteClient::new(RemoteConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));

        let err = RemoteClient::new(RemoteConfig::new("ftp://files.example.com")).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_invalid_default_header_is_config_error() {
        let config = RemoteConfig::new("https://example.com").with_header("bad header", "x");
        assert!(matches!(
            RemoteClient::new(config),
            Err(Error::Config(ConfigError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_response_json_on_empty_body() {
        let response = RemoteResponse {
            status: 204,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        assert!(response.is_empty());
        assert!(matches!(
            response.json::<Value>(),
            Err(Error::InvalidResponse(_))
        ));
    }
}
