//! Direct calls to the application's backend API
//!
//! Shares the session and the refresh-and-resend-once rule with the data
//! access layer; only the base URL differs.

use crate::dispatch::{Access, AuthorizedDispatcher};
use basekit_core::Result;
use basekit_egress::RemoteRequest;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

#[derive(Clone)]
pub struct BackendApi {
    dispatcher: AuthorizedDispatcher,
}

impl BackendApi {
    /// `dispatcher` sends to the backend API base URL
    pub fn new(dispatcher: AuthorizedDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Send `body` (if any) to `path` and decode the JSON reply
    ///
    /// An empty reply decodes as `Value::Null`.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        access: Access,
    ) -> Result<Value> {
        let mut request = RemoteRequest::new(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.dispatcher.dispatch(request, access).await?;
        if response.is_empty() {
            return Ok(Value::Null);
        }
        response.json()
    }

    /// `call` with the reply decoded into `T`
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        access: Access,
    ) -> Result<T> {
        let value = self.call(method, path, body, access).await?;
        Ok(serde_json::from_value(value)?)
    }
}
