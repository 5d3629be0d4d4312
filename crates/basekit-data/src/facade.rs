//! Live data access over the hosted service
//!
//! Each verb maps onto `/rest/v1/{collection}`:
//! - `select` / `select_one`: `GET` (`select_one` adds `limit=1`)
//! - `insert`: `POST` returning the stored representation
//! - `update`: `PATCH`, counted
//! - `delete`: `DELETE`, counted
//!
//! Counts come from the `Content-Range` total (`*/N` or `a-b/N`).

use crate::dispatch::{Access, AuthorizedDispatcher};
use crate::query::encode_query;
use async_trait::async_trait;
use basekit_core::{Collection, DataAccess, Error, Existence, QueryDescriptor, Record, Result};
use basekit_egress::{RemoteRequest, RemoteResponse};
use basekit_observability::Metrics;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, instrument};

const REST_PREFIX: &str = "/rest/v1";

/// Which collections may be used without a signed-in user
#[derive(Debug, Clone, Default)]
pub struct CollectionPolicy {
    public: HashSet<String>,
}

impl CollectionPolicy {
    /// Every collection requires authentication
    pub fn authenticated_only() -> Self {
        Self::default()
    }

    pub fn with_public<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            public: collections.into_iter().map(Into::into).collect(),
        }
    }

    pub fn access_for(&self, collection: &Collection) -> Access {
        if self.public.contains(collection.as_str()) {
            Access::Public
        } else {
            Access::Authenticated
        }
    }
}

#[derive(Clone)]
pub struct LiveDataAccess {
    dispatcher: AuthorizedDispatcher,
    policy: CollectionPolicy,
    metrics: Option<Metrics>,
}

impl LiveDataAccess {
    pub fn new(dispatcher: AuthorizedDispatcher, policy: CollectionPolicy) -> Self {
        Self {
            dispatcher,
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn observe<T, F>(&self, verb: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) => e.kind(),
            };
            metrics.record_data_request(verb, outcome, started.elapsed().as_secs_f64());
        }
        result
    }

    async fn send(&self, collection: &Collection, request: RemoteRequest) -> Result<RemoteResponse> {
        self.dispatcher
            .dispatch(request, self.policy.access_for(collection))
            .await
    }

    async fn fetch(&self, collection: &Collection, query: &QueryDescriptor) -> Result<Vec<Record>> {
        let request = RemoteRequest::get(collection_path(collection)?).queries(encode_query(query));
        let response = self.send(collection, request).await?;
        if response.is_empty() {
            return Ok(Vec::new());
        }
        response.json()
    }

    async fn counted(
        &self,
        collection: &Collection,
        query: &QueryDescriptor,
        request: RemoteRequest,
        verb: &str,
    ) -> Result<u64> {
        // Missing session wins over a malformed request
        self.dispatcher
            .ensure_access(self.policy.access_for(collection))?;
        if !query.has_filters() {
            return Err(unfiltered_write(verb, collection));
        }

        let request = request
            .queries(encode_query(query))
            .header("Prefer", "return=minimal,count=exact");
        let response = self.send(collection, request).await?;
        let count = affected_count(&response);
        debug!(collection = %collection, count, "{} applied", verb);
        Ok(count)
    }
}

/// Update and delete must name the rows they touch
pub(crate) fn unfiltered_write(verb: &str, collection: &Collection) -> Error {
    Error::InvalidQuery(format!(
        "Refusing to {} every record in {}: no filter given",
        verb, collection
    ))
}

#[async_trait]
impl DataAccess for LiveDataAccess {
    #[instrument(skip(self, query), fields(collection = %collection))]
    async fn select(&self, collection: &Collection, query: QueryDescriptor) -> Result<Vec<Record>> {
        self.observe("select", self.fetch(collection, &query)).await
    }

    #[instrument(skip(self, query), fields(collection = %collection))]
    async fn select_one(
        &self,
        collection: &Collection,
        query: QueryDescriptor,
        existence: Existence,
    ) -> Result<Option<Record>> {
        self.observe("select_one", async {
            let rows = self.fetch(collection, &query.limit(1)).await?;
            match (rows.into_iter().next(), existence) {
                (Some(row), _) => Ok(Some(row)),
                (None, Existence::Optional) => Ok(None),
                (None, Existence::Required) => Err(Error::NotFound {
                    collection: collection.to_string(),
                }),
            }
        })
        .await
    }

    #[instrument(skip(self, record), fields(collection = %collection))]
    async fn insert(&self, collection: &Collection, record: Record) -> Result<Record> {
        self.observe("insert", async {
            let request = RemoteRequest::post(collection_path(collection)?)
                .header("Prefer", "return=representation")
                .json(Value::Object(record));
            let response = self.send(collection, request).await?;

            match response.json::<Value>()? {
                Value::Array(rows) => match rows.into_iter().next() {
                    Some(Value::Object(row)) => Ok(row),
                    _ => Err(Error::InvalidResponse(
                        "Insert returned no record".to_string(),
                    )),
                },
                Value::Object(row) => Ok(row),
                other => Err(Error::InvalidResponse(format!(
                    "Insert returned unexpected {}",
                    other
                ))),
            }
        })
        .await
    }

    #[instrument(skip(self, query, changes), fields(collection = %collection))]
    async fn update(
        &self,
        collection: &Collection,
        query: QueryDescriptor,
        changes: Record,
    ) -> Result<u64> {
        self.observe("update", async {
            let request = RemoteRequest::patch(collection_path(collection)?).json(Value::Object(changes));
            self.counted(collection, &query, request, "update").await
        })
        .await
    }

    #[instrument(skip(self, query), fields(collection = %collection))]
    async fn delete(&self, collection: &Collection, query: QueryDescriptor) -> Result<u64> {
        self.observe("delete", async {
            let request = RemoteRequest::delete(collection_path(collection)?);
            self.counted(collection, &query, request, "delete").await
        })
        .await
    }
}

fn collection_path(collection: &Collection) -> Result<String> {
    let name = collection.as_str();
    if name.trim().is_empty() || name.contains(['/', '?', '#']) {
        return Err(Error::InvalidQuery(format!(
            "Invalid collection name '{}'",
            name
        )));
    }
    Ok(format!("{}/{}", REST_PREFIX, name))
}

/// Rows affected, from `Content-Range`, else a returned array, else zero
fn affected_count(response: &RemoteResponse) -> u64 {
    let from_range = response
        .header("content-range")
        .and_then(|range| range.rsplit('/').next())
        .and_then(|total| total.trim().parse::<u64>().ok());
    if let Some(count) = from_range {
        return count;
    }

    match response.json::<Value>() {
        Ok(Value::Array(rows)) => rows.len() as u64,
        _ => 0,
    }
}
