//! Scripted `DataAccess` double
//!
//! Every verb is a `VerbDouble`: script its results, then assert on the
//! calls it recorded. Nothing touches the network.
//!
//! ```
//! # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # runtime.block_on(async {
//! use basekit_core::{Collection, DataAccess, QueryDescriptor};
//! use basekit_data::ScriptedDataAccess;
//! use serde_json::json;
//!
//! let data = ScriptedDataAccess::new();
//! let row = json!({"id": 1}).as_object().cloned().unwrap();
//! data.select.returns(vec![row.clone()]);
//!
//! let rows = data
//!     .select(&Collection::from("articles"), QueryDescriptor::new().eq("id", 1))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(rows, vec![row]);
//! assert_eq!(data.select.call_count(), 1);
//! assert_eq!(data.select.calls()[0].collection.as_str(), "articles");
//! # });
//! ```
//!
//! Unscripted verbs answer with neutral values: `select` an empty vector,
//! `select_one` nothing, `insert` the submitted record, `update` and `delete`
//! zero. Like the live implementation, `update` and `delete` without a filter
//! fail with `Error::InvalidQuery` whatever was scripted; the call is still
//! recorded.

use crate::facade::unfiltered_write;
use async_trait::async_trait;
use basekit_core::{Collection, DataAccess, Error, Existence, QueryDescriptor, Record, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectCall {
    pub collection: Collection,
    pub query: QueryDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOneCall {
    pub collection: Collection,
    pub query: QueryDescriptor,
    pub existence: Existence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertCall {
    pub collection: Collection,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCall {
    pub collection: Collection,
    pub query: QueryDescriptor,
    pub changes: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCall {
    pub collection: Collection,
    pub query: QueryDescriptor,
}

struct Script<A, T> {
    once: VecDeque<Result<T>>,
    always: Option<Result<T>>,
    calls: Vec<A>,
}

/// One scripted verb: canned outcomes plus a call log
///
/// One-shot outcomes are consumed first, in order; after that the standing
/// outcome (if any) answers every call.
pub struct VerbDouble<A, T> {
    script: Mutex<Script<A, T>>,
}

impl<A, T> Default for VerbDouble<A, T> {
    fn default() -> Self {
        Self {
            script: Mutex::new(Script {
                once: VecDeque::new(),
                always: None,
                calls: Vec::new(),
            }),
        }
    }
}

impl<A: Clone, T: Clone> VerbDouble<A, T> {
    /// Answer every call with `value`
    pub fn returns(&self, value: T) {
        self.lock().always = Some(Ok(value));
    }

    /// Fail every call with `error`
    pub fn fails(&self, error: impl Into<Error>) {
        self.lock().always = Some(Err(error.into()));
    }

    /// Answer the next unanswered call with `value`
    pub fn returns_once(&self, value: T) {
        self.lock().once.push_back(Ok(value));
    }

    /// Fail the next unanswered call with `error`
    pub fn fails_once(&self, error: impl Into<Error>) {
        self.lock().once.push_back(Err(error.into()));
    }

    pub fn calls(&self) -> Vec<A> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn last_call(&self) -> Option<A> {
        self.lock().calls.last().cloned()
    }

    /// Forget scripted outcomes and recorded calls
    pub fn reset(&self) {
        let mut script = self.lock();
        script.once.clear();
        script.always = None;
        script.calls.clear();
    }

    /// Log a call without consuming a scripted outcome
    fn record(&self, call: A) {
        self.lock().calls.push(call);
    }

    fn invoke(&self, call: A) -> Option<Result<T>> {
        let mut script = self.lock();
        script.calls.push(call);
        script.once.pop_front().or_else(|| script.always.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script<A, T>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `DataAccess` double with one `VerbDouble` per verb
#[derive(Default)]
pub struct ScriptedDataAccess {
    pub select: VerbDouble<SelectCall, Vec<Record>>,
    pub select_one: VerbDouble<SelectOneCall, Option<Record>>,
    pub insert: VerbDouble<InsertCall, Record>,
    pub update: VerbDouble<UpdateCall, u64>,
    pub delete: VerbDouble<DeleteCall, u64>,
}

impl ScriptedDataAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls across all verbs
    pub fn total_calls(&self) -> usize {
        self.select.call_count()
            + self.select_one.call_count()
            + self.insert.call_count()
            + self.update.call_count()
            + self.delete.call_count()
    }
}

#[async_trait]
impl DataAccess for ScriptedDataAccess {
    async fn select(&self, collection: &Collection, query: QueryDescriptor) -> Result<Vec<Record>> {
        let call = SelectCall {
            collection: collection.clone(),
            query,
        };
        self.select.invoke(call).unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn select_one(
        &self,
        collection: &Collection,
        query: QueryDescriptor,
        existence: Existence,
    ) -> Result<Option<Record>> {
        let call = SelectOneCall {
            collection: collection.clone(),
            query,
            existence,
        };
        match self.select_one.invoke(call).unwrap_or(Ok(None))? {
            Some(row) => Ok(Some(row)),
            None if existence == Existence::Required => Err(Error::NotFound {
                collection: collection.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn insert(&self, collection: &Collection, record: Record) -> Result<Record> {
        let call = InsertCall {
            collection: collection.clone(),
            record: record.clone(),
        };
        self.insert.invoke(call).unwrap_or(Ok(record))
    }

    async fn update(
        &self,
        collection: &Collection,
        query: QueryDescriptor,
        changes: Record,
    ) -> Result<u64> {
        let filtered = query.has_filters();
        let call = UpdateCall {
            collection: collection.clone(),
            query,
            changes,
        };
        if !filtered {
            self.update.record(call);
            return Err(unfiltered_write("update", collection));
        }
        self.update.invoke(call).unwrap_or(Ok(0))
    }

    async fn delete(&self, collection: &Collection, query: QueryDescriptor) -> Result<u64> {
        let filtered = query.has_filters();
        let call = DeleteCall {
            collection: collection.clone(),
            query,
        };
        if !filtered {
            self.delete.record(call);
            return Err(unfiltered_write("delete", collection));
        }
        self.delete.invoke(call).unwrap_or(Ok(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basekit_core::{AuthError, TransportError};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn articles() -> Collection {
        Collection::from("articles")
    }

    #[tokio::test]
    async fn test_unscripted_defaults() {
        let data = ScriptedDataAccess::new();
        let row = record(json!({"title": "draft"}));

        assert!(data.select(&articles(), QueryDescriptor::new()).await.unwrap().is_empty());
        assert_eq!(
            data.select_one(&articles(), QueryDescriptor::new(), Existence::Optional)
                .await
                .unwrap(),
            None
        );
        assert_eq!(data.insert(&articles(), row.clone()).await.unwrap(), row);
        assert_eq!(
            data.update(&articles(), QueryDescriptor::new().eq("id", 1), row)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            data.delete(&articles(), QueryDescriptor::new().eq("id", 1))
                .await
                .unwrap(),
            0
        );
        assert_eq!(data.total_calls(), 5);
    }

    #[tokio::test]
    async fn test_unfiltered_writes_are_refused_like_live_access() {
        let data = ScriptedDataAccess::new();
        data.update.returns(4);
        data.delete.returns_once(2);

        let update = data
            .update(&articles(), QueryDescriptor::new(), record(json!({"status": "archived"})))
            .await;
        let delete = data.delete(&articles(), QueryDescriptor::new()).await;

        assert!(matches!(update, Err(Error::InvalidQuery(_))));
        assert!(matches!(delete, Err(Error::InvalidQuery(_))));
        assert_eq!(data.update.call_count(), 1);
        assert_eq!(data.delete.last_call().unwrap().query, QueryDescriptor::new());

        // Scripted outcomes are left for the next filtered call
        assert_eq!(
            data.delete(&articles(), QueryDescriptor::new().eq("id", 5)).await,
            Ok(2)
        );
    }

    #[tokio::test]
    async fn test_select_one_required_without_row_is_not_found() {
        let data = ScriptedDataAccess::new();

        let err = data
            .select_one(&articles(), QueryDescriptor::new().eq("id", 9), Existence::Required)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::NotFound {
                collection: "articles".to_string()
            }
        );
        assert_eq!(data.select_one.last_call().unwrap().existence, Existence::Required);
    }

    #[tokio::test]
    async fn test_once_outcomes_precede_standing_outcome() {
        let data = ScriptedDataAccess::new();
        data.update.returns(3);
        data.update.fails_once(TransportError::Timeout("slow".into()));
        data.update.returns_once(1);

        let query = || QueryDescriptor::new().eq("status", "draft");
        let changes = record(json!({"status": "published"}));

        assert_eq!(
            data.update(&articles(), query(), changes.clone()).await,
            Err(Error::Transport(TransportError::Timeout("slow".into())))
        );
        assert_eq!(data.update(&articles(), query(), changes.clone()).await, Ok(1));
        assert_eq!(data.update(&articles(), query(), changes.clone()).await, Ok(3));
        assert_eq!(data.update(&articles(), query(), changes).await, Ok(3));
        assert_eq!(data.update.call_count(), 4);
    }

    #[tokio::test]
    async fn test_records_arguments_per_verb() {
        let data = ScriptedDataAccess::new();
        data.insert.returns(record(json!({"id": 7, "title": "hello"})));

        let inserted = data
            .insert(&articles(), record(json!({"title": "hello"})))
            .await
            .unwrap();
        data.delete(&"tags".into(), QueryDescriptor::new().eq("id", 2))
            .await
            .unwrap();

        assert_eq!(inserted["id"], json!(7));
        assert_eq!(
            data.insert.calls(),
            vec![InsertCall {
                collection: articles(),
                record: record(json!({"title": "hello"})),
            }]
        );
        let delete = data.delete.last_call().unwrap();
        assert_eq!(delete.collection.as_str(), "tags");
        assert_eq!(delete.query, QueryDescriptor::new().eq("id", 2));
        assert_eq!(data.select.call_count(), 0);
    }

    #[tokio::test]
    async fn test_standing_failure_and_reset() {
        let data = ScriptedDataAccess::new();
        data.select.fails(AuthError::Unauthenticated);

        assert_eq!(
            data.select(&articles(), QueryDescriptor::new()).await,
            Err(Error::Auth(AuthError::Unauthenticated))
        );

        data.select.reset();
        assert!(data.select(&articles(), QueryDescriptor::new()).await.unwrap().is_empty());
        assert_eq!(data.select.call_count(), 1);
    }
}
