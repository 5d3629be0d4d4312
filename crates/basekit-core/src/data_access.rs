//! Data access capability trait
//!
//! Application code depends only on `DataAccess`. Two implementations exist:
//! - `LiveDataAccess` (basekit-data): talks to the hosted service
//! - `ScriptedDataAccess` (basekit-data): a scripted double for tests

use async_trait::async_trait;

use crate::{Collection, Existence, QueryDescriptor, Record, Result};

/// Uniform CRUD verbs over named collections
///
/// # Errors
/// Every verb may fail with:
/// - `Error::Auth(AuthError::Unauthenticated)` when the collection requires a
///   signed-in user and there is none, or the service rejected the token twice
/// - `Error::Auth(AuthError::SessionExpired)` when the token could not be refreshed
/// - `Error::Transport` for network failures (never retried)
/// - `Error::Remote` when the service rejected the request
///
/// `update` and `delete` without a filter fail with `Error::InvalidQuery`
/// and send nothing. On a collection that needs a session, a missing
/// session is reported first as `AuthError::Unauthenticated`.
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Fetch every matching record. Zero matches is an empty vector.
    async fn select(&self, collection: &Collection, query: QueryDescriptor) -> Result<Vec<Record>>;

    /// Fetch the first matching record
    ///
    /// With `Existence::Required`, zero matches fails with `Error::NotFound`;
    /// with `Existence::Optional` it returns `Ok(None)`.
    async fn select_one(
        &self,
        collection: &Collection,
        query: QueryDescriptor,
        existence: Existence,
    ) -> Result<Option<Record>>;

    /// Insert a record, returning it with server-assigned fields populated
    async fn insert(&self, collection: &Collection, record: Record) -> Result<Record>;

    /// Apply `changes` to every matching record, returning how many changed
    async fn update(
        &self,
        collection: &Collection,
        query: QueryDescriptor,
        changes: Record,
    ) -> Result<u64>;

    /// Delete every matching record, returning how many were removed
    async fn delete(&self, collection: &Collection, query: QueryDescriptor) -> Result<u64>;
}
