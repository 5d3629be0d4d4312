//! Basekit Data
//!
//! The data access layer:
//! - `LiveDataAccess`: the `DataAccess` verbs over the hosted service
//! - `AuthorizedDispatcher`: authenticate, send, refresh-and-resend once
//! - `BackendApi`: direct backend API calls through the same dispatcher
//! - `ScriptedDataAccess`: a scriptable double for tests

pub mod backend;
pub mod dispatch;
pub mod double;
pub mod facade;
pub mod query;

pub use backend::BackendApi;
pub use dispatch::{Access, AuthorizedDispatcher};
pub use double::{
    DeleteCall, InsertCall, ScriptedDataAccess, SelectCall, SelectOneCall, UpdateCall, VerbDouble,
};
pub use facade::{CollectionPolicy, LiveDataAccess};
pub use query::encode_query;
