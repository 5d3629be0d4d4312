//! Basekit Egress
//!
//! This crate provides the outbound HTTP layer:
//! - Shared HTTP client construction and caller-side retry
//! - `RemoteClient`, the request/response transport used by every component
//! - `AuthClient`, the hosted auth service endpoints

pub mod auth;
pub mod client;
pub mod remote;

pub use auth::AuthClient;
pub use client::{HttpClientConfig, create_client, with_retry};
pub use remote::{RemoteClient, RemoteConfig, RemoteRequest, RemoteResponse};
