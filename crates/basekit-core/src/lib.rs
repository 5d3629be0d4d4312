//! Basekit Core Types and Traits
//!
//! This crate provides the fundamental types and traits shared by every
//! Basekit crate:
//! - Credential and query data model
//! - The `DataAccess` capability trait
//! - Clock abstraction
//! - Core error taxonomy

pub mod clock;
pub mod credential;
pub mod data_access;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{Credential, UserIdentity};
pub use data_access::DataAccess;
pub use error::{AuthError, ConfigError, Error, Result, TransportError};
pub use types::{Collection, Direction, Existence, Filter, FilterOp, Ordering, QueryDescriptor, Record};
