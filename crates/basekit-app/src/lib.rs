//! Basekit Application Context
//!
//! One explicit context per running instance, built once at startup and
//! passed to whatever needs the session, data access, backend API or
//! tracker.

pub mod context;

pub use context::{AppContext, ContextParts, init_logging};
