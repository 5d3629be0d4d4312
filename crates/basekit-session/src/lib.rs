//! Basekit Session
//!
//! Owns the one live credential of an application instance:
//! - `SessionStore`: read, proactive refresh with collapsed concurrent
//!   attempts, sign-in/sign-out, status notifications
//! - `AuthProvider`: the token endpoints the store talks to
//! - `CredentialStorage`: where the credential survives restarts

pub mod provider;
pub mod storage;
pub mod store;

pub use provider::AuthProvider;
pub use storage::{CredentialStorage, FileStorage, MemoryStorage};
pub use store::{AutoRefreshHandle, SessionStatus, SessionStore};
