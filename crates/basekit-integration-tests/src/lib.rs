//! End-to-end tests for Basekit
//!
//! The tests under `tests/` bootstrap a full `AppContext` against a
//! wiremock server that plays the hosted service, the backend API and the
//! analytics collector at once. Shared fixtures live here.

use basekit_config::AppConfig;
use serde_json::{Value, json};
use wiremock::MockServer;

pub const PUBLIC_KEY: &str = "anon-key";

/// Configuration pointing every endpoint at `server`
///
/// Background refresh is off so tests decide when time moves.
pub fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.service.url = Some(server.uri());
    config.service.public_key = Some(PUBLIC_KEY.to_string());
    config.backend.url = Some(format!("{}/api", server.uri()));
    config.analytics.endpoint = Some(format!("{}/collect", server.uri()));
    config.analytics.batch_size = 1;
    config.session.auto_refresh = false;
    config.session.refresh_margin_secs = 60;
    config
}

/// Token endpoint reply issuing `access`/`refresh`, valid for `expires_in` seconds
pub fn token_body(access: &str, refresh: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": expires_in,
        "user": {"id": "user-1", "email": "ada@example.com"}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_for_is_valid() {
        let server = MockServer::start().await;
        assert!(config_for(&server).validate().is_ok());
    }
}
