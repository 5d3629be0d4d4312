//! Hosted auth service client
//!
//! Speaks the token endpoints of the hosted auth service:
//! - `POST /auth/v1/token?grant_type=password`
//! - `POST /auth/v1/token?grant_type=refresh_token`
//! - `POST /auth/v1/signup`
//! - `POST /auth/v1/logout`

use crate::remote::{RemoteClient, RemoteRequest};
use basekit_core::{AuthError, Clock, Credential, Error, Result, UserIdentity};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const TOKEN_PATH: &str = "/auth/v1/token";
const SIGNUP_PATH: &str = "/auth/v1/signup";
const LOGOUT_PATH: &str = "/auth/v1/logout";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<UserPayload>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Auth endpoints client
#[derive(Clone)]
pub struct AuthClient {
    remote: RemoteClient,
    clock: Arc<dyn Clock>,
}

impl AuthClient {
    /// `remote` must point at the hosted service root and carry its `apikey` header
    pub fn new(remote: RemoteClient, clock: Arc<dyn Clock>) -> Self {
        Self { remote, clock }
    }

    /// Exchange email and password for a credential
    ///
    /// # Errors
    /// - `AuthError::InvalidCredentials` when the service refuses the pair
    /// - `Error::Transport` / `Error::Remote` otherwise
    #[instrument(skip_all)]
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Credential> {
        let request = RemoteRequest::post(TOKEN_PATH)
            .query("grant_type", "password")
            .json(json!({ "email": email, "password": password }));

        let response = self.remote.send(request).await.map_err(|e| match e {
            Error::Remote { status_code: 400 | 401 | 422, body } => {
                Error::Auth(AuthError::InvalidCredentials(error_message(&body)))
            }
            other => other,
        })?;

        let credential = self.credential_from(response.json()?)?;
        info!("Signed in");
        Ok(credential)
    }

    /// Exchange a refresh token for a new credential
    ///
    /// Rejections are returned as `Error::Remote` so the session store can
    /// tell a revoked token (4xx) from a service outage (5xx).
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        let request = RemoteRequest::post(TOKEN_PATH)
            .query("grant_type", "refresh_token")
            .json(json!({ "refresh_token": refresh_token }));

        let response = self.remote.send(request).await?;
        let credential = self.credential_from(response.json()?)?;
        debug!(expires_at = %credential.expires_at, "Refreshed access token");
        Ok(credential)
    }

    /// Register a new user
    ///
    /// Returns `None` when the service requires email confirmation before
    /// issuing a session.
    #[instrument(skip_all)]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Credential>> {
        let request = RemoteRequest::post(SIGNUP_PATH)
            .json(json!({ "email": email, "password": password }));

        let response = self.remote.send(request).await.map_err(|e| match e {
            Error::Remote { status_code: 400 | 422, body } => {
                Error::Auth(AuthError::InvalidCredentials(error_message(&body)))
            }
            other => other,
        })?;

        let body: Value = response.json()?;
        if body.get("access_token").is_none() {
            info!("Sign-up accepted, confirmation pending");
            return Ok(None);
        }

        let token: TokenResponse = serde_json::from_value(body)?;
        self.credential_from(token).map(Some)
    }

    /// Revoke the session on the service side
    #[instrument(skip(self, access_token))]
    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let request = RemoteRequest::post(LOGOUT_PATH).bearer(access_token);
        match self.remote.send(request).await {
            Ok(_) => Ok(()),
            // Already gone on the service side
            Err(Error::Remote { status_code: 401 | 404, .. }) => {
                warn!("Remote session already invalidated");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn credential_from(&self, token: TokenResponse) -> Result<Credential> {
        let expires_at = resolve_expiry(self.clock.now(), token.expires_at, token.expires_in)?;
        let mut credential = Credential::new(token.access_token, token.refresh_token, expires_at);
        if let Some(user) = token.user {
            credential = credential.with_user(UserIdentity {
                id: user.id,
                email: user.email,
            });
        }
        Ok(credential)
    }
}

fn resolve_expiry(
    now: DateTime<Utc>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
) -> Result<DateTime<Utc>> {
    if let Some(timestamp) = expires_at {
        return DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| Error::InvalidResponse(format!("Invalid expires_at: {}", timestamp)));
    }
    match expires_in {
        Some(seconds) => Ok(now + Duration::seconds(seconds)),
        None => Err(Error::InvalidResponse(
            "Token response carries neither expires_at nor expires_in".to_string(),
        )),
    }
}

/// Best human-readable message out of an auth error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}
