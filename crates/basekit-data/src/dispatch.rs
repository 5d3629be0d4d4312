//! Authorized request dispatch
//!
//! Every data and backend call goes through the same sequence:
//!
//! 1. Resolve a credential from the session store, refreshing proactively
//!    when it is inside the refresh margin. Without one, fail before any
//!    request is sent (unless the target is public).
//! 2. Send the request with the access token.
//! 3. If the service answers 401, force one refresh and resend once. A
//!    second 401 is `AuthError::Unauthenticated`.
//!
//! Transport failures and every other remote error are returned as-is and
//! never retried here.

use basekit_core::{AuthError, Credential, Error, Result};
use basekit_egress::{RemoteClient, RemoteRequest, RemoteResponse};
use basekit_session::SessionStore;
use tracing::{debug, warn};

/// Whether a call may go out without a signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Requires a credential
    Authenticated,
    /// Uses the credential when present, the public key otherwise
    Public,
}

#[derive(Clone)]
pub struct AuthorizedDispatcher {
    remote: RemoteClient,
    session: SessionStore,
    public_key: String,
}

impl AuthorizedDispatcher {
    /// `remote` is expected to carry the `apikey` default header already
    pub fn new(remote: RemoteClient, session: SessionStore, public_key: impl Into<String>) -> Self {
        Self {
            remote,
            session,
            public_key: public_key.into(),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Fail with `AuthError::Unauthenticated` when `access` needs a session
    /// and nobody is signed in
    pub fn ensure_access(&self, access: Access) -> Result<()> {
        if access == Access::Authenticated && self.session.credential().is_none() {
            return Err(AuthError::Unauthenticated.into());
        }
        Ok(())
    }

    pub async fn dispatch(&self, request: RemoteRequest, access: Access) -> Result<RemoteResponse> {
        let credential = match self.session.refresh_if_needed().await {
            Ok(credential) => Some(credential),
            Err(Error::Auth(AuthError::Unauthenticated)) if access == Access::Public => None,
            Err(e) => return Err(e),
        };

        match credential {
            Some(credential) => self.send_authorized(request, credential).await,
            None => {
                debug!("No session, sending with public key");
                self.remote
                    .send(request.bearer(&self.public_key))
                    .await
                    .map_err(rejection_to_unauthenticated)
            }
        }
    }

    async fn send_authorized(&self, request: RemoteRequest, credential: Credential) -> Result<RemoteResponse> {
        let first = self
            .remote
            .send(request.clone().bearer(&credential.access_token))
            .await;

        match first {
            Err(e) if e.is_auth_rejection() => {
                warn!("Access token rejected, refreshing before a single retry");
                let renewed = self.session.force_refresh(&credential.access_token).await?;
                self.remote
                    .send(request.bearer(&renewed.access_token))
                    .await
                    .map_err(rejection_to_unauthenticated)
            }
            other => other,
        }
    }
}

fn rejection_to_unauthenticated(error: Error) -> Error {
    if error.is_auth_rejection() {
        AuthError::Unauthenticated.into()
    } else {
        error
    }
}
