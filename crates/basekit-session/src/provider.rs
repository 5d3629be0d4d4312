//! Token issuing abstraction

use async_trait::async_trait;
use basekit_core::{Credential, Result};
use basekit_egress::AuthClient;

/// Issues, renews and revokes credentials
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credential>;

    /// `None` when the account still needs confirmation
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Credential>>;

    /// Exchange a refresh token for a new credential.
    ///
    /// A 4xx `Error::Remote` means the refresh token itself was refused.
    async fn refresh(&self, refresh_token: &str) -> Result<Credential>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

#[async_trait]
impl AuthProvider for AuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credential> {
        self.sign_in_with_password(email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Credential>> {
        AuthClient::sign_up(self, email, password).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        AuthClient::refresh(self, refresh_token).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        AuthClient::sign_out(self, access_token).await
    }
}
