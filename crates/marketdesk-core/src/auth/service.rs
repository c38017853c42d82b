use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AuthError, UserProfile};

/// Credentials grant returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: UserProfile,
    /// Lifetime in seconds, when the server provides one.
    #[serde(default, alias = "expiresInSeconds")]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshGrant {
    pub access_token: String,
    /// Rotated refresh token. When absent the previous one stays valid.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "expiresInSeconds")]
    pub expires_in: Option<i64>,
}

/// The remote authentication service the session manager talks to.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchange an identifier and secret for a token grant.
    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginGrant, AuthError>;

    /// Mint a new access token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, AuthError>;

    /// Invalidate `access_token` server-side. Callers treat this as best-effort.
    async fn logout(&self, access_token: &str) -> Result<(), AuthError>;
}
