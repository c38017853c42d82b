use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Session expired")]
    TokenExpired,

    #[error("Session refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Unauthorized - session is no longer valid")]
    Unauthorized,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Superseded by a newer session change")]
    Superseded,

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

impl AuthError {
    /// Message suitable for showing inline on the login form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid username or password".to_string(),
            AuthError::Network(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            AuthError::TokenExpired | AuthError::Unauthorized | AuthError::RefreshFailed(_) => {
                "Session expired. Please log in again.".to_string()
            }
            other => other.to_string(),
        }
    }
}
