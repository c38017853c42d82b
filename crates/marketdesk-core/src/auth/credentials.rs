use std::sync::Arc;

use chrono::DateTime;
use tracing::{debug, warn};

use super::store::{SecretStore, StoreError};
use super::{Session, UserProfile};

const TOKEN_KEY: &str = "token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const USER_KEY: &str = "user";
const EXPIRES_AT_KEY: &str = "expires_at";

/// Persists the session as four entries that are always written and cleared together.
///
/// The token is written last and deleted first, so an interrupted save or clear
/// never leaves a token behind without its expiry and user.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn SecretStore>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn SecretStore>) -> Self {
        Self { backend }
    }

    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        let Some(token) = session.access_token() else {
            return self.clear();
        };

        let expires_at = session
            .expires_at()
            .map(|t| t.timestamp_millis().to_string());
        let user = session.user().map(serde_json::to_string).transpose()?;

        let mut writes: Vec<(&str, &str)> = Vec::with_capacity(4);
        let mut deletes: Vec<&str> = Vec::new();

        match expires_at.as_deref() {
            Some(value) => writes.push((EXPIRES_AT_KEY, value)),
            None => deletes.push(EXPIRES_AT_KEY),
        }
        match user.as_deref() {
            Some(value) => writes.push((USER_KEY, value)),
            None => deletes.push(USER_KEY),
        }
        match session.refresh_token() {
            Some(value) => writes.push((REFRESH_TOKEN_KEY, value)),
            None => deletes.push(REFRESH_TOKEN_KEY),
        }
        writes.push((TOKEN_KEY, token));

        if !deletes.is_empty() {
            self.backend.delete_many(&deletes)?;
        }
        self.backend.set_many(&writes)?;
        debug!("Session saved");
        Ok(())
    }

    /// Never fails. Unreadable or inconsistent data is cleared and an empty
    /// session is returned.
    pub fn load(&self) -> Session {
        match self.read() {
            Ok(Some(session)) => session,
            Ok(None) => Session::empty(),
            Err(reason) => {
                warn!(%reason, "Stored session unusable, clearing it");
                if let Err(e) = self.clear() {
                    warn!(error = %e, "Failed to clear unusable session");
                }
                Session::empty()
            }
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend
            .delete_many(&[TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY, EXPIRES_AT_KEY])?;
        debug!("Session cleared");
        Ok(())
    }

    fn read(&self) -> Result<Option<Session>, String> {
        let get = |key: &str| {
            self.backend
                .get(key)
                .map(|v| v.filter(|s| !s.is_empty()))
                .map_err(|e| e.to_string())
        };

        let token = get(TOKEN_KEY)?;
        let refresh_token = get(REFRESH_TOKEN_KEY)?;
        let user = get(USER_KEY)?;
        let expires_at = get(EXPIRES_AT_KEY)?;

        let Some(token) = token else {
            if refresh_token.is_some() || user.is_some() || expires_at.is_some() {
                return Err("leftover entries without a token".to_string());
            }
            return Ok(None);
        };

        let user: Option<UserProfile> = user
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| format!("user entry does not parse: {}", e))?;

        let expires_at = expires_at
            .map(|raw| {
                raw.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(DateTime::from_timestamp_millis)
                    .ok_or_else(|| format!("expiry entry is not a timestamp: {:?}", raw))
            })
            .transpose()?;

        Ok(Some(Session {
            access_token: Some(token),
            refresh_token,
            expires_at,
            user,
        }))
    }
}
