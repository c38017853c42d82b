use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::expiry;

/// Default lifetime of an access token when the server does not say otherwise.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Profile snapshot returned at login time. Display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        match self.surname.as_deref() {
            Some(surname) if !surname.is_empty() => format!("{} {}", self.name, surname),
            _ => self.name.clone(),
        }
    }
}

/// The client-side session.
///
/// The default value is the empty (logged out) session. A token can only be
/// attached through [`Session::new`] or [`Session::with_tokens`], both of which
/// require an expiry, so a token never exists without one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub(crate) access_token: Option<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) user: Option<UserProfile>,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        user: UserProfile,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expires_at: Some(expires_at),
            user: Some(user),
        }
    }

    /// Replace the token pair and expiry, keeping the user snapshot.
    pub fn with_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expires_at: Some(expires_at),
            user: self.user.clone(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.expires_at.is_none()
            && self.user.is_none()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    /// Token and user present and `now < expires_at`.
    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.access_token().is_some()
            && self.user.is_some()
            && self.expires_at.is_some_and(|expires_at| now < expires_at)
    }

    /// Minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        expiry::time_until_expiry(self, now)
            .map(|d| d.num_minutes())
            .unwrap_or(0)
            .max(0)
    }
}

/// Longest token lifetime accepted from the server.
pub const MAX_TOKEN_TTL_DAYS: i64 = 365;

/// Absolute expiry for a token issued at `now`.
///
/// A positive server-provided lifetime wins, capped at [`MAX_TOKEN_TTL_DAYS`];
/// otherwise the fixed default applies. Never overflows.
pub fn expiry_from(now: DateTime<Utc>, expires_in_secs: Option<i64>, default_ttl: Duration) -> DateTime<Utc> {
    let lifetime = expires_in_secs
        .filter(|secs| *secs > 0)
        .and_then(|secs| Duration::try_seconds(secs.min(MAX_TOKEN_TTL_DAYS * 86_400)))
        .unwrap_or(default_ttl);
    now.checked_add_signed(lifetime)
        .or_else(|| now.checked_add_signed(default_ttl))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserProfile {
        UserProfile {
            id: 1,
            name: "Ada".to_string(),
            surname: Some("Lovelace".to_string()),
            email: None,
            phone: None,
        }
    }

    #[test]
    fn test_empty_session_is_not_authenticated() {
        let session = Session::empty();
        assert!(session.is_empty());
        assert!(!session.is_authenticated(Utc::now()));
    }

    #[test]
    fn test_user_without_token_is_not_authenticated() {
        let session = Session {
            user: Some(user()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            ..Session::default()
        };
        assert!(!session.is_authenticated(Utc::now()));
    }

    #[test]
    fn test_token_without_user_is_not_authenticated() {
        let now = Utc::now();
        let session = Session {
            access_token: Some("T1".to_string()),
            expires_at: Some(now + Duration::hours(1)),
            ..Session::default()
        };
        assert!(!session.is_authenticated(now));
    }

    #[test]
    fn test_empty_token_string_is_not_a_token() {
        let now = Utc::now();
        let session = Session::new("", None, now + Duration::hours(1), user());
        assert_eq!(session.access_token(), None);
        assert!(!session.is_authenticated(now));
    }

    #[test]
    fn test_valid_session_is_authenticated() {
        let now = Utc::now();
        let session = Session::new("T1", Some("R1".to_string()), now + Duration::hours(1), user());
        assert!(session.is_authenticated(now));
        assert_eq!(session.minutes_until_expiry(now), 60);
    }

    #[test]
    fn test_with_tokens_keeps_user() {
        let now = Utc::now();
        let session = Session::new("T1", Some("R1".to_string()), now, user());
        let refreshed = session.with_tokens("T2", Some("R2".to_string()), now + Duration::hours(2));
        assert_eq!(refreshed.access_token(), Some("T2"));
        assert_eq!(refreshed.refresh_token(), Some("R2"));
        assert_eq!(refreshed.user(), Some(&user()));
    }

    #[test]
    fn test_expiry_from_prefers_server_ttl() {
        let now = Utc::now();
        let default_ttl = Duration::hours(DEFAULT_TOKEN_TTL_HOURS);
        assert_eq!(expiry_from(now, Some(60), default_ttl), now + Duration::seconds(60));
        assert_eq!(expiry_from(now, None, default_ttl), now + default_ttl);
        assert_eq!(expiry_from(now, Some(0), default_ttl), now + default_ttl);
        assert_eq!(expiry_from(now, Some(-5), default_ttl), now + default_ttl);
    }

    #[test]
    fn test_expiry_from_caps_huge_server_ttl() {
        let now = Utc::now();
        let default_ttl = Duration::hours(DEFAULT_TOKEN_TTL_HOURS);
        let cap = now + Duration::days(MAX_TOKEN_TTL_DAYS);
        assert_eq!(expiry_from(now, Some(i64::MAX), default_ttl), cap);
        assert_eq!(expiry_from(now, Some(10_000_000_000_000), default_ttl), cap);
    }

    #[test]
    fn test_expiry_from_near_end_of_time_does_not_overflow() {
        let now = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        assert_eq!(expiry_from(now, Some(86_400), Duration::hours(24)), now);
        assert_eq!(expiry_from(now, Some(60), Duration::hours(24)), now + Duration::seconds(60));
    }

    #[test]
    fn test_not_authenticated_at_exact_expiry() {
        let now = Utc::now();
        let session = Session::new("T1", None, now, user());
        assert!(!session.is_authenticated(now));
        assert!(!expiry::is_expired(&session, now));
        assert!(session.is_authenticated(now - Duration::milliseconds(1)));
        assert!(!session.is_authenticated(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(user().display_name(), "Ada Lovelace");
        let mut no_surname = user();
        no_surname.surname = None;
        assert_eq!(no_surname.display_name(), "Ada");
    }
}
