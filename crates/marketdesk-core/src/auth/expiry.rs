//! Token expiration policy.
//!
//! Everything here is a pure comparison against an injected `now`, so callers
//! decide where time comes from. [`Clock`] is the seam the session manager uses.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::Session;

/// Buffer before expiry during which a refresh is attempted proactively.
pub const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// A token with no known expiry is treated as already expired.
pub fn is_expired(session: &Session, now: DateTime<Utc>) -> bool {
    if session.access_token().is_none() {
        return false;
    }
    match session.expires_at() {
        Some(expires_at) => now > expires_at,
        None => true,
    }
}

/// Check if the session will expire within `buffer` and should be refreshed
pub fn needs_refresh(session: &Session, now: DateTime<Utc>, buffer: Duration) -> bool {
    if session.access_token().is_none() {
        return false;
    }
    match session.expires_at() {
        Some(expires_at) => now > expires_at - buffer,
        None => true,
    }
}

pub fn time_until_expiry(session: &Session, now: DateTime<Utc>) -> Option<Duration> {
    session.access_token()?;
    session.expires_at().map(|expires_at| expires_at - now)
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserProfile;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn session_expiring(expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            access_token: Some("T1".to_string()),
            refresh_token: None,
            expires_at,
            user: Some(UserProfile {
                id: 1,
                name: "A".to_string(),
                surname: None,
                email: None,
                phone: None,
            }),
        }
    }

    #[test]
    fn test_past_expiry_is_expired_regardless_of_other_fields() {
        let now = at(1_700_000_000_000);
        let mut session = session_expiring(Some(now - Duration::milliseconds(1)));
        assert!(is_expired(&session, now));

        session.user = None;
        session.refresh_token = Some("R1".to_string());
        assert!(is_expired(&session, now));
    }

    #[test]
    fn test_future_expiry_is_not_expired() {
        let now = at(1_700_000_000_000);
        let session = session_expiring(Some(now + Duration::seconds(1)));
        assert!(!is_expired(&session, now));
    }

    #[test]
    fn test_expiry_boundary_is_not_expired() {
        // Expired only strictly after expires_at
        let now = at(1_700_000_000_000);
        let session = session_expiring(Some(now));
        assert!(!is_expired(&session, now));
        assert!(is_expired(&session, now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_token_without_expiry_is_expired() {
        let session = session_expiring(None);
        assert!(is_expired(&session, at(0)));
        assert!(needs_refresh(&session, at(0), Duration::minutes(5)));
    }

    #[test]
    fn test_no_token_is_never_expired() {
        let session = Session::empty();
        assert!(!is_expired(&session, at(0)));
        assert!(!needs_refresh(&session, at(0), Duration::minutes(5)));
        assert_eq!(time_until_expiry(&session, at(0)), None);
    }

    #[test]
    fn test_needs_refresh_inside_buffer() {
        let now = at(1_700_000_000_000);
        let buffer = Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
        let session = session_expiring(Some(now + Duration::minutes(4)));
        assert!(needs_refresh(&session, now, buffer));
        assert!(!is_expired(&session, now));

        let session = session_expiring(Some(now + Duration::minutes(6)));
        assert!(!needs_refresh(&session, now, buffer));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(at(1_000));
        assert_eq!(clock.now(), at(1_000));
        clock.advance(Duration::milliseconds(500));
        assert_eq!(clock.now(), at(1_500));
        clock.set(at(0));
        assert_eq!(clock.now(), at(0));
    }
}
