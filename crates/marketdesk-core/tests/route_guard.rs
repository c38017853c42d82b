use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use marketdesk_core::auth::{
    AuthService, CredentialStore, LoginGrant, ManualClock, MemoryStore, RefreshGrant,
};
use marketdesk_core::{
    AuthError, AuthState, ExpiryCheck, GuardDecision, InvalidationReason, Resource, Route,
    RouteGuard, Session, SessionManager, UserProfile,
};

struct StubAuth {
    refresh_token: Option<String>,
}

#[async_trait]
impl AuthService for StubAuth {
    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginGrant, AuthError> {
        if identifier != "admin" || secret != "correct" {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(LoginGrant {
            access_token: "T1".to_string(),
            refresh_token: self.refresh_token.clone(),
            user: user(),
            expires_in: Some(86_400),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshGrant, AuthError> {
        Err(AuthError::RefreshFailed("refresh token expired".to_string()))
    }

    async fn logout(&self, _access_token: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

fn user() -> UserProfile {
    UserProfile {
        id: 1,
        name: "A".to_string(),
        surname: None,
        email: None,
        phone: None,
    }
}

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
}

struct Setup {
    store: CredentialStore,
    clock: Arc<ManualClock>,
    manager: Arc<SessionManager>,
    guard: RouteGuard,
}

fn setup(refresh_token: Option<&str>) -> Setup {
    let store = CredentialStore::new(Arc::new(MemoryStore::new()));
    let clock = Arc::new(ManualClock::new(now()));
    let service = Arc::new(StubAuth {
        refresh_token: refresh_token.map(str::to_string),
    });
    let manager =
        Arc::new(SessionManager::new(store.clone(), service).with_clock(clock.clone()));
    let guard = RouteGuard::new(manager.clone());
    Setup {
        store,
        clock,
        manager,
        guard,
    }
}

#[tokio::test]
async fn test_app_start_with_expired_session() {
    let s = setup(None);
    s.store
        .save(&Session::new(
            "T1",
            None,
            now() - Duration::milliseconds(1000),
            user(),
        ))
        .unwrap();

    assert_eq!(s.manager.initialize().await, ExpiryCheck::Expired);
    assert!(s.store.load().is_empty());
    assert_eq!(s.manager.state(), AuthState::LoggedOut);
}

#[tokio::test]
async fn test_logged_out_user_is_redirected_to_login() {
    let s = setup(None);
    for resource in Resource::ALL {
        assert_eq!(
            s.guard.can_enter(Route::Resource(resource)).await,
            GuardDecision::Redirect(Route::Login)
        );
    }
    assert_eq!(s.guard.can_enter(Route::Login).await, GuardDecision::Allow);
}

#[tokio::test]
async fn test_authenticated_user_may_enter() {
    let s = setup(None);
    s.manager.login("admin", "correct").await.unwrap();

    assert_eq!(s.guard.can_enter(Route::Dashboard).await, GuardDecision::Allow);
    assert_eq!(
        s.guard.can_enter(Route::Resource(Resource::Businesses)).await,
        GuardDecision::Allow
    );
}

#[tokio::test]
async fn test_login_route_redirects_authenticated_user() {
    let s = setup(None);
    s.manager.login("admin", "correct").await.unwrap();
    assert_eq!(
        s.guard.can_enter(Route::Login).await,
        GuardDecision::Redirect(Route::Dashboard)
    );
}

#[tokio::test]
async fn test_guard_invalidates_expired_session_before_denying() {
    let s = setup(None);
    s.manager.login("admin", "correct").await.unwrap();
    assert_eq!(s.manager.state(), AuthState::Authenticated);

    // The state still says Authenticated; the guard must not trust it
    s.clock.advance(Duration::hours(24) + Duration::seconds(1));
    assert_eq!(s.manager.state(), AuthState::Authenticated);

    assert_eq!(
        s.guard.can_enter(Route::Resource(Resource::Reports)).await,
        GuardDecision::Redirect(Route::Login)
    );
    assert!(s.store.load().is_empty());
    assert_eq!(s.manager.state(), AuthState::LoggedOut);
    assert_eq!(s.manager.take_notice(), Some(InvalidationReason::Expired));
}

#[tokio::test]
async fn test_guard_refresh_failure_denies_entry() {
    let s = setup(Some("R1"));
    s.manager.login("admin", "correct").await.unwrap();
    s.clock.advance(Duration::hours(25));

    assert_eq!(
        s.guard.can_enter(Route::Dashboard).await,
        GuardDecision::Redirect(Route::Login)
    );
    assert_eq!(s.manager.state(), AuthState::LoggedOut);
    assert_eq!(s.manager.take_notice(), Some(InvalidationReason::RefreshFailed));
}

#[tokio::test]
async fn test_guard_reevaluates_every_navigation() {
    let s = setup(None);
    s.manager.login("admin", "correct").await.unwrap();
    assert_eq!(s.guard.can_enter(Route::Dashboard).await, GuardDecision::Allow);

    s.manager.logout().await;
    assert_eq!(
        s.guard.can_enter(Route::Dashboard).await,
        GuardDecision::Redirect(Route::Login)
    );
}

#[tokio::test]
async fn test_login_route_checks_expiry_too() {
    let s = setup(None);
    s.manager.login("admin", "correct").await.unwrap();
    s.clock.advance(Duration::hours(25));

    assert_eq!(s.guard.can_enter(Route::Login).await, GuardDecision::Allow);
    assert!(s.store.load().is_empty());
    assert_eq!(s.manager.state(), AuthState::LoggedOut);
    assert_eq!(s.manager.take_notice(), Some(InvalidationReason::Expired));
}
