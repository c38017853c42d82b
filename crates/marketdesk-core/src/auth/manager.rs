//! Session lifecycle state machine.
//!
//! The manager is the only writer of the credential store. Every state change
//! happens under one mutex that is never held across an `.await`; refreshes and
//! expiry checks are additionally serialized by an async mutex so that two
//! checks never race each other into a double refresh.
//!
//! Logins, logouts and forced invalidations bump a generation counter. A login
//! or refresh whose response arrives after the generation moved on is
//! discarded (last write wins).

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::expiry::{self, Clock, SystemClock, TOKEN_REFRESH_BUFFER_MINUTES};
use super::session::{expiry_from, DEFAULT_TOKEN_TTL_HOURS};
use super::{AuthError, AuthService, CredentialStore, Session, UserProfile};

/// How often the background monitor re-checks expiry.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

/// Upper bound on the best-effort server logout call.
const LOGOUT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggingIn,
    Authenticated,
    Refreshing,
    Expired,
}

/// Why a session was taken away without the user asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    Expired,
    RefreshFailed,
    Unauthorized,
}

impl InvalidationReason {
    pub fn notice(&self) -> &'static str {
        match self {
            InvalidationReason::Expired => "Your session has expired. Please log in again.",
            InvalidationReason::RefreshFailed => {
                "Your session could not be renewed. Please log in again."
            }
            InvalidationReason::Unauthorized => {
                "Your session is no longer valid. Please log in again."
            }
        }
    }
}

/// Result of an expiry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCheck {
    /// Nothing stored.
    NoSession,
    /// Session is still good.
    Valid,
    /// Session was expired or close to it and has been silently refreshed.
    Refreshed,
    /// Session expired with no way to refresh; it has been cleared.
    Expired,
    /// A refresh was attempted and failed; the session has been cleared.
    RefreshFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    ServerConfirmed,
    /// Local state was cleared but the server call did not succeed (or was not made).
    LocalOnly(AuthError),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Token lifetime used when the server does not send one.
    pub default_ttl: Duration,
    /// Refresh proactively when this close to expiry.
    pub refresh_buffer: Duration,
    pub logout_timeout: StdDuration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            refresh_buffer: Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES),
            logout_timeout: StdDuration::from_secs(LOGOUT_TIMEOUT_SECS),
        }
    }
}

struct Inner {
    state: AuthState,
    generation: u64,
    notice: Option<InvalidationReason>,
}

pub struct SessionManager {
    store: CredentialStore,
    service: Arc<dyn AuthService>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    inner: Mutex<Inner>,
    refresh_lock: AsyncMutex<()>,
    state_tx: watch::Sender<AuthState>,
}

impl SessionManager {
    pub fn new(store: CredentialStore, service: Arc<dyn AuthService>) -> Self {
        let (state_tx, _) = watch::channel(AuthState::LoggedOut);
        Self {
            store,
            service,
            clock: Arc::new(SystemClock),
            settings: SessionSettings::default(),
            inner: Mutex::new(Inner {
                state: AuthState::LoggedOut,
                generation: 0,
                notice: None,
            }),
            refresh_lock: AsyncMutex::new(()),
            state_tx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn state(&self) -> AuthState {
        self.lock().state
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// The stored session, read fresh from the credential store.
    pub fn session(&self) -> Session {
        self.store.load()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.store.load().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.load().is_authenticated(self.clock.now())
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// One-time notice left by the last forced invalidation.
    pub fn take_notice(&self) -> Option<InvalidationReason> {
        self.lock().notice.take()
    }

    /// Access token for an outgoing request, read from the store on every call.
    pub fn bearer_token(&self) -> Result<String, AuthError> {
        let session = self.store.load();
        let token = session.access_token().ok_or(AuthError::NotAuthenticated)?;
        if expiry::is_expired(&session, self.clock.now()) {
            return Err(AuthError::TokenExpired);
        }
        Ok(token.to_string())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Evaluate whatever session survived from a previous run.
    pub async fn initialize(&self) -> ExpiryCheck {
        let result = self.check_expiration().await;
        info!(?result, "Session initialized from storage");
        result
    }

    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let attempt = {
            let mut inner = self.lock();
            inner.generation += 1;
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear previous session");
            }
            inner.notice = None;
            self.set_state(&mut inner, AuthState::LoggingIn);
            inner.generation
        };

        info!(identifier, "Logging in");
        let result = self.service.login(identifier, secret).await;

        let mut inner = self.lock();
        if inner.generation != attempt {
            debug!(attempt, current = inner.generation, "Discarding superseded login result");
            return Err(AuthError::Superseded);
        }

        let grant = match result {
            Ok(grant) if grant.access_token.is_empty() => {
                warn!("Login response carried an empty access token");
                self.set_state(&mut inner, AuthState::LoggedOut);
                return Err(AuthError::Network(
                    "login response did not include an access token".to_string(),
                ));
            }
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.set_state(&mut inner, AuthState::LoggedOut);
                return Err(e);
            }
        };

        let expires_at = expiry_from(self.clock.now(), grant.expires_in, self.settings.default_ttl);
        let session = Session::new(grant.access_token, grant.refresh_token, expires_at, grant.user);

        if let Err(e) = self.store.save(&session) {
            error!(error = %e, "Failed to persist session");
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear partially written session");
            }
            self.set_state(&mut inner, AuthState::LoggedOut);
            return Err(e.into());
        }

        self.set_state(&mut inner, AuthState::Authenticated);
        info!(%expires_at, "Login successful");
        Ok(session)
    }

    /// Clear local state, then tell the server. The local clear always happens
    /// first and never depends on the server call.
    pub async fn logout(&self) -> LogoutOutcome {
        let token = {
            let mut inner = self.lock();
            let session = self.store.load();
            inner.generation += 1;
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear stored session");
            }
            inner.notice = None;
            self.set_state(&mut inner, AuthState::LoggedOut);
            session.access_token().map(str::to_string)
        };
        info!("Logged out");

        let Some(token) = token else {
            return LogoutOutcome::LocalOnly(AuthError::NotAuthenticated);
        };

        match tokio::time::timeout(self.settings.logout_timeout, self.service.logout(&token)).await
        {
            Ok(Ok(())) => LogoutOutcome::ServerConfirmed,
            Ok(Err(e)) => {
                warn!(error = %e, "Server-side logout failed");
                LogoutOutcome::LocalOnly(e)
            }
            Err(_) => {
                warn!(timeout = ?self.settings.logout_timeout, "Server-side logout timed out");
                LogoutOutcome::LocalOnly(AuthError::Network("logout timed out".to_string()))
            }
        }
    }

    /// Exchange the refresh token for a new access token. Failure is not
    /// retried: the session is cleared.
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let _serial = self.refresh_lock.lock().await;
        let (session, generation) = {
            let inner = self.lock();
            (self.store.load(), inner.generation)
        };
        if session.access_token().is_none() {
            return Err(AuthError::NotAuthenticated);
        }
        self.refresh_locked(&session, generation).await
    }

    /// Run at startup, on every protected-route entry and periodically.
    ///
    /// An expired session is refreshed when a refresh token exists and cleared
    /// otherwise. The session is read and judged under the state lock.
    pub async fn check_expiration(&self) -> ExpiryCheck {
        let _serial = self.refresh_lock.lock().await;
        let now = self.clock.now();

        let (session, generation) = {
            let mut inner = self.lock();
            let session = self.store.load();

            if session.access_token().is_none() {
                if !matches!(inner.state, AuthState::LoggedOut | AuthState::LoggingIn) {
                    self.set_state(&mut inner, AuthState::LoggedOut);
                }
                return ExpiryCheck::NoSession;
            }

            if session.user().is_none() {
                warn!("Stored session has no user profile, discarding it");
                self.invalidate_locked(&mut inner, InvalidationReason::Expired);
                return ExpiryCheck::NoSession;
            }

            if expiry::is_expired(&session, now) {
                self.set_state(&mut inner, AuthState::Expired);
                info!("Session expired");
                if session.refresh_token().is_none() {
                    self.invalidate_locked(&mut inner, InvalidationReason::Expired);
                    return ExpiryCheck::Expired;
                }
            } else {
                if inner.state != AuthState::Authenticated {
                    self.set_state(&mut inner, AuthState::Authenticated);
                }
                if session.refresh_token().is_none()
                    || !expiry::needs_refresh(&session, now, self.settings.refresh_buffer)
                {
                    return ExpiryCheck::Valid;
                }
                debug!("Session close to expiry, refreshing proactively");
            }

            (session, inner.generation)
        };

        self.refresh_outcome(&session, generation).await
    }

    /// Forced logout. Returns false when there was nothing to invalidate.
    pub fn invalidate(&self, reason: InvalidationReason) -> bool {
        let mut inner = self.lock();
        if self.store.load().is_empty()
            && matches!(inner.state, AuthState::LoggedOut | AuthState::LoggingIn)
        {
            return false;
        }
        self.invalidate_locked(&mut inner, reason);
        true
    }

    /// Forced logout for a request that was sent with `token`.
    ///
    /// Only acts while `token` is still the stored one, so any number of
    /// concurrent rejections of the same token clear the session once, and a
    /// late rejection cannot wipe a newer session.
    pub fn invalidate_token(&self, token: &str, reason: InvalidationReason) -> bool {
        let mut inner = self.lock();
        if self.store.load().access_token() != Some(token) {
            debug!(?reason, "Ignoring rejection of a token that is no longer current");
            return false;
        }
        self.invalidate_locked(&mut inner, reason);
        true
    }

    /// Periodically run [`check_expiration`](Self::check_expiration) until the
    /// manager is dropped or the task is aborted.
    pub fn spawn_expiry_monitor(self: &Arc<Self>, period: StdDuration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; startup has its own check
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    debug!("Session manager dropped, stopping expiry monitor");
                    break;
                };
                let result = manager.check_expiration().await;
                debug!(?result, "Periodic expiry check");
            }
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, inner: &mut Inner, state: AuthState) {
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "Session state change");
        }
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn invalidate_locked(&self, inner: &mut Inner, reason: InvalidationReason) {
        inner.generation += 1;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        inner.notice = Some(reason);
        self.set_state(inner, AuthState::LoggedOut);
        info!(?reason, "Session invalidated");
    }

    async fn refresh_outcome(&self, session: &Session, generation: u64) -> ExpiryCheck {
        match self.refresh_locked(session, generation).await {
            Ok(_) => ExpiryCheck::Refreshed,
            Err(AuthError::Superseded) => {
                if self.is_authenticated() {
                    ExpiryCheck::Valid
                } else {
                    ExpiryCheck::NoSession
                }
            }
            Err(_) => ExpiryCheck::RefreshFailed,
        }
    }

    /// Caller must hold `refresh_lock`. `generation` is the one `session` was
    /// read under; if it has moved on, nothing is sent.
    async fn refresh_locked(&self, session: &Session, generation: u64) -> Result<Session, AuthError> {
        let refresh_token = session
            .refresh_token()
            .ok_or(AuthError::NoRefreshToken)?
            .to_string();

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                debug!("Session changed before refresh, skipping");
                return Err(AuthError::Superseded);
            }
            self.set_state(&mut inner, AuthState::Refreshing);
        }

        debug!("Refreshing session");
        let result = self.service.refresh(&refresh_token).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!("Discarding superseded refresh result");
            return Err(AuthError::Superseded);
        }

        let reason = match result {
            Ok(grant) if !grant.access_token.is_empty() => {
                let expires_at =
                    expiry_from(self.clock.now(), grant.expires_in, self.settings.default_ttl);
                let refreshed = session.with_tokens(
                    grant.access_token,
                    grant.refresh_token.or(Some(refresh_token)),
                    expires_at,
                );
                match self.store.save(&refreshed) {
                    Ok(()) => {
                        self.set_state(&mut inner, AuthState::Authenticated);
                        info!(%expires_at, "Session refreshed");
                        return Ok(refreshed);
                    }
                    Err(e) => format!("could not persist refreshed session: {}", e),
                }
            }
            Ok(_) => "refresh response did not include an access token".to_string(),
            Err(e) => e.to_string(),
        };

        warn!(%reason, "Session refresh failed, logging out");
        self.invalidate_locked(&mut inner, InvalidationReason::RefreshFailed);
        Err(AuthError::RefreshFailed(reason))
    }
}
