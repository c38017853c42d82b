use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use super::SessionManager;
use crate::api::Resource;

/// Views of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Dashboard,
    Resource(Resource),
}

impl Route {
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Dashboard => "/".to_string(),
            Route::Resource(resource) => format!("/{}", resource.path()),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Login => write!(f, "login"),
            Route::Dashboard => write!(f, "dashboard"),
            Route::Resource(resource) => write!(f, "{}", resource.path()),
        }
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('/').to_lowercase();
        match name.as_str() {
            "login" => Ok(Route::Login),
            "" | "dashboard" | "home" => Ok(Route::Dashboard),
            other => other
                .parse::<Resource>()
                .map(Route::Resource)
                .map_err(|_| format!("Unknown route: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(Route),
}

/// Gates navigation on the session. Nothing is cached between calls.
#[derive(Clone)]
pub struct RouteGuard {
    manager: Arc<SessionManager>,
}

impl RouteGuard {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// Runs an expiry check first, so an expired session is invalidated
    /// before the decision is made.
    pub async fn can_enter(&self, route: Route) -> GuardDecision {
        let check = self.manager.check_expiration().await;
        let authenticated = self.manager.is_authenticated();
        let decision = match (route.is_protected(), authenticated) {
            (true, true) | (false, false) => GuardDecision::Allow,
            (true, false) => GuardDecision::Redirect(Route::Login),
            (false, true) => GuardDecision::Redirect(Route::Dashboard),
        };
        debug!(%route, ?check, ?decision, "Route guard");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parsing() {
        assert_eq!("login".parse::<Route>(), Ok(Route::Login));
        assert_eq!("/".parse::<Route>(), Ok(Route::Dashboard));
        assert_eq!("Dashboard".parse::<Route>(), Ok(Route::Dashboard));
        assert_eq!(
            "/businesses".parse::<Route>(),
            Ok(Route::Resource(Resource::Businesses))
        );
        assert!("nowhere".parse::<Route>().is_err());
    }

    #[test]
    fn test_only_login_is_public() {
        assert!(!Route::Login.is_protected());
        assert!(Route::Dashboard.is_protected());
        assert!(Route::Resource(Resource::Ads).is_protected());
    }

    #[test]
    fn test_route_paths() {
        assert_eq!(Route::Login.path(), "/login");
        assert_eq!(Route::Resource(Resource::Users).path(), "/users");
        assert_eq!(Route::Resource(Resource::Users).to_string(), "users");
    }
}
