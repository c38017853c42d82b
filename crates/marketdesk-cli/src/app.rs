//! Application state for the marketdesk console.
//!
//! `App` wires one session manager into the API client and route guard and
//! implements the console commands on top of them.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use marketdesk_core::{
    ApiClient, AuthError, Config, CredentialStore, GuardDecision, HttpAuthService, LogoutOutcome,
    Route, RouteGuard, SessionManager,
};

/// Environment variable with the login identifier
const USERNAME_ENV: &str = "MARKETDESK_USERNAME";

/// Environment variable with the login password
const PASSWORD_ENV: &str = "MARKETDESK_PASSWORD";

/// Maximum identifier length accepted from the prompt
const MAX_IDENTIFIER_LENGTH: usize = 254;

pub struct App {
    pub config: Config,
    pub session: Arc<SessionManager>,
    pub api: ApiClient,
    pub guard: RouteGuard,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        debug!(api = %config.api_base_url, storage = ?config.storage, "App::new() starting");

        let store = CredentialStore::new(config.secret_store()?);
        let service = Arc::new(
            HttpAuthService::with_timeout(&config.api_base_url, config.request_timeout())
                .context("Failed to create authentication client")?,
        );
        let session = Arc::new(
            SessionManager::new(store, service).with_settings(config.session_settings()),
        );
        let api = ApiClient::with_timeout(&config.api_base_url, session.clone(), config.request_timeout())
            .context("Failed to create API client")?;
        let guard = RouteGuard::new(session.clone());

        let startup = session.initialize().await;
        debug!(?startup, "Stored session checked");

        Ok(Self {
            config,
            session,
            api,
            guard,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Interactive login: identifier from the argument, environment, last
    /// login or a prompt; password from the environment or a hidden prompt.
    pub async fn login(&mut self, identifier: Option<String>, may_prompt_identifier: bool) -> Result<()> {
        let identifier = match identifier
            .or_else(|| std::env::var(USERNAME_ENV).ok())
            .or_else(|| self.config.last_identifier.clone())
            .filter(|s| !s.trim().is_empty())
        {
            Some(identifier) => identifier,
            None if may_prompt_identifier => prompt_identifier()?,
            None => anyhow::bail!("Usage: login <username>"),
        };

        let password = match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => password,
            _ => {
                let prompt = format!("Password for {}: ", identifier);
                tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
                    .await
                    .context("Password prompt failed")??
            }
        };

        match self.attempt_login(&identifier, &password).await {
            Ok(()) => {
                let name = self
                    .session
                    .current_user()
                    .map(|u| u.display_name())
                    .unwrap_or_else(|| identifier.clone());
                println!("Logged in as {}.", name);
                Ok(())
            }
            Err(e) => {
                println!("{}", e.user_message());
                Err(e.into())
            }
        }
    }

    /// Log in with the given credentials and remember the identifier.
    pub async fn attempt_login(&mut self, identifier: &str, password: &str) -> Result<(), AuthError> {
        self.session.login(identifier, password).await?;

        self.config.last_identifier = Some(identifier.trim().to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        info!("Login successful");
        Ok(())
    }

    pub async fn logout(&self) {
        match self.session.logout().await {
            LogoutOutcome::ServerConfirmed => println!("Logged out."),
            LogoutOutcome::LocalOnly(AuthError::NotAuthenticated) => println!("Not logged in."),
            LogoutOutcome::LocalOnly(e) => {
                println!("Logged out locally (server did not confirm: {}).", e)
            }
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        match self.session.refresh().await {
            Ok(session) => {
                let minutes = session.minutes_until_expiry(self.session.now());
                println!("Session refreshed, expires in {} minutes.", minutes);
                Ok(())
            }
            Err(e) => {
                println!("{}", e.user_message());
                Err(e.into())
            }
        }
    }

    pub fn status(&self) -> String {
        let session = self.session.session();
        let now = self.session.now();
        match session.user() {
            Some(user) if session.is_authenticated(now) => {
                let email = user
                    .email
                    .as_deref()
                    .map(|e| format!(" <{}>", e))
                    .unwrap_or_default();
                format!(
                    "Logged in as {}{} (session expires in {} minutes)",
                    user.display_name(),
                    email,
                    session.minutes_until_expiry(now)
                )
            }
            _ => "Not logged in".to_string(),
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Navigate to `route`, printing the first page of its collection.
    pub async fn open(&self, route: Route, page: u32) -> Result<()> {
        match self.guard.can_enter(route).await {
            GuardDecision::Redirect(Route::Login) => {
                self.print_notice();
                println!("Login required to open {}.", route);
                return Ok(());
            }
            GuardDecision::Redirect(other) => {
                println!("{}", self.status());
                debug!(%route, redirect = %other, "Redirected");
                return Ok(());
            }
            GuardDecision::Allow => {}
        }

        match route {
            Route::Login => println!("Use `login <username>` to sign in."),
            Route::Dashboard => println!("{}", self.status()),
            Route::Resource(resource) => {
                match self.api.fetch_page(resource, page, self.config.page_size).await {
                    Ok(value) => {
                        println!("{} (page {})", resource.title(), page.max(1));
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    }
                    Err(e) if e.is_session_error() => {
                        println!("Request failed: {}", e);
                        self.print_notice();
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Print the one-time notice left by a forced logout, if any.
    pub fn print_notice(&self) -> bool {
        match self.session.take_notice() {
            Some(reason) => {
                println!("{}", reason.notice());
                true
            }
            None => false,
        }
    }
}

fn prompt_identifier() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut identifier = String::new();
    io::stdin().read_line(&mut identifier)?;
    let identifier = identifier.trim().to_string();
    if !is_valid_identifier(&identifier) {
        anyhow::bail!("Invalid username");
    }
    Ok(identifier)
}

/// Non-empty, bounded and free of control characters.
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() <= MAX_IDENTIFIER_LENGTH
        && !identifier.chars().any(|c| c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("admin"));
        assert!(is_valid_identifier("ops@example.com"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("ad\tmin"));
        assert!(!is_valid_identifier(&"a".repeat(255)));
    }
}
