//! Core library for marketdesk, the marketplace administration console.
//!
//! The heart of the crate is the administrator session lifecycle in [`auth`]:
//! a durable credential store, a pure expiration policy, the session manager
//! state machine and the route guard. [`api`] wraps protected HTTP requests so
//! that a rejected token ends the session in one place.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError, HttpAuthService, Resource};
pub use auth::{
    AuthError, AuthState, CredentialStore, ExpiryCheck, GuardDecision, InvalidationReason,
    LogoutOutcome, Route, RouteGuard, Session, SessionManager, SessionSettings, UserProfile,
};
pub use config::Config;
