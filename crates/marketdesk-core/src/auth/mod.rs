//! Authentication module for the administrator session lifecycle.
//!
//! This module provides:
//! - `Session`: the stored token pair, expiry and user snapshot
//! - `CredentialStore`: durable session persistence over a `SecretStore`
//! - `expiry`: pure expiration policy and the `Clock` seam
//! - `SessionManager`: login, logout, refresh and forced invalidation
//! - `RouteGuard`: allow or redirect navigation based on the session
//!
//! Tokens default to a 24 hour lifetime unless the server provides one.

pub mod credentials;
pub mod error;
pub mod expiry;
pub mod guard;
pub mod manager;
pub mod service;
pub mod session;
pub mod store;

pub use credentials::CredentialStore;
pub use error::AuthError;
pub use expiry::{Clock, ManualClock, SystemClock};
pub use guard::{GuardDecision, Route, RouteGuard};
pub use manager::{
    AuthState, ExpiryCheck, InvalidationReason, LogoutOutcome, SessionManager, SessionSettings,
};
pub use service::{AuthService, LoginGrant, RefreshGrant};
pub use session::{Session, UserProfile};
pub use store::{FileStore, KeyringStore, MemoryStore, SecretStore, StoreError};
