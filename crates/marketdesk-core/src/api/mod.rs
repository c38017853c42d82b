//! REST API module for the marketplace admin backend.
//!
//! This module provides the `ApiClient` used for every protected request and
//! the `HttpAuthService` the session manager uses to log in, refresh and
//! log out.
//!
//! The backend uses bearer token authentication; tokens come from the
//! `/auth/login` endpoint.

pub mod auth;
pub mod client;
pub mod error;
pub mod resource;

pub use auth::HttpAuthService;
pub use client::ApiClient;
pub use error::ApiError;
pub use resource::Resource;
