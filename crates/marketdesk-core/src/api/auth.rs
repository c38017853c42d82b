//! HTTP implementation of the authentication service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::client::REQUEST_TIMEOUT_SECS;
use super::ApiError;
use crate::auth::{AuthError, AuthService, LoginGrant, RefreshGrant};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Talks to `{base}/auth/login`, `{base}/auth/refresh` and `{base}/auth/logout`.
#[derive(Clone)]
pub struct HttpAuthService {
    client: Client,
    base_url: String,
}

impl HttpAuthService {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/{}", self.base_url, path)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T, AuthError> {
        let text = response.text().await.map_err(network)?;
        serde_json::from_str(&text)
            .map_err(|e| AuthError::Network(format!("Failed to parse {} response: {}", what, e)))
    }

    async fn failure(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ApiError::from_status(status, &body).to_string()
    }
}

fn network(e: reqwest::Error) -> AuthError {
    AuthError::Network(e.to_string())
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginGrant, AuthError> {
        let response = self
            .client
            .post(self.url("login"))
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest {
                username: identifier,
                password: secret,
            })
            .send()
            .await
            .map_err(network)?;

        match response.status() {
            s if s.is_success() => Self::parse(response, "login").await,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!(status = %response.status(), "Login rejected");
                Err(AuthError::InvalidCredentials)
            }
            _ => Err(AuthError::Network(Self::failure(response).await)),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, AuthError> {
        let response = self
            .client
            .post(self.url("refresh"))
            .header(header::ACCEPT, "application/json")
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(network)?;

        match response.status() {
            s if s.is_success() => Self::parse(response, "refresh").await,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                AuthError::RefreshFailed("refresh token rejected".to_string()),
            ),
            _ => Err(AuthError::Network(Self::failure(response).await)),
        }
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("logout"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(network)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(AuthError::Unauthorized),
            _ => Err(AuthError::Network(Self::failure(response).await)),
        }
    }
}
