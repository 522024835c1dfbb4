//! Transport adapter for the `/auth/*` endpoints.
//!
//! The gateway performs the four operations that mutate or validate
//! session state plus logout, as plain request/response exchanges. It
//! never retries, never stores anything and never touches the session:
//! writing results into the credential store and publishing them belongs
//! to the caller (the auth service or the pipeline's refresh cycle).

use reqwest::StatusCode;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::http::{HttpClient, HttpResponse};
use crate::models::{AuthResponse, LoginRequest, SignupRequest, TokenRequest, UserIdentity, ValidateResponse};

pub const LOGIN_PATH: &str = "/auth/login";
pub const SIGNUP_PATH: &str = "/auth/signup";
pub const REFRESH_PATH: &str = "/auth/refresh-token";
pub const VALIDATE_PATH: &str = "/auth/validate-token";
pub const LOGOUT_PATH: &str = "/auth/logout";

pub struct AuthGateway {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl AuthGateway {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange email and password for credentials and an identity.
    pub async fn login(&self, request: &LoginRequest) -> ApiResult<AuthResponse> {
        let response = self.post_json(LOGIN_PATH, request, None).await?;
        match response.status {
            s if s.is_success() => decode(&response),
            StatusCode::UNAUTHORIZED => Err(ApiError::InvalidCredentials),
            s => Err(ApiError::from_status(s, &response.body)),
        }
    }

    /// Register a new account.
    pub async fn signup(&self, request: &SignupRequest) -> ApiResult<AuthResponse> {
        let response = self.post_json(SIGNUP_PATH, request, None).await?;
        match response.status {
            s if s.is_success() => decode(&response),
            s => Err(ApiError::from_status(s, &response.body)),
        }
    }

    /// Exchange a refresh token for fresh credentials. The token travels in
    /// the body, not in a header.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<AuthResponse> {
        debug!("Requesting token refresh");
        let body = TokenRequest {
            token: refresh_token.to_string(),
        };
        let response = self.post_json(REFRESH_PATH, &body, None).await?;
        match response.status {
            s if s.is_success() => decode(&response),
            StatusCode::UNAUTHORIZED => Err(ApiError::RefreshRejected),
            s => Err(ApiError::from_status(s, &response.body)),
        }
    }

    /// Confirm an access token is still good and fetch the identity behind
    /// it. Any rejection reads as an invalid token.
    pub async fn validate(&self, access_token: &str) -> ApiResult<UserIdentity> {
        let body = TokenRequest {
            token: access_token.to_string(),
        };
        let response = self.post_json(VALIDATE_PATH, &body, None).await?;
        if response.status.is_success() {
            decode::<ValidateResponse>(&response).map(|v| v.user)
        } else {
            Err(ApiError::InvalidToken)
        }
    }

    /// Tell the server to invalidate the session. The response body is
    /// ignored; only the status matters.
    pub async fn logout(&self, access_token: &str) -> ApiResult<()> {
        let response = self
            .post_json(LOGOUT_PATH, &serde_json::json!({}), Some(access_token))
            .await?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> ApiResult<HttpResponse> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(token) = bearer {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }

        let payload = serde_json::to_string(body).map_err(|e| {
            warn!(path, error = %e, "Failed to serialize request body");
            ApiError::NetworkUnreachable
        })?;

        self.http
            .request("POST", &self.url(path), Some(headers), Some(payload))
            .await
            .map_err(|e| {
                warn!(path, error = %e, "Auth request failed at transport level");
                ApiError::NetworkUnreachable
            })
    }
}

/// Decode a success body; a body we cannot parse is treated the same as
/// receiving no usable response.
fn decode<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> ApiResult<T> {
    response.json().map_err(|e| {
        warn!(error = %e, "Failed to decode auth response body");
        ApiError::NetworkUnreachable
    })
}
