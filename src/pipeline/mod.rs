//! The authenticated request pipeline.
//!
//! Every outgoing API call flows through [`RequestPipeline::execute`]: the
//! pipeline attaches the stored bearer token, sends the request, and on a
//! 401 from a protected endpoint drives the single-flight refresh
//! protocol. Concurrent callers that fail while a refresh is in flight are
//! queued as waiters on the one shared cycle and replayed in FIFO order
//! once the new token lands; a terminal refresh failure tears the session
//! down and fails every waiter with `SessionExpired`.
//!
//! The state machine is deliberately explicit: `Idle | Refreshing{waiters}`
//! behind one mutex, so the single-flight invariant is enforced by
//! structure rather than convention. Network calls never run under the
//! lock; only the check-and-set of the state and waiter enqueues do.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::gateway::{AuthGateway, LOGIN_PATH, SIGNUP_PATH};
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpClient, HttpResponse};
use crate::models::Credentials;
use crate::session::SessionState;
use crate::storage::CredentialStore;

/// A replayable description of one API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus query string, with a leading slash.
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path, Some(body))
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PATCH, path, Some(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, None)
    }

    fn new(method: Method, path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }

    /// Auth endpoints are exempt from the refresh protocol: a 401 from one
    /// of them is a credential failure for that caller, never a trigger.
    fn is_auth_endpoint(&self) -> bool {
        self.path.contains("/auth/")
    }

    /// Login and signup must go out unauthenticated even when a token is
    /// stored.
    fn is_credential_exempt(&self) -> bool {
        self.path.starts_with(LOGIN_PATH) || self.path.starts_with(SIGNUP_PATH)
    }
}

/// A successful (2xx) response as returned to callers, unchanged.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body. An undecodable body on a success response reads as
    /// not having received a usable response.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            warn!(error = %e, "Failed to decode response body");
            ApiError::NetworkUnreachable
        })
    }
}

/// A caller suspended behind the in-flight refresh. Resolved or rejected
/// exactly once, by the cycle that owns it.
struct Waiter {
    request: ApiRequest,
    tx: oneshot::Sender<ApiResult<ApiResponse>>,
}

/// Refresh coordination state. At most one cycle is `Refreshing` at any
/// time; the waiter queue exists only while its cycle does.
enum RefreshCycle {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

pub struct RequestPipeline {
    http: Arc<dyn HttpClient>,
    gateway: Arc<AuthGateway>,
    store: Arc<CredentialStore>,
    session: Arc<SessionState>,
    base_url: String,
    refresh_wait: Option<Duration>,
    cycle: Mutex<RefreshCycle>,
}

impl RequestPipeline {
    pub fn new(
        http: Arc<dyn HttpClient>,
        gateway: Arc<AuthGateway>,
        store: Arc<CredentialStore>,
        session: Arc<SessionState>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            gateway,
            store,
            session,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            refresh_wait: None,
            cycle: Mutex::new(RefreshCycle::Idle),
        }
    }

    /// Bound how long a queued waiter may stay suspended. A waiter that is
    /// not resolved within the deadline fails with `NetworkUnreachable`;
    /// the cycle itself keeps running and still resolves everyone else.
    pub fn with_refresh_wait(mut self, limit: Duration) -> Self {
        self.refresh_wait = Some(limit);
        self
    }

    /// Execute one API call under the pipeline's protocol.
    ///
    /// Success statuses come back as the raw response; error statuses are
    /// mapped to the [`ApiError`] taxonomy. A 401 from a protected
    /// endpoint is the only locally recovered failure: it is absorbed into
    /// the shared refresh cycle and the request is replayed at most once.
    pub async fn execute(self: &Arc<Self>, request: ApiRequest) -> ApiResult<ApiResponse> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, method = %request.method, path = %request.path, "Executing request");

        let response = self.send(&request).await?;

        if response.status != StatusCode::UNAUTHORIZED || request.is_auth_endpoint() {
            return into_result(response);
        }

        debug!(%request_id, path = %request.path, "Got 401 on protected endpoint, joining refresh cycle");
        let rx = self.enlist(request).await;

        let outcome = match self.refresh_wait {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(resolved) => resolved,
                Err(_) => {
                    warn!(%request_id, "Refresh cycle did not resolve within the configured wait");
                    return Err(ApiError::NetworkUnreachable);
                }
            },
            None => rx.await,
        };

        // The sender only disappears if the cycle task died mid-flight.
        outcome.unwrap_or(Err(ApiError::NetworkUnreachable))
    }

    /// Join the current refresh cycle, starting one if the pipeline is
    /// idle. The check-and-set and the enqueue are a single atomic step
    /// under the cycle mutex; the triggering caller becomes waiter number
    /// one and is replayed through the same path as everyone behind it.
    async fn enlist(self: &Arc<Self>, request: ApiRequest) -> oneshot::Receiver<ApiResult<ApiResponse>> {
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter { request, tx };

        let started = {
            let mut cycle = self.cycle.lock().await;
            match &mut *cycle {
                RefreshCycle::Refreshing { waiters } => {
                    waiters.push(waiter);
                    debug!(queued = waiters.len(), "Joined in-flight refresh cycle");
                    false
                }
                RefreshCycle::Idle => {
                    *cycle = RefreshCycle::Refreshing {
                        waiters: vec![waiter],
                    };
                    true
                }
            }
        };

        if started {
            // The cycle runs detached so it completes and resolves every
            // waiter even if the caller that triggered it goes away.
            let pipeline = Arc::clone(self);
            tokio::spawn(async move { pipeline.run_refresh_cycle().await });
        }

        rx
    }

    /// Drive one refresh cycle to completion and settle every waiter.
    async fn run_refresh_cycle(self: Arc<Self>) {
        info!("Starting token refresh cycle");

        let refresh_token = self
            .store
            .credentials()
            .await
            .and_then(|credentials| credentials.refresh_token);

        let outcome = match refresh_token {
            Some(token) => self.gateway.refresh(&token).await,
            None => {
                debug!("No refresh token stored, failing cycle without a network call");
                Err(ApiError::SessionExpired)
            }
        };

        match outcome {
            Ok(response) => {
                // New credentials land before the state flips back to Idle,
                // so replays and fresh requests both pick up the new token.
                let credentials = Credentials::from_response(&response);
                if let Err(e) = self.store.set_credentials(&credentials).await {
                    warn!(error = %e, "Failed to persist refreshed credentials");
                }
                if let Err(e) = self.store.set_user_snapshot(&response.user).await {
                    warn!(error = %e, "Failed to persist refreshed user snapshot");
                }
                self.session.signed_in(response.user.clone()).await;

                let waiters = self.take_waiters().await;
                info!(waiters = waiters.len(), "Token refresh succeeded, replaying queued requests");
                for waiter in waiters {
                    let result = self.replay(waiter.request).await;
                    let _ = waiter.tx.send(result);
                }
            }
            Err(error) => {
                warn!(error = %error, "Token refresh failed, tearing down session");
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Failed to clear credential store during teardown");
                }
                self.session.signed_out().await;

                let waiters = self.take_waiters().await;
                for waiter in waiters {
                    let _ = waiter.tx.send(Err(ApiError::SessionExpired));
                }
            }
        }
    }

    /// Flip the cycle back to Idle and take ownership of its waiters.
    /// Requests that 401 after this point start a fresh cycle; there is no
    /// coalescing across cycles.
    async fn take_waiters(&self) -> Vec<Waiter> {
        let mut cycle = self.cycle.lock().await;
        match std::mem::replace(&mut *cycle, RefreshCycle::Idle) {
            RefreshCycle::Refreshing { waiters } => waiters,
            RefreshCycle::Idle => Vec::new(),
        }
    }

    /// Re-execute a waiter's request once with the refreshed token. A 401
    /// here is terminal: the protocol allows at most one replay per
    /// original 401, so it surfaces as an expired session instead of
    /// looping.
    async fn replay(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        debug!(method = %request.method, path = %request.path, "Replaying request with refreshed token");
        let response = self.send(&request).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::SessionExpired);
        }
        into_result(response)
    }

    /// Send a request with the header injection rules applied: JSON
    /// content type on everything, bearer token on everything except login
    /// and signup.
    async fn send(&self, request: &ApiRequest) -> ApiResult<HttpResponse> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        if !request.is_credential_exempt() {
            if let Some(credentials) = self.store.credentials().await {
                headers.insert(
                    "Authorization".to_string(),
                    format!("Bearer {}", credentials.access_token),
                );
            }
        }

        let url = format!("{}{}", self.base_url, request.path);
        let body = request.body.as_ref().map(|b| b.to_string());

        self.http
            .request(request.method.as_str(), &url, Some(headers), body)
            .await
            .map_err(|e| {
                warn!(path = %request.path, error = %e, "Request failed at transport level");
                ApiError::NetworkUnreachable
            })
    }

    // Typed helpers for the common verb/decode combinations.

    pub async fn get_json<T: DeserializeOwned>(self: &Arc<Self>, path: &str) -> ApiResult<T> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        self: &Arc<Self>,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.execute(ApiRequest::post(path, to_value(body)?)).await?.json()
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        self: &Arc<Self>,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.execute(ApiRequest::put(path, to_value(body)?)).await?.json()
    }

    pub async fn patch_json<B: Serialize, T: DeserializeOwned>(
        self: &Arc<Self>,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.execute(ApiRequest::patch(path, to_value(body)?)).await?.json()
    }

    pub async fn delete(self: &Arc<Self>, path: &str) -> ApiResult<()> {
        self.execute(ApiRequest::delete(path)).await.map(|_| ())
    }
}

fn to_value<B: Serialize>(body: &B) -> ApiResult<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| {
        warn!(error = %e, "Failed to serialize request body");
        ApiError::NetworkUnreachable
    })
}

/// Pass a success response through unchanged; map everything else to the
/// error taxonomy. No retries happen here.
fn into_result(response: HttpResponse) -> ApiResult<ApiResponse> {
    if response.status.is_success() {
        Ok(ApiResponse {
            status: response.status,
            body: response.body,
        })
    } else {
        Err(ApiError::from_status(response.status, &response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_endpoints_are_exempt_from_the_protocol() {
        assert!(ApiRequest::post("/auth/login", serde_json::json!({})).is_auth_endpoint());
        assert!(ApiRequest::post("/auth/refresh-token", serde_json::json!({})).is_auth_endpoint());
        assert!(!ApiRequest::get("/expenses").is_auth_endpoint());
        assert!(!ApiRequest::get("/expenses?category=auth").is_auth_endpoint());
    }

    #[test]
    fn only_login_and_signup_skip_token_injection() {
        assert!(ApiRequest::post("/auth/login", serde_json::json!({})).is_credential_exempt());
        assert!(ApiRequest::post("/auth/signup", serde_json::json!({})).is_credential_exempt());
        assert!(!ApiRequest::post("/auth/logout", serde_json::json!({})).is_credential_exempt());
        assert!(!ApiRequest::post("/auth/refresh-token", serde_json::json!({})).is_credential_exempt());
        assert!(!ApiRequest::get("/expenses").is_credential_exempt());
    }
}
