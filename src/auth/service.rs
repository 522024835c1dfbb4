//! Session orchestration.
//!
//! The gateway is a pure transport, so someone has to write its results
//! into the credential store and publish them to the session state. That
//! someone is this service: it owns login, signup, logout and the
//! bootstrap-from-persisted-credentials routine that runs at process
//! start.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::gateway::{AuthGateway, LOGOUT_PATH};
use crate::error::{ApiError, ApiResult};
use crate::models::{AuthResponse, Credentials, LoginRequest, SignupRequest, UserIdentity};
use crate::pipeline::{ApiRequest, RequestPipeline};
use crate::session::SessionState;
use crate::storage::CredentialStore;

pub struct AuthService {
    gateway: Arc<AuthGateway>,
    pipeline: Arc<RequestPipeline>,
    store: Arc<CredentialStore>,
    session: Arc<SessionState>,
}

impl AuthService {
    pub fn new(
        gateway: Arc<AuthGateway>,
        pipeline: Arc<RequestPipeline>,
        store: Arc<CredentialStore>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            gateway,
            pipeline,
            store,
            session,
        }
    }

    /// Sign in with email and password. On success the credentials are
    /// persisted and the session is published before returning.
    pub async fn login(&self, request: &LoginRequest) -> ApiResult<UserIdentity> {
        let response = self.gateway.login(request).await?;
        self.establish(&response).await;
        Ok(response.user)
    }

    /// Register an account; a successful signup signs the user in.
    pub async fn signup(&self, request: &SignupRequest) -> ApiResult<UserIdentity> {
        let response = self.gateway.signup(request).await?;
        self.establish(&response).await;
        Ok(response.user)
    }

    /// Sign out. The server is notified through the pipeline (so the call
    /// carries the bearer token), but local state is torn down whether or
    /// not the server call lands.
    pub async fn logout(&self) {
        if self.store.credentials().await.is_some() {
            let request = ApiRequest::post(LOGOUT_PATH, serde_json::json!({}));
            if let Err(e) = self.pipeline.execute(request).await {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }

        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear credential store on logout");
        }
        self.session.signed_out().await;
    }

    /// Restore a session from persisted state at process start.
    ///
    /// If a credential pair and a user snapshot are both present, the
    /// session is published from the snapshot immediately and the access
    /// token is then validated against the server. A confirmed-invalid
    /// token forces a teardown; a transport failure keeps the cached
    /// session so the app can start offline.
    pub async fn bootstrap(&self) -> ApiResult<Option<UserIdentity>> {
        let credentials = match self.store.credentials().await {
            Some(credentials) => credentials,
            None => {
                debug!("No persisted credentials, starting unauthenticated");
                return Ok(None);
            }
        };
        let snapshot = match self.store.user_snapshot().await {
            Some(snapshot) => snapshot,
            None => {
                debug!("Credentials present but no user snapshot, starting unauthenticated");
                return Ok(None);
            }
        };

        info!(user_id = snapshot.id, "Restoring session from persisted credentials");
        self.session.signed_in(snapshot.clone()).await;

        match self.gateway.validate(&credentials.access_token).await {
            Ok(user) => {
                if let Err(e) = self.store.set_user_snapshot(&user).await {
                    warn!(error = %e, "Failed to refresh persisted user snapshot");
                }
                self.session.signed_in(user.clone()).await;
                Ok(Some(user))
            }
            Err(ApiError::InvalidToken) => {
                info!("Persisted access token rejected by server, tearing down session");
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Failed to clear credential store during teardown");
                }
                self.session.signed_out().await;
                Ok(None)
            }
            Err(e) => {
                // Offline start: keep the cached session and let the
                // pipeline sort out stale tokens on first real request.
                warn!(error = %e, "Could not validate persisted token, keeping cached session");
                Ok(Some(snapshot))
            }
        }
    }

    /// Persist an auth success and publish the session.
    async fn establish(&self, response: &AuthResponse) {
        let credentials = Credentials::from_response(response);
        if let Err(e) = self.store.set_credentials(&credentials).await {
            warn!(error = %e, "Failed to persist credentials");
        }
        if let Err(e) = self.store.set_user_snapshot(&response.user).await {
            warn!(error = %e, "Failed to persist user snapshot");
        }
        self.session.signed_in(response.user.clone()).await;
    }
}
