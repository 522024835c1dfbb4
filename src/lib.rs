//! Async client for the TrackIt expense tracker API.
//!
//! The centerpiece is the request pipeline: every call carries the stored
//! bearer token, a 401 from a protected endpoint triggers exactly one
//! token refresh no matter how many requests fail at once, queued callers
//! are replayed in order once the new token lands, and an unrecoverable
//! refresh tears the whole session down.
//!
//! ```no_run
//! use std::sync::Arc;
//! use trackit_client::{ClientConfig, LoginRequest, MemoryStore, TrackItClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TrackItClient::new(
//!     ClientConfig::new("https://api.trackit.example"),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! // Restore a previous session, if one was persisted.
//! client.auth().bootstrap().await?;
//!
//! let user = client
//!     .auth()
//!     .login(&LoginRequest {
//!         email: "amina@example.com".into(),
//!         password: "hunter2".into(),
//!         remember_me: None,
//!     })
//!     .await?;
//! println!("signed in as {}", user.email);
//!
//! let expenses = client.expenses().list().await?;
//! println!("{} expenses", expenses.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod expenses;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod storage;

use std::sync::Arc;

pub use auth::{AuthGateway, AuthService};
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult};
pub use expenses::ExpenseClient;
pub use http::{HttpClient, MockHttpClient, ReqwestHttpClient};
pub use models::{AuthResponse, Credentials, LoginRequest, SignupRequest, UserIdentity};
pub use pipeline::{ApiRequest, ApiResponse, RequestPipeline};
pub use session::{SessionEvent, SessionState};
pub use storage::{CredentialStore, JsonFileStore, KeyValueStore, MemoryStore};

/// Fully wired client: storage, session state, auth service, pipeline and
/// the typed endpoint clients, sharing one set of components.
pub struct TrackItClient {
    auth: Arc<AuthService>,
    expenses: ExpenseClient,
    pipeline: Arc<RequestPipeline>,
    session: Arc<SessionState>,
    store: Arc<CredentialStore>,
}

impl TrackItClient {
    /// Build a client over the default reqwest transport.
    pub fn new(config: ClientConfig, backend: Arc<dyn KeyValueStore>) -> Self {
        let http: Arc<dyn HttpClient> =
            Arc::new(ReqwestHttpClient::with_timeout(config.request_timeout()));
        Self::with_http_client(config, backend, http)
    }

    /// Build a client over an injected transport. Tests use this with
    /// [`MockHttpClient`]; production code normally wants [`Self::new`].
    pub fn with_http_client(
        config: ClientConfig,
        backend: Arc<dyn KeyValueStore>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        let store = Arc::new(CredentialStore::new(backend));
        let session = Arc::new(SessionState::new());
        let gateway = Arc::new(AuthGateway::new(Arc::clone(&http), config.base_url.clone()));

        let mut pipeline = RequestPipeline::new(
            http,
            Arc::clone(&gateway),
            Arc::clone(&store),
            Arc::clone(&session),
            config.base_url.clone(),
        );
        if let Some(limit) = config.refresh_wait() {
            pipeline = pipeline.with_refresh_wait(limit);
        }
        let pipeline = Arc::new(pipeline);

        let auth = Arc::new(AuthService::new(
            gateway,
            Arc::clone(&pipeline),
            Arc::clone(&store),
            Arc::clone(&session),
        ));
        let expenses = ExpenseClient::new(Arc::clone(&pipeline));

        Self {
            auth,
            expenses,
            pipeline,
            session,
            store,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn expenses(&self) -> &ExpenseClient {
        &self.expenses
    }

    /// The pipeline, for endpoints without a typed wrapper.
    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.store
    }
}
