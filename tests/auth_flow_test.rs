//! End-to-end tests of the auth service flows: login, signup, logout and
//! the bootstrap-from-persisted-state routine.

use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;

use trackit_client::{
    ApiError, ClientConfig, Credentials, HttpClient, LoginRequest, MemoryStore, MockHttpClient,
    SessionEvent, SignupRequest, TrackItClient, UserIdentity,
};

const BASE: &str = "http://api.test";

fn url(path: &str) -> String {
    format!("{}{}", BASE, path)
}

fn auth_body() -> serde_json::Value {
    json!({
        "token": "fresh-access",
        "refreshToken": "fresh-refresh",
        "user": sample_user_json(),
        "expiresIn": 3600,
        "tokenType": "Bearer"
    })
}

fn sample_user_json() -> serde_json::Value {
    json!({
        "id": 42,
        "email": "amina@example.com",
        "firstName": "Amina",
        "lastName": "Diallo"
    })
}

fn sample_user() -> UserIdentity {
    UserIdentity {
        id: 42,
        email: "amina@example.com".to_string(),
        first_name: "Amina".to_string(),
        last_name: "Diallo".to_string(),
        profile_picture: None,
        roles: None,
    }
}

fn harness() -> (Arc<MockHttpClient>, TrackItClient) {
    let http = Arc::new(MockHttpClient::new());
    let client = TrackItClient::with_http_client(
        ClientConfig::new(BASE),
        Arc::new(MemoryStore::new()),
        http.clone() as Arc<dyn HttpClient>,
    );
    (http, client)
}

#[tokio::test]
async fn login_persists_credentials_and_publishes_the_session() {
    let (http, client) = harness();
    http.enqueue(
        "POST",
        &url("/auth/login"),
        StatusCode::OK,
        &auth_body().to_string(),
    );

    let mut events = client.session().subscribe();
    let user = client
        .auth()
        .login(&LoginRequest {
            email: "amina@example.com".to_string(),
            password: "hunter2".to_string(),
            remember_me: Some(true),
        })
        .await
        .unwrap();

    assert_eq!(user.id, 42);

    let stored = client.credentials().credentials().await.unwrap();
    assert_eq!(stored.access_token, "fresh-access");
    assert_eq!(stored.refresh_token.as_deref(), Some("fresh-refresh"));
    assert_eq!(client.credentials().user_snapshot().await.unwrap().id, 42);

    match events.recv().await.unwrap() {
        SessionEvent::SignedIn { user } => assert_eq!(user.email, "amina@example.com"),
        other => panic!("expected SignedIn, got {:?}", other),
    }

    // Login goes out without a bearer header.
    assert_eq!(http.requests()[0].header("Authorization"), None);
}

#[tokio::test]
async fn failed_login_leaves_no_trace() {
    let (http, client) = harness();
    http.enqueue(
        "POST",
        &url("/auth/login"),
        StatusCode::UNAUTHORIZED,
        r#"{"message":"bad password"}"#,
    );

    let err = client
        .auth()
        .login(&LoginRequest {
            email: "amina@example.com".to_string(),
            password: "wrong".to_string(),
            remember_me: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::InvalidCredentials);
    assert!(client.credentials().credentials().await.is_none());
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn signup_signs_the_user_in() {
    let (http, client) = harness();
    http.enqueue(
        "POST",
        &url("/auth/signup"),
        StatusCode::CREATED,
        &auth_body().to_string(),
    );

    let user = client
        .auth()
        .signup(&SignupRequest {
            email: "amina@example.com".to_string(),
            password: "hunter2".to_string(),
            first_name: "Amina".to_string(),
            last_name: "Diallo".to_string(),
            accept_terms: true,
        })
        .await
        .unwrap();

    assert_eq!(user.first_name, "Amina");
    assert!(client.session().is_authenticated().await);
    assert!(client.credentials().credentials().await.is_some());
}

#[tokio::test]
async fn logout_notifies_the_server_with_the_bearer_token() {
    let (http, client) = harness();
    seed_session(&client).await;
    http.enqueue("POST", &url("/auth/logout"), StatusCode::OK, "{}");

    client.auth().logout().await;

    assert_eq!(http.hits("POST", &url("/auth/logout")), 1);
    assert_eq!(
        http.requests()[0].header("Authorization"),
        Some("Bearer stored-access")
    );
    assert!(client.credentials().credentials().await.is_none());
    assert!(client.credentials().user_snapshot().await.is_none());
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn logout_clears_local_state_even_when_the_server_call_fails() {
    let (http, client) = harness();
    seed_session(&client).await;
    http.enqueue(
        "POST",
        &url("/auth/logout"),
        StatusCode::INTERNAL_SERVER_ERROR,
        "",
    );

    client.auth().logout().await;

    assert!(client.credentials().credentials().await.is_none());
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn logout_without_credentials_skips_the_server() {
    let (http, client) = harness();

    client.auth().logout().await;

    assert!(http.requests().is_empty());
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn bootstrap_without_persisted_state_starts_unauthenticated() {
    let (http, client) = harness();

    let restored = client.auth().bootstrap().await.unwrap();

    assert!(restored.is_none());
    assert!(http.requests().is_empty());
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn bootstrap_restores_and_revalidates_a_persisted_session() {
    let (http, client) = harness();
    seed_session(&client).await;
    http.enqueue(
        "POST",
        &url("/auth/validate-token"),
        StatusCode::OK,
        &json!({ "user": sample_user_json() }).to_string(),
    );

    let restored = client.auth().bootstrap().await.unwrap().unwrap();

    assert_eq!(restored.id, 42);
    assert!(client.session().is_authenticated().await);
    assert_eq!(http.hits("POST", &url("/auth/validate-token")), 1);
}

#[tokio::test]
async fn bootstrap_tears_down_when_the_server_rejects_the_token() {
    let (http, client) = harness();
    seed_session(&client).await;
    http.enqueue(
        "POST",
        &url("/auth/validate-token"),
        StatusCode::UNAUTHORIZED,
        "",
    );

    let restored = client.auth().bootstrap().await.unwrap();

    assert!(restored.is_none());
    assert!(client.credentials().credentials().await.is_none());
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn bootstrap_keeps_the_cached_session_when_the_server_is_unreachable() {
    let (http, client) = harness();
    seed_session(&client).await;
    // No canned response for the validate call, so it fails like a dead
    // server would.

    let restored = client.auth().bootstrap().await.unwrap().unwrap();

    assert_eq!(restored.id, 42);
    assert!(client.session().is_authenticated().await);
    assert!(client.credentials().credentials().await.is_some());
    assert_eq!(http.hits("POST", &url("/auth/validate-token")), 1);
}

/// Persist a credential pair and user snapshot, as a previous run of the
/// app would have.
async fn seed_session(client: &TrackItClient) {
    client
        .credentials()
        .set_credentials(&Credentials {
            access_token: "stored-access".to_string(),
            refresh_token: Some("stored-refresh".to_string()),
            expires_at: None,
        })
        .await
        .unwrap();
    client
        .credentials()
        .set_user_snapshot(&sample_user())
        .await
        .unwrap();
}
