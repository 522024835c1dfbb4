//! HTTP transport abstraction.
//!
//! Every network touch in the crate goes through the [`HttpClient`] trait so
//! the pipeline and the auth gateway can be exercised in tests without a
//! real server. [`MockHttpClient`] replays canned responses per route in
//! FIFO order and records every request it sees, which is what the
//! single-flight and replay-ordering tests are built on.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A response stripped down to what the pipeline cares about.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Transport seam used by the pipeline and the auth gateway.
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    /// Send a request and return the raw status and body. Transport-level
    /// failures (no response at all) come back as errors; any response,
    /// whatever its status, comes back as `Ok`.
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> Result<HttpResponse>;
}

/// Production transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        let method = reqwest::Method::from_str(method.to_uppercase().as_str())?;
        let mut builder = self.client.request(method, url);

        if let Some(headers) = headers {
            for (key, value) in headers {
                builder = builder.header(
                    reqwest::header::HeaderName::from_str(&key)?,
                    reqwest::header::HeaderValue::from_str(&value)?,
                );
            }
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// One request as the mock observed it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
struct CannedResponse {
    status: StatusCode,
    body: String,
    delay: Option<Duration>,
}

/// In-process mock transport.
///
/// Responses are queued per `(method, url)` route and consumed in FIFO
/// order; a route with an exhausted queue fails the request the same way a
/// dead server would. Optional per-response latency lets tests hold a
/// refresh call open while more callers pile up behind it.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<DashMap<String, VecDeque<CannedResponse>>>,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn route_key(method: &str, url: &str) -> String {
        format!("{} {}", method.to_uppercase(), url)
    }

    /// Queue a response for a route.
    pub fn enqueue(&self, method: &str, url: &str, status: StatusCode, body: &str) {
        self.enqueue_canned(
            method,
            url,
            CannedResponse {
                status,
                body: body.to_string(),
                delay: None,
            },
        );
    }

    /// Queue a JSON response for a route.
    pub fn enqueue_json<T: serde::Serialize>(
        &self,
        method: &str,
        url: &str,
        status: StatusCode,
        data: &T,
    ) {
        self.enqueue(
            method,
            url,
            status,
            &serde_json::to_string(data).expect("mock body must serialize"),
        );
    }

    /// Queue a response that is held back for `delay` before being returned.
    pub fn enqueue_delayed(
        &self,
        method: &str,
        url: &str,
        status: StatusCode,
        body: &str,
        delay: Duration,
    ) {
        self.enqueue_canned(
            method,
            url,
            CannedResponse {
                status,
                body: body.to_string(),
                delay: Some(delay),
            },
        );
    }

    fn enqueue_canned(&self, method: &str, url: &str, canned: CannedResponse) {
        self.routes
            .entry(Self::route_key(method, url))
            .or_default()
            .push_back(canned);
    }

    /// Every request observed so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().expect("mock log poisoned").clone()
    }

    /// How many requests hit a given route.
    pub fn hits(&self, method: &str, url: &str) -> usize {
        let method = method.to_uppercase();
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        self.log.lock().expect("mock log poisoned").push(RecordedRequest {
            method: method.to_uppercase(),
            url: url.to_string(),
            headers: headers.unwrap_or_default(),
            body,
        });

        let canned = self
            .routes
            .get_mut(&Self::route_key(method, url))
            .and_then(|mut queue| queue.pop_front())
            .ok_or_else(|| anyhow!("no canned response for {} {}", method, url))?;

        if let Some(delay) = canned.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(HttpResponse {
            status: canned.status,
            body: canned.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_replays_responses_in_fifo_order() {
        let mock = MockHttpClient::new();
        mock.enqueue("GET", "http://t/a", StatusCode::UNAUTHORIZED, "first");
        mock.enqueue("GET", "http://t/a", StatusCode::OK, "second");

        let first = mock.request("GET", "http://t/a", None, None).await.unwrap();
        assert_eq!(first.status, StatusCode::UNAUTHORIZED);
        assert_eq!(first.body, "first");

        let second = mock.request("GET", "http://t/a", None, None).await.unwrap();
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(second.body, "second");

        // Exhausted queue behaves like an unreachable server.
        assert!(mock.request("GET", "http://t/a", None, None).await.is_err());
    }

    #[tokio::test]
    async fn mock_records_requests() {
        let mock = MockHttpClient::new();
        mock.enqueue_json("POST", "http://t/b", StatusCode::OK, &json!({"ok": true}));

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        mock.request("post", "http://t/b", Some(headers), Some("{}".to_string()))
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].header("Authorization"), Some("Bearer abc"));
        assert_eq!(mock.hits("POST", "http://t/b"), 1);
    }
}
