//! HTTP transport abstraction.
//!
//! `RetryingExecutor` talks to the network only through `HttpTransport`.
//! `ReqwestTransport` is the production implementation; `MockTransport`
//! replays scripted responses per path for tests in this and downstream crates.

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::signer::HttpMethod;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use thiserror::Error;

/// Boxed future type for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Header carrying the API key on authenticated requests.
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Fully built request ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Form-encoded body (unauthenticated POST/PUT only).
    pub body: Option<String>,
    /// Sent as `X-MBX-APIKEY` when present.
    pub api_key: Option<String>,
}

impl HttpRequest {
    /// Path component of the URL, without query.
    pub fn path(&self) -> String {
        reqwest::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }

    /// Raw query component of the URL.
    pub fn query(&self) -> Option<String> {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.query().map(str::to_string))
    }
}

/// Raw response: status plus body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connect, TLS, timeout or send failure.
    #[error("request failed: {0}")]
    Send(String),

    /// Response arrived but its body could not be read.
    #[error("failed to read response body: {0}")]
    ReadBody(String),
}

/// Sends built requests.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

// ============================================================================
// reqwest
// ============================================================================

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client honouring timeout, proxy and user agent.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone());

        if let Some(proxy_url) = config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| ConfigError::InvalidProxy {
                url: proxy_url.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
                HttpMethod::Put => self.client.put(&request.url),
                HttpMethod::Delete => self.client.delete(&request.url),
            };

            if let Some(api_key) = &request.api_key {
                builder = builder.header(API_KEY_HEADER, api_key);
            }
            if let Some(body) = request.body {
                builder = builder
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Send(e.to_string()))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::ReadBody(e.to_string()))?;

            Ok(HttpResponse { status, body })
        })
    }
}

// ============================================================================
// Mock
// ============================================================================

type MockReply = Result<HttpResponse, TransportError>;

/// Scripted transport for tests.
///
/// Replies are queued per URL path. The last reply queued for a path repeats
/// once the queue is drained. Unrouted paths answer `400` with an
/// `InvalidRequest`-class payload so they fail fast without retries.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `path`.
    pub fn push(&self, path: &str, reply: MockReply) -> &Self {
        self.routes
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a `200` with `body`.
    pub fn ok(&self, path: &str, body: impl Into<String>) -> &Self {
        self.push(path, Ok(HttpResponse::ok(body)))
    }

    /// Queue an exchange error payload with `status`.
    pub fn api_error(&self, path: &str, status: u16, code: i64, msg: &str) -> &Self {
        let body = format!(r#"{{"code":{code},"msg":"{msg}"}}"#);
        self.push(path, Ok(HttpResponse::new(status, body)))
    }

    /// Queue a transport failure.
    pub fn disconnect(&self, path: &str) -> &Self {
        self.push(path, Err(TransportError::Send("connection reset".into())))
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests sent to `path`.
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path() == path)
            .cloned()
            .collect()
    }

    fn next_reply(&self, path: &str) -> MockReply {
        let mut routes = self.routes.lock();
        match routes.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, ""))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, ""))),
            None => Ok(HttpResponse::new(
                400,
                format!(r#"{{"code":-1102,"msg":"no mock route for {path}"}}"#),
            )),
        }
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let reply = self.next_reply(&request.path());
            self.requests.lock().push(request);
            reply
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            body: None,
            api_key: None,
        }
    }

    #[test]
    fn test_request_path_and_query() {
        let req = get("https://fapi.example/fapi/v1/depth?limit=20&symbol=ETHUSDT");
        assert_eq!(req.path(), "/fapi/v1/depth");
        assert_eq!(req.query().as_deref(), Some("limit=20&symbol=ETHUSDT"));
    }

    #[tokio::test]
    async fn test_mock_replays_queue_then_repeats_last() {
        let mock = MockTransport::new();
        mock.disconnect("/a").ok("/a", "first").ok("/a", "second");

        assert!(mock.send(get("http://h/a")).await.is_err());
        assert_eq!(mock.send(get("http://h/a")).await.unwrap().body, "first");
        assert_eq!(mock.send(get("http://h/a")).await.unwrap().body, "second");
        assert_eq!(mock.send(get("http://h/a")).await.unwrap().body, "second");
        assert_eq!(mock.requests_to("/a").len(), 4);
    }

    #[test]
    fn test_mock_unrouted_path_is_bad_request() {
        let mock = MockTransport::new();
        let response = tokio_test::block_on(mock.send(get("http://h/missing"))).unwrap();
        assert_eq!(response.status, 400);
        assert!(response.body.contains("-1102"));
    }

    #[test]
    fn test_reqwest_transport_builds_with_defaults() {
        assert!(ReqwestTransport::new(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_reqwest_transport_accepts_proxy() {
        let config = ClientConfig {
            proxy_url: Some("http://127.0.0.1:8080".into()),
            ..ClientConfig::default()
        };
        assert!(ReqwestTransport::new(&config).is_ok());
    }
}
