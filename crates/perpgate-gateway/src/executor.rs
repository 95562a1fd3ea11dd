//! Retrying request executor.
//!
//! One call to `execute` is one logical exchange request: rate limit, sign,
//! send, classify, and retry transient failures with exponential backoff.
//! Calls run to completion once started, including the full retry budget.

use crate::config::{ClientConfig, Credentials};
use crate::error::{ApiErrorPayload, ErrorKind, GatewayError, GatewayResult};
use crate::rate_limiter::RateLimiter;
use crate::signer::{HttpMethod, RequestSigner, SignedRequest};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use perpgate_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

/// Backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Multiplier applied per further retry.
    pub backoff: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.retry_delay(),
            backoff: config.retry_backoff,
        }
    }

    /// Delay before retry number `retry` (1-based): `delay * backoff^(retry - 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = self.backoff.checked_pow(exponent).unwrap_or(u32::MAX);
        self.delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Outcome of `execute_tracked`: the final result plus the attempt count.
#[derive(Debug, Clone)]
pub struct Attempted<T> {
    pub result: GatewayResult<T>,
    pub attempts: u32,
}

/// Executes signed requests with rate limiting and retry.
pub struct RetryingExecutor {
    transport: Arc<dyn HttpTransport>,
    signer: RequestSigner,
    limiter: RateLimiter,
    policy: RetryPolicy,
    base_url: String,
}

impl RetryingExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        signer: RequestSigner,
        limiter: RateLimiter,
        policy: RetryPolicy,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            signer,
            limiter,
            policy,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Wire the executor from validated configuration.
    pub fn from_config(
        config: &ClientConfig,
        credentials: Credentials,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self::new(
            transport,
            RequestSigner::new(credentials, config.recv_window_ms),
            RateLimiter::new(config.rate_limit_capacity, config.rate_limit_interval()),
            RetryPolicy::from_config(config),
            config.base_url(),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute `request`, returning the raw response body.
    pub async fn execute(&self, request: SignedRequest) -> GatewayResult<String> {
        self.execute_tracked(request).await.result
    }

    /// Map-style entry point for callers outside the typed client.
    pub async fn execute_raw<I, K, V>(
        &self,
        method: HttpMethod,
        path: &str,
        params: I,
        requires_auth: bool,
    ) -> GatewayResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let request = SignedRequest::new(method, path, requires_auth).params(params);
        self.execute(request).await
    }

    /// `execute`, also reporting how many attempts were made.
    ///
    /// The request is stamped and signed on the first attempt only; every
    /// retry resends the same query string.
    pub async fn execute_tracked(&self, mut request: SignedRequest) -> Attempted<String> {
        let endpoint = request.path().to_string();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.limiter.wait().await;
            self.signer.sign(&mut request);

            let http = self.build(&request);
            trace!(method = %http.method, url = %http.url, attempt, "Sending request");

            let started = Instant::now();
            let result = classify(self.transport.send(http).await);
            Metrics::request_latency(&endpoint, started.elapsed().as_secs_f64() * 1000.0);

            let err = match result {
                Ok(body) => {
                    Metrics::request_completed(&endpoint, "ok");
                    debug!(endpoint = %endpoint, attempt, bytes = body.len(), "Request succeeded");
                    return Attempted {
                        result: Ok(body),
                        attempts: attempt,
                    };
                }
                Err(err) => err,
            };

            let retries_used = attempt - 1;
            if !err.is_retryable() || retries_used >= self.policy.max_retries {
                Metrics::request_completed(&endpoint, err.kind.as_str());
                warn!(
                    endpoint = %endpoint,
                    attempt,
                    kind = %err.kind,
                    code = ?err.code,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Request failed"
                );
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                };
            }

            let delay = self.policy.delay_for(attempt);
            Metrics::request_retry(err.kind.as_str());
            warn!(
                endpoint = %endpoint,
                attempt,
                kind = %err.kind,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Request failed, retrying"
            );
            sleep(delay).await;
        }
    }

    /// Lay out a signed request on the wire.
    ///
    /// GET and DELETE always carry a query string. POST and PUT carry a query
    /// string when authenticated and a form body otherwise.
    fn build(&self, request: &SignedRequest) -> HttpRequest {
        let query = request.query_string();
        let endpoint = format!("{}{}", self.base_url, request.path());
        let method = request.method();
        let in_body = method.has_body() && !request.requires_auth();

        let (url, body) = match (in_body, query.is_empty()) {
            (_, true) => (endpoint, None),
            (true, false) => (endpoint, Some(query)),
            (false, false) => (format!("{endpoint}?{query}"), None),
        };

        let api_key = request
            .auth()
            .map(|auth| auth.api_key.clone())
            .filter(|key| !key.is_empty());

        HttpRequest {
            method,
            url,
            body,
            api_key,
        }
    }
}

/// Classify a transport outcome.
///
/// Order: transport failure, then an exchange error payload (even on 200),
/// then a non-2xx status, otherwise success.
pub fn classify(outcome: Result<HttpResponse, TransportError>) -> GatewayResult<String> {
    let response = match outcome {
        Ok(response) => response,
        Err(TransportError::Send(e)) => {
            return Err(GatewayError::new(ErrorKind::Disconnected, "Request failed").with_detail(e));
        }
        Err(TransportError::ReadBody(e)) => {
            return Err(
                GatewayError::new(ErrorKind::InternalError, "Failed to read response body")
                    .with_detail(e),
            );
        }
    };

    if let Some(payload) = ApiErrorPayload::parse(&response.body) {
        return Err(GatewayError::from_api(payload, response.body));
    }
    if !response.is_success() {
        return Err(GatewayError::from_http_status(response.status, response.body));
    }
    Ok(response.body)
}
