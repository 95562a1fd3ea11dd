//! Signed, rate-limited, retrying REST gateway for USDT-M perpetual futures.
//!
//! # Request pipeline
//!
//! 1. [`RateLimiter::wait`]: token bucket admission
//! 2. [`RequestSigner::sign`]: `apiKey` / `timestamp` / `recvWindow` stamp and HMAC-SHA256
//!    signature, applied once per logical request
//! 3. [`HttpTransport::send`]: GET/DELETE as query string, POST/PUT as query
//!    string when signed, form body otherwise
//! 4. [`classify`]: exchange error payload first, HTTP status second
//! 5. [`RetryingExecutor`]: exponential backoff for retryable [`ErrorKind`]s
//!
//! [`FuturesClient`] wraps the pipeline with typed endpoints.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod rate_limiter;
pub mod signer;
pub mod transport;

pub use client::{
    FuturesClient, IncomeQuery, LeverageChange, OrderRef, DEFAULT_FUNDING_HISTORY_LIMIT,
};
pub use config::{ClientConfig, Credentials, MAINNET_BASE_URL, TESTNET_BASE_URL};
pub use error::{ApiErrorPayload, ConfigError, ErrorKind, GatewayError, GatewayResult};
pub use executor::{classify, Attempted, RetryPolicy, RetryingExecutor};
pub use rate_limiter::RateLimiter;
pub use signer::{canonical_query, AuthStamp, HttpMethod, RequestSigner, SignedRequest};
pub use transport::{
    BoxFuture, HttpRequest, HttpResponse, HttpTransport, MockTransport, ReqwestTransport,
    TransportError,
};
