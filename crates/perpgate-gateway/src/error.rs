//! Gateway error types.
//!
//! Every failure that crosses the gateway boundary is a `GatewayError`
//! carrying one `ErrorKind` from a closed taxonomy plus the raw upstream
//! payload. Kinds are derived from the exchange's numeric error codes first
//! and from the HTTP status second.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Closed error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    InvalidJson,
    InvalidSymbol,
    InvalidInterval,
    InvalidOrderType,
    InvalidTimeInForce,
    InvalidSide,
    InvalidQuantity,
    InvalidPrice,
    InvalidTimestamp,
    Disconnected,
    Unauthorized,
    TooManyRequests,
    InternalError,
    ServiceUnavailable,
    UnknownOrder,
    OrderRejected,
    CancelRejected,
    NoSuchOrder,
    InsufficientFunds,
    AccountInactive,
    DuplicateOrder,
    Unknown,
}

impl ErrorKind {
    /// Map an exchange error code.
    pub fn from_api_code(code: i64) -> Self {
        match code {
            -1021 => Self::InvalidTimestamp,
            -1100 | -1114 => Self::InvalidJson,
            -1101 | -1102 | -1103 | -1104 | -1105 | -1106 | -1112 | -1022 | -2014 | -2015
            | -2019 => Self::InvalidRequest,
            -1121 => Self::InvalidSymbol,
            -1120 => Self::InvalidInterval,
            -1116 => Self::InvalidOrderType,
            -1115 => Self::InvalidSide,
            -1111 | -1013 => Self::InvalidQuantity,
            -1110 => Self::InvalidPrice,
            -1001 => Self::Disconnected,
            -1002 | -1015 => Self::Unauthorized,
            -1003 => Self::TooManyRequests,
            -1006 => Self::ServiceUnavailable,
            -1007 => Self::InternalError,
            -2010 | -2011 => Self::UnknownOrder,
            -2013 => Self::NoSuchOrder,
            -2016 => Self::AccountInactive,
            -2021 => Self::OrderRejected,
            -2022 | -2018 => Self::CancelRejected,
            -2012 => Self::InsufficientFunds,
            -4116 => Self::DuplicateOrder,
            _ => Self::Unknown,
        }
    }

    /// Map a non-2xx HTTP status.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 | 403 => Self::Unauthorized,
            429 => Self::TooManyRequests,
            500 => Self::InternalError,
            502..=504 => Self::ServiceUnavailable,
            _ => Self::Unknown,
        }
    }

    /// Whether retrying could change the outcome.
    ///
    /// Structurally invalid or unauthorized requests fail the same way every
    /// time. A duplicate order means an earlier attempt already committed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidRequest
                | Self::InvalidSymbol
                | Self::InvalidJson
                | Self::Unauthorized
                | Self::AccountInactive
                | Self::DuplicateOrder
        )
    }

    /// Stable snake_case label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidJson => "invalid_json",
            Self::InvalidSymbol => "invalid_symbol",
            Self::InvalidInterval => "invalid_interval",
            Self::InvalidOrderType => "invalid_order_type",
            Self::InvalidTimeInForce => "invalid_time_in_force",
            Self::InvalidSide => "invalid_side",
            Self::InvalidQuantity => "invalid_quantity",
            Self::InvalidPrice => "invalid_price",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::Disconnected => "disconnected",
            Self::Unauthorized => "unauthorized",
            Self::TooManyRequests => "too_many_requests",
            Self::InternalError => "internal_error",
            Self::ServiceUnavailable => "service_unavailable",
            Self::UnknownOrder => "unknown_order",
            Self::OrderRejected => "order_rejected",
            Self::CancelRejected => "cancel_rejected",
            Self::NoSuchOrder => "no_such_order",
            Self::InsufficientFunds => "insufficient_funds",
            Self::AccountInactive => "account_inactive",
            Self::DuplicateOrder => "duplicate_order",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange error payload: `{"code": -1121, "msg": "Invalid symbol."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorPayload {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

impl ApiErrorPayload {
    /// Parse `body` as an error payload.
    ///
    /// Exchange error codes are negative; `{"code":200,"msg":"success"}` is
    /// how some write endpoints acknowledge success.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|payload| payload.code < 0)
    }
}

/// Structured gateway failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}{}", detail_suffix(.detail))]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: String,
    /// Exchange error code, when the failure came from an error payload.
    pub code: Option<i64>,
    /// Raw upstream response body, empty for local failures.
    pub raw: String,
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(" ({detail})")
    }
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: String::new(),
            code: None,
            raw: String::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    /// Error from an exchange error payload.
    pub fn from_api(payload: ApiErrorPayload, raw: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::from_api_code(payload.code), payload.msg)
            .with_raw(raw);
        err.code = Some(payload.code);
        err
    }

    /// Error from a non-2xx status without a recognizable payload.
    pub fn from_http_status(status: u16, raw: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::from_http_status(status),
            format!("HTTP status {status}"),
        )
        .with_raw(raw)
    }

    /// Response body that could not be decoded into the expected type.
    pub fn decode(what: &str, err: &serde_json::Error, raw: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidJson, format!("Failed to decode {what}"))
            .with_detail(err.to_string())
            .with_raw(raw)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Transient server-side or connectivity failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ServiceUnavailable | ErrorKind::Disconnected | ErrorKind::InternalError
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind == ErrorKind::TooManyRequests
    }

    pub fn is_auth(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Unauthorized | ErrorKind::InvalidTimestamp | ErrorKind::AccountInactive
        )
    }

    pub fn is_order_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UnknownOrder
                | ErrorKind::NoSuchOrder
                | ErrorKind::OrderRejected
                | ErrorKind::CancelRejected
                | ErrorKind::InsufficientFunds
                | ErrorKind::InvalidQuantity
                | ErrorKind::InvalidPrice
        )
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Construction-time configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key is empty")]
    EmptyApiKey,

    #[error("Secret key is empty")]
    EmptySecretKey,

    #[error("Timeout must be greater than zero")]
    InvalidTimeout,

    #[error("recvWindow {0}ms outside 0..=60000")]
    RecvWindowOutOfRange(u64),

    #[error("Rate limit capacity and interval must be greater than zero")]
    InvalidRateLimit,

    #[error("Retry backoff multiplier must be at least 1")]
    InvalidBackoff,

    #[error("Invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid proxy URL {url:?}: {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("HTTP client build failed: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_code_table() {
        let cases = [
            (-1021, ErrorKind::InvalidTimestamp),
            (-1100, ErrorKind::InvalidJson),
            (-1114, ErrorKind::InvalidJson),
            (-1102, ErrorKind::InvalidRequest),
            (-1022, ErrorKind::InvalidRequest),
            (-2015, ErrorKind::InvalidRequest),
            (-2019, ErrorKind::InvalidRequest),
            (-1121, ErrorKind::InvalidSymbol),
            (-1120, ErrorKind::InvalidInterval),
            (-1116, ErrorKind::InvalidOrderType),
            (-1115, ErrorKind::InvalidSide),
            (-1111, ErrorKind::InvalidQuantity),
            (-1013, ErrorKind::InvalidQuantity),
            (-1110, ErrorKind::InvalidPrice),
            (-1000, ErrorKind::Unknown),
            (-1001, ErrorKind::Disconnected),
            (-1002, ErrorKind::Unauthorized),
            (-1015, ErrorKind::Unauthorized),
            (-1003, ErrorKind::TooManyRequests),
            (-1006, ErrorKind::ServiceUnavailable),
            (-1007, ErrorKind::InternalError),
            (-2010, ErrorKind::UnknownOrder),
            (-2011, ErrorKind::UnknownOrder),
            (-2013, ErrorKind::NoSuchOrder),
            (-2016, ErrorKind::AccountInactive),
            (-2021, ErrorKind::OrderRejected),
            (-2022, ErrorKind::CancelRejected),
            (-2018, ErrorKind::CancelRejected),
            (-2012, ErrorKind::InsufficientFunds),
            (-4116, ErrorKind::DuplicateOrder),
            (-9999, ErrorKind::Unknown),
        ];
        for (code, kind) in cases {
            assert_eq!(ErrorKind::from_api_code(code), kind, "code {code}");
        }
    }

    #[test]
    fn test_http_status_table() {
        assert_eq!(ErrorKind::from_http_status(400), ErrorKind::InvalidRequest);
        assert_eq!(ErrorKind::from_http_status(401), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_http_status(403), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_http_status(429), ErrorKind::TooManyRequests);
        assert_eq!(ErrorKind::from_http_status(500), ErrorKind::InternalError);
        assert_eq!(ErrorKind::from_http_status(502), ErrorKind::ServiceUnavailable);
        assert_eq!(ErrorKind::from_http_status(504), ErrorKind::ServiceUnavailable);
        assert_eq!(ErrorKind::from_http_status(418), ErrorKind::Unknown);
    }

    #[test]
    fn test_retryable_kinds() {
        for kind in [
            ErrorKind::InvalidRequest,
            ErrorKind::InvalidSymbol,
            ErrorKind::InvalidJson,
            ErrorKind::Unauthorized,
            ErrorKind::AccountInactive,
            ErrorKind::DuplicateOrder,
        ] {
            assert!(!kind.is_retryable(), "{kind} should abort");
        }
        for kind in [
            ErrorKind::Disconnected,
            ErrorKind::TooManyRequests,
            ErrorKind::ServiceUnavailable,
            ErrorKind::InternalError,
            ErrorKind::InvalidTimestamp,
            ErrorKind::Unknown,
        ] {
            assert!(kind.is_retryable(), "{kind} should retry");
        }
    }

    #[test]
    fn test_payload_parse_ignores_success_bodies() {
        assert!(ApiErrorPayload::parse(r#"{"code":-1003,"msg":"Too many requests"}"#).is_some());
        assert!(ApiErrorPayload::parse(r#"{"code":200,"msg":"success"}"#).is_none());
        assert!(ApiErrorPayload::parse(r#"{"code":0,"msg":""}"#).is_none());
        assert!(ApiErrorPayload::parse(r#"{"symbol":"ETHUSDT"}"#).is_none());
        assert!(ApiErrorPayload::parse("[]").is_none());
        assert!(ApiErrorPayload::parse("<html>").is_none());
    }

    #[test]
    fn test_from_api_keeps_code_and_raw() {
        let raw = r#"{"code":-1121,"msg":"Invalid symbol."}"#;
        let payload = ApiErrorPayload::parse(raw).unwrap();
        let err = GatewayError::from_api(payload, raw);
        assert_eq!(err.kind, ErrorKind::InvalidSymbol);
        assert_eq!(err.code, Some(-1121));
        assert_eq!(err.raw, raw);
        assert_eq!(err.to_string(), "invalid_symbol: Invalid symbol.");
    }

    #[test]
    fn test_display_includes_detail() {
        let err = GatewayError::new(ErrorKind::Disconnected, "Request failed")
            .with_detail("connection reset");
        assert_eq!(err.to_string(), "disconnected: Request failed (connection reset)");
    }

    #[test]
    fn test_predicates() {
        assert!(GatewayError::new(ErrorKind::ServiceUnavailable, "").is_timeout());
        assert!(GatewayError::new(ErrorKind::TooManyRequests, "").is_rate_limit());
        assert!(GatewayError::new(ErrorKind::InvalidTimestamp, "").is_auth());
        assert!(GatewayError::new(ErrorKind::InsufficientFunds, "").is_order_error());
        assert!(!GatewayError::new(ErrorKind::Unknown, "").is_order_error());
    }
}
