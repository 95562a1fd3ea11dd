//! Request construction and HMAC-SHA256 signing.
//!
//! A `SignedRequest` keeps caller parameters and signing metadata apart:
//! `params` holds only what the caller asked for, `auth` is filled in once by
//! `RequestSigner::sign`. Re-signing a stamped request is a no-op, so a retry
//! resends exactly the bytes that were signed the first time.

use crate::config::Credentials;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Keys owned by the auth stamp. A caller copy is dropped once stamped.
const RESERVED_KEYS: [&str; 4] = ["apiKey", "timestamp", "recvWindow", "signature"];

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether parameters may travel in a form body.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted, percent-encoded `key=value&...` serialization.
///
/// Keys are sorted lexicographically, pairs with an empty value are skipped,
/// values are percent-encoded. Used both to compute the signature and to
/// build the transmitted query string.
pub fn canonical_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = pairs.into_iter().filter(|(_, v)| !v.is_empty()).collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signing metadata attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStamp {
    pub api_key: String,
    pub timestamp_ms: i64,
    pub recv_window_ms: u64,
    /// Absent when the credentials carry no secret.
    pub signature: Option<String>,
}

/// One logical exchange call.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    method: HttpMethod,
    path: String,
    params: BTreeMap<String, String>,
    requires_auth: bool,
    auth: Option<AuthStamp>,
}

impl SignedRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>, requires_auth: bool) -> Self {
        Self {
            method,
            path: path.into(),
            params: BTreeMap::new(),
            requires_auth,
            auth: None,
        }
    }

    /// Public `GET`.
    pub fn public(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path, false)
    }

    /// Authenticated request.
    pub fn signed(method: HttpMethod, path: impl Into<String>) -> Self {
        Self::new(method, path, true)
    }

    /// Add a parameter. Empty values are kept here but never transmitted.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Add a parameter only when `value` is `Some`.
    #[must_use]
    pub fn param_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    #[must_use]
    pub fn params<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.params
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn user_params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn auth(&self) -> Option<&AuthStamp> {
        self.auth.as_ref()
    }

    /// Canonical string covered by the signature: user params plus
    /// `apiKey`, `timestamp` and `recvWindow` when stamped. Stamped values
    /// replace any caller-supplied copy of those keys.
    pub fn signing_payload(&self) -> String {
        let timestamp;
        let recv_window;
        let stamped = self.auth.is_some();
        let mut pairs: Vec<(&str, &str)> = self
            .params
            .iter()
            .filter(|(k, _)| !(stamped && RESERVED_KEYS.contains(&k.as_str())))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        if let Some(auth) = &self.auth {
            timestamp = auth.timestamp_ms.to_string();
            recv_window = auth.recv_window_ms.to_string();
            pairs.push(("apiKey", auth.api_key.as_str()));
            pairs.push(("timestamp", timestamp.as_str()));
            pairs.push(("recvWindow", recv_window.as_str()));
        }

        canonical_query(pairs)
    }

    /// Query string to transmit: the signing payload with the signature appended.
    pub fn query_string(&self) -> String {
        let payload = self.signing_payload();
        match self.auth.as_ref().and_then(|a| a.signature.as_deref()) {
            Some(sig) if payload.is_empty() => format!("signature={sig}"),
            Some(sig) => format!("{payload}&signature={sig}"),
            None => payload,
        }
    }
}

/// Stamps and signs authenticated requests.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
    recv_window_ms: u64,
}

impl RequestSigner {
    pub fn new(credentials: Credentials, recv_window_ms: u64) -> Self {
        Self {
            credentials,
            recv_window_ms,
        }
    }

    pub fn api_key(&self) -> &str {
        self.credentials.api_key()
    }

    /// Stamp `request` with the current time and sign it.
    ///
    /// No-op for public requests and for requests that are already stamped.
    pub fn sign(&self, request: &mut SignedRequest) {
        self.sign_at(request, chrono::Utc::now().timestamp_millis());
    }

    /// `sign` with an explicit timestamp.
    pub fn sign_at(&self, request: &mut SignedRequest, timestamp_ms: i64) {
        if !request.requires_auth || request.auth.is_some() {
            return;
        }

        request.auth = Some(AuthStamp {
            api_key: self.credentials.api_key().to_string(),
            timestamp_ms,
            recv_window_ms: self.recv_window_ms,
            signature: None,
        });

        if self.credentials.can_sign() {
            let signature = self.signature(&request.signing_payload());
            if let Some(auth) = request.auth.as_mut() {
                auth.signature = Some(signature);
            }
        }
    }

    /// hex(HMAC-SHA256(secret, payload)).
    pub fn signature(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret_key().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";

    fn signer() -> RequestSigner {
        RequestSigner::new(Credentials::new("test-key", DOC_SECRET), 5000)
    }

    fn order_request() -> SignedRequest {
        SignedRequest::signed(HttpMethod::Post, "/fapi/v1/order")
            .param("symbol", "ETHUSDT")
            .param("side", "BUY")
            .param("type", "MARKET")
            .param("quantity", "0.01")
    }

    #[test]
    fn test_canonical_query_sorts_and_skips_empty() {
        let query = canonical_query([
            ("symbol", "ETHUSDT"),
            ("side", "BUY"),
            ("timestamp", "1700000000000"),
            ("price", ""),
        ]);
        assert_eq!(query, "side=BUY&symbol=ETHUSDT&timestamp=1700000000000");
    }

    #[test]
    fn test_canonical_query_percent_encodes_values() {
        let query = canonical_query([("note", "a b/c"), ("id", "x:y")]);
        assert_eq!(query, "id=x%3Ay&note=a%20b%2Fc");
    }

    #[test]
    fn test_signature_matches_reference_vector() {
        let payload = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            signer().signature(payload),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_signature_never_empty() {
        let empty = RequestSigner::new(Credentials::new("k", ""), 5000).signature("a=1");
        let long_key = "k".repeat(200);
        let long = RequestSigner::new(Credentials::new("k", long_key), 5000).signature("a=1");
        for sig in [empty, long] {
            assert_eq!(sig.len(), 64);
            assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_signature_deterministic_and_value_sensitive() {
        let mut a = order_request();
        let mut b = order_request();
        signer().sign_at(&mut a, 1_700_000_000_000);
        signer().sign_at(&mut b, 1_700_000_000_000);
        assert_eq!(a.auth().unwrap().signature, b.auth().unwrap().signature);

        let mut c = order_request().param("quantity", "0.02");
        signer().sign_at(&mut c, 1_700_000_000_000);
        assert_ne!(a.auth().unwrap().signature, c.auth().unwrap().signature);
    }

    #[test]
    fn test_query_string_is_signed_payload_plus_signature() {
        let signer = signer();
        let mut request = order_request();
        signer.sign_at(&mut request, 1_700_000_000_000);

        let query = request.query_string();
        let (payload, sig) = query.rsplit_once("&signature=").unwrap();
        assert_eq!(
            payload,
            "apiKey=test-key&quantity=0.01&recvWindow=5000&side=BUY&symbol=ETHUSDT&timestamp=1700000000000&type=MARKET"
        );
        assert_eq!(sig, signer.signature(payload));
    }

    #[test]
    fn test_resign_is_noop() {
        let signer = signer();
        let mut request = order_request();
        signer.sign_at(&mut request, 1_000);
        let first = request.query_string();

        signer.sign_at(&mut request, 2_000);
        assert_eq!(request.query_string(), first);
        assert_eq!(request.auth().unwrap().timestamp_ms, 1_000);
        assert_eq!(first.matches("signature=").count(), 1);
        assert!(!request.user_params().contains_key("timestamp"));
    }

    #[test]
    fn test_stamp_replaces_caller_auth_keys() {
        let signer = signer();
        let mut request = order_request()
            .param("timestamp", "1")
            .param("recvWindow", "10")
            .param("apiKey", "other")
            .param("signature", "forged");
        signer.sign_at(&mut request, 1_700_000_000_000);

        let query = request.query_string();
        for key in ["apiKey=", "timestamp=", "recvWindow=", "signature="] {
            assert_eq!(query.matches(key).count(), 1, "{key} in {query}");
        }
        assert!(query.contains("timestamp=1700000000000"));
        assert!(query.contains("apiKey=test-key"));
        assert!(!query.contains("forged"));

        let (payload, sig) = query.rsplit_once("&signature=").unwrap();
        assert_eq!(sig, signer.signature(payload));
    }

    #[test]
    fn test_public_request_keeps_timestamp_param() {
        let request = SignedRequest::public("/fapi/v1/klines").param("timestamp", "1");
        assert_eq!(request.query_string(), "timestamp=1");
    }

    #[test]
    fn test_public_request_left_unsigned() {
        let mut request = SignedRequest::public("/fapi/v1/depth")
            .param("symbol", "ETHUSDT")
            .param("limit", 20);
        signer().sign_at(&mut request, 1_000);
        assert!(request.auth().is_none());
        assert_eq!(request.query_string(), "limit=20&symbol=ETHUSDT");
    }

    #[test]
    fn test_empty_secret_stamps_without_signature() {
        let signer = RequestSigner::new(Credentials::new("read-only", ""), 60_000);
        let mut request = SignedRequest::signed(HttpMethod::Get, "/fapi/v2/account");
        signer.sign_at(&mut request, 42);

        let auth = request.auth().unwrap();
        assert!(auth.signature.is_none());
        assert_eq!(
            request.query_string(),
            "apiKey=read-only&recvWindow=60000&timestamp=42"
        );
    }

    #[test]
    fn test_param_opt() {
        let request = SignedRequest::public("/x")
            .param_opt("limit", Some(5))
            .param_opt::<u32>("orderId", None);
        assert_eq!(request.query_string(), "limit=5");
    }
}
