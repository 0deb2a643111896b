//! The injectable transport contract.
//!
//! The worker never assumes a concrete HTTP stack: every outbound call goes
//! through a boxed [`tower::Service`] taking a [`TransportRequest`] and
//! yielding a [`TransportResponse`]. Production wires a reqwest-backed
//! service; tests use `tower::service_fn` closures.

use crate::SyncError;
use tower::util::BoxCloneSyncService;

/// Boxed error type produced by transport implementations.
pub type BoxError = tower::BoxError;

/// The shared transport handle held by the credential manager and the
/// request pipeline. Cloning is cheap.
pub type BoxTransport = BoxCloneSyncService<TransportRequest, TransportResponse, BoxError>;

/// HTTP method of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// An outbound request handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response produced by the transport. Body bytes are already collected.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decodes the body as JSON; an undecodable body is a validation error.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, SyncError> {
        serde_json::from_str(&self.body)
            .map_err(|err| SyncError::validation(format!("undecodable response body: {err}")))
    }
}

/// Message substrings identifying network-class transport failures.
///
/// The first five come from the upstream API client this worker replaces;
/// the rest are their reqwest/hyper spellings.
const NETWORK_SIGNATURES: &[&str] = &[
    "econnrefused",
    "enotfound",
    "etimedout",
    "fetch failed",
    "network",
    "connection refused",
    "connection reset",
    "dns error",
    "timed out",
];

/// Maps a transport error to the taxonomy: recognizable network failures
/// become the retryable `NetworkFailure`; everything else surfaces as the
/// non-retryable `Transport` kind.
pub fn classify_transport_error(error: BoxError) -> SyncError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if NETWORK_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        SyncError::NetworkFailure { message }
    } else {
        SyncError::Transport { message }
    }
}

/// Extracts a human-readable error message from a non-2xx response body.
///
/// Follows the API's error convention: `{"error": {"code", "message"}}`
/// when the body is JSON, otherwise a bounded excerpt of the raw text.
pub fn error_body_excerpt(response: &TransportResponse, max_len: usize) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&response.body) {
        return parsed.error.message;
    }

    let mut excerpt: String = response.body.chars().take(max_len).collect();
    if excerpt.is_empty() {
        excerpt = format!("http status {}", response.status);
    }
    excerpt
}
