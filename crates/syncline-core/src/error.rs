//! The error taxonomy shared by every syncline component.

use std::time::Duration;

/// Errors produced by the request pipeline and its surrounding components.
///
/// The retry engine asks two questions of an error: [`is_retryable`] and
/// [`retry_after`]. Both are answered here so classification happens once,
/// at the point the error is constructed.
///
/// [`is_retryable`]: SyncError::is_retryable
/// [`retry_after`]: SyncError::retry_after
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// The authentication endpoint rejected the configured credentials.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Server-supplied rejection message, or a summary of the status.
        message: String,
    },

    /// The server answered 401: the access token is no longer accepted.
    #[error("access token rejected by upstream")]
    CredentialExpired,

    /// The server answered 429.
    #[error("rate limited by upstream, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Parsed `Retry-After` value (default 60 when absent or unparsable).
        retry_after_seconds: u64,
    },

    /// The server answered 503.
    #[error("service unavailable")]
    ServiceUnavailable {
        /// Parsed `Retry-After` value, when the server sent one.
        retry_after_seconds: Option<u64>,
    },

    /// The per-call deadline elapsed before the transport produced a response.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout {
        /// The deadline that was exceeded, in milliseconds.
        elapsed_ms: u64,
    },

    /// The transport failed with a recognizable network signature
    /// (connection refused, DNS failure, socket timeout, ...).
    #[error("network failure: {message}")]
    NetworkFailure { message: String },

    /// Any other transport failure, surfaced without reclassification.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// A non-2xx response with no dedicated classification.
    #[error("api request failed with status {status}: {body_excerpt}")]
    ApiFailure {
        status: u16,
        /// Decoded `error.message` when the body followed the JSON error
        /// convention, otherwise a bounded excerpt of the raw body.
        body_excerpt: String,
    },

    /// The persistence layer rejected a save.
    #[error("database failure: {message}")]
    DatabaseFailure { message: String },

    /// The retry budget ran out. Wraps the last attempt's error.
    #[error("giving up after {attempts} attempts")]
    MaxRetriesExceeded {
        attempts: usize,
        #[source]
        cause: Box<SyncError>,
    },

    /// Startup configuration violated a documented constraint.
    #[error("invalid configuration: {message}")]
    ConfigurationInvalid { message: String },

    /// A request or response failed validation (e.g. an undecodable body).
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// The operation was cancelled before it ran (queue purge, limiter
    /// reset).
    #[error("cancelled: {reason}")]
    Cancelled { reason: String },
}

impl SyncError {
    /// Short stable identifier for structured logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::AuthenticationFailed { .. } => "authentication_failed",
            SyncError::CredentialExpired => "credential_expired",
            SyncError::RateLimited { .. } => "rate_limited",
            SyncError::ServiceUnavailable { .. } => "service_unavailable",
            SyncError::Timeout { .. } => "timeout",
            SyncError::NetworkFailure { .. } => "network_failure",
            SyncError::Transport { .. } => "transport",
            SyncError::ApiFailure { .. } => "api_failure",
            SyncError::DatabaseFailure { .. } => "database_failure",
            SyncError::MaxRetriesExceeded { .. } => "max_retries_exceeded",
            SyncError::ConfigurationInvalid { .. } => "configuration_invalid",
            SyncError::Validation { .. } => "validation",
            SyncError::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether the retry engine may re-attempt an operation that failed with
    /// this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::CredentialExpired
                | SyncError::RateLimited { .. }
                | SyncError::ServiceUnavailable { .. }
                | SyncError::Timeout { .. }
                | SyncError::NetworkFailure { .. }
        )
    }

    /// Server-supplied delay hint, when the error carries one.
    ///
    /// Overrides exponential backoff for the attempt that observed it.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited {
                retry_after_seconds,
            } => Some(Duration::from_secs(*retry_after_seconds)),
            SyncError::ServiceUnavailable {
                retry_after_seconds: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Convenience constructor for network-class transport failures.
    pub fn network(message: impl Into<String>) -> Self {
        SyncError::NetworkFailure {
            message: message.into(),
        }
    }

    /// Convenience constructor for cancellation errors.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        SyncError::Cancelled {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for validation errors.
    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation {
            message: message.into(),
        }
    }
}
