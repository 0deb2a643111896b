//! Response-to-taxonomy classification and `Retry-After` parsing.

use chrono::Utc;
use syncline_core::transport::{error_body_excerpt, TransportResponse};
use syncline_core::SyncError;

/// Applied when a 429 carries no parsable `Retry-After`.
pub(crate) const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const ERROR_EXCERPT_LEN: usize = 200;

/// Maps a transport response onto the error taxonomy. 2xx passes through.
pub(crate) fn classify_response(
    response: TransportResponse,
) -> Result<TransportResponse, SyncError> {
    if response.ok() {
        return Ok(response);
    }

    Err(match response.status {
        401 => SyncError::CredentialExpired,
        429 => SyncError::RateLimited {
            retry_after_seconds: parse_retry_after(response.header("Retry-After"))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        503 => SyncError::ServiceUnavailable {
            retry_after_seconds: parse_retry_after(response.header("Retry-After")),
        },
        status => SyncError::ApiFailure {
            status,
            body_excerpt: error_body_excerpt(&response, ERROR_EXCERPT_LEN),
        },
    })
}

/// Parses `Retry-After`: integer seconds first, then HTTP-date as a
/// delta from now floored at zero. `None` when absent or unparsable.
pub(crate) fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    let value = value?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }
    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delta = date.with_timezone(&Utc) - Utc::now();
        return Some(delta.num_seconds().max(0) as u64);
    }
    None
}
