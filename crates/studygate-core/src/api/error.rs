use serde::Deserialize;
use thiserror::Error;

use crate::auth::RefreshError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Insufficient credits: {required} required, {credits} available")]
    InsufficientCredits { credits: u32, required: u32 },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Machine-readable code some backends send instead of a 429
const RATE_LIMIT_CODE: &str = "RATE_LIMITED";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "error", alias = "detail")]
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// True when the body carries an explicit rate-limit signal
    fn body_signals_rate_limit(body: &str) -> bool {
        let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
            return false;
        };
        if parsed
            .code
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(RATE_LIMIT_CODE))
        {
            return true;
        }
        parsed.message.as_deref().is_some_and(|m| {
            let lower = m.to_lowercase();
            lower.contains("rate limit") || lower.contains("too many requests")
        })
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status.as_u16() == 429 || Self::body_signals_rate_limit(body) {
            return ApiError::RateLimited;
        }
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited)
    }
}

impl From<ApiError> for RefreshError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::RateLimited => RefreshError::RateLimited,
            other => RefreshError::Rejected(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, "no"), ApiError::AccessDenied(_)));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, ""), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, ""), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::IM_A_TEAPOT, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_explicit_rate_limit_signal_in_body() {
        let by_code = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"code":"rate_limited"}"#);
        assert!(by_code.is_rate_limited());

        let by_message = ApiError::from_status(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error":"Rate limit exceeded, try again later"}"#,
        );
        assert!(by_message.is_rate_limited());

        let plain = ApiError::from_status(StatusCode::BAD_REQUEST, "rate limit (not json)");
        assert!(!plain.is_rate_limited());
    }

    #[test]
    fn test_truncates_long_bodies() {
        let body = "é".repeat(400);
        match ApiError::from_status(StatusCode::FORBIDDEN, &body) {
            ApiError::AccessDenied(msg) => {
                assert!(msg.contains("truncated, 800 total bytes"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_into_refresh_error() {
        assert_eq!(RefreshError::from(ApiError::RateLimited), RefreshError::RateLimited);
        assert_eq!(
            RefreshError::from(ApiError::Unauthorized),
            RefreshError::Rejected("Unauthorized - token may be expired".to_string())
        );
    }
}
