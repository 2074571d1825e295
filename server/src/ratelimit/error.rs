//! Rate limiting error types for HTTP responses.

use axum::http::header::{HeaderValue, RETRY_AFTER};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ratelimit::RateLimitResult;

/// Errors that can occur during rate limit checks.
#[derive(Debug)]
pub enum RateLimitError {
    /// Redis is unavailable (fail-open, but should be logged).
    RedisUnavailable,
    /// Request exceeded the rate limit.
    LimitExceeded(RateLimitResult),
}

/// JSON response body for rate limit errors.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: &'static str,
    /// Seconds to wait before retrying.
    pub retry_after: u64,
    /// Maximum requests allowed in the window.
    pub limit: u32,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        match self {
            Self::RedisUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "Service temporarily unavailable",
                    "code": "SERVICE_UNAVAILABLE"
                })),
            )
                .into_response(),
            Self::LimitExceeded(result) => {
                let body = RateLimitErrorResponse {
                    error: format!("Too many requests. Wait {} seconds.", result.retry_after),
                    code: "RATE_LIMITED",
                    retry_after: result.retry_after,
                    limit: result.limit,
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                if let Ok(v) = HeaderValue::from_str(&result.retry_after.to_string()) {
                    response.headers_mut().insert(RETRY_AFTER, v);
                }
                response
            }
        }
    }
}
