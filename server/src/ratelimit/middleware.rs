//! Axum middleware for rate limiting.
//!
//! Requests are keyed by the normalized client address captured in
//! [`ClientInfo`]. The category comes from request extensions, set by
//! [`with_category`]; without one the general tier applies.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::api::AppState;
use crate::context::ClientInfo;
use crate::ratelimit::{RateLimitCategory, RateLimitError};

/// Middleware to rate limit requests by client IP address.
///
/// # Usage
///
/// ```ignore
/// Router::new()
///     .route("/admin/auth/verify", post(verify))
///     .layer(from_fn_with_state(state.clone(), rate_limit_by_ip))
///     .layer(from_fn(with_category(RateLimitCategory::Login)))
/// ```
///
/// # Behavior
///
/// - If rate limiter is not configured (`state.rate_limiter` is `None`), requests pass through.
/// - If Redis is unavailable and `fail_open` is true, requests pass through with a warning.
/// - If the rate limit is exceeded, returns `429 Too Many Requests` with retry information.
#[tracing::instrument(skip(state, request, next))]
pub async fn rate_limit_by_ip(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let category = request
        .extensions()
        .get::<RateLimitCategory>()
        .copied()
        .unwrap_or(RateLimitCategory::General);

    // Skip rate limiting if not configured
    let Some(ref rate_limiter) = state.rate_limiter else {
        return Ok(next.run(request).await);
    };

    let identifier = match request.extensions().get::<ClientInfo>() {
        Some(client) => client.normalized_ip.clone(),
        None => ClientInfo::from_request(&request, state.config.trust_proxy).normalized_ip,
    };

    debug!(
        category = %category.as_str(),
        ip = %identifier,
        "Checking rate limit by IP"
    );

    let result = match rate_limiter.check(category, &identifier).await {
        Ok(result) => result,
        Err(RateLimitError::RedisUnavailable) => {
            // Fail open if configured
            if rate_limiter.config().fail_open {
                warn!(
                    category = %category.as_str(),
                    ip = %identifier,
                    "Redis unavailable, allowing request (fail_open=true)"
                );
                return Ok(next.run(request).await);
            }
            return Err(RateLimitError::RedisUnavailable);
        }
        Err(e) => return Err(e),
    };

    if !result.allowed {
        debug!(
            category = %category.as_str(),
            ip = %identifier,
            retry_after = result.retry_after,
            "Rate limit exceeded"
        );
        return Err(RateLimitError::LimitExceeded(result));
    }

    Ok(next.run(request).await)
}

/// Sets the rate limit category for downstream middleware.
///
/// Apply it outside (after, in builder order) `rate_limit_by_ip`:
///
/// ```ignore
/// let app = Router::new()
///     .route("/admin/2fa/verify-login", post(verify_login))
///     .layer(from_fn_with_state(state.clone(), rate_limit_by_ip))
///     .layer(from_fn(with_category(RateLimitCategory::TwoFactor)));
/// ```
pub fn with_category(
    category: RateLimitCategory,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send
       + 'static {
    move |mut request: Request, next: Next| {
        request.extensions_mut().insert(category);
        Box::pin(async move { next.run(request).await })
    }
}
