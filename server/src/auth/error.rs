//! Authentication Error Types

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;

/// Errors raised by the admin auth chain and 2FA endpoints.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header.
    #[error("Authorization header required")]
    MissingToken,

    /// Malformed header, or the identity service did not accept the token.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Session was invalidated and must re-authenticate.
    #[error("Session invalidated, please sign in again")]
    NotAuthenticated,

    /// Not an admin, inactive, or role too low.
    #[error("{0}")]
    Forbidden(String),

    /// Second factor pending for this session.
    #[error("Two-factor verification required")]
    TwoFactorRequired,

    /// Wrong TOTP code.
    #[error("Invalid verification code")]
    InvalidCode { attempts_remaining: Option<u32> },

    /// Too many attempts.
    #[error("Too many attempts, try again later")]
    RateLimited { retry_after: u64 },

    /// Malformed request body or state.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Identity or profile lookup failed on our side.
    #[error("Authentication service error")]
    AuthService,

    /// Internal server error.
    #[error("Internal server error")]
    Internal(String),
}

impl AuthError {
    /// Machine-readable code clients branch on.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::TwoFactorRequired => "2FA_REQUIRED",
            Self::InvalidCode { .. } => "INVALID_CODE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::AuthService => "AUTH_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken
            | Self::InvalidToken
            | Self::NotAuthenticated
            | Self::TwoFactorRequired
            | Self::InvalidCode { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AuthService | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(detail = %detail, "Internal auth error");
        }

        let (attempts_remaining, retry_after) = match &self {
            Self::InvalidCode { attempts_remaining } => (*attempts_remaining, None),
            Self::RateLimited { retry_after } => (None, Some(*retry_after)),
            _ => (None, None),
        };

        // Display never carries internal detail for the 500 variants.
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            attempts_remaining,
            retry_after,
        });

        let mut response = (self.status(), body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, v);
            }
        }
        response
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
