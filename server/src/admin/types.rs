//! Admin module types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;
use crate::db::StoreError;
use crate::settings::SettingsError;

/// Back-office API error type.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Validation error.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Action not allowed on this target.
    #[error("{0}")]
    Forbidden(String),

    /// Store error.
    #[error("Database error")]
    Store(#[from] StoreError),

    /// Auth chain error surfaced from a handler.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<SettingsError> for AdminError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Store(e) => Self::Store(e),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Auth(e) => return e.into_response(),
            Self::NotFound(what) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": format!("{what} not found"), "code": "NOT_FOUND"}),
            ),
            Self::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": msg, "code": "VALIDATION_ERROR"}),
            ),
            Self::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                serde_json::json!({"error": msg, "code": "FORBIDDEN"}),
            ),
            Self::Store(e) => {
                tracing::error!(error = %e, "Admin store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({"error": "Internal server error", "code": "INTERNAL_ERROR"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// Request types

/// Audit log query parameters.
#[derive(Debug, Deserialize)]
pub struct AuditLogParams {
    /// Maximum number of items to return.
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Number of items to skip.
    #[serde(default)]
    pub offset: i64,
    /// Filter by action prefix (e.g. "2FA_").
    pub action: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub value_type: Option<String>,
}

// Response types

/// Generic paginated response wrapper.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceLogoutResponse {
    pub admin_id: uuid::Uuid,
    pub force_logout_at: chrono::DateTime<chrono::Utc>,
}
