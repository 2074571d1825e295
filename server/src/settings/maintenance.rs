//! Maintenance-mode gate.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use super::{DEFAULT_MAINTENANCE_MESSAGE, MAINTENANCE_MESSAGE, MAINTENANCE_MODE};
use crate::api::AppState;

/// Paths that stay reachable during maintenance.
fn is_exempt(path: &str) -> bool {
    ["/admin", "/health"]
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

/// Short-circuit non-admin traffic with 503 while `maintenance_mode` is set.
///
/// Settings read errors let the request through.
pub async fn maintenance_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    match state.settings.get_bool(MAINTENANCE_MODE).await {
        Ok(Some(true)) => {}
        Ok(_) => return next.run(request).await,
        Err(e) => {
            warn!(error = %e, "Could not read maintenance flag, allowing request");
            return next.run(request).await;
        }
    }

    let message = state
        .settings
        .get_string(MAINTENANCE_MESSAGE)
        .await
        .ok()
        .flatten()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MAINTENANCE_MESSAGE.to_string());

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": message,
            "code": "MAINTENANCE_MODE",
        })),
    )
        .into_response()
}
