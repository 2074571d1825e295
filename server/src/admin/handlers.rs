//! Back-office handlers.
//!
//! All of these sit behind the full admin chain, including the second-factor
//! gate, and each writes one audit entry per call.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use tracing::info;
use uuid::Uuid;

use super::types::{
    AdminError, AuditLogParams, ForceLogoutResponse, PaginatedResponse, UpdateSettingRequest,
};
use crate::api::AppState;
use crate::audit::actions;
use crate::context::AdminContext;
use crate::db::{AuditLogEntry, AuditQuery};
use crate::settings::SettingsCacheEntry;

const MAX_SETTING_KEY_LEN: usize = 64;

fn validate_setting_key(key: &str) -> Result<(), AdminError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_SETTING_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AdminError::Validation(
            "Setting keys are 1-64 characters of a-z, 0-9 and _".into(),
        ))
    }
}

/// Audit log, newest first, with an optional action prefix filter.
///
/// `GET /admin/audit-logs`
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn get_audit_log(
    State(state): State<AppState>,
    ctx: AdminContext,
    params: Result<Query<AuditLogParams>, QueryRejection>,
) -> Result<Json<PaginatedResponse<AuditLogEntry>>, AdminError> {
    let mut trail = state
        .audit
        .trail(&ctx, actions::AUDIT_LOG_VIEW, actions::RESOURCE_AUDIT_LOG);

    let result: Result<_, AdminError> = async {
        let Query(params) = params.map_err(|e| AdminError::Validation(e.body_text()))?;
        let query = AuditQuery {
            limit: params.limit.clamp(1, 100),
            offset: params.offset.max(0),
            action_prefix: params.action.filter(|a| !a.is_empty()),
        };
        trail.meta("limit", query.limit).meta("offset", query.offset);
        if let Some(prefix) = &query.action_prefix {
            trail.meta("action", prefix.as_str());
        }

        let (items, total) = state.audit_log.list(&query).await?;
        Ok(Json(PaginatedResponse {
            items,
            total,
            limit: query.limit,
            offset: query.offset,
        }))
    }
    .await;

    trail.finish(result)
}

/// All platform settings from the cache.
///
/// `GET /admin/settings`
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn list_settings(
    State(state): State<AppState>,
    ctx: AdminContext,
) -> Result<Json<Vec<SettingsCacheEntry>>, AdminError> {
    let trail = state
        .audit
        .trail(&ctx, actions::SETTINGS_VIEW, actions::RESOURCE_SETTINGS);

    let result = state.settings.all().await.map(Json).map_err(AdminError::from);
    trail.finish(result)
}

/// Write one setting through and invalidate the cache.
///
/// `PUT /admin/settings/{key}`
#[tracing::instrument(skip(state, ctx, payload), fields(admin_id = %ctx.profile.id))]
pub async fn update_setting(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(key): Path<String>,
    payload: Result<Json<UpdateSettingRequest>, JsonRejection>,
) -> Result<Json<SettingsCacheEntry>, AdminError> {
    let mut trail = state
        .audit
        .trail(&ctx, actions::SETTINGS_UPDATE, actions::RESOURCE_SETTINGS);
    trail.resource_id(key.as_str());

    let result: Result<_, AdminError> = async {
        let Json(body) = payload.map_err(|e| AdminError::Validation(e.body_text()))?;
        validate_setting_key(&key)?;
        trail.meta("value", body.value.clone());
        let entry = state
            .settings
            .update(&key, &body.value, body.value_type.as_deref(), ctx.profile.id)
            .await?;
        Ok(Json(entry))
    }
    .await;

    trail.finish(result)
}

/// Invalidate another admin's next request.
///
/// `POST /admin/admins/{id}/force-logout`
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn force_logout(
    State(state): State<AppState>,
    ctx: AdminContext,
    target: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ForceLogoutResponse>, AdminError> {
    let mut trail = state
        .audit
        .trail(&ctx, actions::ADMIN_FORCE_LOGOUT, actions::RESOURCE_PROFILE);

    let result: Result<_, AdminError> = async {
        let Path(target_id) = target.map_err(|e| AdminError::Validation(e.body_text()))?;
        trail.resource_id(target_id.to_string());
        if target_id == ctx.profile.id {
            return Err(AdminError::Forbidden(
                "Use logout to end your own session".into(),
            ));
        }

        let at = state.clock.now();
        if !state.admins.set_force_logout(target_id, at).await? {
            return Err(AdminError::NotFound("Admin".into()));
        }

        info!(target_id = %target_id, by = %ctx.profile.id, "Force logout scheduled");
        Ok(Json(ForceLogoutResponse {
            admin_id: target_id,
            force_logout_at: at,
        }))
    }
    .await;

    trail.finish(result)
}
