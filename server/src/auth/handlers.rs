//! Admin Authentication HTTP Handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::error::{AuthError, AuthResult};
use super::lockout::{AttemptGate, FailureOutcome};
use super::roles::Role;
use super::two_factor::SecondFactorState;
use crate::api::AppState;
use crate::audit::actions;
use crate::context::AdminContext;
use crate::db::AdminProfile;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Admin profile as returned to clients. Never carries the TOTP secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfileView {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub two_fa_enabled: bool,
    pub two_fa_verified_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&AdminProfile> for AdminProfileView {
    fn from(profile: &AdminProfile) -> Self {
        Self {
            id: profile.id,
            email: profile.email.clone(),
            role: profile.role,
            is_active: profile.is_active,
            two_fa_enabled: profile.two_fa_enabled,
            two_fa_verified_at: profile.two_fa_verified_at,
            last_login_at: profile.last_login_at,
            created_at: profile.created_at,
        }
    }
}

/// Response for `POST /admin/auth/verify`.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub admin: AdminProfileView,
    #[serde(rename = "requiresTwoFA")]
    pub requires_two_fa: bool,
}

/// Response for `POST /admin/2fa/setup`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFaSetupResponse {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// `otpauth://` URI for QR rendering.
    pub enrollment_uri: String,
}

/// Body for `POST /admin/2fa/verify`.
#[derive(Debug, Deserialize, Validate)]
pub struct TwoFaEnableRequest {
    #[validate(length(min = 16, max = 128))]
    pub secret: String,
    #[validate(length(equal = 6))]
    pub token: String,
}

/// Body for `POST /admin/2fa/verify-login`.
#[derive(Debug, Deserialize, Validate)]
pub struct TwoFaLoginRequest {
    #[validate(length(equal = 6))]
    pub token: String,
}

/// Response for `POST /admin/2fa/check`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFaCheckResponse {
    pub two_fa_enabled: bool,
    /// A challenge is pending for this session.
    #[serde(rename = "requiresTwoFA")]
    pub requires_two_fa: bool,
    pub verified: bool,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: &'static str,
}

fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> AuthResult<T> {
    let Json(body) = payload.map_err(|e| AuthError::Validation(e.body_text()))?;
    body.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;
    Ok(body)
}

// ============================================================================
// Session
// ============================================================================

/// Confirm admin access after sign-in.
///
/// POST /admin/auth/verify
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn verify(
    State(state): State<AppState>,
    ctx: AdminContext,
) -> AuthResult<Json<VerifyResponse>> {
    let mut trail = state
        .audit
        .trail(&ctx, actions::ADMIN_LOGIN, actions::RESOURCE_SESSION);

    let now = state.clock.now();
    if let Err(e) = state.admins.record_login(ctx.profile.id, now).await {
        warn!(admin_id = %ctx.profile.id, error = %e, "Failed to stamp last login");
    }

    let gate = SecondFactorState::evaluate(&ctx.profile, ctx.verified_2fa_at);
    let mut admin = AdminProfileView::from(&ctx.profile);
    admin.last_login_at = Some(now);

    trail.meta("role", ctx.profile.role.as_str());
    trail.success();

    info!(admin_id = %ctx.profile.id, role = %ctx.profile.role, "Admin signed in");
    Ok(Json(VerifyResponse {
        admin,
        requires_two_fa: gate == SecondFactorState::Required,
    }))
}

/// GET /admin/auth/profile
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn profile(State(state): State<AppState>, ctx: AdminContext) -> Json<AdminProfileView> {
    state
        .audit
        .trail(&ctx, actions::ADMIN_PROFILE_VIEW, actions::RESOURCE_PROFILE)
        .success();
    Json(AdminProfileView::from(&ctx.profile))
}

/// Record the sign-out and drop this session's 2FA flag.
///
/// POST /admin/auth/logout
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn logout(State(state): State<AppState>, ctx: AdminContext) -> Json<SuccessResponse> {
    state.sessions.revoke(&ctx.session_key);
    state
        .audit
        .trail(&ctx, actions::ADMIN_LOGOUT, actions::RESOURCE_SESSION)
        .success();

    Json(SuccessResponse {
        success: true,
        message: "Logged out",
    })
}

// ============================================================================
// Two-Factor
// ============================================================================

/// Start TOTP enrollment. Nothing is persisted until `verify` succeeds.
///
/// POST /admin/2fa/setup
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn two_fa_setup(
    State(state): State<AppState>,
    ctx: AdminContext,
) -> AuthResult<Json<TwoFaSetupResponse>> {
    let trail = state
        .audit
        .trail(&ctx, actions::TWO_FA_SETUP, actions::RESOURCE_PROFILE);

    let result = if ctx.profile.two_fa_enabled && ctx.profile.two_fa_verified_at.is_some() {
        Err(AuthError::Validation("2FA is already enabled".into()))
    } else {
        state
            .totp
            .enroll(&ctx.profile.email)
            .map(|enrollment| {
                Json(TwoFaSetupResponse {
                    secret: enrollment.secret,
                    enrollment_uri: enrollment.enrollment_uri,
                })
            })
            .map_err(|e| AuthError::Internal(e.to_string()))
    };

    trail.finish(result)
}

/// Confirm enrollment with a first code and switch 2FA on.
///
/// POST /admin/2fa/verify
#[tracing::instrument(skip(state, ctx, payload), fields(admin_id = %ctx.profile.id))]
pub async fn two_fa_enable(
    State(state): State<AppState>,
    ctx: AdminContext,
    payload: Result<Json<TwoFaEnableRequest>, JsonRejection>,
) -> AuthResult<Json<SuccessResponse>> {
    let trail = state
        .audit
        .trail(&ctx, actions::TWO_FA_ENABLE, actions::RESOURCE_PROFILE);

    let result: AuthResult<Json<SuccessResponse>> = async {
        // A confirmed secret is only replaced through disable, which is 2FA-gated.
        if ctx.profile.two_fa_enabled && ctx.profile.two_fa_verified_at.is_some() {
            return Err(AuthError::Validation("2FA is already enabled".into()));
        }
        let body = validated(payload)?;
        if !state.totp.check(&body.secret, &body.token) {
            return Err(AuthError::InvalidCode {
                attempts_remaining: None,
            });
        }

        state
            .admins
            .enable_two_fa(ctx.profile.id, &body.secret, state.clock.now())
            .await?;

        info!(admin_id = %ctx.profile.id, "2FA enabled");
        Ok(Json(SuccessResponse {
            success: true,
            message: "Two-factor authentication enabled",
        }))
    }
    .await;

    trail.finish(result)
}

/// Login-time second factor: lockout check, code check, session flag.
///
/// POST /admin/2fa/verify-login
#[tracing::instrument(skip(state, ctx, payload), fields(admin_id = %ctx.profile.id))]
pub async fn two_fa_verify_login(
    State(state): State<AppState>,
    ctx: AdminContext,
    payload: Result<Json<TwoFaLoginRequest>, JsonRejection>,
) -> AuthResult<Json<SuccessResponse>> {
    let mut trail = state
        .audit
        .trail(&ctx, actions::TWO_FA_LOGIN_VERIFY, actions::RESOURCE_SESSION);

    let body = match validated(payload) {
        Ok(body) => body,
        Err(e) => return trail.finish(Err(e)),
    };

    let secret = match (&ctx.profile.two_fa_secret, ctx.profile.two_fa_enabled) {
        (Some(secret), true) => secret.clone(),
        _ => {
            return trail.finish(Err(AuthError::Validation(
                "2FA is not enabled for this account".into(),
            )))
        }
    };

    let already_counted = match state.attempts.begin(ctx.profile.id).await {
        AttemptGate::Locked { retry_after } => {
            trail.meta("retryAfter", retry_after);
            return trail.finish(Err(AuthError::RateLimited { retry_after }));
        }
        AttemptGate::Open { already_counted } => already_counted,
    };

    if state.totp.check(&secret, &body.token) {
        state.attempts.reset_attempts(ctx.profile.id).await;
        let verified_at = state
            .sessions
            .mark_verified(&ctx.session_key, ctx.profile.id);
        trail.meta("verifiedAt", verified_at.to_rfc3339());
        trail.success();

        info!(admin_id = %ctx.profile.id, "2FA verified for session");
        return Ok(Json(SuccessResponse {
            success: true,
            message: "Two-factor verification successful",
        }));
    }

    match state
        .attempts
        .record_failure(ctx.profile.id, already_counted)
        .await
    {
        FailureOutcome::Locked { retry_after } => {
            warn!(admin_id = %ctx.profile.id, retry_after, "2FA locked after repeated failures");
            trail
                .set_action(actions::TWO_FA_LOCKOUT)
                .meta("retryAfter", retry_after);
            trail.finish(Err(AuthError::RateLimited { retry_after }))
        }
        FailureOutcome::Remaining(remaining) => {
            trail.meta("attemptsRemaining", remaining);
            trail.finish(Err(AuthError::InvalidCode {
                attempts_remaining: Some(remaining),
            }))
        }
    }
}

/// Turn 2FA off and clear the stored secret.
///
/// POST /admin/2fa/disable
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn two_fa_disable(
    State(state): State<AppState>,
    ctx: AdminContext,
) -> AuthResult<Json<SuccessResponse>> {
    let trail = state
        .audit
        .trail(&ctx, actions::TWO_FA_DISABLE, actions::RESOURCE_PROFILE);

    let result: AuthResult<Json<SuccessResponse>> = async {
        if !ctx.profile.two_fa_enabled {
            return Err(AuthError::Validation("2FA is not enabled".into()));
        }
        state.admins.disable_two_fa(ctx.profile.id).await?;
        state.attempts.reset_attempts(ctx.profile.id).await;
        state.sessions.revoke_admin(ctx.profile.id);

        info!(admin_id = %ctx.profile.id, "2FA disabled");
        Ok(Json(SuccessResponse {
            success: true,
            message: "Two-factor authentication disabled",
        }))
    }
    .await;

    trail.finish(result)
}

/// Whether this session still owes a second factor.
///
/// POST /admin/2fa/check
#[tracing::instrument(skip(state, ctx), fields(admin_id = %ctx.profile.id))]
pub async fn two_fa_check(
    State(state): State<AppState>,
    ctx: AdminContext,
) -> Json<TwoFaCheckResponse> {
    let gate = SecondFactorState::evaluate(&ctx.profile, ctx.verified_2fa_at);

    let mut trail = state
        .audit
        .trail(&ctx, actions::TWO_FA_CHECK, actions::RESOURCE_SESSION);
    trail.meta("allowed", gate.allows_access());
    trail.success();

    Json(TwoFaCheckResponse {
        two_fa_enabled: ctx.profile.two_fa_enabled,
        requires_two_fa: gate == SecondFactorState::Required,
        verified: gate == SecondFactorState::Satisfied,
    })
}
