//! Admin Authentication Middleware
//!
//! Stages, outermost first: [`require_admin`] (bearer token, identity
//! service, profile resolution), [`enforce_role`] (role gate configured by
//! [`with_role`]), [`require_second_factor`] (per-session 2FA flag).

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::error::AuthError;
use super::identity::{extract_bearer_token, BearerToken};
use super::resolver::ResolveOutcome;
use super::roles::RoleRequirement;
use super::two_factor::{session_key, SecondFactorState};
use crate::api::AppState;
use crate::audit::actions;
use crate::context::{AdminContext, ClientInfo};
use crate::db::AuditOutcome;

/// Middleware to require an authenticated, active admin.
///
/// Inserts [`AdminContext`] into request extensions.
///
/// # Usage
///
/// ```ignore
/// Router::new()
///     .route("/admin/auth/profile", get(handler))
///     .layer(axum::middleware::from_fn_with_state(state, require_admin))
/// ```
#[tracing::instrument(skip(state, request, next), fields(path = %request.uri().path()))]
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = match extract_bearer_token(request.headers()) {
        BearerToken::Present(token) => token.to_string(),
        BearerToken::Missing => return Err(AuthError::MissingToken),
        BearerToken::Malformed => return Err(AuthError::InvalidToken),
    };

    let principal = state
        .verifier
        .verify(&token)
        .await
        .ok_or(AuthError::InvalidToken)?;

    let profile = match state.resolver.resolve_detailed(&principal.id).await {
        Ok(ResolveOutcome::Active(profile)) => profile,
        Ok(ResolveOutcome::NotFound) => {
            debug!(principal_id = %principal.id, "Principal has no admin profile");
            return Err(AuthError::Forbidden("Admin access required".into()));
        }
        Ok(ResolveOutcome::Inactive) => {
            info!(principal_id = %principal.id, "Inactive admin denied");
            return Err(AuthError::Forbidden("Admin account is deactivated".into()));
        }
        Ok(ResolveOutcome::ForcedLogout { admin_id }) => {
            state.sessions.revoke_admin(admin_id);
            return Err(AuthError::NotAuthenticated);
        }
        Err(e) => {
            error!(principal_id = %principal.id, error = %e, "Admin profile lookup failed");
            return Err(AuthError::AuthService);
        }
    };

    let client = match request.extensions().get::<ClientInfo>() {
        Some(client) => client.clone(),
        None => ClientInfo::from_request(&request, state.config.trust_proxy),
    };
    let session_key = session_key(&token);
    let verified_2fa_at = state.sessions.verified_at(&session_key, profile.id);

    request.extensions_mut().insert(AdminContext {
        client,
        principal,
        profile,
        session_key,
        verified_2fa_at,
    });

    Ok(next.run(request).await)
}

/// Sets the role requirement for a downstream [`enforce_role`].
pub fn with_role(
    requirement: RoleRequirement,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send
       + 'static {
    move |mut request: Request, next: Next| {
        request.extensions_mut().insert(requirement);
        Box::pin(async move { next.run(request).await })
    }
}

/// Role gate. Denials are audited as `ACCESS_DENIED`.
#[tracing::instrument(skip(state, request, next))]
pub async fn enforce_role(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ctx = request
        .extensions()
        .get::<AdminContext>()
        .ok_or(AuthError::NotAuthenticated)?;

    let Some(requirement) = request.extensions().get::<RoleRequirement>().copied() else {
        return Ok(next.run(request).await);
    };

    if !requirement.is_satisfied_by(&ctx.profile) {
        warn!(
            admin_id = %ctx.profile.id,
            role = %ctx.profile.role,
            required = %requirement.role(),
            "Role check failed"
        );
        state.audit.record_for(
            ctx,
            actions::ACCESS_DENIED,
            actions::RESOURCE_ROUTE,
            AuditOutcome::Failure,
            json!({
                "method": request.method().as_str(),
                "path": request.uri().path(),
                "requiredRole": requirement.role().as_str(),
                "role": ctx.profile.role.as_str(),
            }),
        );
        return Err(AuthError::Forbidden("Insufficient role".into()));
    }

    Ok(next.run(request).await)
}

/// Second-factor gate. Only checks the session flag, never verifies codes.
#[tracing::instrument(skip(state, request, next))]
pub async fn require_second_factor(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ctx = request
        .extensions()
        .get::<AdminContext>()
        .ok_or(AuthError::NotAuthenticated)?;

    if SecondFactorState::evaluate(&ctx.profile, ctx.verified_2fa_at)
        == SecondFactorState::Required
    {
        debug!(admin_id = %ctx.profile.id, "Second factor required");
        state.audit.record_for(
            ctx,
            actions::TWO_FA_REQUIRED,
            actions::RESOURCE_ROUTE,
            AuditOutcome::Failure,
            json!({
                "method": request.method().as_str(),
                "path": request.uri().path(),
            }),
        );
        return Err(AuthError::TwoFactorRequired);
    }

    Ok(next.run(request).await)
}

/// Extractor for the admin context in handlers behind [`require_admin`].
impl<S> FromRequestParts<S> for AdminContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::NotAuthenticated)
    }
}
