//! Admin Authentication Service
//!
//! Bearer verification against the identity service, admin profile
//! resolution, role gates, TOTP second factor and the 2FA lockout.

mod error;
mod handlers;
mod identity;
mod lockout;
mod middleware;
mod resolver;
mod roles;
mod totp;
mod two_factor;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

use crate::api::AppState;
use crate::ratelimit::{rate_limit_by_ip, with_category, RateLimitCategory};

pub use error::{AuthError, AuthResult, ErrorResponse};
pub use handlers::AdminProfileView;
pub use identity::{
    extract_bearer_token, BearerToken, CredentialVerifier, HttpIdentityProvider, IdentityError,
    IdentityProvider, Principal,
};
pub use lockout::{AttemptGate, AttemptTracker, FailureOutcome, LockoutPolicy};
pub use middleware::{enforce_role, require_admin, require_second_factor, with_role};
pub use resolver::{ProfileResolver, ResolveOutcome};
pub use roles::{has_role, is_role, Role, RoleRequirement};
pub use totp::{Enrollment, TotpEngine, TotpError};
pub use two_factor::{session_key, SecondFactorState, SessionVerifications};

/// Wrap `routes` in the admin chain.
///
/// Request order: rate-limit category, rate limit, admin resolution, role
/// gate, second-factor gate (when `second_factor` is set), handler.
pub fn guarded(
    state: &AppState,
    routes: Router<AppState>,
    category: RateLimitCategory,
    role: Option<RoleRequirement>,
    second_factor: bool,
) -> Router<AppState> {
    let mut routes = routes;
    if second_factor {
        routes = routes.layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_second_factor,
        ));
    }
    if let Some(requirement) = role {
        routes = routes
            .layer(axum_middleware::from_fn_with_state(
                state.clone(),
                enforce_role,
            ))
            .layer(axum_middleware::from_fn(with_role(requirement)));
    }
    routes
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_by_ip,
        ))
        .layer(axum_middleware::from_fn(with_category(category)))
}

/// Create the admin auth router.
///
/// Session routes (any active admin):
/// - POST /admin/auth/verify - Confirm admin access, stamp last login
/// - GET /admin/auth/profile - Sanitized profile
/// - POST /admin/auth/logout - Audit sign-out, drop session 2FA flag
/// - POST /admin/2fa/check - Whether this session owes a second factor
/// - POST /admin/2fa/verify-login - Submit a TOTP code for this session
///
/// Super admin routes:
/// - POST /admin/2fa/setup - Start enrollment
/// - POST /admin/2fa/verify - Confirm enrollment
/// - POST /admin/2fa/disable - Turn 2FA off (2FA-gated)
pub fn router(state: &AppState) -> Router<AppState> {
    let login_route = guarded(
        state,
        Router::new().route("/admin/auth/verify", post(handlers::verify)),
        RateLimitCategory::Login,
        None,
        false,
    );

    let verification_routes = guarded(
        state,
        Router::new()
            .route("/admin/auth/profile", get(handlers::profile))
            .route("/admin/2fa/check", post(handlers::two_fa_check)),
        RateLimitCategory::AdminVerification,
        None,
        false,
    );

    let logout_route = guarded(
        state,
        Router::new().route("/admin/auth/logout", post(handlers::logout)),
        RateLimitCategory::AdminOperation,
        None,
        false,
    );

    let verify_login_route = guarded(
        state,
        Router::new().route("/admin/2fa/verify-login", post(handlers::two_fa_verify_login)),
        RateLimitCategory::TwoFactor,
        None,
        false,
    );

    // Enrollment must stay reachable without a second factor.
    let enrollment_routes = guarded(
        state,
        Router::new()
            .route("/admin/2fa/setup", post(handlers::two_fa_setup))
            .route("/admin/2fa/verify", post(handlers::two_fa_enable)),
        RateLimitCategory::TwoFactor,
        Some(RoleRequirement::Exactly(Role::SuperAdmin)),
        false,
    );

    let disable_route = guarded(
        state,
        Router::new().route("/admin/2fa/disable", post(handlers::two_fa_disable)),
        RateLimitCategory::TwoFactor,
        Some(RoleRequirement::Exactly(Role::SuperAdmin)),
        true,
    );

    login_route
        .merge(verification_routes)
        .merge(logout_route)
        .merge(verify_login_route)
        .merge(enrollment_routes)
        .merge(disable_route)
}
