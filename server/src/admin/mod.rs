//! Back-Office Admin Module
//!
//! Privileged endpoints that sit behind the whole admin chain:
//! - Audit log (super admin)
//! - Platform settings (moderator+ to read, super admin to write)
//! - Force logout of another admin (super admin)

pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::api::AppState;
use crate::auth::{guarded, Role, RoleRequirement};
use crate::ratelimit::RateLimitCategory;

pub use types::AdminError;

/// Create the back-office router. Every route is 2FA-gated.
pub fn router(state: &AppState) -> Router<AppState> {
    let super_admin_routes = guarded(
        state,
        Router::new()
            .route("/admin/audit-logs", get(handlers::get_audit_log))
            .route("/admin/settings/{key}", put(handlers::update_setting))
            .route(
                "/admin/admins/{id}/force-logout",
                post(handlers::force_logout),
            ),
        RateLimitCategory::AdminOperation,
        Some(RoleRequirement::AtLeast(Role::SuperAdmin)),
        true,
    );

    let moderator_routes = guarded(
        state,
        Router::new().route("/admin/settings", get(handlers::list_settings)),
        RateLimitCategory::AdminOperation,
        Some(RoleRequirement::AtLeast(Role::Moderator)),
        true,
    );

    super_admin_routes.merge(moderator_routes)
}
