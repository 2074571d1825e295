//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    admin,
    audit::AuditLogger,
    auth::{
        self, AttemptTracker, CredentialVerifier, IdentityProvider, ProfileResolver,
        SessionVerifications, TotpEngine,
    },
    clock::Clock,
    config::Config,
    context::capture_client_info,
    db::{AdminStore, AttemptStore, AuditSink, SettingsStore},
    ratelimit::{rate_limit_by_ip, RateLimiter},
    settings::{maintenance_gate, SettingsCache, DEFAULT_SITE_NAME, SITE_NAME},
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Bearer token verification against the identity service
    pub verifier: Arc<CredentialVerifier>,
    /// Fresh admin profile lookups
    pub resolver: Arc<ProfileResolver>,
    /// Admin profile persistence
    pub admins: Arc<dyn AdminStore>,
    /// TOTP enrollment and checks
    pub totp: Arc<TotpEngine>,
    /// Failed 2FA attempt lockout
    pub attempts: Arc<AttemptTracker>,
    /// Per-session 2FA flags
    pub sessions: Arc<SessionVerifications>,
    /// Best-effort audit writer
    pub audit: AuditLogger,
    /// Audit log reads
    pub audit_log: Arc<dyn AuditSink>,
    /// Platform settings cache
    pub settings: Arc<SettingsCache>,
    /// Rate limiter (optional)
    pub rate_limiter: Option<RateLimiter>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Collaborators needed to build [`AppState`].
pub struct AppStateConfig {
    pub config: Config,
    pub identity: Arc<dyn IdentityProvider>,
    pub admins: Arc<dyn AdminStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub audit: Arc<dyn AuditSink>,
    pub settings: Arc<dyn SettingsStore>,
    pub rate_limiter: Option<RateLimiter>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(parts: AppStateConfig) -> Self {
        let AppStateConfig {
            config,
            identity,
            admins,
            attempts,
            audit,
            settings,
            rate_limiter,
            clock,
        } = parts;

        let verifier = CredentialVerifier::new(
            identity,
            Duration::from_millis(config.identity_timeout_ms),
        );
        let resolver = ProfileResolver::new(admins.clone(), clock.clone());
        let totp = TotpEngine::new(
            config.totp_issuer.clone(),
            config.totp_skew_steps,
            clock.clone(),
        );
        let tracker = AttemptTracker::new(attempts, config.lockout_policy(), clock.clone());
        let sessions = SessionVerifications::new(
            chrono::Duration::seconds(config.two_fa_session_ttl_secs),
            clock.clone(),
        );
        let settings = SettingsCache::new(
            settings,
            chrono::Duration::seconds(config.settings_cache_ttl_secs),
            clock.clone(),
        );

        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            resolver: Arc::new(resolver),
            admins,
            totp: Arc::new(totp),
            attempts: Arc::new(tracker),
            sessions: Arc::new(sessions),
            audit: AuditLogger::new(audit.clone()),
            audit_log: audit,
            settings: Arc::new(settings),
            rate_limiter,
            clock,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Public platform status
        .route("/api/status", get(platform_status))
        // Admin auth and 2FA
        .merge(auth::router(&state))
        // Back office
        .merge(admin::router(&state))
        // General tier on every request
        .layer(from_fn_with_state(state.clone(), rate_limit_by_ip))
        .layer(from_fn_with_state(state.clone(), maintenance_gate))
        .layer(from_fn_with_state(state.clone(), capture_client_info))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        // State
        .with_state(state)
}

pub(crate) fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "Internal server error",
            "code": "INTERNAL_ERROR",
        })),
    )
        .into_response()
}

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Whether rate limiting is enabled
    rate_limiting: bool,
}

/// Health check endpoint. Never maintenance-gated.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rate_limiting: state.rate_limiter.is_some(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: &'static str,
    site_name: String,
}

/// Public status endpoint, behind the maintenance gate.
async fn platform_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let site_name = state
        .settings
        .get_string(SITE_NAME)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string());

    Json(StatusResponse {
        status: "ok",
        site_name,
    })
}
