//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full axum
//! router. Collaborators are swapped for in-process fakes: an in-memory store,
//! a static identity provider and a manually driven clock.
//!
//! ## Shared Resources
//!
//! Use [`shared_pool()`] for the `#[ignore]` Postgres-backed tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use lf_admin_server::api::{create_router, AppState, AppStateConfig};
use lf_admin_server::auth::{IdentityError, IdentityProvider, Principal};
use lf_admin_server::clock::{Clock, ManualClock};
use lf_admin_server::config::Config;
use lf_admin_server::db::memory::{AdminSeed, MemoryStore};
use lf_admin_server::db::{self, AdminProfile, AuditLogEntry};
use lf_admin_server::ratelimit::{RateLimitConfig, RateLimiter};
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tower::ServiceExt;

/// Forwarded client address used by [`TestApp::send`].
pub const CLIENT_IP: &str = "198.51.100.7";

/// Valid 160-bit base32 TOTP secret.
pub const TEST_SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";

// ============================================================================
// Shared resources
// ============================================================================

static SHARED_POOL: OnceCell<PgPool> = OnceCell::const_new();

/// Get or create a shared, migrated database pool.
pub async fn shared_pool() -> &'static PgPool {
    SHARED_POOL
        .get_or_init(|| async {
            let config = Config::default_for_test();
            let url = std::env::var("DATABASE_URL").unwrap_or(config.database_url);
            let pool = db::create_pool(&url)
                .await
                .expect("Failed to connect to test DB");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run migrations");
            pool
        })
        .await
}

// ============================================================================
// Fakes
// ============================================================================

/// Identity provider that accepts a fixed set of tokens.
#[derive(Default)]
pub struct StaticIdentity {
    tokens: RwLock<HashMap<String, Principal>>,
}

impl StaticIdentity {
    pub fn issue(&self, token: &str, principal: Principal) {
        self.tokens
            .write()
            .unwrap()
            .insert(token.to_string(), principal);
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn lookup(&self, token: &str) -> Result<Principal, IdentityError> {
        self.tokens
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(IdentityError::Rejected)
    }
}

// ============================================================================
// TestApp
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub identity: Arc<StaticIdentity>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    /// App without rate limiting.
    pub fn new() -> Self {
        Self::build(Config::default_for_test(), None)
    }

    /// App with an in-memory rate limiter using `rl_config`.
    pub fn with_rate_limits(rl_config: RateLimitConfig) -> Self {
        Self::build(Config::default_for_test(), Some(rl_config))
    }

    fn build(config: Config, rl_config: Option<RateLimitConfig>) -> Self {
        let store = Arc::new(MemoryStore::with_default_settings());
        let identity = Arc::new(StaticIdentity::default());
        let clock = Arc::new(ManualClock::default());
        let rate_limiter = rl_config.map(|c| RateLimiter::in_memory(c, clock.clone()));

        let state = AppState::new(AppStateConfig {
            config,
            identity: identity.clone(),
            admins: store.clone(),
            attempts: store.clone(),
            audit: store.clone(),
            settings: store.clone(),
            rate_limiter,
            clock: clock.clone(),
        });
        let router = create_router(state.clone());

        Self {
            router,
            state,
            store,
            identity,
            clock,
        }
    }

    /// Insert an admin and issue a bearer token for it.
    pub fn admin(&self, seed: AdminSeed) -> (AdminProfile, String) {
        let profile = self.store.insert_admin(seed);
        let token = self.sign_in(&profile);
        (profile, token)
    }

    /// Issue a fresh bearer token for an existing admin.
    pub fn sign_in(&self, profile: &AdminProfile) -> String {
        let token = format!("tok-{}", uuid::Uuid::now_v7());
        self.identity.issue(
            &token,
            Principal {
                id: profile.principal_id.clone(),
                email: profile.email.clone(),
            },
        );
        token
    }

    /// Current TOTP code for `secret` at the app clock.
    pub fn totp_code(&self, secret: &str) -> String {
        let now = u64::try_from(self.clock.now().timestamp()).unwrap();
        self.state.totp.generate_at(secret, now).unwrap()
    }

    /// A six-digit code that does not pass for `secret` at the app clock.
    pub fn wrong_code(&self, secret: &str) -> String {
        (0..1_000_000)
            .map(|n| format!("{n:06}"))
            .find(|code| !self.state.totp.check(secret, code))
            .unwrap()
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// Send a JSON request with an optional bearer token.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        self.send_from(CLIENT_IP, method, uri, token, body).await
    }

    /// Like [`send`](Self::send), from a given forwarded client address.
    pub async fn send_from(
        &self,
        ip: &str,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Self::request(method, uri).header("x-forwarded-for", ip);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        self.oneshot(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: serde_json::Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Wait until at least `count` audit entries with `action` exist.
    pub async fn wait_for_audit(&self, action: &str, count: usize) -> Vec<AuditLogEntry> {
        for _ in 0..100 {
            let entries = self.audit(action);
            if entries.len() >= count {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.audit(action)
    }

    /// Audit entries with `action` written so far.
    pub fn audit(&self, action: &str) -> Vec<AuditLogEntry> {
        self.store
            .audit_entries()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

/// Read a response body as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
