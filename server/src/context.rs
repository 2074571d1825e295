//! Request context.
//!
//! Each middleware stage adds one immutable value to the request
//! extensions; later stages and handlers only read them.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};

use crate::api::AppState;
use crate::auth::Principal;
use crate::db::AdminProfile;
use crate::ratelimit::{extract_client_ip, normalize_ip};

/// Who is calling, as far as the transport can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Resolved client address.
    pub ip: String,
    /// Rate-limit key for the address (IPv6 collapsed to /64).
    pub normalized_ip: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_request(request: &Request, trust_proxy: bool) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0);
        let ip = extract_client_ip(request.headers(), peer, trust_proxy);

        Self {
            ip: ip.to_string(),
            normalized_ip: normalize_ip(ip),
            user_agent: request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.chars().take(512).collect()),
        }
    }
}

/// Authenticated admin for the current request.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub client: ClientInfo,
    pub principal: Principal,
    pub profile: AdminProfile,
    /// Fingerprint of the bearer token; keys the 2FA session flag.
    pub session_key: String,
    /// When this session passed the second factor, if it has.
    pub verified_2fa_at: Option<DateTime<Utc>>,
}

impl AdminContext {
    /// Label stored on audit entries.
    pub fn actor_label(&self) -> String {
        format!("{} ({})", self.profile.email, self.profile.role)
    }
}

/// Outermost middleware: attach [`ClientInfo`] to every request.
pub async fn capture_client_info(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let client = ClientInfo::from_request(&request, state.config.trust_proxy);
    request.extensions_mut().insert(client);
    next.run(request).await
}
