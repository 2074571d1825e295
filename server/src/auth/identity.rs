//! Identity Service Client
//!
//! Bearer tokens are issued and validated by an external identity service.
//! This module only asks it "who is this token?".

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Identity-service principal behind a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

/// Identity service errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The service rejected the token.
    #[error("Token rejected by identity service")]
    Rejected,

    /// Transport or decoding failure.
    #[error("Identity service request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Validates bearer tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn lookup(&self, token: &str) -> Result<Principal, IdentityError>;
}

/// HTTP identity provider: `GET {base}/auth/v1/user`.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn lookup(&self, token: &str) -> Result<Principal, IdentityError> {
        let mut request = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "Identity service rejected token");
            return Err(IdentityError::Rejected);
        }

        Ok(response.json::<Principal>().await?)
    }
}

/// Credential verifier with a bounded call into the identity service.
///
/// "No principal" and "service error" look the same to callers.
pub struct CredentialVerifier {
    provider: std::sync::Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl CredentialVerifier {
    pub fn new(provider: std::sync::Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Resolve a bearer token to a principal, or `None`.
    pub async fn verify(&self, token: &str) -> Option<Principal> {
        if token.is_empty() {
            return None;
        }

        match tokio::time::timeout(self.timeout, self.provider.lookup(token)).await {
            Ok(Ok(principal)) => Some(principal),
            Ok(Err(IdentityError::Rejected)) => None,
            Ok(Err(e)) => {
                warn!(error = %e, "Identity service call failed");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Identity service call timed out"
                );
                None
            }
        }
    }
}

/// Outcome of reading the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerToken<'a> {
    Missing,
    Malformed,
    Present(&'a str),
}

/// Extract a bearer token from request headers without calling anything.
pub fn extract_bearer_token(headers: &HeaderMap) -> BearerToken<'_> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return BearerToken::Missing;
    };

    match value
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
    {
        Some(token) if !token.is_empty() => BearerToken::Present(token),
        _ => BearerToken::Malformed,
    }
}
