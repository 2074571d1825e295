//! Core rate limiter service.
//!
//! Fixed-window counters, kept in process memory by default or in Redis
//! when one is configured.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use fred::prelude::*;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::ratelimit::{
    LimitConfig, RateLimitCategory, RateLimitConfig, RateLimitError, RateLimitResult,
    MEMORY_SWEEP_INTERVAL_SECS, SCRIPT_ALLOWED,
};

/// Embedded Lua script for atomic rate limit check and increment.
const RATE_LIMIT_SCRIPT: &str = include_str!("rate_limit.lua");

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started_at: DateTime<Utc>,
    window_secs: u64,
}

impl Window {
    fn expires_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(i64::try_from(self.window_secs).unwrap_or(i64::MAX))
    }
}

/// Process-local fixed windows.
struct MemoryWindows {
    windows: DashMap<String, Window>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
enum Backend {
    Memory(Arc<MemoryWindows>),
    Redis {
        client: Client,
        script_sha: Arc<RwLock<String>>,
    },
}

/// Rate limiter shared by every request.
#[derive(Clone)]
pub struct RateLimiter {
    backend: Backend,
    config: Arc<RateLimitConfig>,
}

impl RateLimiter {
    /// Creates an in-process rate limiter.
    pub fn in_memory(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryWindows {
                windows: DashMap::new(),
                clock,
            })),
            config: Arc::new(config),
        }
    }

    /// Creates a Redis-backed rate limiter.
    ///
    /// Call `init()` after creation to load the Lua script into Redis.
    pub fn redis(client: Client, config: RateLimitConfig) -> Self {
        Self {
            backend: Backend::Redis {
                client,
                script_sha: Arc::new(RwLock::new(String::new())),
            },
            config: Arc::new(config),
        }
    }

    /// Loads the Lua script when backed by Redis. No-op in memory.
    pub async fn init(&self) -> Result<(), Error> {
        if let Backend::Redis { client, script_sha } = &self.backend {
            Self::load_script(client, script_sha).await?;
        }
        Ok(())
    }

    /// Loads or reloads the Lua script into Redis.
    ///
    /// Called during init and when NOSCRIPT errors are encountered.
    async fn load_script(client: &Client, script_sha: &RwLock<String>) -> Result<(), Error> {
        let sha: String = client.script_load(RATE_LIMIT_SCRIPT).await?;
        info!(rate_limit_sha = %sha, "Lua script loaded into Redis");
        *script_sha.write().await = sha;
        Ok(())
    }

    /// Checks if an error is a NOSCRIPT error (script not found in Redis).
    fn is_noscript_error(error: &Error) -> bool {
        error.to_string().contains("NOSCRIPT")
    }

    /// Name of the active backend.
    pub const fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Redis { .. } => "redis",
        }
    }

    /// Returns the configuration for this rate limiter.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Checks if the identifier is in the allowlist configuration.
    pub fn is_allowed_by_config(&self, identifier: &str) -> bool {
        self.config.allowlist.contains(identifier)
    }

    /// Checks and increments the rate limit for a given category and identifier.
    ///
    /// # Errors
    /// Returns `RateLimitError::RedisUnavailable` if Redis is unreachable.
    #[tracing::instrument(skip(self), fields(category = %category.as_str()))]
    pub async fn check(
        &self,
        category: RateLimitCategory,
        identifier: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        if !self.config.is_enforced(category) {
            return Ok(RateLimitResult::unlimited());
        }

        if self.is_allowed_by_config(identifier) {
            debug!(ip = %identifier, "IP in allowlist, bypassing rate limit");
            return Ok(RateLimitResult::unlimited());
        }

        let limit_config = *self.config.limits.for_category(category);
        let key = self.build_key(category.as_str(), identifier);

        match &self.backend {
            Backend::Memory(memory) => Ok(memory.hit(&key, limit_config)),
            Backend::Redis { client, script_sha } => {
                let result = Self::execute_script(client, script_sha, &key, limit_config).await?;
                Ok(Self::result_from_script(&result, limit_config))
            }
        }
    }

    fn result_from_script(result: &[i64], limit_config: LimitConfig) -> RateLimitResult {
        let count = result.first().copied().unwrap_or_default();
        let allowed = result.get(1).copied() == Some(SCRIPT_ALLOWED);
        let ttl = u64::try_from(result.get(2).copied().unwrap_or_default()).unwrap_or_default();

        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let count = u32::try_from(count).unwrap_or(u32::MAX);

        RateLimitResult {
            allowed,
            limit: limit_config.requests,
            remaining: if allowed {
                limit_config.requests.saturating_sub(count)
            } else {
                0
            },
            reset_at: now + ttl,
            retry_after: if allowed { 0 } else { ttl.max(1) },
        }
    }

    /// Executes the rate limit Lua script with NOSCRIPT retry.
    async fn execute_script(
        client: &Client,
        script_sha: &RwLock<String>,
        key: &str,
        limit_config: LimitConfig,
    ) -> Result<Vec<i64>, RateLimitError> {
        let args = vec![
            limit_config.window_secs.to_string(),
            limit_config.requests.to_string(),
        ];
        let sha = script_sha.read().await.clone();

        let result: Result<Vec<i64>, _> = client.evalsha(&sha, vec![key], args.clone()).await;

        match result {
            Ok(r) => Ok(r),
            Err(e) if Self::is_noscript_error(&e) => {
                warn!("NOSCRIPT error, reloading Lua script");
                Self::load_script(client, script_sha).await.map_err(|e| {
                    warn!(error = %e, "Failed to reload script");
                    RateLimitError::RedisUnavailable
                })?;

                // Retry with new SHA
                let new_sha = script_sha.read().await.clone();
                client
                    .evalsha(&new_sha, vec![key], args)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "Redis rate limit check failed after reload");
                        RateLimitError::RedisUnavailable
                    })
            }
            Err(e) => {
                warn!(error = %e, "Redis rate limit check failed");
                Err(RateLimitError::RedisUnavailable)
            }
        }
    }

    /// Drops expired in-memory windows. No-op for Redis, where keys expire.
    pub fn purge_expired(&self) {
        if let Backend::Memory(memory) = &self.backend {
            let now = memory.clock.now();
            memory.windows.retain(|_, w| w.expires_at() > now);
        }
    }

    /// Periodically purge expired in-memory windows.
    pub fn spawn_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !matches!(self.backend, Backend::Memory(_)) {
            return None;
        }

        let limiter = self.clone();
        Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(StdDuration::from_secs(MEMORY_SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                limiter.purge_expired();
            }
        }))
    }

    /// Builds a key with the configured prefix.
    fn build_key(&self, category: &str, identifier: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, category, identifier)
    }
}

impl MemoryWindows {
    fn hit(&self, key: &str, limit_config: LimitConfig) -> RateLimitResult {
        let now = self.clock.now();
        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started_at: now,
            window_secs: limit_config.window_secs,
        });

        if window.expires_at() <= now {
            window.count = 0;
            window.started_at = now;
        }
        window.count = window.count.saturating_add(1);

        let expires_at = window.expires_at();
        let allowed = window.count <= limit_config.requests;
        let remaining = limit_config.requests.saturating_sub(window.count);
        drop(window);

        let ttl_ms = u64::try_from((expires_at - now).num_milliseconds()).unwrap_or_default();
        let ttl = ttl_ms.div_ceil(1000);

        RateLimitResult {
            allowed,
            limit: limit_config.requests,
            remaining: if allowed { remaining } else { 0 },
            reset_at: u64::try_from(expires_at.timestamp()).unwrap_or_default(),
            retry_after: if allowed { 0 } else { ttl.max(1) },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::clock::ManualClock;

    fn mock_config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            key_prefix: "test:rl".to_string(),
            fail_open: true,
            allowlist: HashSet::from(["127.0.0.1".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_key() {
        let limiter = RateLimiter::in_memory(mock_config(), Arc::new(ManualClock::default()));

        let key = limiter.build_key("login", "192.168.1.1");
        assert_eq!(key, "test:rl:login:192.168.1.1");
    }

    #[test]
    fn test_is_allowed_by_config() {
        let limiter = RateLimiter::in_memory(mock_config(), Arc::new(ManualClock::default()));

        assert!(limiter.is_allowed_by_config("127.0.0.1"));
        assert!(!limiter.is_allowed_by_config("192.168.1.1"));
    }

    #[tokio::test]
    async fn test_memory_fixed_window() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::in_memory(mock_config(), clock.clone());

        for i in 0..5 {
            let result = limiter.check(RateLimitCategory::Login, "10.0.0.1").await.unwrap();
            assert!(result.allowed, "attempt {i}");
            assert_eq!(result.remaining, 4 - i);
        }

        let denied = limiter.check(RateLimitCategory::Login, "10.0.0.1").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, 900);

        // Other identifiers and categories are independent
        assert!(limiter.check(RateLimitCategory::Login, "10.0.0.2").await.unwrap().allowed);
        assert!(limiter.check(RateLimitCategory::TwoFactor, "10.0.0.1").await.unwrap().allowed);

        clock.advance(Duration::seconds(900));
        assert!(limiter.check(RateLimitCategory::Login, "10.0.0.1").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_allowlist_and_disabled_tier_bypass() {
        let config = RateLimitConfig {
            admin_verification_enabled: false,
            limits: crate::ratelimit::RateLimits {
                admin_verification: LimitConfig { requests: 1, window_secs: 60 },
                login: LimitConfig { requests: 1, window_secs: 60 },
                ..Default::default()
            },
            ..mock_config()
        };
        let limiter = RateLimiter::in_memory(config, Arc::new(ManualClock::default()));

        for _ in 0..3 {
            assert!(limiter.check(RateLimitCategory::Login, "127.0.0.1").await.unwrap().allowed);
            assert!(limiter
                .check(RateLimitCategory::AdminVerification, "10.0.0.9")
                .await
                .unwrap()
                .allowed);
        }
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::in_memory(mock_config(), clock.clone());

        limiter.check(RateLimitCategory::AdminOperation, "10.0.0.1").await.unwrap();
        limiter.check(RateLimitCategory::General, "10.0.0.1").await.unwrap();

        clock.advance(Duration::seconds(61));
        limiter.purge_expired();

        let Backend::Memory(memory) = &limiter.backend else {
            panic!("expected memory backend");
        };
        assert_eq!(memory.windows.len(), 1);
    }

    #[test]
    fn test_result_from_script() {
        let limit = LimitConfig { requests: 5, window_secs: 900 };

        let allowed = RateLimiter::result_from_script(&[2, 1, 880], limit);
        assert!(allowed.allowed);
        assert_eq!(allowed.remaining, 3);
        assert_eq!(allowed.retry_after, 0);

        let denied = RateLimiter::result_from_script(&[6, 0, 42], limit);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, 42);
    }
}
