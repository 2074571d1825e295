//! Rate limiting configuration.

use std::collections::HashSet;

use super::RateLimitCategory;

/// Configuration for the rate limiting system.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    /// Prefix for Redis keys (e.g., "lf:rl")
    pub key_prefix: String,
    /// Whether to allow requests when Redis is unavailable
    pub fail_open: bool,
    /// IP addresses that bypass rate limiting
    pub allowlist: HashSet<String>,
    /// Whether the admin-verification tier is enforced
    pub admin_verification_enabled: bool,
    /// Per-category rate limits
    pub limits: RateLimits,
}

/// Rate limits for each category.
#[derive(Debug, Clone)]
pub struct RateLimits {
    /// All traffic
    pub general: LimitConfig,
    /// Back-office operations
    pub admin_operation: LimitConfig,
    /// Profile and 2FA status checks
    pub admin_verification: LimitConfig,
    /// Admin login verification
    pub login: LimitConfig,
    /// 2FA submissions
    pub two_factor: LimitConfig,
}

/// Configuration for a single rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests allowed in the window
    pub requests: u32,
    /// Window duration in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "lf:rl".to_string(),
            fail_open: true,
            allowlist: HashSet::new(),
            admin_verification_enabled: true,
            limits: RateLimits::default(),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            general: LimitConfig {
                requests: 1000,
                window_secs: 900,
            },
            admin_operation: LimitConfig {
                requests: 100,
                window_secs: 60,
            },
            admin_verification: LimitConfig {
                requests: 30,
                window_secs: 60,
            },
            login: LimitConfig {
                requests: 5,
                window_secs: 900,
            },
            two_factor: LimitConfig {
                requests: 10,
                window_secs: 300,
            },
        }
    }
}

impl RateLimits {
    /// Returns the limit configuration for a given category.
    pub const fn for_category(&self, category: RateLimitCategory) -> &LimitConfig {
        match category {
            RateLimitCategory::General => &self.general,
            RateLimitCategory::AdminOperation => &self.admin_operation,
            RateLimitCategory::AdminVerification => &self.admin_verification,
            RateLimitCategory::Login => &self.login,
            RateLimitCategory::TwoFactor => &self.two_factor,
        }
    }
}

impl RateLimitConfig {
    /// Whether a category is enforced under this configuration.
    pub const fn is_enforced(&self, category: RateLimitCategory) -> bool {
        self.enabled
            && (self.admin_verification_enabled
                || !matches!(category, RateLimitCategory::AdminVerification))
    }

    /// Creates configuration from environment variables.
    ///
    /// The admin-verification tier is disabled outside production unless
    /// `RATE_LIMIT_ADMIN_VERIFICATION_ENABLED` says otherwise.
    ///
    /// Environment variables:
    /// - `RATE_LIMIT_ENABLED`: Enable/disable rate limiting (default: true)
    /// - `RATE_LIMIT_PREFIX`: Redis key prefix (default: "lf:rl")
    /// - `RATE_LIMIT_FAIL_OPEN`: Allow requests when Redis unavailable (default: true)
    /// - `RATE_LIMIT_ALLOWLIST`: Comma-separated IP allowlist
    /// - `RATE_LIMIT_GENERAL`: "requests,window_secs"
    /// - `RATE_LIMIT_ADMIN_OPERATION`: "requests,window_secs"
    /// - `RATE_LIMIT_ADMIN_VERIFICATION`: "requests,window_secs"
    /// - `RATE_LIMIT_LOGIN`: "requests,window_secs"
    /// - `RATE_LIMIT_TWO_FACTOR`: "requests,window_secs"
    pub fn from_env(production: bool) -> Self {
        let mut config = Self {
            admin_verification_enabled: production,
            ..Self::default()
        };

        if let Ok(val) = std::env::var("RATE_LIMIT_ENABLED") {
            config.enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_PREFIX") {
            config.key_prefix = val;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_FAIL_OPEN") {
            config.fail_open = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_ALLOWLIST") {
            config.allowlist = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_ADMIN_VERIFICATION_ENABLED") {
            config.admin_verification_enabled = val.parse().unwrap_or(production);
        }

        // Parse per-category limits (format: "requests,window_secs")
        let overrides = [
            ("RATE_LIMIT_GENERAL", &mut config.limits.general),
            ("RATE_LIMIT_ADMIN_OPERATION", &mut config.limits.admin_operation),
            ("RATE_LIMIT_ADMIN_VERIFICATION", &mut config.limits.admin_verification),
            ("RATE_LIMIT_LOGIN", &mut config.limits.login),
            ("RATE_LIMIT_TWO_FACTOR", &mut config.limits.two_factor),
        ];
        for (name, slot) in overrides {
            if let Some(limit) = std::env::var(name).ok().and_then(|v| parse_limit_config(&v)) {
                *slot = limit;
            }
        }

        config
    }
}

/// Parses a limit config from "requests,window_secs" format.
fn parse_limit_config(val: &str) -> Option<LimitConfig> {
    let parts: Vec<&str> = val.split(',').collect();
    if parts.len() == 2 {
        let requests = parts[0].trim().parse().ok()?;
        let window_secs = parts[1].trim().parse().ok()?;
        Some(LimitConfig { requests, window_secs })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.key_prefix, "lf:rl");
        assert!(config.fail_open);
        assert!(config.allowlist.is_empty());
    }

    #[test]
    fn test_default_tiers() {
        let limits = RateLimits::default();
        let expected = [
            (&limits.general, 1000, 900),
            (&limits.admin_operation, 100, 60),
            (&limits.admin_verification, 30, 60),
            (&limits.login, 5, 900),
            (&limits.two_factor, 10, 300),
        ];
        for (limit, requests, window_secs) in expected {
            assert_eq!(limit.requests, requests);
            assert_eq!(limit.window_secs, window_secs);
        }
    }

    #[test]
    fn test_admin_verification_toggle() {
        let config = RateLimitConfig {
            admin_verification_enabled: false,
            ..RateLimitConfig::default()
        };
        assert!(!config.is_enforced(RateLimitCategory::AdminVerification));
        assert!(config.is_enforced(RateLimitCategory::Login));

        let disabled = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        for category in RateLimitCategory::all() {
            assert!(!disabled.is_enforced(*category));
        }
    }

    #[test]
    fn test_parse_limit_config() {
        let limit = parse_limit_config("10,60").unwrap();
        assert_eq!(limit.requests, 10);
        assert_eq!(limit.window_secs, 60);

        // With whitespace
        let limit = parse_limit_config(" 20 , 120 ").unwrap();
        assert_eq!(limit.requests, 20);
        assert_eq!(limit.window_secs, 120);

        // Invalid formats
        assert!(parse_limit_config("10").is_none());
        assert!(parse_limit_config("10,60,extra").is_none());
        assert!(parse_limit_config("abc,60").is_none());
    }
}
