//! Rate limiting types.

/// Endpoint classes, each with its own window and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitCategory {
    /// Every request
    General,
    /// Privileged back-office operations
    AdminOperation,
    /// Admin profile and 2FA status checks
    AdminVerification,
    /// Admin login verification
    Login,
    /// 2FA setup and code submission
    TwoFactor,
}

impl RateLimitCategory {
    /// Returns the string identifier for this category (used in keys).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::AdminOperation => "admin_op",
            Self::AdminVerification => "admin_verify",
            Self::Login => "login",
            Self::TwoFactor => "two_factor",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::General,
            Self::AdminOperation,
            Self::AdminVerification,
            Self::Login,
            Self::TwoFactor,
        ]
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Maximum requests allowed in the window
    pub limit: u32,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Unix timestamp when the window resets
    pub reset_at: u64,
    /// Seconds to wait before retrying (0 if allowed)
    pub retry_after: u64,
}

impl RateLimitResult {
    pub(crate) const fn unlimited() -> Self {
        Self {
            allowed: true,
            limit: 0,
            remaining: 0,
            reset_at: 0,
            retry_after: 0,
        }
    }
}
