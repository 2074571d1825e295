//! Rate limiting constants.

/// IPv6 prefix segments for rate limiting (uses /64)
pub const IPV6_PREFIX_SEGMENTS: usize = 4;

/// Lua script return codes
pub const SCRIPT_ALLOWED: i64 = 1;

/// How often the in-memory backend sweeps expired windows, in seconds
pub const MEMORY_SWEEP_INTERVAL_SECS: u64 = 60;
