//! Failed 2FA attempt lockout tracker.
//!
//! Each login-time code submission goes through [`AttemptTracker::begin`]
//! before the code is checked, then either [`AttemptTracker::reset_attempts`]
//! or [`AttemptTracker::record_failure`]. All counter mutations are single
//! atomic store operations.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::AttemptStore;

/// Lockout thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures accumulate while the gap between attempts stays within this.
    pub window: Duration,
    /// Failures within the window that trigger a lock.
    pub max_attempts: u32,
    /// Lock length.
    pub lockout: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            window: Duration::minutes(10),
            max_attempts: 3,
            lockout: Duration::minutes(10),
        }
    }
}

/// Whether a submission may be checked at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptGate {
    /// A lock is in force.
    Locked { retry_after: u64 },
    /// Check the code. `already_counted` is set when the window was reset
    /// and this attempt already holds count 1.
    Open { already_counted: bool },
}

/// Result of counting a failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// This failure triggered a lock.
    Locked { retry_after: u64 },
    /// Attempts left before a lock.
    Remaining(u32),
}

/// Per-admin failure counter over an [`AttemptStore`].
pub struct AttemptTracker {
    store: Arc<dyn AttemptStore>,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
}

fn seconds_until(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    // Round up so a live lock never reports zero.
    let millis = (until - now).num_milliseconds().max(0);
    u64::try_from(millis).unwrap_or_default().div_ceil(1000).max(1)
}

impl AttemptTracker {
    pub fn new(store: Arc<dyn AttemptStore>, policy: LockoutPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    pub const fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Apply the window reset and report whether a lock is in force.
    ///
    /// Store failures are treated as "not locked".
    #[tracing::instrument(skip(self))]
    pub async fn begin(&self, admin_id: Uuid) -> AttemptGate {
        let now = self.clock.now();
        match self.store.begin_attempt(admin_id, now, &self.policy).await {
            Ok(start) => {
                if start.window_reset {
                    info!(admin_id = %admin_id, "2FA attempt window expired, counter reset");
                }
                match start.record {
                    Some(record) if record.is_locked(now) => AttemptGate::Locked {
                        retry_after: record
                            .locked_until
                            .map_or(1, |until| seconds_until(until, now)),
                    },
                    _ => AttemptGate::Open {
                        already_counted: start.window_reset,
                    },
                }
            }
            Err(e) => {
                warn!(admin_id = %admin_id, error = %e, "Lockout lookup failed, treating as not locked");
                AttemptGate::Open {
                    already_counted: false,
                }
            }
        }
    }

    /// Count a failed submission and report what the caller should answer.
    #[tracing::instrument(skip(self))]
    pub async fn record_failure(&self, admin_id: Uuid, already_counted: bool) -> FailureOutcome {
        let now = self.clock.now();
        match self
            .store
            .register_failure(admin_id, now, &self.policy, already_counted)
            .await
        {
            Ok(record) => {
                let count = u32::try_from(record.attempt_count).unwrap_or_default();
                match record.locked_until {
                    Some(until) if until > now && count >= self.policy.max_attempts => {
                        FailureOutcome::Locked {
                            retry_after: seconds_until(until, now),
                        }
                    }
                    _ => FailureOutcome::Remaining(self.policy.max_attempts.saturating_sub(count)),
                }
            }
            Err(e) => {
                warn!(admin_id = %admin_id, error = %e, "Failed to record 2FA failure");
                FailureOutcome::Remaining(self.policy.max_attempts.saturating_sub(1))
            }
        }
    }

    /// Zero the counter after a successful check.
    pub async fn reset_attempts(&self, admin_id: Uuid) {
        if let Err(e) = self.store.reset(admin_id).await {
            warn!(admin_id = %admin_id, error = %e, "Failed to reset 2FA attempts");
        }
    }
}
