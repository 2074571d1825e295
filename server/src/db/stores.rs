//! Store traits.
//!
//! The persistent data store is an external collaborator; these traits are
//! the only surface the auth chain depends on. [`super::PgStore`] backs them
//! in production and [`super::memory::MemoryStore`] in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::models::{
    AdminProfile, AuditLogEntry, NewAuditEntry, SettingRecord, TwoFaAttemptRecord,
};
use crate::auth::LockoutPolicy;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped to its model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Backend unreachable or refusing work.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of opening a 2FA attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptStart {
    /// Record after the window check, `None` if the admin never failed.
    pub record: Option<TwoFaAttemptRecord>,
    /// The stale window was reset and this attempt is already counted as 1.
    pub window_reset: bool,
}

/// Audit log listing filter.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub limit: i64,
    pub offset: i64,
    /// Only entries whose action starts with this prefix.
    pub action_prefix: Option<String>,
}

/// Admin profile persistence.
#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn find_by_principal(&self, principal_id: &str) -> StoreResult<Option<AdminProfile>>;

    /// Clear a pending force-logout marker.
    async fn clear_force_logout(&self, admin_id: Uuid) -> StoreResult<()>;

    /// Set the force-logout marker. Returns `false` if the admin does not exist.
    async fn set_force_logout(&self, admin_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Persist a confirmed TOTP secret and flip 2FA on.
    async fn enable_two_fa(
        &self,
        admin_id: Uuid,
        secret: &str,
        verified_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Clear the TOTP secret and 2FA flags.
    async fn disable_two_fa(&self, admin_id: Uuid) -> StoreResult<()>;

    async fn record_login(&self, admin_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Failed 2FA attempt counters. Every mutation is a single atomic operation.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Load the record and, if the gap since the last attempt exceeds the
    /// policy window, reset it to count 1 with no lock.
    async fn begin_attempt(
        &self,
        admin_id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> StoreResult<AttemptStart>;

    /// Count a failed attempt and apply the lockout threshold.
    ///
    /// `already_counted` is true when `begin_attempt` reset the window for
    /// this same attempt.
    async fn register_failure(
        &self,
        admin_id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
        already_counted: bool,
    ) -> StoreResult<TwoFaAttemptRecord>;

    /// Zero the counter and clear any lock.
    async fn reset(&self, admin_id: Uuid) -> StoreResult<()>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn insert(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry>;

    /// Newest first, with the total count matching the filter.
    async fn list(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditLogEntry>, i64)>;
}

/// Key/value platform settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_all(&self) -> StoreResult<Vec<SettingRecord>>;

    async fn upsert(&self, record: &SettingRecord, updated_by: Uuid) -> StoreResult<()>;
}
