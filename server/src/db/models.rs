//! Database Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::Role;

/// Privileged admin profile, resolved fresh on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminProfile {
    pub id: Uuid,
    pub principal_id: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub two_fa_enabled: bool,
    pub two_fa_secret: Option<String>,
    pub two_fa_verified_at: Option<DateTime<Utc>>,
    pub force_logout_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Raw `admin_profiles` row. The role column is free text in the schema.
#[derive(Debug, Clone, FromRow)]
pub struct AdminProfileRow {
    pub id: Uuid,
    pub principal_id: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub two_fa_enabled: bool,
    pub two_fa_secret: Option<String>,
    pub two_fa_verified_at: Option<DateTime<Utc>>,
    pub force_logout_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AdminProfileRow> for AdminProfile {
    type Error = String;

    fn try_from(row: AdminProfileRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| format!("unknown admin role '{}'", row.role))?;

        Ok(Self {
            id: row.id,
            principal_id: row.principal_id,
            email: row.email,
            role,
            is_active: row.is_active,
            two_fa_enabled: row.two_fa_enabled,
            two_fa_secret: row.two_fa_secret,
            two_fa_verified_at: row.two_fa_verified_at,
            force_logout_at: row.force_logout_at,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
        })
    }
}

/// Per-admin failed 2FA attempt counter.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TwoFaAttemptRecord {
    pub admin_id: Uuid,
    pub attempt_count: i32,
    pub last_attempt_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl TwoFaAttemptRecord {
    /// Whether a lockout is in force at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Whether the gap since the last attempt exceeds `window`.
    pub fn window_expired(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.last_attempt_at > window
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Audit entry about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub admin_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub outcome: AuditOutcome,
    pub resource_id: Option<String>,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub actor_label: Option<String>,
}

/// Persisted audit log entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub outcome: AuditOutcome,
    pub resource_id: Option<String>,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub actor_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn from_new(entry: NewAuditEntry, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            admin_id: entry.admin_id,
            action: entry.action,
            resource_type: entry.resource_type,
            outcome: entry.outcome,
            resource_id: entry.resource_id,
            metadata: entry.metadata,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            actor_label: entry.actor_label,
            created_at,
        }
    }
}

/// Raw `admin_audit_logs` row.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub outcome: String,
    pub resource_id: Option<String>,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub actor_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogRow> for AuditLogEntry {
    fn from(row: AuditLogRow) -> Self {
        let outcome = if row.outcome == "success" {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        Self {
            id: row.id,
            admin_id: row.admin_id,
            action: row.action,
            resource_type: row.resource_type,
            outcome,
            resource_id: row.resource_id,
            metadata: row.metadata,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            actor_label: row.actor_label,
            created_at: row.created_at,
        }
    }
}

/// Raw key/value setting as stored.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SettingRecord {
    pub key: String,
    pub value: String,
    pub value_type: String,
}
