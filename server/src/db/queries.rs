//! Database Queries

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{
    AdminProfileRow, AuditLogRow, NewAuditEntry, SettingRecord, TwoFaAttemptRecord,
};
use crate::auth::LockoutPolicy;

const ADMIN_COLUMNS: &str = r"
    id, principal_id, email, role, is_active, two_fa_enabled, two_fa_secret,
    two_fa_verified_at, force_logout_at, last_login_at, created_at
";

const AUDIT_COLUMNS: &str = r"
    id, admin_id, action, resource_type, outcome, resource_id, metadata,
    ip_address, user_agent, actor_label, created_at
";

// ============================================================================
// Admin profiles
// ============================================================================

/// Find an admin profile by identity-service principal ID.
pub async fn find_admin_by_principal(
    pool: &PgPool,
    principal_id: &str,
) -> sqlx::Result<Option<AdminProfileRow>> {
    sqlx::query_as::<_, AdminProfileRow>(&format!(
        "SELECT {ADMIN_COLUMNS} FROM admin_profiles WHERE principal_id = $1"
    ))
    .bind(principal_id)
    .fetch_optional(pool)
    .await
}

/// Clear a force-logout marker.
pub async fn clear_force_logout(pool: &PgPool, admin_id: Uuid) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE admin_profiles SET force_logout_at = NULL, updated_at = NOW() WHERE id = $1",
    )
    .bind(admin_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Set the force-logout marker. Returns whether a row was updated.
pub async fn set_force_logout(
    pool: &PgPool,
    admin_id: Uuid,
    at: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE admin_profiles SET force_logout_at = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(admin_id)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Store a confirmed TOTP secret and enable 2FA.
pub async fn enable_two_fa(
    pool: &PgPool,
    admin_id: Uuid,
    secret: &str,
    verified_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        UPDATE admin_profiles
        SET two_fa_secret = $2,
            two_fa_enabled = TRUE,
            two_fa_verified_at = $3,
            updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(admin_id)
    .bind(secret)
    .bind(verified_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Clear TOTP secret and 2FA flags.
pub async fn disable_two_fa(pool: &PgPool, admin_id: Uuid) -> sqlx::Result<()> {
    sqlx::query(
        r"
        UPDATE admin_profiles
        SET two_fa_secret = NULL,
            two_fa_enabled = FALSE,
            two_fa_verified_at = NULL,
            updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(admin_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stamp the last successful login.
pub async fn record_login(pool: &PgPool, admin_id: Uuid, at: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query("UPDATE admin_profiles SET last_login_at = $2 WHERE id = $1")
        .bind(admin_id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

// ============================================================================
// 2FA attempts
// ============================================================================

/// Reset a stale attempt window in place. Returns the record only if it was reset.
pub async fn reset_stale_attempt_window(
    pool: &PgPool,
    admin_id: Uuid,
    now: DateTime<Utc>,
    policy: &LockoutPolicy,
) -> sqlx::Result<Option<TwoFaAttemptRecord>> {
    sqlx::query_as::<_, TwoFaAttemptRecord>(
        r"
        UPDATE two_fa_attempts
        SET attempt_count = 1,
            last_attempt_at = $2,
            locked_until = NULL
        WHERE admin_id = $1 AND last_attempt_at < $3
        RETURNING admin_id, attempt_count, last_attempt_at, locked_until
        ",
    )
    .bind(admin_id)
    .bind(now)
    .bind(now - policy.window)
    .fetch_optional(pool)
    .await
}

/// Load the attempt record for an admin.
pub async fn get_attempt_record(
    pool: &PgPool,
    admin_id: Uuid,
) -> sqlx::Result<Option<TwoFaAttemptRecord>> {
    sqlx::query_as::<_, TwoFaAttemptRecord>(
        r"
        SELECT admin_id, attempt_count, last_attempt_at, locked_until
        FROM two_fa_attempts
        WHERE admin_id = $1
        ",
    )
    .bind(admin_id)
    .fetch_optional(pool)
    .await
}

/// Atomically count a failed attempt and apply the lockout threshold.
pub async fn register_attempt_failure(
    pool: &PgPool,
    admin_id: Uuid,
    now: DateTime<Utc>,
    policy: &LockoutPolicy,
    already_counted: bool,
) -> sqlx::Result<TwoFaAttemptRecord> {
    sqlx::query_as::<_, TwoFaAttemptRecord>(
        r"
        INSERT INTO two_fa_attempts AS a (admin_id, attempt_count, last_attempt_at, locked_until)
        VALUES ($1, 1, $2, CASE WHEN 1 >= $4 THEN $5 ELSE NULL END)
        ON CONFLICT (admin_id) DO UPDATE SET
            attempt_count = CASE
                WHEN a.last_attempt_at < $3 THEN 1
                WHEN $6 THEN a.attempt_count
                ELSE a.attempt_count + 1
            END,
            last_attempt_at = $2,
            locked_until = CASE
                WHEN (CASE
                    WHEN a.last_attempt_at < $3 THEN 1
                    WHEN $6 THEN a.attempt_count
                    ELSE a.attempt_count + 1
                END) >= $4 THEN $5
                WHEN a.last_attempt_at < $3 THEN NULL
                ELSE a.locked_until
            END
        RETURNING admin_id, attempt_count, last_attempt_at, locked_until
        ",
    )
    .bind(admin_id)
    .bind(now)
    .bind(now - policy.window)
    .bind(i32::try_from(policy.max_attempts).unwrap_or(i32::MAX))
    .bind(now + policy.lockout)
    .bind(already_counted)
    .fetch_one(pool)
    .await
}

/// Zero the counter and clear any lock.
pub async fn reset_attempts(pool: &PgPool, admin_id: Uuid) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE two_fa_attempts SET attempt_count = 0, locked_until = NULL WHERE admin_id = $1",
    )
    .bind(admin_id)
    .execute(pool)
    .await?;
    Ok(())
}

// ============================================================================
// Audit log
// ============================================================================

/// Append an audit log entry.
pub async fn insert_audit_log(pool: &PgPool, entry: &NewAuditEntry) -> sqlx::Result<AuditLogRow> {
    sqlx::query_as::<_, AuditLogRow>(&format!(
        r"
        INSERT INTO admin_audit_logs
            (id, admin_id, action, resource_type, outcome, resource_id, metadata,
             ip_address, user_agent, actor_label)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {AUDIT_COLUMNS}
        "
    ))
    .bind(Uuid::now_v7())
    .bind(entry.admin_id)
    .bind(&entry.action)
    .bind(&entry.resource_type)
    .bind(entry.outcome.as_str())
    .bind(&entry.resource_id)
    .bind(&entry.metadata)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(&entry.actor_label)
    .fetch_one(pool)
    .await
}

/// Get audit log entries, newest first, with an optional action prefix filter.
pub async fn list_audit_logs(
    pool: &PgPool,
    limit: i64,
    offset: i64,
    action_prefix: Option<&str>,
) -> sqlx::Result<Vec<AuditLogRow>> {
    sqlx::query_as::<_, AuditLogRow>(&format!(
        r"
        SELECT {AUDIT_COLUMNS}
        FROM admin_audit_logs
        WHERE ($1::text IS NULL OR left(action, length($1)) = $1)
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "
    ))
    .bind(action_prefix)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Count audit log entries matching an optional action prefix.
pub async fn count_audit_logs(pool: &PgPool, action_prefix: Option<&str>) -> sqlx::Result<i64> {
    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM admin_audit_logs WHERE ($1::text IS NULL OR left(action, length($1)) = $1)",
    )
    .bind(action_prefix)
    .fetch_one(pool)
    .await?;
    Ok(total.0)
}

// ============================================================================
// Platform settings
// ============================================================================

/// Load every platform setting.
pub async fn load_settings(pool: &PgPool) -> sqlx::Result<Vec<SettingRecord>> {
    sqlx::query_as::<_, SettingRecord>(
        "SELECT key, value, value_type FROM platform_settings ORDER BY key",
    )
    .fetch_all(pool)
    .await
}

/// Insert or update a platform setting.
pub async fn upsert_setting(
    pool: &PgPool,
    record: &SettingRecord,
    updated_by: Uuid,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO platform_settings (key, value, value_type, updated_by, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (key) DO UPDATE SET
            value = EXCLUDED.value,
            value_type = EXCLUDED.value_type,
            updated_by = EXCLUDED.updated_by,
            updated_at = NOW()
        ",
    )
    .bind(&record.key)
    .bind(&record.value)
    .bind(&record.value_type)
    .bind(updated_by)
    .execute(pool)
    .await?;
    Ok(())
}
