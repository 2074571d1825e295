//! Database Layer
//!
//! `PostgreSQL` and Redis connections, plus the store implementations the
//! auth chain is wired against.

pub mod memory;
mod models;
mod queries;
mod stores;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use models::*;
pub use queries::*;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
pub use stores::*;
use tracing::info;
use uuid::Uuid;

use crate::auth::LockoutPolicy;

/// Create `PostgreSQL` connection pool with health configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(2)
        .max_connections(20)
        // Prevent hanging requests on pool exhaustion
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}

/// Create Redis client.
pub async fn create_redis_client(redis_url: &str) -> Result<fred::clients::Client> {
    use fred::prelude::*;

    let config = Config::from_url(redis_url)?;
    let client = Client::new(config, None, None, None);
    client.connect();
    client.wait_for_connect().await?;

    info!("Connected to Redis");
    Ok(client)
}

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn into_profile(row: Option<AdminProfileRow>) -> StoreResult<Option<AdminProfile>> {
    row.map(AdminProfile::try_from)
        .transpose()
        .map_err(StoreError::Corrupt)
}

#[async_trait]
impl AdminStore for PgStore {
    async fn find_by_principal(&self, principal_id: &str) -> StoreResult<Option<AdminProfile>> {
        into_profile(find_admin_by_principal(&self.pool, principal_id).await?)
    }

    async fn clear_force_logout(&self, admin_id: Uuid) -> StoreResult<()> {
        Ok(clear_force_logout(&self.pool, admin_id).await?)
    }

    async fn set_force_logout(&self, admin_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        Ok(set_force_logout(&self.pool, admin_id, at).await?)
    }

    async fn enable_two_fa(
        &self,
        admin_id: Uuid,
        secret: &str,
        verified_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(enable_two_fa(&self.pool, admin_id, secret, verified_at).await?)
    }

    async fn disable_two_fa(&self, admin_id: Uuid) -> StoreResult<()> {
        Ok(disable_two_fa(&self.pool, admin_id).await?)
    }

    async fn record_login(&self, admin_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        Ok(record_login(&self.pool, admin_id, at).await?)
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn begin_attempt(
        &self,
        admin_id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> StoreResult<AttemptStart> {
        if let Some(record) = reset_stale_attempt_window(&self.pool, admin_id, now, policy).await? {
            return Ok(AttemptStart {
                record: Some(record),
                window_reset: true,
            });
        }

        Ok(AttemptStart {
            record: get_attempt_record(&self.pool, admin_id).await?,
            window_reset: false,
        })
    }

    async fn register_failure(
        &self,
        admin_id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
        already_counted: bool,
    ) -> StoreResult<TwoFaAttemptRecord> {
        Ok(register_attempt_failure(&self.pool, admin_id, now, policy, already_counted).await?)
    }

    async fn reset(&self, admin_id: Uuid) -> StoreResult<()> {
        Ok(reset_attempts(&self.pool, admin_id).await?)
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn insert(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry> {
        Ok(insert_audit_log(&self.pool, &entry).await?.into())
    }

    async fn list(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditLogEntry>, i64)> {
        let prefix = query.action_prefix.as_deref();
        let total = count_audit_logs(&self.pool, prefix).await?;
        let rows = list_audit_logs(&self.pool, query.limit, query.offset, prefix).await?;
        Ok((rows.into_iter().map(AuditLogEntry::from).collect(), total))
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn load_all(&self) -> StoreResult<Vec<SettingRecord>> {
        Ok(load_settings(&self.pool).await?)
    }

    async fn upsert(&self, record: &SettingRecord, updated_by: Uuid) -> StoreResult<()> {
        Ok(upsert_setting(&self.pool, record, updated_by).await?)
    }
}
