//! In-memory store.
//!
//! Implements every store trait without a database. Used by tests and by
//! local tooling; lockout counters are updated under a per-key entry lock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::models::{
    AdminProfile, AuditLogEntry, NewAuditEntry, SettingRecord, TwoFaAttemptRecord,
};
use super::stores::{
    AdminStore, AttemptStart, AttemptStore, AuditQuery, AuditSink, SettingsStore, StoreError,
    StoreResult,
};
use crate::auth::{LockoutPolicy, Role};

/// Builder for seeding admin profiles.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    profile: AdminProfile,
}

impl AdminSeed {
    pub fn new(principal_id: &str, role: Role) -> Self {
        Self {
            profile: AdminProfile {
                id: Uuid::now_v7(),
                principal_id: principal_id.to_string(),
                email: format!("{principal_id}@example.com"),
                role,
                is_active: true,
                two_fa_enabled: false,
                two_fa_secret: None,
                two_fa_verified_at: None,
                force_logout_at: None,
                last_login_at: None,
                created_at: Utc::now(),
            },
        }
    }

    #[must_use]
    pub fn email(mut self, email: &str) -> Self {
        self.profile.email = email.to_string();
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.profile.is_active = false;
        self
    }

    /// Enabled and confirmed 2FA.
    #[must_use]
    pub fn with_two_fa(mut self, secret: &str) -> Self {
        self.profile.two_fa_enabled = true;
        self.profile.two_fa_secret = Some(secret.to_string());
        self.profile.two_fa_verified_at = Some(Utc::now());
        self
    }

    /// Enabled but never confirmed.
    #[must_use]
    pub fn with_unconfirmed_two_fa(mut self, secret: &str) -> Self {
        self.profile.two_fa_enabled = true;
        self.profile.two_fa_secret = Some(secret.to_string());
        self.profile.two_fa_verified_at = None;
        self
    }

    #[must_use]
    pub const fn force_logout_at(mut self, at: DateTime<Utc>) -> Self {
        self.profile.force_logout_at = Some(at);
        self
    }
}

/// Process-local implementation of all store traits.
#[derive(Default)]
pub struct MemoryStore {
    admins: DashMap<Uuid, AdminProfile>,
    attempts: DashMap<Uuid, TwoFaAttemptRecord>,
    audit: Mutex<Vec<AuditLogEntry>>,
    settings: DashMap<String, SettingRecord>,
    settings_loads: AtomicUsize,
    fail_attempts: AtomicBool,
    fail_audit: AtomicBool,
    fail_settings: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the default platform settings.
    pub fn with_default_settings() -> Self {
        let store = Self::new();
        store.put_setting("maintenance_mode", "false", "boolean");
        store.put_setting(
            "maintenance_message",
            "The platform is under maintenance. Please try again later.",
            "string",
        );
        store.put_setting("site_name", "Lost & Found", "string");
        store
    }

    pub fn insert_admin(&self, seed: AdminSeed) -> AdminProfile {
        let profile = seed.profile;
        self.admins.insert(profile.id, profile.clone());
        profile
    }

    pub fn admin(&self, admin_id: Uuid) -> Option<AdminProfile> {
        self.admins.get(&admin_id).map(|a| a.clone())
    }

    pub fn attempt_record(&self, admin_id: Uuid) -> Option<TwoFaAttemptRecord> {
        self.attempts.get(&admin_id).map(|r| r.clone())
    }

    /// Write a setting directly, bypassing any cache.
    pub fn put_setting(&self, key: &str, value: &str, value_type: &str) {
        self.settings.insert(
            key.to_string(),
            SettingRecord {
                key: key.to_string(),
                value: value.to_string(),
                value_type: value_type.to_string(),
            },
        );
    }

    /// Number of full settings loads attempted, failed ones included.
    pub fn settings_loads(&self) -> usize {
        self.settings_loads.load(Ordering::SeqCst)
    }

    /// Snapshot of every audit entry, in insertion order.
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_fail_attempts(&self, fail: bool) {
        self.fail_attempts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_settings(&self, fail: bool) {
        self.fail_settings.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{what} store offline")));
        }
        Ok(())
    }

    fn update_admin(&self, admin_id: Uuid, f: impl FnOnce(&mut AdminProfile)) -> bool {
        self.admins.get_mut(&admin_id).map(|mut a| f(&mut a)).is_some()
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn find_by_principal(&self, principal_id: &str) -> StoreResult<Option<AdminProfile>> {
        Ok(self
            .admins
            .iter()
            .find(|a| a.principal_id == principal_id)
            .map(|a| a.clone()))
    }

    async fn clear_force_logout(&self, admin_id: Uuid) -> StoreResult<()> {
        self.update_admin(admin_id, |a| a.force_logout_at = None);
        Ok(())
    }

    async fn set_force_logout(&self, admin_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self.update_admin(admin_id, |a| a.force_logout_at = Some(at)))
    }

    async fn enable_two_fa(
        &self,
        admin_id: Uuid,
        secret: &str,
        verified_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.update_admin(admin_id, |a| {
            a.two_fa_secret = Some(secret.to_string());
            a.two_fa_enabled = true;
            a.two_fa_verified_at = Some(verified_at);
        });
        Ok(())
    }

    async fn disable_two_fa(&self, admin_id: Uuid) -> StoreResult<()> {
        self.update_admin(admin_id, |a| {
            a.two_fa_secret = None;
            a.two_fa_enabled = false;
            a.two_fa_verified_at = None;
        });
        Ok(())
    }

    async fn record_login(&self, admin_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        self.update_admin(admin_id, |a| a.last_login_at = Some(at));
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn begin_attempt(
        &self,
        admin_id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> StoreResult<AttemptStart> {
        Self::check(&self.fail_attempts, "attempt")?;

        let mut window_reset = false;
        let record = self.attempts.get_mut(&admin_id).map(|mut record| {
            if record.window_expired(now, policy.window) {
                record.attempt_count = 1;
                record.last_attempt_at = now;
                record.locked_until = None;
                window_reset = true;
            }
            record.clone()
        });

        Ok(AttemptStart {
            record,
            window_reset,
        })
    }

    async fn register_failure(
        &self,
        admin_id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
        already_counted: bool,
    ) -> StoreResult<TwoFaAttemptRecord> {
        Self::check(&self.fail_attempts, "attempt")?;

        let max = i32::try_from(policy.max_attempts).unwrap_or(i32::MAX);
        let lock_at = now + policy.lockout;

        let record = match self.attempts.entry(admin_id) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.window_expired(now, policy.window) {
                    record.attempt_count = 1;
                    record.locked_until = None;
                } else if !already_counted {
                    record.attempt_count += 1;
                }
                record.last_attempt_at = now;
                if record.attempt_count >= max {
                    record.locked_until = Some(lock_at);
                }
                record.clone()
            }
            Entry::Vacant(vacant) => vacant
                .insert(TwoFaAttemptRecord {
                    admin_id,
                    attempt_count: 1,
                    last_attempt_at: now,
                    locked_until: (1 >= max).then_some(lock_at),
                })
                .clone(),
        };

        Ok(record)
    }

    async fn reset(&self, admin_id: Uuid) -> StoreResult<()> {
        Self::check(&self.fail_attempts, "attempt")?;

        if let Some(mut record) = self.attempts.get_mut(&admin_id) {
            record.attempt_count = 0;
            record.locked_until = None;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn insert(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry> {
        Self::check(&self.fail_audit, "audit")?;

        let entry = AuditLogEntry::from_new(entry, Uuid::now_v7(), Utc::now());
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(entry)
    }

    async fn list(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditLogEntry>, i64)> {
        Self::check(&self.fail_audit, "audit")?;

        let mut matching: Vec<AuditLogEntry> = self
            .audit_entries()
            .into_iter()
            .filter(|e| {
                query
                    .action_prefix
                    .as_deref()
                    .is_none_or(|prefix| e.action.starts_with(prefix))
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(query.offset).unwrap_or_default();
        let limit = usize::try_from(query.limit).unwrap_or_default();
        let page = matching.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_all(&self) -> StoreResult<Vec<SettingRecord>> {
        self.settings_loads.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_settings, "settings")?;

        let mut records: Vec<SettingRecord> = self.settings.iter().map(|s| s.clone()).collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    async fn upsert(&self, record: &SettingRecord, _updated_by: Uuid) -> StoreResult<()> {
        Self::check(&self.fail_settings, "settings")?;

        self.settings.insert(record.key.clone(), record.clone());
        Ok(())
    }
}
