//! Platform Settings Cache
//!
//! Read-through cache over the key/value settings table. The whole table
//! is reloaded at most once per TTL into a fresh map, which is then
//! published with a single pointer swap: readers hold either the old
//! snapshot or the new one, never a partially-filled map.

pub mod maintenance;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{SettingRecord, SettingsStore, StoreError, StoreResult};

pub use maintenance::maintenance_gate;

pub const MAINTENANCE_MODE: &str = "maintenance_mode";
pub const MAINTENANCE_MESSAGE: &str = "maintenance_message";
pub const SITE_NAME: &str = "site_name";

pub const DEFAULT_SITE_NAME: &str = "Lost & Found";

pub const DEFAULT_MAINTENANCE_MESSAGE: &str =
    "The platform is under maintenance. Please try again later.";

/// Declared type of a stored setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    String,
    Number,
    Boolean,
    Json,
}

impl SettingType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Type a JSON value would be stored as.
    pub const fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Null | Value::Array(_) | Value::Object(_) => Self::Json,
        }
    }

    /// Decode a stored text value.
    fn decode(self, raw: &str) -> Option<Value> {
        match self {
            Self::String => Some(Value::String(raw.to_string())),
            Self::Boolean => raw.trim().parse::<bool>().ok().map(Value::Bool),
            Self::Number => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .ok()
                .or_else(|| raw.trim().parse::<f64>().ok().map(Value::from)),
            Self::Json => serde_json::from_str(raw).ok(),
        }
    }

    /// Encode a JSON value for storage, if it fits this type.
    pub fn encode(self, value: &Value) -> Option<String> {
        match (self, value) {
            (Self::String, Value::String(s)) => Some(s.clone()),
            (Self::Boolean, Value::Bool(b)) => Some(b.to_string()),
            (Self::Number, Value::Number(n)) => Some(n.to_string()),
            (Self::Json, v) => serde_json::to_string(v).ok(),
            _ => None,
        }
    }
}

/// One cached setting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsCacheEntry {
    pub key: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: SettingType,
    pub cached_at: DateTime<Utc>,
}

impl SettingsCacheEntry {
    fn from_record(record: SettingRecord, cached_at: DateTime<Utc>) -> Self {
        let declared = SettingType::parse(&record.value_type).unwrap_or_else(|| {
            warn!(key = %record.key, value_type = %record.value_type, "Unknown setting type");
            SettingType::String
        });
        let (value_type, value) = match declared.decode(&record.value) {
            Some(value) => (declared, value),
            None => {
                warn!(key = %record.key, "Setting value does not match its type, serving as string");
                (SettingType::String, Value::String(record.value))
            }
        };

        Self {
            key: record.key,
            value,
            value_type,
            cached_at,
        }
    }
}

/// Immutable view of the whole table at one refresh.
#[derive(Debug, Default)]
struct SettingsSnapshot {
    entries: HashMap<String, SettingsCacheEntry>,
    /// `None` until the first load, or after an invalidation.
    refreshed_at: Option<DateTime<Utc>>,
    /// At least one load has succeeded.
    loaded: bool,
}

/// Settings cache errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Setting value does not match type '{0}'")]
    TypeMismatch(&'static str),

    #[error("Unknown setting type '{0}'")]
    UnknownType(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// TTL-based read-through cache.
pub struct SettingsCache {
    source: Arc<dyn SettingsStore>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Arc<SettingsSnapshot>>,
    /// Serializes reloads so one stale read triggers one backing fetch.
    refresh_lock: Mutex<()>,
    /// Bumped on invalidation; a reload that raced one publishes as stale.
    generation: AtomicU64,
}

impl SettingsCache {
    pub fn new(source: Arc<dyn SettingsStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            ttl,
            clock,
            snapshot: RwLock::new(Arc::new(SettingsSnapshot::default())),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    fn is_fresh(&self, snapshot: &SettingsSnapshot, now: DateTime<Utc>) -> bool {
        snapshot
            .refreshed_at
            .is_some_and(|at| now - at <= self.ttl)
    }

    /// Current snapshot, reloading it first if the TTL has passed.
    async fn current(&self) -> StoreResult<Arc<SettingsSnapshot>> {
        let snapshot = self.snapshot.read().await.clone();
        if self.is_fresh(&snapshot, self.clock.now()) {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have reloaded while we waited.
        let snapshot = self.snapshot.read().await.clone();
        if self.is_fresh(&snapshot, self.clock.now()) {
            return Ok(snapshot);
        }

        self.reload().await
    }

    async fn reload(&self) -> StoreResult<Arc<SettingsSnapshot>> {
        let generation = self.generation.load(Ordering::Acquire);
        let now = self.clock.now();
        let records = match self.source.load_all().await {
            Ok(records) => records,
            Err(e) => return self.serve_stale(e, generation, now).await,
        };

        let entries: HashMap<_, _> = records
            .into_iter()
            .map(|r| (r.key.clone(), SettingsCacheEntry::from_record(r, now)))
            .collect();

        let raced = self.generation.load(Ordering::Acquire) != generation;
        let fresh = Arc::new(SettingsSnapshot {
            entries,
            refreshed_at: (!raced).then_some(now),
            loaded: true,
        });

        *self.snapshot.write().await = fresh.clone();
        debug!(count = fresh.entries.len(), "Settings cache refreshed");
        Ok(fresh)
    }

    /// Keep serving the last good table for one more TTL after a failed load.
    ///
    /// With nothing loaded yet there is nothing to serve and the error is
    /// returned.
    async fn serve_stale(
        &self,
        err: StoreError,
        generation: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<Arc<SettingsSnapshot>> {
        let mut slot = self.snapshot.write().await;
        if !slot.loaded {
            return Err(err);
        }

        warn!(
            error = %err,
            retry_in_secs = self.ttl.num_seconds(),
            "Settings reload failed, serving previous snapshot"
        );
        let raced = self.generation.load(Ordering::Acquire) != generation;
        let stale = Arc::new(SettingsSnapshot {
            entries: slot.entries.clone(),
            refreshed_at: (!raced).then_some(now),
            loaded: true,
        });
        *slot = stale.clone();
        Ok(stale)
    }

    /// Mark the cache stale without touching readers' current snapshot.
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Arc::new(SettingsSnapshot {
            entries: snapshot.entries.clone(),
            refreshed_at: None,
            loaded: snapshot.loaded,
        });
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.current().await?.entries.get(key).map(|e| e.value.clone()))
    }

    pub async fn get_bool(&self, key: &str) -> StoreResult<Option<bool>> {
        Ok(self.get(key).await?.and_then(|v| v.as_bool()))
    }

    pub async fn get_string(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Every cached entry, sorted by key.
    pub async fn all(&self) -> StoreResult<Vec<SettingsCacheEntry>> {
        let snapshot = self.current().await?;
        let mut entries: Vec<_> = snapshot.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Write a setting through to the store and invalidate the cache.
    pub async fn update(
        &self,
        key: &str,
        value: &Value,
        value_type: Option<&str>,
        updated_by: Uuid,
    ) -> Result<SettingsCacheEntry, SettingsError> {
        let value_type = match value_type {
            Some(t) => SettingType::parse(t).ok_or_else(|| SettingsError::UnknownType(t.into()))?,
            None => SettingType::infer(value),
        };
        let encoded = value_type
            .encode(value)
            .ok_or(SettingsError::TypeMismatch(value_type.as_str()))?;

        let record = SettingRecord {
            key: key.to_string(),
            value: encoded,
            value_type: value_type.as_str().to_string(),
        };
        self.source.upsert(&record, updated_by).await?;
        self.invalidate().await;

        info!(key = %key, updated_by = %updated_by, "Platform setting updated");
        Ok(SettingsCacheEntry::from_record(record, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::db::memory::MemoryStore;

    fn cache() -> (Arc<MemoryStore>, Arc<ManualClock>, SettingsCache) {
        let store = Arc::new(MemoryStore::with_default_settings());
        let clock = Arc::new(ManualClock::default());
        let cache = SettingsCache::new(store.clone(), Duration::seconds(30), clock.clone());
        (store, clock, cache)
    }

    #[tokio::test]
    async fn test_reads_within_ttl_hit_cache() {
        let (store, clock, cache) = cache();

        assert_eq!(cache.get_bool(MAINTENANCE_MODE).await.unwrap(), Some(false));
        store.put_setting(MAINTENANCE_MODE, "true", "boolean");

        clock.advance(Duration::seconds(29));
        assert_eq!(cache.get_bool(MAINTENANCE_MODE).await.unwrap(), Some(false));
        assert_eq!(store.settings_loads(), 1);

        clock.advance(Duration::seconds(2));
        assert_eq!(cache.get_bool(MAINTENANCE_MODE).await.unwrap(), Some(true));
        assert_eq!(store.settings_loads(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_stale_reads_load_once() {
        let (store, _, cache) = cache();
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.all().await.unwrap().len() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 3);
        }
        assert_eq!(store.settings_loads(), 1);
    }

    #[tokio::test]
    async fn test_update_invalidates() {
        let (store, _, cache) = cache();
        let admin = Uuid::now_v7();

        assert_eq!(
            cache.get_string(SITE_NAME).await.unwrap().as_deref(),
            Some("Lost & Found")
        );
        cache
            .update(SITE_NAME, &json!("Found It"), None, admin)
            .await
            .unwrap();
        assert_eq!(
            cache.get_string(SITE_NAME).await.unwrap().as_deref(),
            Some("Found It")
        );
        assert_eq!(store.settings_loads(), 2);
    }

    #[tokio::test]
    async fn test_update_rejects_type_mismatch() {
        let (_, _, cache) = cache();
        let admin = Uuid::now_v7();

        assert!(matches!(
            cache
                .update(MAINTENANCE_MODE, &json!("yes"), Some("boolean"), admin)
                .await,
            Err(SettingsError::TypeMismatch("boolean"))
        ));
        assert!(matches!(
            cache.update("x", &json!(1), Some("date"), admin).await,
            Err(SettingsError::UnknownType(_))
        ));
    }

    #[tokio::test]
    async fn test_typed_decoding() {
        let (store, _, cache) = cache();
        store.put_setting("max_items", "25", "number");
        store.put_setting("featured", r#"{"ids":[1,2]}"#, "json");
        store.put_setting("broken", "maybe", "boolean");

        assert_eq!(cache.get("max_items").await.unwrap(), Some(json!(25)));
        assert_eq!(cache.get("featured").await.unwrap(), Some(json!({"ids": [1, 2]})));
        assert_eq!(cache.get("broken").await.unwrap(), Some(json!("maybe")));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_error_propagates() {
        let (store, _, cache) = cache();
        store.set_fail_settings(true);
        assert!(cache.get(MAINTENANCE_MODE).await.is_err());
    }

    #[tokio::test]
    async fn test_outage_serves_previous_snapshot_for_one_ttl() {
        let (store, clock, cache) = cache();
        assert_eq!(cache.get_bool(MAINTENANCE_MODE).await.unwrap(), Some(false));

        store.set_fail_settings(true);
        clock.advance(Duration::seconds(31));
        assert_eq!(cache.get_bool(MAINTENANCE_MODE).await.unwrap(), Some(false));
        assert_eq!(store.settings_loads(), 2);

        // Backed off: further reads in the window stay off the store.
        for _ in 0..5 {
            clock.advance(Duration::seconds(5));
            assert_eq!(cache.get_bool(MAINTENANCE_MODE).await.unwrap(), Some(false));
        }
        assert_eq!(store.settings_loads(), 2);

        store.set_fail_settings(false);
        store.put_setting(MAINTENANCE_MODE, "true", "boolean");
        clock.advance(Duration::seconds(6));
        assert_eq!(cache.get_bool(MAINTENANCE_MODE).await.unwrap(), Some(true));
        assert_eq!(store.settings_loads(), 3);
    }
}
