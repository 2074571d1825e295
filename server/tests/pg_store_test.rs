//! `PgStore` against a real database.
//!
//! Run with `DATABASE_URL` set: `cargo test --test pg_store_test -- --ignored`

mod helpers;

use std::sync::Arc;

use chrono::{Duration, Utc};
use helpers::shared_pool;
use lf_admin_server::auth::LockoutPolicy;
use lf_admin_server::db::{
    AttemptStore, AuditOutcome, AuditQuery, AuditSink, NewAuditEntry, PgStore, SettingRecord,
    SettingsStore,
};
use uuid::Uuid;

async fn insert_admin(store: &PgStore) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO admin_profiles (id, principal_id, email, role) VALUES ($1, $2, $3, 'super_admin')",
    )
    .bind(id)
    .bind(format!("principal-{id}"))
    .bind(format!("{id}@example.com"))
    .execute(store.pool())
    .await
    .expect("insert admin");
    id
}

#[tokio::test]
#[ignore]
async fn test_concurrent_failures_lock_once_threshold_reached() {
    let store = Arc::new(PgStore::new(shared_pool().await.clone()));
    let admin = insert_admin(&store).await;
    let policy = LockoutPolicy::default();
    let now = Utc::now();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .register_failure(admin, now, &policy, false)
                    .await
                    .expect("register failure")
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let start = store
        .begin_attempt(admin, now, &policy)
        .await
        .expect("begin attempt");
    let record = start.record.expect("record");
    assert!(!start.window_reset);
    assert_eq!(record.attempt_count, 6);
    assert!(record.is_locked(now));

    // A stale window resets before the lock is checked.
    let later = now + Duration::minutes(11);
    let start = store
        .begin_attempt(admin, later, &policy)
        .await
        .expect("begin attempt");
    assert!(start.window_reset);
    let record = start.record.expect("record");
    assert_eq!(record.attempt_count, 1);
    assert!(record.locked_until.is_none());

    let record = store
        .register_failure(admin, later, &policy, true)
        .await
        .expect("register failure");
    assert_eq!(record.attempt_count, 1);

    store.reset(admin).await.expect("reset");
}

#[tokio::test]
#[ignore]
async fn test_audit_prefix_filter() {
    let store = PgStore::new(shared_pool().await.clone());
    let admin = insert_admin(&store).await;
    let prefix = format!("T{}_", admin.simple());

    for suffix in ["SETUP", "ENABLE"] {
        store
            .insert(NewAuditEntry {
                admin_id: admin,
                action: format!("{prefix}{suffix}"),
                resource_type: "admin_profile".into(),
                outcome: AuditOutcome::Success,
                resource_id: None,
                metadata: serde_json::json!({}),
                ip_address: Some("203.0.113.1".into()),
                user_agent: None,
                actor_label: None,
            })
            .await
            .expect("insert audit");
    }

    let (items, total) = store
        .list(&AuditQuery {
            limit: 1,
            offset: 0,
            action_prefix: Some(prefix.clone()),
        })
        .await
        .expect("list audit");
    assert_eq!(total, 2);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].action, format!("{prefix}ENABLE"));
}

#[tokio::test]
#[ignore]
async fn test_settings_upsert() {
    let store = PgStore::new(shared_pool().await.clone());
    let admin = insert_admin(&store).await;
    let key = format!("test_{}", admin.simple());

    for value in ["1", "2"] {
        store
            .upsert(
                &SettingRecord {
                    key: key.clone(),
                    value: value.into(),
                    value_type: "number".into(),
                },
                admin,
            )
            .await
            .expect("upsert");
    }

    let records = store.load_all().await.expect("load");
    let record = records.iter().find(|r| r.key == key).expect("setting");
    assert_eq!(record.value, "2");
}
