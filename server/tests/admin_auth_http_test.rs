//! HTTP tests for the admin authentication chain.
//!
//! Bearer verification, profile resolution, role gates, the second-factor
//! gate and force logout, all driven through the full router.

mod helpers;

use axum::http::{header, Method, StatusCode};
use helpers::{body_to_json, TestApp, CLIENT_IP, TEST_SECRET};
use lf_admin_server::auth::Role;
use lf_admin_server::db::memory::AdminSeed;
use lf_admin_server::db::AuditOutcome;
use serde_json::json;

#[tokio::test]
async fn test_missing_and_malformed_credentials() {
    let app = TestApp::new();

    let resp = app
        .send(Method::GET, "/admin/auth/profile", None, None)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_to_json(resp).await["code"], "MISSING_TOKEN");

    let req = TestApp::request(Method::GET, "/admin/auth/profile")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_to_json(resp).await["code"], "INVALID_TOKEN");

    let resp = app.get("/admin/auth/profile", "not-issued").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_to_json(resp).await;
    assert_eq!(body["code"], "INVALID_TOKEN");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_principal_without_admin_profile_is_forbidden() {
    let app = TestApp::new();
    app.identity.issue(
        "member-token",
        lf_admin_server::auth::Principal {
            id: "member-1".into(),
            email: "member@example.com".into(),
        },
    );

    let resp = app.get("/admin/auth/profile", "member-token").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_to_json(resp).await["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_inactive_admin_is_forbidden_for_every_role() {
    let app = TestApp::new();

    for role in [Role::Analyst, Role::Moderator, Role::SuperAdmin] {
        let (_, token) = app.admin(
            AdminSeed::new(&format!("inactive-{role}"), role)
                .inactive()
                .with_two_fa(TEST_SECRET),
        );
        let resp = app.get("/admin/auth/profile", &token).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "role {role}");
    }
}

#[tokio::test]
async fn test_verify_stamps_login_and_reports_second_factor() {
    let app = TestApp::new();
    let (admin, token) =
        app.admin(AdminSeed::new("root", Role::SuperAdmin).with_two_fa(TEST_SECRET));

    let resp = app.post("/admin/auth/verify", &token, json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_to_json(resp).await;
    assert_eq!(body["requiresTwoFA"], true);
    assert_eq!(body["admin"]["role"], "super_admin");
    assert!(body["admin"].get("twoFaSecret").is_none());

    assert!(app.store.admin(admin.id).unwrap().last_login_at.is_some());

    let entries = app.wait_for_audit("ADMIN_LOGIN", 1).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Success);
    assert_eq!(entries[0].ip_address.as_deref(), Some(CLIENT_IP));
}

#[tokio::test]
async fn test_analyst_denied_super_admin_route() {
    let app = TestApp::new();
    let (analyst, token) = app.admin(AdminSeed::new("analyst", Role::Analyst));

    let resp = app.get("/admin/audit-logs", &token).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_to_json(resp).await["code"], "FORBIDDEN");

    let denied = app.wait_for_audit("ACCESS_DENIED", 1).await;
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].admin_id, analyst.id);
    assert_eq!(denied[0].outcome, AuditOutcome::Failure);
    assert_eq!(denied[0].metadata["path"], "/admin/audit-logs");
    assert!(app.audit("AUDIT_LOG_VIEW").is_empty());
}

#[tokio::test]
async fn test_enrollment_routes_require_exact_super_admin() {
    let app = TestApp::new();
    let (_, token) = app.admin(AdminSeed::new("mod", Role::Moderator));

    let resp = app.post("/admin/2fa/setup", &token, json!({})).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_second_factor_required_then_satisfied() {
    let app = TestApp::new();
    let (_, token) = app.admin(AdminSeed::new("root", Role::SuperAdmin).with_two_fa(TEST_SECRET));

    let resp = app.get("/admin/audit-logs", &token).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_to_json(resp).await["code"], "2FA_REQUIRED");

    let resp = app
        .post(
            "/admin/2fa/verify-login",
            &token,
            json!({ "token": app.totp_code(TEST_SECRET) }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_to_json(resp).await["success"], true);

    let resp = app.get("/admin/audit-logs", &token).await;
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(app.wait_for_audit("2FA_REQUIRED", 1).await.len(), 1);
    let verified = app.wait_for_audit("2FA_LOGIN_VERIFY", 1).await;
    assert_eq!(verified[0].outcome, AuditOutcome::Success);
}

#[tokio::test]
async fn test_second_factor_is_per_session() {
    let app = TestApp::new();
    let (admin, token) =
        app.admin(AdminSeed::new("root", Role::SuperAdmin).with_two_fa(TEST_SECRET));

    let resp = app
        .post(
            "/admin/2fa/verify-login",
            &token,
            json!({ "token": app.totp_code(TEST_SECRET) }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // A second credential for the same admin starts unverified.
    let other = app.sign_in(&admin);
    let resp = app.get("/admin/settings", &other).await;
    assert_eq!(body_to_json(resp).await["code"], "2FA_REQUIRED");

    // Logout drops the flag for the original session.
    let resp = app.post("/admin/auth/logout", &token, json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.get("/admin/settings", &token).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_super_admin_never_challenged() {
    let app = TestApp::new();
    let (_, token) = app.admin(AdminSeed::new("mod", Role::Moderator).with_two_fa(TEST_SECRET));

    let resp = app.get("/admin/settings", &token).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.post("/admin/2fa/check", &token, json!({})).await;
    let body = body_to_json(resp).await;
    assert_eq!(body["requiresTwoFA"], false);
    assert_eq!(body["twoFaEnabled"], true);
}

#[tokio::test]
async fn test_unconfirmed_two_fa_is_not_challenged() {
    let app = TestApp::new();
    let (_, token) = app.admin(
        AdminSeed::new("root", Role::SuperAdmin).with_unconfirmed_two_fa(TEST_SECRET),
    );

    let resp = app.get("/admin/audit-logs", &token).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_enrollment_flow() {
    let app = TestApp::new();
    let (admin, token) = app.admin(AdminSeed::new("root", Role::SuperAdmin));

    let resp = app.post("/admin/2fa/setup", &token, json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_to_json(resp).await;
    let secret = body["secret"].as_str().unwrap().to_string();
    assert!(body["enrollmentUri"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));
    assert!(!app.store.admin(admin.id).unwrap().two_fa_enabled);

    let resp = app
        .post(
            "/admin/2fa/verify",
            &token,
            json!({ "secret": secret, "token": app.wrong_code(&secret) }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_to_json(resp).await["code"], "INVALID_CODE");

    let resp = app
        .post(
            "/admin/2fa/verify",
            &token,
            json!({ "secret": secret, "token": app.totp_code(&secret) }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let stored = app.store.admin(admin.id).unwrap();
    assert!(stored.two_fa_enabled);
    assert!(stored.two_fa_verified_at.is_some());
    assert_eq!(stored.two_fa_secret.as_deref(), Some(secret.as_str()));

    // Enabled and confirmed: setup is refused.
    let resp = app.post("/admin/2fa/setup", &token, json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let enables = app.wait_for_audit("2FA_ENABLE", 2).await;
    assert_eq!(enables.len(), 2);
    assert_eq!(
        enables
            .iter()
            .filter(|e| e.outcome == AuditOutcome::Success)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_enable_cannot_replace_confirmed_secret() {
    let app = TestApp::new();
    let (admin, token) =
        app.admin(AdminSeed::new("root", Role::SuperAdmin).with_two_fa(TEST_SECRET));

    let resp = app.get("/admin/audit-logs", &token).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // A session that never passed the second factor brings its own secret.
    let other_secret = app.state.totp.enroll("intruder").unwrap().secret;
    let resp = app
        .post(
            "/admin/2fa/verify",
            &token,
            json!({ "secret": other_secret, "token": app.totp_code(&other_secret) }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_to_json(resp).await["code"], "VALIDATION_ERROR");

    let stored = app.store.admin(admin.id).unwrap();
    assert_eq!(stored.two_fa_secret.as_deref(), Some(TEST_SECRET));
    assert!(stored.two_fa_verified_at.is_some());

    let resp = app.get("/admin/audit-logs", &token).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_to_json(resp).await["code"], "2FA_REQUIRED");

    let enables = app.wait_for_audit("2FA_ENABLE", 1).await;
    assert_eq!(enables.len(), 1);
    assert_eq!(enables[0].outcome, AuditOutcome::Failure);
}

#[tokio::test]
async fn test_disable_requires_second_factor() {
    let app = TestApp::new();
    let (admin, token) =
        app.admin(AdminSeed::new("root", Role::SuperAdmin).with_two_fa(TEST_SECRET));

    let resp = app.post("/admin/2fa/disable", &token, json!({})).await;
    assert_eq!(body_to_json(resp).await["code"], "2FA_REQUIRED");

    let resp = app
        .post(
            "/admin/2fa/verify-login",
            &token,
            json!({ "token": app.totp_code(TEST_SECRET) }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.post("/admin/2fa/disable", &token, json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let stored = app.store.admin(admin.id).unwrap();
    assert!(!stored.two_fa_enabled);
    assert!(stored.two_fa_secret.is_none());
}

#[tokio::test]
async fn test_force_logout_denies_once() {
    let app = TestApp::new();
    let (_, root_token) = app.admin(AdminSeed::new("root", Role::SuperAdmin));
    let (target, target_token) = app.admin(AdminSeed::new("analyst", Role::Analyst));

    let resp = app
        .post(
            &format!("/admin/admins/{}/force-logout", target.id),
            &root_token,
            json!({}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.get("/admin/auth/profile", &target_token).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_to_json(resp).await["code"], "NOT_AUTHENTICATED");
    assert!(app.store.admin(target.id).unwrap().force_logout_at.is_none());

    let fresh = app.sign_in(&target);
    let resp = app.get("/admin/auth/profile", &fresh).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_force_logout_guards() {
    let app = TestApp::new();
    let (root, token) = app.admin(AdminSeed::new("root", Role::SuperAdmin));

    let resp = app
        .post(
            &format!("/admin/admins/{}/force-logout", root.id),
            &token,
            json!({}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .post(
            &format!("/admin/admins/{}/force-logout", uuid::Uuid::now_v7()),
            &token,
            json!({}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let entries = app.wait_for_audit("ADMIN_FORCE_LOGOUT", 2).await;
    assert!(entries.iter().all(|e| e.outcome == AuditOutcome::Failure));
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_request() {
    let app = TestApp::new();
    app.store.set_fail_audit(true);
    let (_, token) = app.admin(AdminSeed::new("root", Role::SuperAdmin));

    let resp = app.post("/admin/auth/verify", &token, json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_query_is_audited() {
    let app = TestApp::new();
    let (_, token) = app.admin(AdminSeed::new("root", Role::SuperAdmin));

    let resp = app.get("/admin/audit-logs?limit=abc", &token).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_to_json(resp).await["code"], "VALIDATION_ERROR");

    let entries = app.wait_for_audit("AUDIT_LOG_VIEW", 1).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Failure);
}

#[tokio::test]
async fn test_malformed_admin_id_is_audited() {
    let app = TestApp::new();
    let (_, token) = app.admin(AdminSeed::new("root", Role::SuperAdmin));

    let resp = app
        .post("/admin/admins/not-a-uuid/force-logout", &token, json!({}))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let entries = app.wait_for_audit("ADMIN_FORCE_LOGOUT", 1).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Failure);
    assert!(entries[0].resource_id.is_none());
}
